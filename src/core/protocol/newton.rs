//! NEWTON-42 binary frames
//!
//! ```text
//! header   1 | S | O | Z | D1 D0 | C1 C0
//!            S  stable        O  overload        Z  zeroing in progress
//!            D  decimal places (0-3)             C  channels - 1 (1-4 channels)
//! channel  3 bytes per channel, bit 7 always clear
//!            b0 + b1 << 7 + (b2 & 0x3f) << 14, sign in bit 6 of b2
//! ```

use crate::core::decoder::DecodeError;
use crate::core::reading::WeightReading;
use bytes::Bytes;

/// Bit 7 marks a header byte
pub const HEAD: u8 = 0x80;
const STABLE: u8 = 0x40;
const OVERLOAD: u8 = 0x20;
const ZEROING: u8 = 0x10;
const DECIMALS_MASK: u8 = 0x0c;
const CHANNELS_MASK: u8 = 0x03;

const GROUP_LEN: usize = 3;
const SIGN: u8 = 0x40;
const MAGNITUDE_TOP: u8 = 0x3f;

/// Tare/zero: header, `Z`, CR LF
pub const TARE_COMMAND: &[u8] = &[HEAD, b'Z', b'\r', b'\n'];
/// Weight request: header, `P`, CR LF
pub const POLL_COMMAND: &[u8] = &[HEAD, b'P', b'\r', b'\n'];
/// Calibration prefix, followed by the gram count and CR LF
pub const CALIBRATE_PREFIX: &[u8] = &[HEAD, b'C'];

/// Decoded header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Reading is stable
    pub stable: bool,
    /// Scale is overloaded
    pub overload: bool,
    /// Zeroing in progress
    pub zeroing: bool,
    /// Number of decimal places
    pub decimals: u8,
    /// Number of channels (1-4)
    pub channels: u8,
}

impl Header {
    /// Parse a header byte, `None` if bit 7 is clear
    pub fn parse(byte: u8) -> Option<Self> {
        if byte & HEAD == 0 {
            return None;
        }
        Some(Self {
            stable: byte & STABLE != 0,
            overload: byte & OVERLOAD != 0,
            zeroing: byte & ZEROING != 0,
            decimals: (byte & DECIMALS_MASK) >> 2,
            channels: (byte & CHANNELS_MASK) + 1,
        })
    }

    /// Total frame length including the header
    pub fn frame_len(&self) -> usize {
        1 + GROUP_LEN * usize::from(self.channels)
    }
}

/// Frame length announced by a header byte
pub fn frame_len(header: u8) -> Option<usize> {
    Header::parse(header).map(|h| h.frame_len())
}

/// Decode one frame into a reading per channel
pub fn decode(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let first = *raw.first().ok_or(DecodeError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let header = Header::parse(first).ok_or(DecodeError::NotAWeightFrame)?;

    let needed = header.frame_len();
    if raw.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: raw.len(),
        });
    }
    let frame = &raw[..needed];
    let scale = 10f64.powi(i32::from(header.decimals));

    frame[1..]
        .chunks_exact(GROUP_LEN)
        .zip(0u8..)
        .map(|(group, channel)| {
            let value = channel_value(group)?;
            WeightReading::new(f64::from(value) / scale, Bytes::copy_from_slice(frame)).map(
                |reading| {
                    reading
                        .with_status(header.stable, header.overload)
                        .with_zeroing(header.zeroing)
                        .with_channel(channel)
                },
            )
        })
        .collect()
}

fn channel_value(group: &[u8]) -> Result<i32, DecodeError> {
    if let Some(byte) = group.iter().find(|b| **b & HEAD != 0) {
        return Err(DecodeError::Malformed(format!(
            "payload byte {byte:#04x} has bit 7 set"
        )));
    }
    let negative = group[2] & SIGN != 0;
    let magnitude = i32::from(group[0])
        | i32::from(group[1]) << 7
        | i32::from(group[2] & MAGNITUDE_TOP) << 14;
    Ok(if negative { -magnitude } else { magnitude })
}
