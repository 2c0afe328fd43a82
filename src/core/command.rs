//! Command builder
//!
//! Turns an intent (tare, zero, calibrate, poll) into the exact bytes a
//! protocol expects. Arguments are validated before any bytes are produced.

use super::protocol::{CalibrationTemplate, CommandTemplate, Protocol, ProtocolId};
use bytes::{BufMut, Bytes, BytesMut};

/// Weight request sent to an ASCII indicator while probing for its protocol
pub const DETECT_PROBE: &[u8] = b"W\r\n";

const CRLF: &[u8] = b"\r\n";
const MAX_GRAMS: u64 = 0x00ff_ffff;

/// Command builder errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Argument rejected before encoding
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Protocol has no such command
    #[error("{protocol} has no {command} command")]
    Unsupported {
        /// Protocol asked
        protocol: ProtocolId,
        /// Command name
        command: &'static str,
    },
}

fn render(template: CommandTemplate) -> Bytes {
    match template {
        CommandTemplate::Text(verb) => {
            let mut buf = BytesMut::with_capacity(verb.len() + CRLF.len());
            buf.put_slice(verb.as_bytes());
            buf.put_slice(CRLF);
            buf.freeze()
        }
        CommandTemplate::Bytes(bytes) => Bytes::from_static(bytes),
    }
}

/// Tare command
pub fn build_tare(protocol: &Protocol) -> Bytes {
    render(protocol.tare())
}

/// Zero command; the same bytes as tare for single-verb devices
pub fn build_zero(protocol: &Protocol) -> Bytes {
    render(protocol.zero())
}

/// Weight request, `None` for streaming protocols
pub fn build_poll(protocol: &Protocol) -> Option<Bytes> {
    protocol.poll().map(Bytes::from_static)
}

/// Reject negative and non-finite reference weights
pub fn validate_reference_weight(reference_weight_kg: f64) -> Result<(), CommandError> {
    if !reference_weight_kg.is_finite() {
        return Err(CommandError::InvalidArgument(format!(
            "reference weight must be finite, got {reference_weight_kg}"
        )));
    }
    if reference_weight_kg < 0.0 {
        return Err(CommandError::InvalidArgument(format!(
            "reference weight must not be negative, got {reference_weight_kg}"
        )));
    }
    Ok(())
}

/// Calibration command for a reference weight in kilograms.
///
/// ASCII protocols send `<verb> <kg with 3 decimals>\r\n`. NEWTON-42 binary
/// sends the weight as a 24-bit little-endian gram count.
pub fn build_calibrate(protocol: &Protocol, reference_weight_kg: f64) -> Result<Bytes, CommandError> {
    validate_reference_weight(reference_weight_kg)?;

    match protocol.calibrate() {
        CalibrationTemplate::Text(verb) => {
            Ok(Bytes::from(format!("{verb} {reference_weight_kg:.3}\r\n")))
        }
        CalibrationTemplate::BinaryGrams(prefix) => {
            let grams = (reference_weight_kg * 1000.0).round();
            if grams > MAX_GRAMS as f64 {
                return Err(CommandError::InvalidArgument(format!(
                    "reference weight {reference_weight_kg} kg exceeds the 24-bit gram field"
                )));
            }
            let grams = grams as u32;
            let mut buf = BytesMut::with_capacity(prefix.len() + 3 + CRLF.len());
            buf.put_slice(prefix);
            buf.put_slice(&grams.to_le_bytes()[..3]);
            buf.put_slice(CRLF);
            Ok(buf.freeze())
        }
        CalibrationTemplate::Unsupported => Err(CommandError::Unsupported {
            protocol: protocol.id(),
            command: "calibrate",
        }),
    }
}
