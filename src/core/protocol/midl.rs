//! MIDL binary responses
//!
//! The indicator answers a `0x0A` request with a 20-byte frame: six decimal
//! digits (one per byte, most significant first), a status byte and padding.

use crate::core::decoder::DecodeError;
use crate::core::reading::{WeighMode, WeightReading};
use bytes::Bytes;

/// Response length
pub const FRAME_LEN: usize = 20;

/// Weight request
pub const POLL_COMMAND: &[u8] = &[0x0a];
/// Tare
pub const TARE_COMMAND: &[u8] = &[0x0c];
/// Set zero
pub const ZERO_COMMAND: &[u8] = &[0x0d];

const DIGITS: usize = 6;
const STATUS: usize = 6;
const DECIMALS: i32 = 3;

const NET: u8 = 0x01;
const NEGATIVE: u8 = 0x02;
const OVERLOAD: u8 = 0x04;

/// Decode one 20-byte response
pub fn decode(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    if raw.len() < FRAME_LEN {
        return Err(DecodeError::Truncated {
            needed: FRAME_LEN,
            available: raw.len(),
        });
    }
    let frame = &raw[..FRAME_LEN];

    let mut value: u32 = 0;
    for (pos, digit) in frame[..DIGITS].iter().enumerate() {
        if *digit > 9 {
            return Err(DecodeError::Malformed(format!(
                "byte {pos} is {digit:#04x}, expected a digit 0-9"
            )));
        }
        value = value * 10 + u32::from(*digit);
    }

    let status = frame[STATUS];
    let mut mass = f64::from(value) / 10f64.powi(DECIMALS);
    if status & NEGATIVE != 0 {
        mass = -mass;
    }
    let mode = if status & NET != 0 {
        WeighMode::Net
    } else {
        WeighMode::Gross
    };

    let reading = WeightReading::new(mass, Bytes::copy_from_slice(frame))?
        .with_status(true, status & OVERLOAD != 0)
        .with_mode(mode);
    Ok(vec![reading])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(digits: [u8; 6], status: u8) -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..6].copy_from_slice(&digits);
        frame[6] = status;
        frame
    }

    #[test]
    fn test_decode_gross() {
        let readings = decode(&frame([0, 1, 2, 3, 4, 5], 0)).unwrap();
        assert_eq!(readings.len(), 1);
        assert!((readings[0].mass_kg() - 12.345).abs() < 1e-9);
        assert_eq!(readings[0].mode(), WeighMode::Gross);
        assert!(!readings[0].is_overload());
    }

    #[test]
    fn test_status_bits() {
        let readings = decode(&frame([0, 0, 1, 5, 0, 0], NET | NEGATIVE | OVERLOAD)).unwrap();
        assert!((readings[0].mass_kg() + 1.5).abs() < 1e-9);
        assert_eq!(readings[0].mode(), WeighMode::Net);
        assert!(readings[0].is_overload());
    }

    #[test]
    fn test_short_frame() {
        assert_eq!(
            decode(&[0; 12]),
            Err(DecodeError::Truncated {
                needed: 20,
                available: 12
            })
        );
    }

    #[test]
    fn test_non_digit() {
        assert!(matches!(
            decode(&frame([0, 0, 0x30, 0, 0, 0], 0)),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_negative_zero() {
        let readings = decode(&frame([0; 6], NEGATIVE)).unwrap();
        assert!(readings[0].mass_kg().is_sign_positive());
    }
}
