//! Frame decoding
//!
//! Decoding never panics and never propagates a numeric parse fault: every
//! failure comes back as a [`DecodeError`] the session can sort into noise
//! (ignore and keep reading) or corruption (report).

use super::detect;
use super::protocol::{ascii, FrameKind, Protocol, ProtocolSelector};
use super::reading::WeightReading;
use tracing::trace;

/// Decode failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Input is not a weight frame for this protocol (echo, unrelated line)
    #[error("not a weight frame")]
    NotAWeightFrame,

    /// Binary frame shorter than its header declares
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the frame requires
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Frame matched the protocol shape but failed validation
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Routine condition the caller should skip silently
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotAWeightFrame | Self::Truncated { .. })
    }
}

/// Decode one frame with an explicit protocol or auto-detection.
///
/// With [`ProtocolSelector::Auto`] the frame is classified first; a line no
/// recognizer accepts is [`DecodeError::NotAWeightFrame`].
pub fn decode(selector: ProtocolSelector, raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    match selector {
        ProtocolSelector::Explicit(id) => decode_with(id.protocol(), raw),
        ProtocolSelector::Auto => decode_auto(raw).map(|(_, readings)| readings),
    }
}

/// Decode one frame with a known protocol
pub fn decode_with(protocol: &Protocol, raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let result = protocol.decode(raw);
    trace!(protocol = protocol.name(), len = raw.len(), ok = result.is_ok(), "decode");
    result
}

/// Detect the protocol of an ASCII line, then decode it.
///
/// Returns the protocol that matched alongside the readings.
pub fn decode_auto(
    raw: &[u8],
) -> Result<(&'static Protocol, Vec<WeightReading>), DecodeError> {
    let line = ascii::line_text(raw);
    let protocol = detect::detect(&line).ok_or(DecodeError::NotAWeightFrame)?;
    debug_assert_eq!(protocol.kind(), FrameKind::AsciiLine);
    let readings = decode_with(protocol, raw)?;
    Ok((protocol, readings))
}
