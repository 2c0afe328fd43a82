//! Scale protocol descriptors
//!
//! A [`Protocol`] is plain data: its frame shape, a recognizer used by
//! auto-detection, a decode function and the command templates the device
//! understands. All descriptors live in the [`registry`].
//!
//! Supported families:
//! - ASCII line protocols (MIDL-MI-VDA, A&D, Sartorius, Ohaus, TOKVES-SH50,
//!   MIKROSIM-M0601, NEWTON-42)
//! - NEWTON-42 binary frames with a bit-packed header
//! - MIDL binary 20-byte responses

pub mod ascii;
pub mod midl;
pub mod newton;
pub mod registry;

pub use registry::{all, default_auto_order, lookup};

use super::decoder::DecodeError;
use super::reading::WeightReading;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decode function signature shared by every protocol
pub type DecodeFn = fn(&[u8]) -> Result<Vec<WeightReading>, DecodeError>;

/// Auto-detection predicate over one trimmed sample line
pub type RecognizeFn = fn(&str) -> bool;

/// Protocol identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolId {
    /// MIDL MI VDA/12Ya, `W +123.450 kg`
    MidlMiVda,
    /// A&D, `+0012345`
    AnD,
    /// Sartorius, `0012345`
    Sartorius,
    /// TOKVES SH-50, `ST,GS,  +1.234 kg`
    TokvesSh50,
    /// Ohaus, `ST,+00123.45,kg`
    Ohaus,
    /// MIKROSIM M0601, `+0001.234 kg`
    MikrosimM0601,
    /// NEWTON-42 ASCII, `N+00012.345 kg`
    Newton42Ascii,
    /// NEWTON-42 binary frames
    Newton42Binary,
    /// MIDL binary 20-byte responses
    MidlBinary,
}

impl ProtocolId {
    /// Resolve to the registry descriptor
    pub fn protocol(self) -> &'static Protocol {
        registry::get(self)
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        self.protocol().name()
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a protocol speaks text lines or binary frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// CR/LF terminated text
    AsciiLine,
    /// Fixed-shape byte sequence
    BinaryFrame,
}

/// How frames are cut out of the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShape {
    /// Text line, CR and/or LF terminated
    Line,
    /// Header byte with bit 7 set; length follows from the header
    HeaderCounted,
    /// Fixed number of bytes per frame
    Fixed(usize),
}

impl FrameShape {
    /// Frame kind of this shape
    pub fn kind(self) -> FrameKind {
        match self {
            Self::Line => FrameKind::AsciiLine,
            Self::HeaderCounted | Self::Fixed(_) => FrameKind::BinaryFrame,
        }
    }
}

/// A fixed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTemplate {
    /// ASCII verb, sent followed by CR LF
    Text(&'static str),
    /// Literal bytes
    Bytes(&'static [u8]),
}

/// Calibration command shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTemplate {
    /// `<verb> <weight>` followed by CR LF
    Text(&'static str),
    /// Prefix bytes, then the weight as a 3-byte little-endian gram count, then CR LF
    BinaryGrams(&'static [u8]),
    /// The device has no calibration command
    Unsupported,
}

/// Immutable protocol descriptor
pub struct Protocol {
    pub(crate) id: ProtocolId,
    pub(crate) name: &'static str,
    pub(crate) aliases: &'static [&'static str],
    pub(crate) shape: FrameShape,
    pub(crate) sample: &'static str,
    pub(crate) recognizer: Option<RecognizeFn>,
    pub(crate) decoder: DecodeFn,
    pub(crate) tare: CommandTemplate,
    pub(crate) zero: CommandTemplate,
    pub(crate) calibrate: CalibrationTemplate,
    pub(crate) poll: Option<&'static [u8]>,
}

impl Protocol {
    /// Identifier
    pub fn id(&self) -> ProtocolId {
        self.id
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Alternative names accepted by [`lookup`]
    pub fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    /// Frame kind
    pub fn kind(&self) -> FrameKind {
        self.shape.kind()
    }

    /// Frame shape used by the stream assembler
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Example of the device output, for help texts
    pub fn sample(&self) -> &'static str {
        self.sample
    }

    /// Whether auto-detection can select this protocol
    pub fn is_detectable(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Run the auto-detection predicate against one sample line
    pub fn recognizes(&self, line: &str) -> bool {
        self.recognizer.is_some_and(|recognize| recognize(line))
    }

    /// Decode one frame
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
        (self.decoder)(raw)
    }

    /// Tare command template
    pub fn tare(&self) -> CommandTemplate {
        self.tare
    }

    /// Zero command template
    pub fn zero(&self) -> CommandTemplate {
        self.zero
    }

    /// Calibration command template
    pub fn calibrate(&self) -> CalibrationTemplate {
        self.calibrate
    }

    /// Weight request command, if the device must be polled
    pub fn poll(&self) -> Option<&'static [u8]> {
        self.poll
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Protocol {}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("detectable", &self.is_detectable())
            .finish()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Explicit protocol or auto-detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolSelector {
    /// Detect from the first recognisable ASCII line
    #[default]
    Auto,
    /// Use this protocol
    Explicit(ProtocolId),
}

impl ProtocolSelector {
    /// Explicitly selected protocol, `None` for auto
    pub fn protocol(self) -> Option<&'static Protocol> {
        match self {
            Self::Auto => None,
            Self::Explicit(id) => Some(id.protocol()),
        }
    }
}

impl From<ProtocolId> for ProtocolSelector {
    fn from(id: ProtocolId) -> Self {
        Self::Explicit(id)
    }
}

impl fmt::Display for ProtocolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(id) => write!(f, "{id}"),
        }
    }
}

/// Unknown protocol name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolSelector {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        lookup(s)
            .map(|p| Self::Explicit(p.id()))
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse() {
        assert_eq!("auto".parse::<ProtocolSelector>(), Ok(ProtocolSelector::Auto));
        assert_eq!(
            "Ohaus".parse::<ProtocolSelector>(),
            Ok(ProtocolSelector::Explicit(ProtocolId::Ohaus))
        );
        assert!("acme-9000".parse::<ProtocolSelector>().is_err());
    }

    #[test]
    fn test_kind_follows_shape() {
        assert_eq!(ProtocolId::MidlMiVda.protocol().kind(), FrameKind::AsciiLine);
        assert_eq!(ProtocolId::Newton42Binary.protocol().kind(), FrameKind::BinaryFrame);
        assert_eq!(ProtocolId::MidlBinary.protocol().shape(), FrameShape::Fixed(20));
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(ProtocolSelector::Auto.to_string(), "auto");
        assert_eq!(
            ProtocolSelector::Explicit(ProtocolId::TokvesSh50).to_string(),
            "TOKVES-SH50"
        );
    }
}
