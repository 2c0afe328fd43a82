//! Fixed protocol catalog
//!
//! Insertion order is detection order: the first recognizer that matches a
//! sample line wins, so TOKVES-SH50 sits ahead of the looser Ohaus rule.

use super::{ascii, midl, newton};
use super::{CalibrationTemplate, CommandTemplate, FrameShape, Protocol, ProtocolId};
use crate::core::detect;

static PROTOCOLS: [Protocol; 9] = [
    Protocol {
        id: ProtocolId::MidlMiVda,
        name: "MIDL-MI-VDA",
        aliases: &["MIDL", "MI-VDA", "MIDL MI VDA/12Ya"],
        shape: FrameShape::Line,
        sample: "W +123.450 kg",
        recognizer: Some(detect::is_midl_line),
        decoder: ascii::decode_midl,
        tare: CommandTemplate::Text("Z"),
        zero: CommandTemplate::Text("Z"),
        calibrate: CalibrationTemplate::Text("CAL"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::AnD,
        name: "A&D",
        aliases: &["AND", "A-D", "A&D Weighing"],
        shape: FrameShape::Line,
        sample: "+0012345",
        recognizer: Some(detect::is_and_line),
        decoder: ascii::decode_and,
        tare: CommandTemplate::Text("Z"),
        zero: CommandTemplate::Text("Z"),
        calibrate: CalibrationTemplate::Text("C"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::Sartorius,
        name: "Sartorius",
        aliases: &[],
        shape: FrameShape::Line,
        sample: "0012345",
        recognizer: Some(detect::is_sartorius_line),
        decoder: ascii::decode_sartorius,
        tare: CommandTemplate::Text("T"),
        zero: CommandTemplate::Text("T"),
        calibrate: CalibrationTemplate::Text("CAL"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::TokvesSh50,
        name: "TOKVES-SH50",
        aliases: &["TOKVES", "TOKVES SH-50", "ТОКВЕС SH-50"],
        shape: FrameShape::Line,
        sample: "ST,GS,  +1.234 kg",
        recognizer: Some(detect::is_tokves_line),
        decoder: ascii::decode_tokves,
        tare: CommandTemplate::Text("T"),
        zero: CommandTemplate::Text("T"),
        calibrate: CalibrationTemplate::Text("CAL"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::Ohaus,
        name: "Ohaus",
        aliases: &[],
        shape: FrameShape::Line,
        sample: "ST,+00123.45,kg",
        recognizer: Some(detect::is_ohaus_line),
        decoder: ascii::decode_ohaus,
        tare: CommandTemplate::Text("Z"),
        zero: CommandTemplate::Text("Z"),
        calibrate: CalibrationTemplate::Text("CAL"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::MikrosimM0601,
        name: "MIKROSIM-M0601",
        aliases: &["MIKROSIM", "Mikrosim M0601", "Микросим М0601"],
        shape: FrameShape::Line,
        sample: "+0001.234 kg",
        recognizer: Some(detect::is_mikrosim_line),
        decoder: ascii::decode_mikrosim,
        tare: CommandTemplate::Text("T"),
        zero: CommandTemplate::Text("T"),
        calibrate: CalibrationTemplate::Text("CAL"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::Newton42Ascii,
        name: "NEWTON-42",
        aliases: &["NEWTON-42 ASCII", "NEWTON42", "Ньютон 42"],
        shape: FrameShape::Line,
        sample: "N+00012.345 kg",
        recognizer: Some(detect::is_newton_line),
        decoder: ascii::decode_newton,
        tare: CommandTemplate::Text("Z"),
        zero: CommandTemplate::Text("Z"),
        calibrate: CalibrationTemplate::Text("C"),
        poll: None,
    },
    Protocol {
        id: ProtocolId::Newton42Binary,
        name: "NEWTON-42-BIN",
        aliases: &["NEWTON-42 binary", "NEWTON42-BIN", "Ньютон 42 бин"],
        shape: FrameShape::HeaderCounted,
        sample: "c0 01 00 00",
        recognizer: None,
        decoder: newton::decode,
        tare: CommandTemplate::Bytes(newton::TARE_COMMAND),
        zero: CommandTemplate::Bytes(newton::TARE_COMMAND),
        calibrate: CalibrationTemplate::BinaryGrams(newton::CALIBRATE_PREFIX),
        poll: Some(newton::POLL_COMMAND),
    },
    Protocol {
        id: ProtocolId::MidlBinary,
        name: "MIDL-BIN",
        aliases: &["MIDL binary", "MIDL-MI-VDA binary"],
        shape: FrameShape::Fixed(midl::FRAME_LEN),
        sample: "00 01 02 03 04 05 00 ...",
        recognizer: None,
        decoder: midl::decode,
        tare: CommandTemplate::Bytes(midl::TARE_COMMAND),
        zero: CommandTemplate::Bytes(midl::ZERO_COMMAND),
        calibrate: CalibrationTemplate::Unsupported,
        poll: Some(midl::POLL_COMMAND),
    },
];

/// Every protocol, in registry order
pub fn all() -> &'static [Protocol] {
    &PROTOCOLS
}

/// Protocols auto-detection tries, in precedence order
pub fn default_auto_order() -> impl Iterator<Item = &'static Protocol> {
    PROTOCOLS.iter().filter(|p| p.is_detectable())
}

/// Find a protocol by name or alias.
///
/// Matching ignores case, spaces, `-` and `_`.
pub fn lookup(name: &str) -> Option<&'static Protocol> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    PROTOCOLS.iter().find(|p| {
        normalize(p.name) == wanted || p.aliases.iter().any(|alias| normalize(alias) == wanted)
    })
}

pub(super) fn get(id: ProtocolId) -> &'static Protocol {
    let index = match id {
        ProtocolId::MidlMiVda => 0,
        ProtocolId::AnD => 1,
        ProtocolId::Sartorius => 2,
        ProtocolId::TokvesSh50 => 3,
        ProtocolId::Ohaus => 4,
        ProtocolId::MikrosimM0601 => 5,
        ProtocolId::Newton42Ascii => 6,
        ProtocolId::Newton42Binary => 7,
        ProtocolId::MidlBinary => 8,
    };
    &PROTOCOLS[index]
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}
