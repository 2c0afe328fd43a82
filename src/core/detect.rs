//! Protocol auto-detection from one ASCII sample line
//!
//! The rules overlap on purpose; precedence is the registry order, so a
//! `ST,GS,` line is TOKVES-SH50 even though it also satisfies the Ohaus rule.
//! Binary protocols are never detected.

use super::protocol::{self, Protocol};
use tracing::debug;

/// Guess the protocol of a sample line. Surrounding whitespace and line
/// terminators are ignored.
pub fn detect(sample_line: &str) -> Option<&'static Protocol> {
    let line = sample_line.trim();
    if line.is_empty() {
        return None;
    }
    let found = protocol::default_auto_order().find(|p| p.recognizes(line));
    match found {
        Some(p) => debug!(protocol = p.name(), line, "protocol detected"),
        None => debug!(line, "no protocol matches sample"),
    }
    found
}

fn starts_with_sign(line: &str) -> bool {
    line.starts_with('+') || line.starts_with('-')
}

pub(crate) fn is_midl_line(line: &str) -> bool {
    line.starts_with("W +") && line.contains("kg")
}

pub(crate) fn is_and_line(line: &str) -> bool {
    if !starts_with_sign(line) || line.chars().count() < 7 {
        return false;
    }
    let rest = &line[1..];
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}

pub(crate) fn is_sartorius_line(line: &str) -> bool {
    let digits: String = line.chars().filter(|c| *c != '.').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && line.chars().count() >= 5
}

pub(crate) fn is_tokves_line(line: &str) -> bool {
    line.starts_with("ST,GS,") && (line.contains("kg") || line.contains("Kg"))
}

pub(crate) fn is_ohaus_line(line: &str) -> bool {
    line.starts_with("ST,") && line[3..].contains(',')
}

pub(crate) fn is_mikrosim_line(line: &str) -> bool {
    starts_with_sign(line)
        && line.contains("kg")
        && line
            .split_whitespace()
            .next()
            .is_some_and(|token| token.chars().count() == 8)
}

pub(crate) fn is_newton_line(line: &str) -> bool {
    line.starts_with('N') && line.contains("kg") && (line.contains("+000") || line.contains("-000"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::ProtocolId;

    fn detected(line: &str) -> Option<ProtocolId> {
        detect(line).map(Protocol::id)
    }

    #[test]
    fn test_each_family() {
        assert_eq!(detected("W +123.450 kg"), Some(ProtocolId::MidlMiVda));
        assert_eq!(detected("+0012345"), Some(ProtocolId::AnD));
        assert_eq!(detected("0012345"), Some(ProtocolId::Sartorius));
        assert_eq!(detected("ST,+00123.45,kg"), Some(ProtocolId::Ohaus));
        assert_eq!(detected("+001.234 kg"), Some(ProtocolId::MikrosimM0601));
        assert_eq!(detected("N+00012.345 kg"), Some(ProtocolId::Newton42Ascii));
    }

    #[test]
    fn test_tokves_before_ohaus() {
        assert_eq!(detected("ST,GS,  +1.234 kg"), Some(ProtocolId::TokvesSh50));
        assert!(is_ohaus_line("ST,GS,  +1.234 kg"));
    }

    #[test]
    fn test_and_before_sartorius() {
        // signed digit-only line satisfies A&D first
        assert_eq!(detected("-123.4567"), Some(ProtocolId::AnD));
        assert_eq!(detected("123.45"), Some(ProtocolId::Sartorius));
    }

    #[test]
    fn test_near_misses() {
        assert_eq!(detected(""), None);
        assert_eq!(detected("   \r\n"), None);
        assert_eq!(detected("W -1.000 kg"), None);
        assert_eq!(detected("+12345"), None);
        assert_eq!(detected("1234"), None);
        assert_eq!(detected("ST,"), None);
        assert_eq!(detected("+1.234 kg"), None);
        // nine-character weight token, explicit selection only
        assert_eq!(detected("+0001.234 kg"), None);
        assert_eq!(detected("N+12.345 kg"), None);
        assert_eq!(detected("garbage"), None);
    }

    #[test]
    fn test_terminators_trimmed() {
        assert_eq!(detected("W +1.000 kg\r\n"), Some(ProtocolId::MidlMiVda));
    }
}
