//! Decoders for the ASCII line protocols
//!
//! Each decoder receives one line with its terminators already stripped (a
//! trailing CR/LF is tolerated). A line without the protocol's literal prefix
//! is [`DecodeError::NotAWeightFrame`]; a line that has the prefix but a bad
//! payload is [`DecodeError::Malformed`].

use crate::core::decoder::DecodeError;
use crate::core::reading::{MassUnit, WeighMode, WeightReading};
use bytes::Bytes;
use std::borrow::Cow;

/// Raw bytes as a trimmed line
pub fn line_text(raw: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(raw) {
        Cow::Borrowed(text) => Cow::Borrowed(text.trim()),
        Cow::Owned(text) => Cow::Owned(text.trim().to_string()),
    }
}

/// Parse a locale-independent decimal: optional sign, digits, at most one `.`
pub fn parse_decimal(text: &str) -> Result<f64, DecodeError> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, text[1..].trim_start()),
        Some(b'+') => (false, text[1..].trim_start()),
        _ => (false, text),
    };

    let mut digits = 0usize;
    let mut seen_dot = false;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' if !seen_dot => seen_dot = true,
            _ => return Err(DecodeError::Malformed(format!("non-numeric payload {text:?}"))),
        }
    }
    if digits == 0 {
        return Err(DecodeError::Malformed(format!("no digits in {text:?}")));
    }

    let magnitude: f64 = body
        .parse()
        .map_err(|_| DecodeError::Malformed(format!("non-numeric payload {text:?}")))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Number token followed by an optional unit token, converted to kilograms
fn number_with_unit(body: &str) -> Result<f64, DecodeError> {
    let mut tokens = body.split_whitespace();
    let number = tokens
        .next()
        .ok_or_else(|| DecodeError::Malformed(format!("missing weight in {body:?}")))?;
    let value = parse_decimal(number)?;
    to_kg(value, tokens.next())
}

fn to_kg(value: f64, unit: Option<&str>) -> Result<f64, DecodeError> {
    match unit {
        None => Ok(value),
        Some(token) => MassUnit::from_symbol(token)
            .map(|unit| unit.to_kg(value))
            .ok_or_else(|| DecodeError::Malformed(format!("unknown unit {token:?}"))),
    }
}

fn single(mass_kg: f64, raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    Ok(vec![WeightReading::new(mass_kg, Bytes::copy_from_slice(raw))?])
}

fn starts_with_sign(line: &str) -> bool {
    line.starts_with('+') || line.starts_with('-')
}

/// MIDL-MI-VDA: `W +123.450 kg`
pub fn decode_midl(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let line = line_text(raw);
    // a bare `W` is the echo of our own weight request
    if line == "W" || !line.starts_with('W') {
        return Err(DecodeError::NotAWeightFrame);
    }
    single(number_with_unit(&line[1..])?, raw)
}

/// A&D: sign followed by up to seven digit characters in grams, `+0012345`
pub fn decode_and(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    const DIGITS: usize = 7;

    let line = line_text(raw);
    if !starts_with_sign(&line) {
        return Err(DecodeError::NotAWeightFrame);
    }
    let payload = line[1..].get(..DIGITS).unwrap_or(&line[1..]);
    let grams = parse_decimal(payload)?;
    let kg = grams / 1000.0;
    single(if line.starts_with('-') { -kg } else { kg }, raw)
}

/// Sartorius: bare digits in grams, `0012345`
pub fn decode_sartorius(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    const MIN_LEN: usize = 5;

    let line = line_text(raw);
    let body = line.trim_start_matches(['+', '-']);
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return Err(DecodeError::NotAWeightFrame);
    }
    if line.len() < MIN_LEN {
        return Err(DecodeError::Malformed(format!("too short: {line:?}")));
    }
    single(parse_decimal(&line)? / 1000.0, raw)
}

/// Ohaus: `ST,+00123.45,kg`
pub fn decode_ohaus(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let line = line_text(raw);
    if !line.starts_with("ST,") {
        return Err(DecodeError::NotAWeightFrame);
    }
    let mut fields = line.split(',').skip(1).map(str::trim);
    let number = fields
        .next()
        .filter(|field| !field.is_empty())
        .ok_or_else(|| DecodeError::Malformed(format!("missing weight field in {line:?}")))?;
    let unit = fields.next().filter(|field| !field.is_empty());
    single(to_kg(parse_decimal(number)?, unit)?, raw)
}

/// TOKVES SH-50: `ST,GS,  +1.234 kg`
///
/// `ST`/`US` carries stability, `GS`/`NT` carries gross/net.
pub fn decode_tokves(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let line = line_text(raw);
    let mut fields = line.splitn(3, ',');
    let stable = match fields.next() {
        Some("ST") => true,
        Some("US") => false,
        _ => return Err(DecodeError::NotAWeightFrame),
    };
    let mode = match fields.next() {
        Some("GS") => WeighMode::Gross,
        Some("NT") => WeighMode::Net,
        _ => return Err(DecodeError::NotAWeightFrame),
    };
    let body = fields
        .next()
        .ok_or_else(|| DecodeError::Malformed(format!("missing weight field in {line:?}")))?;
    let reading = WeightReading::new(number_with_unit(body)?, Bytes::copy_from_slice(raw))?
        .with_status(stable, false)
        .with_mode(mode);
    Ok(vec![reading])
}

/// MIKROSIM M0601: `+0001.234 kg`
pub fn decode_mikrosim(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let line = line_text(raw);
    if !starts_with_sign(&line) {
        return Err(DecodeError::NotAWeightFrame);
    }
    single(number_with_unit(&line)?, raw)
}

/// NEWTON-42 ASCII: `N+00012.345 kg`, or a bare signed value `+00012.345`
pub fn decode_newton(raw: &[u8]) -> Result<Vec<WeightReading>, DecodeError> {
    let line = line_text(raw);
    let body: &str = if let Some(rest) = line.strip_prefix('N') {
        rest
    } else if starts_with_sign(&line) {
        &line
    } else {
        // `P` is the echo of the weight request
        return Err(DecodeError::NotAWeightFrame);
    };
    single(number_with_unit(body)?, raw)
}
