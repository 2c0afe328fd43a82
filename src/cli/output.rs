//! Reading output formats

use crate::core::reading::{MassUnit, WeighMode, WeightReading};
use chrono::{DateTime, Local};

/// Output format for readings and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Comma separated values with a header row
    Csv,
}

/// Renders readings in one unit and precision
#[derive(Debug, Clone, Copy)]
pub struct ReadingFormatter {
    format: OutputFormat,
    unit: MassUnit,
    decimals: usize,
}

const CSV_HEADER: &str = "timestamp,mass,unit,stable,overload,zeroing,channel,mode,raw";

impl ReadingFormatter {
    /// New formatter
    pub fn new(format: OutputFormat, unit: MassUnit, decimals: usize) -> Self {
        Self {
            format,
            unit,
            decimals,
        }
    }

    /// Output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Header line, CSV only
    pub fn header(&self) -> Option<&'static str> {
        match self.format {
            OutputFormat::Csv => Some(CSV_HEADER),
            _ => None,
        }
    }

    fn mass(&self, kg: f64) -> f64 {
        let scale = 10f64.powi(i32::try_from(self.decimals).unwrap_or(i32::MAX));
        let value = (self.unit.from_kg(kg) * scale).round() / scale;
        if value == 0.0 {
            0.0
        } else {
            value
        }
    }

    /// One line for a reading
    pub fn reading(&self, reading: &WeightReading, at: DateTime<Local>) -> String {
        let mass = self.mass(reading.mass_kg());
        match self.format {
            OutputFormat::Text => {
                let mut line = format!(
                    "{} {:>12.*} {}",
                    at.format("%H:%M:%S%.3f"),
                    self.decimals,
                    mass,
                    self.unit
                );
                if reading.channel() > 0 {
                    line.push_str(&format!(" ch{}", reading.channel()));
                }
                if reading.mode() == WeighMode::Net {
                    line.push_str(" NET");
                }
                if reading.is_overload() {
                    line.push_str(" OVERLOAD");
                } else if !reading.is_stable() {
                    line.push_str(" ~");
                }
                if reading.is_zeroing() {
                    line.push_str(" ZEROING");
                }
                line
            }
            OutputFormat::Json => serde_json::json!({
                "timestamp": at.to_rfc3339(),
                "mass": mass,
                "unit": self.unit.symbol(),
                "mass_kg": reading.mass_kg(),
                "stable": reading.is_stable(),
                "overload": reading.is_overload(),
                "zeroing": reading.is_zeroing(),
                "channel": reading.channel(),
                "mode": reading.mode(),
                "raw": hex::encode(reading.raw()),
            })
            .to_string(),
            OutputFormat::Csv => format!(
                "{},{:.*},{},{},{},{},{},{},{}",
                at.to_rfc3339(),
                self.decimals,
                mass,
                self.unit,
                reading.is_stable(),
                reading.is_overload(),
                reading.is_zeroing(),
                reading.channel(),
                reading.mode(),
                hex::encode(reading.raw())
            ),
        }
    }

    /// Notice that a target weight was reached
    pub fn target_reached(&self, target_kg: f64, at: DateTime<Local>) -> String {
        let target = self.mass(target_kg);
        match self.format {
            OutputFormat::Json => serde_json::json!({
                "timestamp": at.to_rfc3339(),
                "event": "target_reached",
                "target": target,
                "unit": self.unit.symbol(),
            })
            .to_string(),
            _ => format!(
                "target reached: {:.*} {}",
                self.decimals, target, self.unit
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decoder::decode;
    use crate::core::protocol::ProtocolId;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 8, 30, 15).unwrap()
    }

    fn reading(id: ProtocolId, raw: &[u8]) -> WeightReading {
        decode(id.into(), raw).unwrap().remove(0)
    }

    #[test]
    fn test_text_line() {
        let formatter = ReadingFormatter::new(OutputFormat::Text, MassUnit::Kg, 3);
        let r = reading(ProtocolId::MidlMiVda, b"W +123.450 kg\r\n");
        assert_eq!(formatter.reading(&r, at()), "08:30:15.000      123.450 kg");
        assert_eq!(formatter.header(), None);

        let net = reading(ProtocolId::TokvesSh50, b"US,NT,  +1.234 kg");
        assert!(formatter.reading(&net, at()).ends_with("1.234 kg NET ~"));
    }

    #[test]
    fn test_unit_conversion_rounds() {
        let formatter = ReadingFormatter::new(OutputFormat::Text, MassUnit::G, 1);
        let r = reading(ProtocolId::MikrosimM0601, b"+001.234 kg");
        assert!(formatter.reading(&r, at()).ends_with(" 1234.0 g"));
    }

    #[test]
    fn test_json_line() {
        let formatter = ReadingFormatter::new(OutputFormat::Json, MassUnit::Kg, 3);
        let r = reading(ProtocolId::Newton42Binary, &[0xc0, 0x01, 0x00, 0x00]);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.reading(&r, at())).unwrap();
        assert_eq!(value["mass"], 1.0);
        assert_eq!(value["stable"], true);
        assert_eq!(value["raw"], "c0010000");
    }

    #[test]
    fn test_csv_line() {
        let formatter = ReadingFormatter::new(OutputFormat::Csv, MassUnit::Kg, 2);
        let r = reading(ProtocolId::Ohaus, b"ST,+00123.45,kg");
        let line = formatter.reading(&r, at());
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), CSV_HEADER.split(',').count());
        assert_eq!(fields[1], "123.45");
        assert_eq!(fields[2], "kg");
        assert_eq!(formatter.header(), Some(CSV_HEADER));
    }

    #[test]
    fn test_target_reached() {
        let text = ReadingFormatter::new(OutputFormat::Text, MassUnit::Kg, 3);
        assert_eq!(text.target_reached(12.5, at()), "target reached: 12.500 kg");
        let json = ReadingFormatter::new(OutputFormat::Json, MassUnit::G, 0);
        assert!(json.target_reached(12.5, at()).contains("\"target\":12500.0"));
    }
}
