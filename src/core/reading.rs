//! Weight readings produced by the decoder
//!
//! A [`WeightReading`] is only ever built by a successful decode, so every
//! value in circulation carries a finite mass.

use super::decoder::DecodeError;
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Gross or net weighing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeighMode {
    /// Total measured mass
    #[default]
    Gross,
    /// Mass after subtracting the tared offset
    Net,
}

impl fmt::Display for WeighMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gross => write!(f, "gross"),
            Self::Net => write!(f, "net"),
        }
    }
}

/// Display unit for masses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    /// Kilograms
    #[default]
    Kg,
    /// Grams
    G,
    /// Pounds
    Lb,
}

impl MassUnit {
    /// How many of this unit make one kilogram
    pub fn per_kg(self) -> f64 {
        match self {
            Self::Kg => 1.0,
            Self::G => 1000.0,
            Self::Lb => 2.20462,
        }
    }

    /// Convert kilograms into this unit
    pub fn from_kg(self, kg: f64) -> f64 {
        kg * self.per_kg()
    }

    /// Convert a value in this unit into kilograms
    pub fn to_kg(self, value: f64) -> f64 {
        value / self.per_kg()
    }

    /// Unit symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::G => "g",
            Self::Lb => "lb",
        }
    }

    /// Match a unit token as printed by an indicator (`kg`, `Kg`, `g`, `lb`)
    pub fn from_symbol(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "kg" => Some(Self::Kg),
            "g" => Some(Self::G),
            "lb" | "lbs" => Some(Self::Lb),
            _ => None,
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for MassUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_symbol(s.trim()).ok_or_else(|| format!("unknown mass unit: {s}"))
    }
}

/// One decoded weight value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReading {
    mass_kg: f64,
    #[serde(serialize_with = "serialize_raw")]
    raw: Bytes,
    is_stable: bool,
    is_overload: bool,
    is_zeroing: bool,
    channel: u8,
    mode: WeighMode,
}

fn serialize_raw<S: Serializer>(raw: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(raw))
}

impl WeightReading {
    /// Build a reading from a decoded mass.
    ///
    /// Rejects non-finite masses and collapses `-0.0` to `0.0`.
    pub(crate) fn new(mass_kg: f64, raw: impl Into<Bytes>) -> Result<Self, DecodeError> {
        if !mass_kg.is_finite() {
            return Err(DecodeError::Malformed(format!("non-finite mass {mass_kg}")));
        }
        let mass_kg = if mass_kg == 0.0 { 0.0 } else { mass_kg };
        Ok(Self {
            mass_kg,
            raw: raw.into(),
            is_stable: true,
            is_overload: false,
            is_zeroing: false,
            channel: 0,
            mode: WeighMode::Gross,
        })
    }

    pub(crate) fn with_status(mut self, stable: bool, overload: bool) -> Self {
        self.is_stable = stable;
        self.is_overload = overload;
        self
    }

    pub(crate) fn with_zeroing(mut self, zeroing: bool) -> Self {
        self.is_zeroing = zeroing;
        self
    }

    pub(crate) fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub(crate) fn with_mode(mut self, mode: WeighMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mass in kilograms
    pub fn mass_kg(&self) -> f64 {
        self.mass_kg
    }

    /// Mass converted to a display unit
    pub fn mass_in(&self, unit: MassUnit) -> f64 {
        unit.from_kg(self.mass_kg)
    }

    /// The exact bytes this reading was decoded from
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Stability flag (always `true` for protocols that do not report it)
    pub fn is_stable(&self) -> bool {
        self.is_stable
    }

    /// Overload flag
    pub fn is_overload(&self) -> bool {
        self.is_overload
    }

    /// Zeroing in progress (NEWTON-42 binary only)
    pub fn is_zeroing(&self) -> bool {
        self.is_zeroing
    }

    /// Channel index, 0 for single-channel protocols
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Gross/net mode
    pub fn mode(&self) -> WeighMode {
        self.mode
    }
}

impl fmt::Display for WeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} kg", self.mass_kg)?;
        if self.mode == WeighMode::Net {
            write!(f, " net")?;
        }
        if self.is_overload {
            write!(f, " OVERLOAD")?;
        } else if !self.is_stable {
            write!(f, " ~")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_zero_collapses() {
        let reading = WeightReading::new(-0.0, Bytes::new()).unwrap();
        assert!(reading.mass_kg().is_sign_positive());
        assert_eq!(reading.mass_kg(), 0.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(matches!(
            WeightReading::new(f64::NAN, Bytes::new()),
            Err(DecodeError::Malformed(_))
        ));
        assert!(WeightReading::new(f64::INFINITY, Bytes::new()).is_err());
    }

    #[test]
    fn test_defaults() {
        let reading = WeightReading::new(1.5, Bytes::from_static(b"x")).unwrap();
        assert!(reading.is_stable());
        assert!(!reading.is_overload());
        assert_eq!(reading.channel(), 0);
        assert_eq!(reading.mode(), WeighMode::Gross);
    }

    #[test]
    fn test_unit_conversion() {
        let reading = WeightReading::new(2.0, Bytes::new()).unwrap();
        assert_eq!(reading.mass_in(MassUnit::G), 2000.0);
        assert!((reading.mass_in(MassUnit::Lb) - 4.40924).abs() < 1e-9);
        assert!((MassUnit::G.to_kg(500.0) - 0.5).abs() < 1e-12);
        assert_eq!("Kg".parse::<MassUnit>(), Ok(MassUnit::Kg));
        assert!("oz".parse::<MassUnit>().is_err());
    }

    #[test]
    fn test_json_has_hex_raw() {
        let reading = WeightReading::new(1.0, Bytes::from_static(&[0xc0, 0x01])).unwrap();
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["raw"], "c001");
        assert_eq!(json["mode"], "Gross");
    }
}
