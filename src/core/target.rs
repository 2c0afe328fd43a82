//! One-shot target weight watch

use serde::{Deserialize, Serialize};

/// Default match tolerance in kilograms
pub const DEFAULT_TOLERANCE_KG: f64 = 0.001;

/// Target mass with a tolerance, cleared by the session once reached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetWatch {
    target_kg: f64,
    tolerance_kg: f64,
}

impl TargetWatch {
    /// Watch for `target_kg` with the default tolerance
    pub fn new(target_kg: f64) -> Option<Self> {
        target_kg.is_finite().then_some(Self {
            target_kg,
            tolerance_kg: DEFAULT_TOLERANCE_KG,
        })
    }

    /// Replace the tolerance; must be finite and positive
    pub fn with_tolerance(self, tolerance_kg: f64) -> Option<Self> {
        (tolerance_kg.is_finite() && tolerance_kg > 0.0).then_some(Self {
            tolerance_kg,
            ..self
        })
    }

    /// Target mass
    pub fn target_kg(&self) -> f64 {
        self.target_kg
    }

    /// Match tolerance
    pub fn tolerance_kg(&self) -> f64 {
        self.tolerance_kg
    }

    /// `|mass - target| < tolerance`
    pub fn is_satisfied_by(&self, mass_kg: f64) -> bool {
        (mass_kg - self.target_kg).abs() < self.tolerance_kg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance() {
        let watch = TargetWatch::new(10.0).unwrap();
        assert!(watch.is_satisfied_by(10.0005));
        assert!(watch.is_satisfied_by(9.9995));
        assert!(!watch.is_satisfied_by(10.002));
    }

    #[test]
    fn test_custom_tolerance() {
        let watch = TargetWatch::new(5.0).unwrap().with_tolerance(0.1).unwrap();
        assert!(watch.is_satisfied_by(5.05));
        assert!(!watch.is_satisfied_by(5.2));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(TargetWatch::new(f64::NAN).is_none());
        let watch = TargetWatch::new(1.0).unwrap();
        assert!(watch.with_tolerance(0.0).is_none());
        assert!(watch.with_tolerance(-1.0).is_none());
    }
}
