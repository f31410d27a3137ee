use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary trading decision for one day: flat (0) or fully long (1).
///
/// Also used as the classification label of a feature row (next-period direction),
/// since the two share the same 0/1 domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Signal {
    #[default]
    Flat,
    Long,
}

impl Signal {
    /// Numeric value written to artifacts (0 or 1).
    pub fn value(self) -> u8 {
        match self {
            Signal::Flat => 0,
            Signal::Long => 1,
        }
    }

    /// Market exposure as a fraction of equity.
    pub fn exposure(self) -> f64 {
        f64::from(self.value())
    }

    pub fn is_long(self) -> bool {
        self == Signal::Long
    }

    /// Interpret a raw label value. Anything strictly positive is `Long`.
    pub fn from_label(label: f64) -> Option<Self> {
        if !label.is_finite() {
            return None;
        }
        Some(if label > 0.0 { Signal::Long } else { Signal::Flat })
    }
}

/// Raw signal value outside `{0, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid signal value {0} (expected 0 or 1)")]
pub struct InvalidSignal(pub u8);

impl From<Signal> for u8 {
    fn from(signal: Signal) -> Self {
        signal.value()
    }
}

impl TryFrom<u8> for Signal {
    type Error = InvalidSignal;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            other => Err(InvalidSignal(other)),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_roundtrip() {
        assert_eq!(Signal::try_from(0).unwrap(), Signal::Flat);
        assert_eq!(Signal::try_from(1).unwrap(), Signal::Long);
        assert_eq!(Signal::try_from(2), Err(InvalidSignal(2)));
    }

    #[test]
    fn label_interpretation() {
        assert_eq!(Signal::from_label(1.0), Some(Signal::Long));
        assert_eq!(Signal::from_label(0.0), Some(Signal::Flat));
        assert_eq!(Signal::from_label(-1.0), Some(Signal::Flat));
        assert_eq!(Signal::from_label(f64::NAN), None);
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Signal::Long).unwrap(), "1");
        let parsed: Signal = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, Signal::Flat);
        assert!(serde_json::from_str::<Signal>("3").is_err());
    }
}
