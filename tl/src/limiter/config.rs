//! Limiter configuration

use std::fmt;
use std::num::NonZeroUsize;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::LimiterError;

const DEFAULT_MAX_CONCURRENT: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// Concurrency ceiling for a limiter
///
/// Valid by construction: a limited ceiling is always at least 1. The
/// ceiling is fixed for the lifetime of the limiter it configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// At most this many jobs in flight at once
    Limited(NonZeroUsize),

    /// No ceiling; every scheduled job starts at the next opportunity
    Unbounded,
}

impl Concurrency {
    /// Create a limited ceiling, rejecting zero
    pub fn limited(max: usize) -> Result<Self, LimiterError> {
        NonZeroUsize::new(max)
            .map(Self::Limited)
            .ok_or_else(|| LimiterError::InvalidArgument(invalid_concurrency(&max.to_string())))
    }

    /// The numeric ceiling, if one exists
    pub fn max(self) -> Option<usize> {
        match self {
            Self::Limited(max) => Some(max.get()),
            Self::Unbounded => None,
        }
    }

    /// Whether the gate admits another job at the given active count
    pub(crate) fn allows(self, active: usize) -> bool {
        match self {
            Self::Limited(max) => active < max.get(),
            Self::Unbounded => true,
        }
    }
}

impl TryFrom<usize> for Concurrency {
    type Error = LimiterError;

    fn try_from(max: usize) -> Result<Self, Self::Error> {
        Self::limited(max)
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

fn invalid_concurrency(got: &str) -> String {
    format!("expected `concurrency` to be a positive integer or \"unbounded\", got {got}")
}

impl Serialize for Concurrency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(max) => serializer.serialize_u64(max.get() as u64),
            Self::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

struct ConcurrencyVisitor;

impl<'de> Visitor<'de> for ConcurrencyVisitor {
    type Value = Concurrency;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a positive integer or \"unbounded\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Concurrency, E> {
        usize::try_from(v)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Concurrency::Limited)
            .ok_or_else(|| E::custom(invalid_concurrency(&v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Concurrency, E> {
        if v > 0 {
            self.visit_u64(v as u64)
        } else {
            Err(E::custom(invalid_concurrency(&v.to_string())))
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Concurrency, E> {
        // Integral floats pass (a config writing `5.0` means 5); anything
        // fractional, non-finite, or out of range does not.
        if v.is_finite() && v.fract() == 0.0 && v >= 1.0 && v <= u64::MAX as f64 {
            self.visit_u64(v as u64)
        } else {
            Err(E::custom(invalid_concurrency(&v.to_string())))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Concurrency, E> {
        if v == "unbounded" {
            Ok(Concurrency::Unbounded)
        } else {
            Err(E::custom(invalid_concurrency(&format!("\"{v}\""))))
        }
    }
}

impl<'de> Deserialize<'de> for Concurrency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConcurrencyVisitor)
    }
}

/// Limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Max concurrent jobs
    #[serde(default = "default_concurrency")]
    pub concurrency: Concurrency,
}

fn default_concurrency() -> Concurrency {
    Concurrency::Limited(DEFAULT_MAX_CONCURRENT)
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = LimiterConfig::default();
        assert_eq!(config.concurrency.max(), Some(10));
    }

    #[test]
    fn test_empty_config_uses_default() {
        let config: LimiterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.concurrency.max(), Some(10));
    }

    #[test]
    fn test_limited_rejects_zero() {
        let err = Concurrency::limited(0).unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_try_from() {
        assert_eq!(Concurrency::try_from(3).unwrap().max(), Some(3));
        assert!(Concurrency::try_from(0).is_err());
    }

    #[test]
    fn test_deserialize_accepts_valid_values() {
        let limited: Concurrency = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(limited.max(), Some(7));

        let unbounded: Concurrency = serde_json::from_value(json!("unbounded")).unwrap();
        assert_eq!(unbounded, Concurrency::Unbounded);

        let integral_float: Concurrency = serde_json::from_value(json!(5.0)).unwrap();
        assert_eq!(integral_float.max(), Some(5));
    }

    #[test]
    fn test_deserialize_rejects_invalid_values() {
        for bad in [json!(0), json!(-1), json!(1.2), json!(true), json!("sometimes"), json!(null)] {
            let result: Result<Concurrency, _> = serde_json::from_value(bad.clone());
            assert!(result.is_err(), "expected {bad} to be rejected");
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let limited = Concurrency::limited(4).unwrap();
        let value = serde_json::to_value(limited).unwrap();
        assert_eq!(value, json!(4));
        assert_eq!(serde_json::from_value::<Concurrency>(value).unwrap(), limited);

        let value = serde_json::to_value(Concurrency::Unbounded).unwrap();
        assert_eq!(value, json!("unbounded"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Concurrency::limited(3).unwrap().to_string(), "3");
        assert_eq!(Concurrency::Unbounded.to_string(), "unbounded");
    }

    #[test]
    fn test_allows() {
        let two = Concurrency::limited(2).unwrap();
        assert!(two.allows(0));
        assert!(two.allows(1));
        assert!(!two.allows(2));

        assert!(Concurrency::Unbounded.allows(usize::MAX));
    }
}
