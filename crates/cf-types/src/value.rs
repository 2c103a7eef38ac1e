//! Concrete parameter values.

use serde::{Deserialize, Serialize};

/// A concrete parameter value produced by a searcher.
///
/// Categorical options are carried as JSON so any option type (strings,
/// numbers, booleans) can be offered without a generic parameter.
///
/// Equality is by value: a numeric JSON option equals the `Int`/`Float` with
/// the same number, which is what an untagged round-trip produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value; `None` for non-numeric JSON options.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Json(v) => v.as_i64(),
            Self::Float(_) => None,
        }
    }
}

impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Json(a), _) if !a.is_number() => false,
            (_, Self::Json(b)) if !b.is_number() => false,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => self.as_f64() == other.as_f64(),
            },
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<serde_json::Value> for ParameterValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_serialization_keeps_ints_exact() {
        let json = serde_json::to_string(&ParameterValue::Int(32)).unwrap();
        assert_eq!(json, "32");
        let back: ParameterValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ParameterValue::Int(32));

        let back: ParameterValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(back, ParameterValue::Float(0.5));

        let back: ParameterValue = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(back, ParameterValue::Json(serde_json::json!("relu")));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(ParameterValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParameterValue::Float(0.25).as_i64(), None);
        assert_eq!(ParameterValue::Json(serde_json::json!(7)).as_i64(), Some(7));
        assert_eq!(ParameterValue::Json(serde_json::json!("x")).as_f64(), None);
        assert_eq!(ParameterValue::Float(1.5).to_string(), "1.5");
    }

    #[test]
    fn numeric_json_options_survive_untagged_round_trip() {
        let option = ParameterValue::Json(serde_json::json!(5));
        let json = serde_json::to_string(&option).unwrap();
        let back: ParameterValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ParameterValue::Int(5));
        assert_eq!(back, option);

        assert_ne!(ParameterValue::Json(serde_json::json!("5")), ParameterValue::Int(5));
        assert_ne!(ParameterValue::Int(5), ParameterValue::Float(5.5));
    }
}
