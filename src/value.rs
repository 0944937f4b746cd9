//! Tagged parameter values
//!
//! Parameters arrive from user code as "anything printable". Storage encoders
//! and the graph builder dispatch on a closed tagged type instead of runtime
//! type inspection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A parameter value: numeric, textual, or a reference to an external blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParamValue {
    /// Floating-point scalar.
    Number(f64),
    /// Integer scalar.
    Integer(i64),
    /// Free-form text.
    Text(String),
    /// Reference to an externally stored blob (path or URI).
    Blob(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(v) => Some(*v as f64),
            Self::Text(_) | Self::Blob(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) | Self::Blob(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_scalar_form() {
        assert_eq!(ParamValue::Number(0.01).to_string(), "0.01");
        assert_eq!(ParamValue::Integer(32).to_string(), "32");
        assert_eq!(ParamValue::Text("Adam".into()).to_string(), "Adam");
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(ParamValue::Number(1.5).as_f64(), Some(1.5));
        assert_eq!(ParamValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Text("x".into()).as_f64(), None);
    }
}
