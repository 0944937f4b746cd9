//! Parameter Record - scalar run configuration values

use serde::{Deserialize, Serialize};

use crate::value::ParamValue;

/// A named scalar parameter of the run.
///
/// Immutable once created; logging a parameter again under the same name
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    name: String,
    value: ParamValue,
}

impl ParameterRecord {
    /// Create a new parameter record.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Get the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parameter value.
    #[must_use]
    pub const fn value(&self) -> &ParamValue {
        &self.value
    }
}
