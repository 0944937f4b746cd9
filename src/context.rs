//! Execution-phase contexts and metric sources
//!
//! A [`Context`] scopes every metric and artifact to the phase of the run that
//! produced it. The uppercase tag rendered by `Display` is load-bearing: it is
//! embedded in per-rank metric file names and in provenance entity identifiers,
//! and parsed back when the graph builder scans the metrics directory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Training-phase tag scoping a metric or artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Context {
    /// Metric produced during a training epoch.
    Training,
    /// Metric produced during a validation epoch.
    Validation,
    /// Metric produced during final evaluation/testing.
    Evaluation,
}

impl Context {
    /// All contexts, in declaration order.
    pub const ALL: [Self; 3] = [Self::Training, Self::Validation, Self::Evaluation];

    /// Uppercase tag used in file names and entity identifiers.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Training => "TRAINING",
            Self::Validation => "VALIDATION",
            Self::Evaluation => "EVALUATION",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Context {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "TRAINING" => Ok(Self::Training),
            "VALIDATION" => Ok(Self::Validation),
            "EVALUATION" => Ok(Self::Evaluation),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown context tag: {other}"
            ))),
        }
    }
}

/// Origin of a logged metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricSource {
    /// Logged explicitly by user training code.
    UserCode,
    /// Produced by system telemetry (CPU/GPU/memory probes).
    SystemTelemetry,
    /// Produced by carbon/energy telemetry.
    CarbonTelemetry,
}

impl MetricSource {
    /// Tag written into metric file headers and entity attributes.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::UserCode => "user_code",
            Self::SystemTelemetry => "system_telemetry",
            Self::CarbonTelemetry => "carbon_telemetry",
        }
    }
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MetricSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user_code" => Ok(Self::UserCode),
            "system_telemetry" => Ok(Self::SystemTelemetry),
            "carbon_telemetry" => Ok(Self::CarbonTelemetry),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown metric source: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_tag_roundtrip() {
        for ctx in Context::ALL {
            assert_eq!(ctx.tag().parse::<Context>().unwrap(), ctx);
        }
    }

    #[test]
    fn test_context_unknown_tag_is_config_error() {
        let err = "TESTING".parse::<Context>().unwrap_err();
        assert!(err.to_string().contains("unknown context tag"));
    }

    #[test]
    fn test_source_tag_roundtrip() {
        for source in [
            MetricSource::UserCode,
            MetricSource::SystemTelemetry,
            MetricSource::CarbonTelemetry,
        ] {
            assert_eq!(source.tag().parse::<MetricSource>().unwrap(), source);
        }
    }
}
