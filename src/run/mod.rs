//! Run State - records and registry for one training run
//!
//! ## Schema Overview
//!
//! ```text
//! RunRegistry (1 per process)
//!     ├──< MetricRecord (N) [time-series, keyed by (name, context)]
//!     ├──< ParameterRecord (N)
//!     ├──< ArtifactRecord (N) [model versions flagged]
//!     └──< CumulativeMetric (N) [folded across the run]
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runprov::run::{RunConfig, RunRegistry};
//! use runprov::Context;
//!
//! # fn main() -> runprov::Result<()> {
//! let mut registry = RunRegistry::init(RunConfig::new("mnist", "prov"))?;
//!
//! registry.log_metric("loss", 0.5, 0, Context::Training);
//! registry.add_parameter("learning_rate", 0.01);
//!
//! registry.flush_metrics(runprov::store::MetricFormat::Text, false)?;
//! # Ok(())
//! # }
//! ```

mod artifact_record;
mod metric_record;
mod parameter_record;
mod registry;

pub use artifact_record::{ArtifactRecord, ArtifactRecordBuilder};
pub use metric_record::{MetricRecord, Sample};
pub use parameter_record::ParameterRecord;
pub use registry::{CumulativeMetric, FoldOp, RankInfo, RunConfig, RunRegistry};
