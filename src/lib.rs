//! # runprov: Provenance Tracking for ML Training Runs
//!
//! runprov records metrics, parameters, and artifacts produced during
//! training/validation/evaluation and assembles them into:
//!
//! - a compact, appendable per-metric time-series store (plain-text rows or a
//!   chunked Arrow/Parquet columnar container), and
//! - a directed provenance graph linking the run, its executions
//!   (epochs/tests), parameters, datasets, model versions, and artifacts.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use runprov::run::{RunConfig, RunRegistry};
//! use runprov::store::MetricFormat;
//! use runprov::{graph, Context};
//!
//! # fn main() -> runprov::Result<()> {
//! let mut registry = RunRegistry::init(RunConfig::new("mnist", "prov"))?;
//!
//! registry.add_parameter("learning_rate", 0.0002);
//! for epoch in 0..2 {
//!     registry.log_metric("loss", 0.5 / f64::from(epoch + 1), epoch, Context::Training);
//! }
//! registry.flush_metrics(MetricFormat::Text, false)?;
//!
//! let doc = graph::create_prov_document(&registry)?;
//! doc.save_json(&graph::document_path(&registry))?;
//! # Ok(())
//! # }
//! ```
//!
//! Collection is gated per rank: in a distributed run only rank 0 buffers and
//! flushes by default, and per-rank metric files are merged only at
//! graph-build time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod access;
pub mod context;
pub mod convert;
pub mod error;
pub mod graph;
pub mod run;
pub mod store;
pub mod value;

pub use context::{Context, MetricSource};
pub use error::{Error, Result};
pub use value::ParamValue;
