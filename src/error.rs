//! Error types for runprov
//!
//! Taxonomy follows the crate's failure model: configuration errors are fatal
//! to the call, parse errors are fatal for the file/metric being processed,
//! soft external-dependency failures (git) never surface here at all.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// runprov error types
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported metric encoding or input format (configuration error)
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A metric file row did not have the expected `epoch, value, timestamp` columns
    #[error("Malformed metric row in {file} at line {line}: {reason}")]
    MalformedMetricRow {
        /// Metric file being parsed
        file: String,
        /// 1-based line number of the offending row
        line: usize,
        /// What failed to parse
        reason: String,
    },

    /// A provenance document is missing an expected key or carries an
    /// unparseable attribute
    #[error("Malformed provenance document: {0}")]
    MalformedDocument(String),

    /// Lookup of a metric that is not present in the document
    #[error("Metric not found in document: {0}")]
    MetricNotFound(String),

    /// Columnar storage error (Arrow/Parquet)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
