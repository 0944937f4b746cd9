//! Metric Store - durable encodings for flushed metric buffers
//!
//! Each flush serializes the current samples of one [`MetricRecord`] to a file
//! named deterministically from the metric name, context, and optional rank:
//!
//! ```text
//! {name}_{CONTEXT}.txt            unranked, plain-text rows
//! {name}_{CONTEXT}_GR{rank}.parquet   ranked, chunked columnar
//! ```
//!
//! The plain-text encoding is append-only and read back at graph-build time;
//! the parquet encoding is the archival/chunked columnar form. Re-encoding
//! between the two is lossless at the on-disk precision (values are stored as
//! 4-byte floats in the columnar form).

pub mod columnar;
pub mod text;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::context::{Context, MetricSource};
use crate::run::MetricRecord;
use crate::{Error, Result};

/// On-disk encoding of a flushed metric buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFormat {
    /// One header line, then one `epoch, value, timestamp` row per sample.
    Text,
    /// Chunked columnar container (parquet).
    Parquet,
}

impl MetricFormat {
    /// File extension for the encoding.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Parquet => "parquet",
        }
    }
}

impl fmt::Display for MetricFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MetricFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "txt" => Ok(Self::Text),
            "parquet" => Ok(Self::Parquet),
            other => Err(Error::UnsupportedFormat(format!(
                "unsupported metric encoding: {other}"
            ))),
        }
    }
}

/// One decoded sample row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    /// Epoch the sample was logged under.
    pub epoch: u32,
    /// Logged value.
    pub value: f64,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp_ms: i64,
}

/// A fully decoded metric file: header metadata plus sample rows in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFileContents {
    /// Metric name from the file header/attributes.
    pub name: String,
    /// Context from the file header/attributes.
    pub context: Context,
    /// Source kind from the file header/attributes.
    pub source: MetricSource,
    /// Sample rows in the order they appear in the file.
    pub rows: Vec<SampleRow>,
}

/// Deterministic per-rank file name for a metric: `{name}_{CONTEXT}[_GR{rank}].{ext}`.
#[must_use]
pub fn metric_file_name(
    name: &str,
    context: Context,
    rank: Option<u32>,
    format: MetricFormat,
) -> String {
    match rank {
        Some(r) => format!("{name}_{context}_GR{r}.{}", format.extension()),
        None => format!("{name}_{context}.{}", format.extension()),
    }
}

/// Parse a metric file name back into (name, context, rank).
///
/// Parsing is right-anchored: the rank suffix and context tag are recovered
/// from the end of the stem, so metric names may contain the separator as long
/// as their trailing segment is not itself a context tag.
#[must_use]
pub fn parse_metric_file_name(file_name: &str) -> Option<(String, Context, Option<u32>)> {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);
    let mut segments: Vec<&str> = stem.split('_').collect();

    let rank = segments
        .last()
        .and_then(|seg| seg.strip_prefix("GR"))
        .and_then(|digits| digits.parse::<u32>().ok());
    if rank.is_some() {
        segments.pop();
    }

    let context = segments.pop()?.parse::<Context>().ok()?;
    if segments.is_empty() {
        return None;
    }
    Some((segments.join("_"), context, rank))
}

/// Serialize the current in-memory samples of a metric record to a file under
/// `dir`, then clear the buffer (the record's running count is retained).
///
/// The text encoding appends to an existing file; the columnar encoding
/// extends the container's arrays. A missing file means "create new".
///
/// # Errors
///
/// Returns an error if the file cannot be written. The buffer is only cleared
/// after a successful write.
pub fn save_metric(
    record: &mut MetricRecord,
    dir: &Path,
    format: MetricFormat,
    use_compression: bool,
    rank: Option<u32>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(metric_file_name(record.name(), record.context(), rank, format));

    match format {
        MetricFormat::Text => text::append_metric(&path, record)?,
        MetricFormat::Parquet => columnar::append_metric(
            &path,
            record,
            &columnar::ColumnarOptions::new().compression(use_compression),
        )?,
    }

    debug!(metric = record.name(), path = %path.display(), "flushed metric buffer");
    record.take_samples();
    Ok(path)
}

/// Read a metric file of either encoding fully into memory.
///
/// # Errors
///
/// Returns a configuration error for an unrecognized extension, a parse error
/// for malformed contents, and propagates read errors.
pub fn read_metric_file(path: &Path) -> Result<MetricFileContents> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::UnsupportedFormat(format!("{} has no extension", path.display())))?;
    match ext.parse::<MetricFormat>()? {
        MetricFormat::Text => text::read_metric_file(path),
        MetricFormat::Parquet => columnar::read_metric_file(path),
    }
}
