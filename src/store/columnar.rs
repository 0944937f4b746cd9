//! Chunked columnar metric encoding (Arrow/Parquet)
//!
//! A container holds three equal-length arrays (`epochs:int32`,
//! `values:float32`, `timestamps:int64`) plus the metric's `name`, `context`,
//! and `source` as file metadata. Chunk size and compression are fixed when
//! the container is created: appends re-read the existing rows and rewrite the
//! container with the arrays extended, reusing the creation-time settings.
//! Changing the compression of an existing container requires [`reencode`].

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, Float32Array, Int32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::run::MetricRecord;
use crate::store::{self, MetricFileContents, SampleRow};
use crate::{Error, Result};

/// Default number of rows per chunk (parquet row group).
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Container-creation settings: fixed once the file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnarOptions {
    chunk_size: usize,
    use_compression: bool,
}

impl ColumnarOptions {
    /// Default settings: [`DEFAULT_CHUNK_SIZE`], no compression.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            use_compression: false,
        }
    }

    /// Set the chunk (row group) size.
    #[must_use]
    pub const fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows;
        self
    }

    /// Enable or disable ZSTD compression.
    #[must_use]
    pub const fn compression(mut self, on: bool) -> Self {
        self.use_compression = on;
        self
    }
}

impl Default for ColumnarOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the record's buffered samples to the container at `path`.
///
/// Creates the container (with metadata attributes and the caller's settings)
/// when the file does not exist; otherwise extends the three arrays by
/// concatenation, keeping the settings recorded at creation time.
///
/// # Errors
///
/// Returns an error if the existing container cannot be read or the rewrite
/// fails.
pub fn append_metric(path: &Path, record: &MetricRecord, opts: &ColumnarOptions) -> Result<()> {
    let mut new_rows = Vec::with_capacity(record.buffered_count());
    for (epoch, samples) in record.epoch_samples() {
        for sample in samples {
            new_rows.push(SampleRow {
                epoch: *epoch,
                value: sample.value,
                timestamp_ms: sample.timestamp_ms,
            });
        }
    }

    let (mut contents, opts) = if path.exists() {
        if new_rows.is_empty() {
            return Ok(());
        }
        read_with_settings(path)?
    } else {
        (
            MetricFileContents {
                name: record.name().to_string(),
                context: record.context(),
                source: record.source(),
                rows: Vec::new(),
            },
            *opts,
        )
    };

    contents.rows.extend(new_rows);
    write_container(path, &contents, &opts)
}

/// Read a columnar metric file fully into memory.
///
/// # Errors
///
/// Returns an error if the file is unreadable or its metadata attributes are
/// missing.
pub fn read_metric_file(path: &Path) -> Result<MetricFileContents> {
    read_with_settings(path).map(|(contents, _)| contents)
}

/// Re-encode an existing metric file (either encoding) into a fresh columnar
/// container, optionally changing the compression setting.
///
/// Archival/export path: reads the source fully, never appends in place.
///
/// # Errors
///
/// Propagates read errors from the source file and write errors for the
/// destination.
pub fn reencode(src: &Path, dst: &Path, use_compression: bool) -> Result<()> {
    let contents = store::read_metric_file(src)?;
    write_container(
        dst,
        &contents,
        &ColumnarOptions::new().compression(use_compression),
    )
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("epochs", DataType::Int32, false),
        Field::new("values", DataType::Float32, false),
        Field::new("timestamps", DataType::Int64, false),
    ]))
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
fn write_container(path: &Path, contents: &MetricFileContents, opts: &ColumnarOptions) -> Result<()> {
    let epochs = Int32Array::from_iter_values(contents.rows.iter().map(|r| r.epoch as i32));
    let values = Float32Array::from_iter_values(contents.rows.iter().map(|r| r.value as f32));
    let timestamps = Int64Array::from_iter_values(contents.rows.iter().map(|r| r.timestamp_ms));

    let batch = RecordBatch::try_new(
        schema(),
        vec![Arc::new(epochs), Arc::new(values), Arc::new(timestamps)],
    )?;

    let compression = if opts.use_compression {
        Compression::ZSTD(ZstdLevel::default())
    } else {
        Compression::UNCOMPRESSED
    };
    let metadata = vec![
        KeyValue::new("name".to_string(), contents.name.clone()),
        KeyValue::new("context".to_string(), contents.context.to_string()),
        KeyValue::new("source".to_string(), contents.source.to_string()),
        KeyValue::new("chunk_size".to_string(), opts.chunk_size.to_string()),
        KeyValue::new(
            "compression".to_string(),
            if opts.use_compression { "zstd" } else { "none" }.to_string(),
        ),
    ];
    let props = WriterProperties::builder()
        .set_max_row_group_size(opts.chunk_size.max(1))
        .set_compression(compression)
        .set_key_value_metadata(Some(metadata))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[allow(clippy::cast_sign_loss)]
fn read_with_settings(path: &Path) -> Result<(MetricFileContents, ColumnarOptions)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let kv = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .cloned()
        .unwrap_or_default();
    let attr = |key: &str| -> Result<String> {
        kv.iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.clone())
            .ok_or_else(|| {
                Error::StorageError(format!(
                    "{}: missing container attribute `{key}`",
                    path.display()
                ))
            })
    };

    let name = attr("name")?;
    let context = attr("context")?.parse()?;
    let source = attr("source")?.parse()?;
    let chunk_size = attr("chunk_size")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    let use_compression = attr("compression").ok().as_deref() == Some("zstd");

    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let epochs = downcast::<Int32Array>(&batch, 0, path)?;
        let values = downcast::<Float32Array>(&batch, 1, path)?;
        let timestamps = downcast::<Int64Array>(&batch, 2, path)?;
        for i in 0..batch.num_rows() {
            rows.push(SampleRow {
                epoch: epochs.value(i) as u32,
                value: f64::from(values.value(i)),
                timestamp_ms: timestamps.value(i),
            });
        }
    }

    Ok((
        MetricFileContents {
            name,
            context,
            source,
            rows,
        },
        ColumnarOptions {
            chunk_size,
            use_compression,
        },
    ))
}

fn downcast<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    column: usize,
    path: &Path,
) -> Result<&'a T> {
    batch
        .column(column)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            Error::StorageError(format!(
                "{}: column {column} has unexpected type",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, MetricSource};

    fn sample_record() -> MetricRecord {
        let mut record = MetricRecord::new("loss", Context::Training, MetricSource::UserCode);
        record.add_sample(0.5, 0, 1000);
        record.add_sample(0.25, 1, 2000);
        record
    }

    #[test]
    fn test_create_then_extend() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("loss_TRAINING.parquet");

        let mut record = sample_record();
        append_metric(&path, &record, &ColumnarOptions::new()).unwrap();
        record.take_samples();

        record.add_sample(0.125, 2, 3000);
        append_metric(&path, &record, &ColumnarOptions::new()).unwrap();

        let contents = read_metric_file(&path).unwrap();
        assert_eq!(contents.name, "loss");
        assert_eq!(contents.context, Context::Training);
        assert_eq!(contents.rows.len(), 3);
        assert_eq!(contents.rows[2].epoch, 2);
        assert_eq!(contents.rows[2].timestamp_ms, 3000);
    }

    #[test]
    fn test_compression_setting_fixed_at_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("loss_TRAINING.parquet");

        let mut record = sample_record();
        let compressed = ColumnarOptions::new().compression(true).chunk_size(10);
        append_metric(&path, &record, &compressed).unwrap();
        record.take_samples();

        // Caller-supplied settings on append are ignored in favor of the
        // container's recorded settings.
        record.add_sample(0.1, 2, 3000);
        append_metric(&path, &record, &ColumnarOptions::new()).unwrap();

        let (_, settings) = read_with_settings(&path).unwrap();
        assert_eq!(settings, compressed);
    }

    #[test]
    fn test_reencode_from_text_preserves_triples() {
        let tmp = tempfile::tempdir().unwrap();
        let txt = tmp.path().join("loss_TRAINING.txt");
        let pq = tmp.path().join("loss_TRAINING.parquet");

        let record = sample_record();
        crate::store::text::append_metric(&txt, &record).unwrap();

        reencode(&txt, &pq, true).unwrap();
        let contents = read_metric_file(&pq).unwrap();
        assert_eq!(contents.source, MetricSource::UserCode);
        assert_eq!(contents.rows.len(), 2);
        assert_eq!(contents.rows[0].epoch, 0);
        assert!((contents.rows[0].value - 0.5).abs() < f64::from(f32::EPSILON));
        assert_eq!(contents.rows[1].timestamp_ms, 2000);
    }

    #[test]
    fn test_unsupported_extension_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("loss_TRAINING.zarr");
        std::fs::write(&bad, b"").unwrap();
        let err = crate::store::read_metric_file(&bad).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
