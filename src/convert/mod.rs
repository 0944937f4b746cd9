//! Format Converters - provenance document to columnar archive
//!
//! Reads a finished provenance document, extracts every TRAINING-context
//! metric as typed arrays, groups metrics that share a sample count into
//! "granularity" groups, and writes one parquet archive with one record batch
//! (row group) per observed count. Within a batch, each row is one metric and
//! the `epochs`/`values`/`timestamps` list columns hold that metric's samples,
//! giving the (metric-count x sample-count) 2-D layout dense storage.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, Float32Builder, Int32Builder, Int64Builder, ListBuilder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::debug;

use crate::access::{self, MetricArrays};
use crate::{Error, Result};

/// Convert a provenance document (`.json`) into a columnar metric archive
/// (`.parquet`), grouped by sample count.
///
/// # Errors
///
/// Returns a configuration error for wrong input/output extensions, and
/// propagates read, parse, and write errors.
pub fn document_to_parquet(input: &Path, output: &Path) -> Result<()> {
    check_extension(input, "json")?;
    check_extension(output, "parquet")?;

    let doc: serde_json::Value = serde_json::from_reader(File::open(input)?)?;
    let groups = granularity_groups(&doc)?;

    let file = File::create(output)?;
    let metadata = vec![KeyValue::new(
        "granularities".to_string(),
        groups
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )];
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(metadata))
        .build();
    let mut writer = ArrowWriter::try_new(file, archive_schema(), Some(props))?;

    for (size, metrics) in &groups {
        let batch = build_group_batch(metrics)?;
        writer.write(&batch)?;
        // One row group per granularity.
        writer.flush()?;
        debug!(granularity = size, metrics = metrics.len(), "wrote metric group");
    }
    writer.close()?;
    Ok(())
}

/// TRAINING-context metrics grouped by shared sample count, in deterministic
/// (ascending-count, then name) order.
fn granularity_groups(
    doc: &serde_json::Value,
) -> Result<BTreeMap<usize, Vec<(String, MetricArrays)>>> {
    let mut groups: BTreeMap<usize, Vec<(String, MetricArrays)>> = BTreeMap::new();
    for name in access::metric_names(doc, Some("TRAINING")) {
        if !is_metric_entity(doc, &name) {
            continue;
        }
        let arrays = access::metric_arrays(doc, &name)?;
        if arrays.is_empty() {
            continue;
        }
        groups.entry(arrays.len()).or_default().push((name, arrays));
    }
    for metrics in groups.values_mut() {
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(groups)
}

fn is_metric_entity(doc: &serde_json::Value, name: &str) -> bool {
    doc.get("entity")
        .and_then(|e| e.get(name))
        .and_then(|attrs| attrs.get("prov-ml:metric_epoch_list"))
        .is_some()
}

fn archive_schema() -> Arc<Schema> {
    let item = |dt: DataType| Arc::new(Field::new("item", dt, true));
    Arc::new(Schema::new(vec![
        Field::new("metric", DataType::Utf8, false),
        Field::new("epochs", DataType::List(item(DataType::Int32)), true),
        Field::new("values", DataType::List(item(DataType::Float32)), true),
        Field::new("timestamps", DataType::List(item(DataType::Int64)), true),
    ]))
}

fn build_group_batch(metrics: &[(String, MetricArrays)]) -> Result<RecordBatch> {
    let mut names = StringBuilder::new();
    let mut epochs = ListBuilder::new(Int32Builder::new());
    let mut values = ListBuilder::new(Float32Builder::new());
    let mut timestamps = ListBuilder::new(Int64Builder::new());

    for (name, arrays) in metrics {
        names.append_value(name);
        epochs.values().append_slice(&arrays.epochs);
        epochs.append(true);
        values.values().append_slice(&arrays.values);
        values.append(true);
        timestamps.values().append_slice(&arrays.timestamps);
        timestamps.append(true);
    }

    RecordBatch::try_new(
        archive_schema(),
        vec![
            Arc::new(names.finish()),
            Arc::new(epochs.finish()),
            Arc::new(values.finish()),
            Arc::new(timestamps.finish()),
        ],
    )
    .map_err(Error::from)
}

fn check_extension(path: &Path, expected: &str) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext == expected {
        Ok(())
    } else {
        Err(Error::UnsupportedFormat(format!(
            "{} must have a .{expected} extension",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_doc(dir: &Path) -> std::path::PathBuf {
        let doc = json!({
            "entity": {
                "loss_TRAINING": {
                    "prov-ml:type": "Metric",
                    "prov-ml:metric_epoch_list": "[0,1]",
                    "prov-ml:metric_value_list": "[0.5,0.3]",
                    "prov-ml:metric_timestamp_list": "[1000,2000]"
                },
                "accuracy_TRAINING": {
                    "prov-ml:type": "Metric",
                    "prov-ml:metric_epoch_list": "[0,1]",
                    "prov-ml:metric_value_list": "[0.8,0.9]",
                    "prov-ml:metric_timestamp_list": "[1100,2100]"
                },
                "gpu_power_TRAINING": {
                    "prov-ml:type": "Metric",
                    "prov-ml:metric_epoch_list": "[0,0,1]",
                    "prov-ml:metric_value_list": "[120.0,130.0,125.0]",
                    "prov-ml:metric_timestamp_list": "[900,1500,2500]"
                },
                "loss_VALIDATION": {
                    "prov-ml:type": "Metric",
                    "prov-ml:metric_epoch_list": "[0]",
                    "prov-ml:metric_value_list": "[0.6]",
                    "prov-ml:metric_timestamp_list": "[1200]"
                }
            }
        });
        let path = dir.join("provgraph.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    #[test]
    fn test_groups_by_sample_count() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_doc(tmp.path());
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(input).unwrap()).unwrap();

        let groups = granularity_groups(&doc).unwrap();
        assert_eq!(groups.len(), 2);
        // Two metrics with 2 samples, one with 3; VALIDATION is excluded.
        assert_eq!(groups[&2].len(), 2);
        assert_eq!(groups[&3].len(), 1);
        assert_eq!(groups[&2][0].0, "accuracy_TRAINING");
    }

    #[test]
    fn test_single_metric_group_is_one_row() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_doc(tmp.path());
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(input).unwrap()).unwrap();

        let groups = granularity_groups(&doc).unwrap();
        let batch = build_group_batch(&groups[&3]).unwrap();
        assert_eq!(batch.num_rows(), 1);
    }

    #[test]
    fn test_convert_writes_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_doc(tmp.path());
        let output = tmp.path().join("provgraph.parquet");

        document_to_parquet(&input, &output).unwrap();
        assert!(output.is_file());

        // Read back: one row group per granularity, rows sum to metric count.
        let file = File::open(&output).unwrap();
        let builder =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 2);
        let total: usize = builder
            .build()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("provgraph.xml");
        std::fs::write(&bad, b"{}").unwrap();

        let err = document_to_parquet(&bad, &tmp.path().join("out.parquet")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
