//! Accessors - read-side helpers over a finished provenance document
//!
//! All functions take the document as loaded JSON (`serde_json::Value`) and
//! never mutate it. Metric attribute lists are stored as stringified JSON
//! list literals, so every accessor goes through one parse step.
//!
//! Missing-key behavior is documented per accessor: [`metric_series`] returns
//! an empty table, everything else raises a scoped lookup error.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

/// Options for [`metric_series`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesOptions {
    /// Convert timestamps from milliseconds to seconds.
    pub seconds: bool,
    /// Replace each timestamp with the difference from its predecessor
    /// (first row becomes 0).
    pub incremental: bool,
}

/// One row of an extracted metric table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRow {
    /// Epoch the sample was logged under.
    pub epoch: i64,
    /// Logged value.
    pub value: f64,
    /// Timestamp (milliseconds, or seconds/deltas per [`SeriesOptions`]).
    pub time: i64,
}

/// Typed column arrays for one metric, sorted by timestamp. Matches the
/// columnar on-disk widths (int32/float32/int64).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricArrays {
    /// Epoch per sample.
    pub epochs: Vec<i32>,
    /// Value per sample.
    pub values: Vec<f32>,
    /// Timestamp in milliseconds per sample.
    pub timestamps: Vec<i64>,
}

impl MetricArrays {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether the metric has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

/// List entity names in the document, optionally filtered by substring.
#[must_use]
pub fn metric_names(doc: &Value, keyword: Option<&str>) -> Vec<String> {
    let Some(entities) = doc.get("entity").and_then(Value::as_object) else {
        return Vec::new();
    };
    entities
        .keys()
        .filter(|name| keyword.map_or(true, |kw| name.contains(kw)))
        .cloned()
        .collect()
}

/// Extract one metric as an ordered table: deduplicated rows sorted by
/// timestamp, with optional unit conversion and incremental-time transform.
///
/// A missing or non-metric entity yields an empty table rather than an error.
#[must_use]
pub fn metric_series(doc: &Value, metric: &str, opts: SeriesOptions) -> Vec<MetricRow> {
    let (Ok(epochs), Ok(values), Ok(times)) = (
        list_attr::<i64>(doc, metric, "prov-ml:metric_epoch_list"),
        list_attr::<f64>(doc, metric, "prov-ml:metric_value_list"),
        list_attr::<i64>(doc, metric, "prov-ml:metric_timestamp_list"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut rows: Vec<MetricRow> = epochs
        .into_iter()
        .zip(values)
        .zip(times)
        .map(|((epoch, value), time)| MetricRow { epoch, value, time })
        .filter(|row| seen.insert((row.epoch, row.value.to_bits(), row.time)))
        .collect();
    rows.sort_by_key(|row| row.time);

    if opts.seconds {
        for row in &mut rows {
            row.time /= 1000;
        }
    }
    if opts.incremental {
        for i in (1..rows.len()).rev() {
            rows[i].time -= rows[i - 1].time;
        }
        if let Some(first) = rows.first_mut() {
            first.time = 0;
        }
    }
    rows
}

/// Extract one metric as typed column arrays sorted by timestamp.
///
/// # Errors
///
/// Returns [`Error::MetricNotFound`] when the entity is absent and
/// [`Error::MalformedDocument`] when its attribute lists cannot be parsed.
#[allow(clippy::cast_possible_truncation)]
pub fn metric_arrays(doc: &Value, metric: &str) -> Result<MetricArrays> {
    let epochs = list_attr::<i64>(doc, metric, "prov-ml:metric_epoch_list")?;
    let values = list_attr::<f64>(doc, metric, "prov-ml:metric_value_list")?;
    let timestamps = list_attr::<i64>(doc, metric, "prov-ml:metric_timestamp_list")?;

    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&i| timestamps[i]);

    Ok(MetricArrays {
        epochs: order.iter().map(|&i| epochs[i] as i32).collect(),
        values: order.iter().map(|&i| values[i] as f32).collect(),
        timestamps: order.iter().map(|&i| timestamps[i]).collect(),
    })
}

/// Average of a metric's values.
///
/// # Errors
///
/// Lookup error on a missing metric or empty value list.
#[allow(clippy::cast_precision_loss)]
pub fn avg_metric(doc: &Value, metric: &str) -> Result<f64> {
    let values = list_attr::<f64>(doc, metric, "prov-ml:metric_value_list")?;
    if values.is_empty() {
        return Err(Error::MalformedDocument(format!(
            "metric {metric} has no values"
        )));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sum of a metric's values.
///
/// # Errors
///
/// Lookup error on a missing metric.
pub fn sum_metric(doc: &Value, metric: &str) -> Result<f64> {
    Ok(list_attr::<f64>(doc, metric, "prov-ml:metric_value_list")?
        .iter()
        .sum())
}

/// Total wall-time span of a metric (max timestamp - min timestamp).
///
/// # Errors
///
/// Lookup error on a missing metric or empty timestamp list.
pub fn metric_time_span(doc: &Value, metric: &str, seconds: bool) -> Result<i64> {
    let times = list_attr::<i64>(doc, metric, "prov-ml:metric_timestamp_list")?;
    let (Some(min), Some(max)) = (times.iter().min(), times.iter().max()) else {
        return Err(Error::MalformedDocument(format!(
            "metric {metric} has no timestamps"
        )));
    };
    let span = max - min;
    Ok(if seconds { span / 1000 } else { span })
}

/// Numeric value of a parameter entity.
///
/// # Errors
///
/// Lookup error on a missing parameter or a non-numeric value.
pub fn parameter_value(doc: &Value, param: &str) -> Result<f64> {
    let value = doc
        .get("entity")
        .and_then(|e| e.get(param))
        .ok_or_else(|| Error::MetricNotFound(param.to_string()))?
        .get("prov-ml:parameter_value")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::MalformedDocument(format!("parameter {param} has no value attribute"))
        })?;
    value.parse().map_err(|_| {
        Error::MalformedDocument(format!("parameter {param} is not numeric: {value}"))
    })
}

fn list_attr<T: DeserializeOwned>(doc: &Value, metric: &str, key: &str) -> Result<Vec<T>> {
    let entity = doc
        .get("entity")
        .and_then(|e| e.get(metric))
        .ok_or_else(|| Error::MetricNotFound(metric.to_string()))?;
    let raw = entity.get(key).and_then(Value::as_str).ok_or_else(|| {
        Error::MalformedDocument(format!("metric {metric} is missing {key}"))
    })?;
    serde_json::from_str(raw)
        .map_err(|e| Error::MalformedDocument(format!("metric {metric}, {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_doc() -> Value {
        json!({
            "entity": {
                "loss_TRAINING": {
                    "prov-ml:type": "Metric",
                    "prov-ml:metric_epoch_list": "[1,0,0]",
                    "prov-ml:metric_value_list": "[0.3,0.5,0.5]",
                    "prov-ml:metric_timestamp_list": "[3000,1000,1000]"
                },
                "learning_rate": {
                    "prov-ml:type": "Parameter",
                    "prov-ml:parameter_value": "0.01"
                }
            }
        })
    }

    #[test]
    fn test_metric_names_filter() {
        let doc = sample_doc();
        assert_eq!(metric_names(&doc, Some("TRAINING")), vec!["loss_TRAINING"]);
        assert_eq!(metric_names(&doc, None).len(), 2);
    }

    #[test]
    fn test_series_dedups_and_sorts() {
        let doc = sample_doc();
        let rows = metric_series(&doc, "loss_TRAINING", SeriesOptions::default());
        assert_eq!(
            rows,
            vec![
                MetricRow { epoch: 0, value: 0.5, time: 1000 },
                MetricRow { epoch: 1, value: 0.3, time: 3000 },
            ]
        );
    }

    #[test]
    fn test_series_incremental_seconds() {
        let doc = sample_doc();
        let rows = metric_series(
            &doc,
            "loss_TRAINING",
            SeriesOptions { seconds: true, incremental: true },
        );
        assert_eq!(rows[0].time, 0);
        assert_eq!(rows[1].time, 2);
    }

    #[test]
    fn test_series_missing_metric_is_empty() {
        let doc = sample_doc();
        assert!(metric_series(&doc, "nope", SeriesOptions::default()).is_empty());
    }

    #[test]
    fn test_aggregates() {
        let doc = sample_doc();
        assert!((sum_metric(&doc, "loss_TRAINING").unwrap() - 1.3).abs() < 1e-9);
        assert!((avg_metric(&doc, "loss_TRAINING").unwrap() - 1.3 / 3.0).abs() < 1e-9);
        assert_eq!(metric_time_span(&doc, "loss_TRAINING", false).unwrap(), 2000);
        assert_eq!(metric_time_span(&doc, "loss_TRAINING", true).unwrap(), 2);
    }

    #[test]
    fn test_missing_metric_is_lookup_error() {
        let doc = sample_doc();
        assert!(matches!(
            avg_metric(&doc, "nope"),
            Err(Error::MetricNotFound(_))
        ));
    }

    #[test]
    fn test_parameter_value() {
        let doc = sample_doc();
        assert!((parameter_value(&doc, "learning_rate").unwrap() - 0.01).abs() < 1e-12);
        assert!(parameter_value(&doc, "missing").is_err());
    }
}
