//! Metric Record - buffered time-series samples for one (name, context) pair

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::{Context, MetricSource};

/// A single buffered metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Logged value.
    pub value: f64,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp_ms: i64,
}

/// Metric Record accumulates samples for one (name, context) pair, grouped by
/// epoch, between flushes to durable storage.
///
/// `total_count` is the running count of every sample ever added and is *not*
/// reset when the in-memory buffer is drained by a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    name: String,
    context: Context,
    source: MetricSource,
    total_count: u64,
    epoch_samples: BTreeMap<u32, Vec<Sample>>,
}

impl MetricRecord {
    /// Create an empty record for a (name, context) pair.
    #[must_use]
    pub fn new(name: impl Into<String>, context: Context, source: MetricSource) -> Self {
        Self {
            name: name.into(),
            context,
            source,
            total_count: 0,
            epoch_samples: BTreeMap::new(),
        }
    }

    /// Get the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the context the metric was logged under.
    #[must_use]
    pub const fn context(&self) -> Context {
        self.context
    }

    /// Get the source kind of the metric.
    #[must_use]
    pub const fn source(&self) -> MetricSource {
        self.source
    }

    /// Running count of all samples ever added, independent of flushes.
    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Number of samples currently buffered (awaiting flush).
    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.epoch_samples.values().map(Vec::len).sum()
    }

    /// Whether the in-memory buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epoch_samples.is_empty()
    }

    /// Buffered samples grouped by epoch.
    #[must_use]
    pub const fn epoch_samples(&self) -> &BTreeMap<u32, Vec<Sample>> {
        &self.epoch_samples
    }

    /// Append a sample under the given epoch.
    ///
    /// Pure in-memory append; the caller serializes concurrent writes to the
    /// same record.
    pub fn add_sample(&mut self, value: f64, epoch: u32, timestamp_ms: i64) {
        self.epoch_samples.entry(epoch).or_default().push(Sample {
            value,
            timestamp_ms,
        });
        self.total_count += 1;
    }

    /// Drain the buffered samples for a flush.
    ///
    /// The record itself persists: `total_count` is unchanged and subsequent
    /// `add_sample` calls keep accumulating into the same record.
    pub fn take_samples(&mut self) -> BTreeMap<u32, Vec<Sample>> {
        std::mem::take(&mut self.epoch_samples)
    }
}
