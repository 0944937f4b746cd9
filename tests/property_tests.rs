//! Property-based tests for the metric buffer and store naming/encoding.

use proptest::prelude::*;

use runprov::run::MetricRecord;
use runprov::store::{self, MetricFormat};
use runprov::{Context, MetricSource};

fn context_strategy() -> impl Strategy<Value = Context> {
    prop_oneof![
        Just(Context::Training),
        Just(Context::Validation),
        Just(Context::Evaluation),
    ]
}

fn sample_strategy() -> impl Strategy<Value = (u32, f64, i64)> {
    (0u32..50, -1.0e12..1.0e12f64, 0i64..4_000_000_000_000)
}

proptest! {
    /// The running sample count equals the number of appends, regardless of
    /// epoch distribution and flush draining.
    #[test]
    fn prop_total_count_tracks_appends(samples in prop::collection::vec(sample_strategy(), 0..64)) {
        let mut record = MetricRecord::new("loss", Context::Training, MetricSource::UserCode);
        for (i, &(epoch, value, ts)) in samples.iter().enumerate() {
            record.add_sample(value, epoch, ts);
            prop_assert_eq!(record.total_count(), i as u64 + 1);
        }

        let drained: usize = record.take_samples().values().map(Vec::len).sum();
        prop_assert_eq!(drained, samples.len());
        prop_assert!(record.is_empty());
        prop_assert_eq!(record.total_count(), samples.len() as u64);
    }

    /// Text flushes are lossless: every buffered (epoch, value, timestamp)
    /// triple reads back exactly, in epoch-grouped flush order.
    #[test]
    fn prop_text_roundtrip_is_lossless(samples in prop::collection::vec(sample_strategy(), 1..32)) {
        let tmp = tempfile::tempdir().unwrap();
        let mut record = MetricRecord::new("loss", Context::Training, MetricSource::UserCode);
        for &(epoch, value, ts) in &samples {
            record.add_sample(value, epoch, ts);
        }

        // A flush writes epoch groups in ascending epoch order, preserving
        // insertion order within each epoch.
        let mut expected: Vec<(u32, f64, i64)> = Vec::new();
        for (&epoch, group) in record.epoch_samples() {
            for sample in group {
                expected.push((epoch, sample.value, sample.timestamp_ms));
            }
        }

        let path = store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None)
            .unwrap();
        let contents = store::read_metric_file(&path).unwrap();

        let actual: Vec<(u32, f64, i64)> = contents
            .rows
            .iter()
            .map(|r| (r.epoch, r.value, r.timestamp_ms))
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(contents.name, "loss");
        prop_assert_eq!(contents.context, Context::Training);
        prop_assert_eq!(contents.source, MetricSource::UserCode);
    }

    /// File names built from (name, context, rank) parse back to the same
    /// triple for any multi-segment metric name that does not end in a
    /// context tag.
    #[test]
    fn prop_file_name_roundtrip(
        name in "[a-z][a-z0-9]{0,11}(_[a-z0-9]{1,8}){0,2}",
        context in context_strategy(),
        rank in prop::option::of(0u32..1024),
    ) {
        for format in [MetricFormat::Text, MetricFormat::Parquet] {
            let file_name = store::metric_file_name(&name, context, rank, format);
            let parsed = store::parse_metric_file_name(&file_name);
            prop_assert_eq!(parsed, Some((name.clone(), context, rank)));
        }
    }
}
