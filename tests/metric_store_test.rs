//! Metric store round-trip tests
//!
//! Covers append-only text flushes, the chunked columnar container, and
//! lossless re-encoding between the two.

use runprov::run::MetricRecord;
use runprov::store::{self, columnar, MetricFormat};
use runprov::{Context, MetricSource};

fn record_with(samples: &[(u32, f64, i64)]) -> MetricRecord {
    let mut record = MetricRecord::new("loss", Context::Training, MetricSource::UserCode);
    for &(epoch, value, ts) in samples {
        record.add_sample(value, epoch, ts);
    }
    record
}

// =============================================================================
// Plain-text encoding
// =============================================================================

#[test]
fn test_text_append_is_lossless_and_order_preserving() {
    let tmp = tempfile::tempdir().unwrap();
    let mut record = record_with(&[(0, 0.5, 1000), (0, 0.4, 1100), (1, 0.3, 2000)]);

    let path = store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None)
        .expect("first flush");
    assert!(record.is_empty());
    assert_eq!(record.total_count(), 3);

    // Second flush with more samples appends after the first batch.
    record.add_sample(0.2, 2, 3000);
    record.add_sample(0.1, 3, 4000);
    store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None)
        .expect("second flush");
    assert_eq!(record.total_count(), 5);

    let contents = store::read_metric_file(&path).expect("read back");
    let triples: Vec<(u32, f64, i64)> = contents
        .rows
        .iter()
        .map(|r| (r.epoch, r.value, r.timestamp_ms))
        .collect();
    assert_eq!(
        triples,
        vec![
            (0, 0.5, 1000),
            (0, 0.4, 1100),
            (1, 0.3, 2000),
            (2, 0.2, 3000),
            (3, 0.1, 4000),
        ]
    );
}

#[test]
fn test_text_save_with_empty_buffer_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let mut record = record_with(&[(0, 0.5, 1000)]);

    let path = store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None)
        .expect("flush");
    let len = std::fs::metadata(&path).unwrap().len();

    store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None).unwrap();
    store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
}

#[test]
fn test_rank_suffix_in_file_name() {
    let tmp = tempfile::tempdir().unwrap();
    let mut record = record_with(&[(0, 0.5, 1000)]);

    let path = store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, Some(3))
        .expect("flush");
    assert!(path.ends_with("loss_TRAINING_GR3.txt"));
}

// =============================================================================
// Columnar encoding and re-encode
// =============================================================================

#[test]
fn test_columnar_flushes_extend_arrays() {
    let tmp = tempfile::tempdir().unwrap();
    let mut record = record_with(&[(0, 0.5, 1000), (1, 0.25, 2000)]);

    let path = store::save_metric(&mut record, tmp.path(), MetricFormat::Parquet, true, None)
        .expect("first flush");
    record.add_sample(0.125, 2, 3000);
    store::save_metric(&mut record, tmp.path(), MetricFormat::Parquet, true, None)
        .expect("second flush");

    let contents = store::read_metric_file(&path).expect("read back");
    assert_eq!(contents.name, "loss");
    assert_eq!(contents.context, Context::Training);
    assert_eq!(contents.source, MetricSource::UserCode);
    let epochs: Vec<u32> = contents.rows.iter().map(|r| r.epoch).collect();
    assert_eq!(epochs, vec![0, 1, 2]);
}

#[test]
fn test_text_to_columnar_reencode_preserves_triples() {
    let tmp = tempfile::tempdir().unwrap();
    let mut record = record_with(&[(0, 0.5, 1000), (0, 0.75, 1100), (1, 0.25, 2000)]);

    let txt = store::save_metric(&mut record, tmp.path(), MetricFormat::Text, false, None)
        .expect("flush");
    let pq = tmp.path().join("loss_TRAINING.parquet");
    columnar::reencode(&txt, &pq, true).expect("reencode");

    let original = store::read_metric_file(&txt).unwrap();
    let converted = store::read_metric_file(&pq).unwrap();
    assert_eq!(original.rows.len(), converted.rows.len());
    for (a, b) in original.rows.iter().zip(&converted.rows) {
        assert_eq!(a.epoch, b.epoch);
        assert_eq!(a.timestamp_ms, b.timestamp_ms);
        // Columnar values are stored as 4-byte floats.
        assert!((a.value - b.value).abs() < f64::from(f32::EPSILON));
    }
}

#[test]
fn test_reencode_missing_source_propagates_read_error() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope_TRAINING.txt");
    let out = tmp.path().join("out.parquet");
    assert!(columnar::reencode(&missing, &out, false).is_err());
}
