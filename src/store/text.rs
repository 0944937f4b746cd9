//! Plain-text metric encoding
//!
//! First line is the header `name, context, source`; every following line is
//! one sample `epoch, value, timestamp`. Appending to an existing file is
//! simply opening it in append mode; no re-read is needed.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::run::MetricRecord;
use crate::store::{MetricFileContents, SampleRow};
use crate::{Error, Result};

/// Append the record's buffered samples to `path`, writing the header line
/// first when the file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_metric(path: &Path, record: &MetricRecord) -> Result<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);

    if !file_exists {
        writeln!(
            writer,
            "{}, {}, {}",
            record.name(),
            record.context(),
            record.source()
        )?;
    }
    for (epoch, samples) in record.epoch_samples() {
        for sample in samples {
            writeln!(writer, "{epoch}, {}, {}", sample.value, sample.timestamp_ms)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read a plain-text metric file fully into memory.
///
/// # Errors
///
/// A row without exactly three parseable `epoch, value, timestamp` columns is
/// a fatal parse error for the file, reported with its line number.
pub fn read_metric_file(path: &Path) -> Result<MetricFileContents> {
    let file_label = path.display().to_string();
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut lines = reader.lines();

    let header = lines.next().transpose()?.ok_or_else(|| Error::MalformedMetricRow {
        file: file_label.clone(),
        line: 1,
        reason: "missing header line".to_string(),
    })?;
    let mut header_cols = header.split(',').map(str::trim);
    let (name, context, source) = match (header_cols.next(), header_cols.next(), header_cols.next())
    {
        (Some(name), Some(ctx), Some(source)) => {
            (name.to_string(), ctx.parse()?, source.parse()?)
        }
        _ => {
            return Err(Error::MalformedMetricRow {
                file: file_label,
                line: 1,
                reason: "header must be `name, context, source`".to_string(),
            })
        }
    };

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(&line, &file_label, idx + 2)?);
    }

    Ok(MetricFileContents {
        name,
        context,
        source,
        rows,
    })
}

fn parse_row(line: &str, file: &str, line_no: usize) -> Result<SampleRow> {
    let malformed = |reason: String| Error::MalformedMetricRow {
        file: file.to_string(),
        line: line_no,
        reason,
    };

    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    if cols.len() != 3 {
        return Err(malformed(format!("expected 3 columns, got {}", cols.len())));
    }
    Ok(SampleRow {
        epoch: cols[0]
            .parse()
            .map_err(|_| malformed(format!("bad epoch: {}", cols[0])))?,
        value: cols[1]
            .parse()
            .map_err(|_| malformed(format!("bad value: {}", cols[1])))?,
        timestamp_ms: cols[2]
            .parse()
            .map_err(|_| malformed(format!("bad timestamp: {}", cols[2])))?,
    })
}
