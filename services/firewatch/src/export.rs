//! CSV export of sensor history

use std::path::Path;

use crate::api::HistoryRecord;
use crate::error::{FirewatchError, Result};

const COLUMNS: [&str; 7] = [
    "timestamp",
    "temperature",
    "humidity",
    "MQ",
    "Flame",
    "latitude",
    "longitude",
];

fn text(value: &Option<String>) -> String {
    match value {
        Some(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        None => String::new(),
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn row(record: &HistoryRecord) -> String {
    [
        text(&record.timestamp),
        number(record.temperature),
        number(record.humidity),
        text(&record.mq),
        text(&record.flame),
        number(record.latitude),
        number(record.longitude),
    ]
    .join(",")
}

/// Render records as CSV: a header row, then one row per record.
///
/// Text values are quoted with embedded quotes doubled; numbers are bare and
/// absent values are left empty.
pub fn history_csv(records: &[HistoryRecord]) -> Result<String> {
    if records.is_empty() {
        return Err(FirewatchError::Export("no records to export".to_string()));
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(COLUMNS.join(","));
    lines.extend(records.iter().map(row));
    Ok(lines.join("\n"))
}

pub fn write_history_csv(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    let csv = history_csv(records)?;
    std::fs::write(path, csv)?;
    tracing::info!("Wrote {} record(s) to {:?}", records.len(), path);
    Ok(())
}
