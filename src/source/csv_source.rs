//! CSV export of the line log as a measurement source
//!
//! Expected layout: a header row with a timestamp column (name
//! configurable, default `timestamp`) and any number of measurement
//! columns. Cells parse as:
//! - empty, `NaN`, `NA`, `null` → missing
//! - a finite number → numeric
//! - anything else → categorical text (product, pass/fail checks, ...)
//!
//! Timestamps accept RFC 3339 or `%Y-%m-%d %H:%M:%S` (taken as UTC).

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{select, MeasurementSource, SourceError};
use crate::types::{FieldValue, Filters, Record, RecordTable};

/// Reads measurements from a CSV file on every query.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    timestamp_column: String,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timestamp_column: "timestamp".to_string(),
        }
    }

    pub fn with_timestamp_column(mut self, column: &str) -> Self {
        self.timestamp_column = column.to_string();
        self
    }

    /// Read and parse the whole file.
    pub fn load_all(&self) -> Result<Vec<Record>, SourceError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| SourceError::Io(self.path.clone(), e))?;
        let records = parse_records(file, &self.timestamp_column)?;
        debug!(path = %self.path.display(), rows = records.len(), "Loaded CSV measurements");
        Ok(records)
    }
}

impl MeasurementSource for CsvSource {
    fn query_measurements(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &Filters,
    ) -> Result<RecordTable, SourceError> {
        let records = self.load_all()?;
        Ok(select(&records, start, end, filters))
    }

    fn source_name(&self) -> &str {
        "csv"
    }
}

/// Parse CSV rows from any reader.
pub(crate) fn parse_records<R: std::io::Read>(
    reader: R,
    timestamp_column: &str,
) -> Result<Vec<Record>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| SourceError::Parse {
            row: 0,
            message: e.to_string(),
        })?
        .clone();
    let ts_idx = headers
        .iter()
        .position(|h| h == timestamp_column)
        .ok_or_else(|| SourceError::MissingColumn(timestamp_column.to_string()))?;

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row_no = i + 1;
        let row = row.map_err(|e| SourceError::Parse {
            row: row_no,
            message: e.to_string(),
        })?;
        let raw_ts = row.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| SourceError::Parse {
            row: row_no,
            message: format!("invalid timestamp '{raw_ts}'"),
        })?;

        let mut record = Record::new(timestamp);
        for (col, cell) in headers.iter().zip(row.iter()) {
            if col == timestamp_column {
                continue;
            }
            record.fields.insert(col.to_string(), parse_cell(cell));
        }
        records.push(record);
    }
    Ok(records)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_cell(cell: &str) -> FieldValue {
    if cell.is_empty() || matches!(cell.to_ascii_lowercase().as_str(), "nan" | "na" | "null") {
        return FieldValue::Missing;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => FieldValue::Number(v),
        _ => FieldValue::Text(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    const SAMPLE: &str = "\
timestamp,product,torque,brix,seal_check
2026-03-01T06:00:00Z,cola,18.2,10.6,pass
2026-03-01 06:10:00,cola,,10.7,pass
2026-03-01T06:20:00+00:00,lemon,17.9,NaN,fail
";

    #[test]
    fn test_parse_cells() {
        let records = parse_records(SAMPLE.as_bytes(), "timestamp").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("torque"), Some(&FieldValue::Number(18.2)));
        assert_eq!(records[1].get("torque"), Some(&FieldValue::Missing));
        assert_eq!(records[2].get("brix"), Some(&FieldValue::Missing));
        assert_eq!(records[2].get("seal_check"), Some(&FieldValue::Text("fail".to_string())));
    }

    #[test]
    fn test_missing_timestamp_column() {
        let err = parse_records("time,torque\n1,2\n".as_bytes(), "timestamp").unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn(_)));
    }

    #[test]
    fn test_bad_timestamp_reports_row() {
        let err = parse_records("timestamp,torque\nyesterday,2\n".as_bytes(), "timestamp")
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { row: 1, .. }));
    }

    #[test]
    fn test_query_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let source = CsvSource::new(file.path());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let table = source
            .query_measurements(start, start + Duration::minutes(15), &Filters::new())
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.series("brix").values(), vec![10.6, 10.7]);
    }
}
