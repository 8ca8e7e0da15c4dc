//! Measurement sources
//!
//! The engines consume one capability from the record store:
//! `query_measurements(start, end, filters) -> RecordTable`. The time range
//! is `[start, end)`. Implementations:
//! - `InMemorySource`: a fixed record set (tests, simulation replay)
//! - `CsvSource`: a CSV export of the line log, re-read on every query

mod csv_source;

pub use csv_source::CsvSource;

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::types::{Filters, Record, RecordTable};

/// Errors raised while reading measurements.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error reading {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("missing required column '{0}'")]
    MissingColumn(String),
}

/// A queryable store of timestamped measurement records.
pub trait MeasurementSource: Send + Sync {
    /// Records with `start <= timestamp < end` that match `filters`,
    /// sorted by timestamp.
    fn query_measurements(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &Filters,
    ) -> Result<RecordTable, SourceError>;

    /// Source name for logging
    fn source_name(&self) -> &str;
}

/// Select the records of `records` that fall in `[start, end)` and match `filters`.
pub(crate) fn select(
    records: &[Record],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filters: &Filters,
) -> RecordTable {
    RecordTable::new(
        records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end && filters.matches(r))
            .cloned()
            .collect(),
    )
}

/// A fixed, in-memory record set.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<Record>,
}

impl InMemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MeasurementSource for InMemorySource {
    fn query_measurements(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &Filters,
    ) -> Result<RecordTable, SourceError> {
        Ok(select(&self.records, start, end, filters))
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}
