//! Tabular measurement records as returned by the record store
//!
//! A `RecordTable` is an immutable, timestamp-ordered sequence of records.
//! Engines borrow it read-only and extract per-parameter `MeasurementSeries`
//! views; nothing here mutates the collaborator's data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cell of a measurement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Numeric value, if the cell holds a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// A single logged record: a timestamp plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Equality filters on categorical fields (e.g. `product = "cola"`).
///
/// A record lacking a filtered field does not match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub equals: BTreeMap<String, String>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.equals.insert(field.to_string(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.equals.iter().all(|(field, expected)| match record.get(field) {
            Some(FieldValue::Text(s)) => s == expected,
            Some(FieldValue::Number(v)) => expected.parse::<f64>().is_ok_and(|e| e == *v),
            _ => false,
        })
    }
}

/// Immutable record sequence, sorted by timestamp on construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    records: Vec<Record>,
}

impl RecordTable {
    pub fn new(mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record carries a field with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.fields.contains_key(name))
    }

    /// Extract one parameter as a series.
    ///
    /// Records without the column, or with a non-numeric cell, contribute a
    /// missing point. An absent column yields an empty series.
    pub fn series(&self, name: &str) -> MeasurementSeries {
        if !self.has_column(name) {
            return MeasurementSeries::new(name, Vec::new());
        }
        let points = self
            .records
            .iter()
            .map(|r| DataPoint {
                timestamp: r.timestamp,
                value: r.get(name).and_then(FieldValue::as_number),
            })
            .collect();
        MeasurementSeries::new(name, points)
    }

    /// Names of all columns holding at least one finite number.
    pub fn numeric_columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .flat_map(|r| {
                r.fields
                    .iter()
                    .filter(|(_, v)| v.as_number().is_some())
                    .map(|(k, _)| k.clone())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// One (timestamp, value) pair. `None` marks a missing measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Ordered measurements for one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSeries {
    pub name: String,
    points: Vec<DataPoint>,
}

impl MeasurementSeries {
    pub fn new(name: &str, mut points: Vec<DataPoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self {
            name: name.to_string(),
            points,
        }
    }

    /// Build a series from present values only.
    pub fn from_values(name: &str, values: &[(DateTime<Utc>, f64)]) -> Self {
        let points = values
            .iter()
            .map(|&(timestamp, value)| DataPoint {
                timestamp,
                value: Some(value),
            })
            .collect();
        Self::new(name, points)
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points with a present, finite value, in timestamp order.
    pub fn present(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.points
            .iter()
            .filter_map(|p| match p.value {
                Some(v) if v.is_finite() => Some((p.timestamp, v)),
                _ => None,
            })
            .collect()
    }

    /// Present values only, in timestamp order.
    pub fn values(&self) -> Vec<f64> {
        self.present().into_iter().map(|(_, v)| v).collect()
    }
}
