//! Series preparation: daily resampling with forward fill

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{MeasurementSeries, RecordTable};

/// Minimum raw samples for a production forecast.
pub const MIN_SAMPLES_STRICT: usize = 30;

/// Relaxed minimum for ad-hoc exploration.
pub const MIN_SAMPLES_EXPLORATORY: usize = 10;

/// One value per consecutive calendar day, starting at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    pub name: String,
    pub start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    pub fn new(name: &str, start: NaiveDate, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            start,
            values,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Calendar day of each value.
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.values.len())
            .map(|i| self.start + Duration::days(i as i64))
            .collect()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.values
            .len()
            .checked_sub(1)
            .map(|i| self.start + Duration::days(i as i64))
    }

    /// The `horizon` calendar days after the last observed day.
    pub fn future_dates(&self, horizon: usize) -> Vec<NaiveDate> {
        let Some(last) = self.last_date() else {
            return Vec::new();
        };
        (1..=horizon)
            .map(|h| last + Duration::days(h as i64))
            .collect()
    }
}

/// Extract `column` from `table` and resample it to daily means.
///
/// Returns `None` when fewer than `min_samples` non-missing values exist
/// (an absent column counts as zero samples).
pub fn prepare_time_series(
    table: &RecordTable,
    column: &str,
    min_samples: usize,
) -> Option<DailySeries> {
    prepare_series(&table.series(column), min_samples)
}

/// Resample an already extracted series to daily means.
pub fn prepare_series(series: &MeasurementSeries, min_samples: usize) -> Option<DailySeries> {
    let points = series.present();
    if points.len() < min_samples || points.is_empty() {
        debug!(
            parameter = %series.name,
            samples = points.len(),
            required = min_samples,
            "Insufficient data for forecasting"
        );
        return None;
    }

    // day -> (sum, count)
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (ts, value) in &points {
        let entry = days.entry(ts.date_naive()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    let (&start, _) = days.iter().next()?;
    let (&end, _) = days.iter().next_back()?;

    let mut values = Vec::new();
    let mut last = None;
    let mut day = start;
    while day <= end {
        if let Some(&(sum, count)) = days.get(&day) {
            last = Some(sum / count as f64);
        }
        // The first day always has data, so `last` is set from here on.
        if let Some(v) = last {
            values.push(v);
        }
        day += Duration::days(1);
    }

    debug!(
        parameter = %series.name,
        samples = points.len(),
        days = values.len(),
        filled = values.len() - days.len(),
        "Resampled series to daily means"
    );

    Some(DailySeries::new(&series.name, start, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_below_minimum_is_none() {
        let points: Vec<_> = (0..9).map(|i| (at(1 + i, 8), 1.0)).collect();
        let series = MeasurementSeries::from_values("brix", &points);
        assert!(prepare_series(&series, MIN_SAMPLES_EXPLORATORY).is_none());
        assert!(prepare_series(&series, 9).is_some());
    }

    #[test]
    fn test_daily_mean_and_forward_fill() {
        let series = MeasurementSeries::from_values(
            "torque",
            &[
                (at(1, 8), 10.0),
                (at(1, 16), 12.0),
                (at(2, 9), 14.0),
                // 3rd and 4th missing
                (at(5, 7), 20.0),
            ],
        );
        let daily = prepare_series(&series, 4).unwrap();
        assert_eq!(daily.values(), &[11.0, 14.0, 14.0, 14.0, 20.0]);
        assert_eq!(daily.start, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
        assert_eq!(daily.last_date(), NaiveDate::from_ymd_opt(2026, 4, 5));
    }

    #[test]
    fn test_from_table_skips_missing_and_absent() {
        let table = RecordTable::new(
            (0..12)
                .map(|i| {
                    let r = Record::new(at(1 + i, 8));
                    if i == 3 {
                        r
                    } else {
                        r.with("net_content", 500.0 + i as f64)
                    }
                })
                .collect(),
        );
        let daily = prepare_time_series(&table, "net_content", 10).unwrap();
        assert_eq!(daily.len(), 12);
        assert_eq!(daily.values()[3], daily.values()[2]);
        assert!(prepare_time_series(&table, "brix", 1).is_none());
    }

    #[test]
    fn test_future_dates_follow_last_day() {
        let start = NaiveDate::from_ymd_opt(2026, 4, 28).unwrap();
        let daily = DailySeries::new("x", start, vec![1.0, 2.0, 3.0]);
        let future = daily.future_dates(2);
        assert_eq!(
            future,
            vec![
                NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()
            ]
        );
    }
}
