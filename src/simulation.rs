//! Bottling-line simulation
//!
//! Generates a synthetic line log for exercising the engines end to end:
//! cap torque, BRIX, net fill content, a pass/fail seal check and the
//! product on the line. Supports a linear drift on one parameter and
//! random spikes.

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::Write;

// ============================================================================
// Line Constants
// ============================================================================

/// Cap application torque (in-lbs)
const BASE_TORQUE: f64 = 18.0;
const TORQUE_SD: f64 = 0.3;
/// Sugar content (°Bx)
const BASE_BRIX: f64 = 10.6;
const BRIX_SD: f64 = 0.08;
/// Net fill (ml)
const BASE_NET_CONTENT: f64 = 500.0;
const NET_CONTENT_SD: f64 = 1.2;

/// Seal check failure probability in normal operation
const SEAL_FAIL_RATE: f64 = 0.01;

/// Spike magnitude in standard deviations
const SPIKE_SIGMAS: f64 = 6.0;

const PRODUCTS: [&str; 2] = ["cola", "lemon"];

pub const PARAMETERS: [&str; 3] = ["torque", "brix", "net_content"];

/// Simulation settings.
#[derive(Debug, Clone)]
pub struct SimulationSpec {
    pub start: DateTime<Utc>,
    pub samples: usize,
    pub interval: Duration,
    /// Parameter that drifts, if any
    pub drift_parameter: Option<String>,
    /// Drift per day, in the parameter's own units
    pub drift_per_day: f64,
    /// Per-sample spike probability
    pub spike_rate: f64,
    /// Samples per product run before changeover
    pub run_length: usize,
}

impl SimulationSpec {
    /// Offset of sample `index` from `start`, `None` when it does not fit a `Duration`.
    pub fn offset(&self, index: usize) -> Option<Duration> {
        let index = i64::try_from(index).ok()?;
        let millis = self.interval.num_milliseconds().checked_mul(index)?;
        Duration::try_milliseconds(millis)
    }

    /// Timestamp of the last sample, `None` when the run overflows the calendar.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        let last = self.samples.saturating_sub(1);
        self.start.checked_add_signed(self.offset(last)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid noise distribution: {0}")]
    Noise(#[from] rand_distr::NormalError),
    #[error("{samples} samples at {interval_secs} s intervals overflow the timestamp range")]
    SpanOverflow { samples: usize, interval_secs: i64 },
}

/// One simulated sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSample {
    pub timestamp: DateTime<Utc>,
    pub product: &'static str,
    pub torque: f64,
    pub brix: f64,
    pub net_content: f64,
    pub seal_pass: bool,
}

pub struct LineSimulator {
    rng: StdRng,
    spec: SimulationSpec,
    torque_noise: Normal<f64>,
    brix_noise: Normal<f64>,
    fill_noise: Normal<f64>,
}

impl LineSimulator {
    pub fn new(spec: SimulationSpec, seed: Option<u64>) -> Result<Self, SimulationError> {
        if spec.last_timestamp().is_none() {
            return Err(SimulationError::SpanOverflow {
                samples: spec.samples,
                interval_secs: spec.interval.num_seconds(),
            });
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            spec,
            torque_noise: Normal::new(0.0, TORQUE_SD)?,
            brix_noise: Normal::new(0.0, BRIX_SD)?,
            fill_noise: Normal::new(0.0, NET_CONTENT_SD)?,
        })
    }

    fn drift(&self, parameter: &str, elapsed: Duration) -> f64 {
        match self.spec.drift_parameter.as_deref() {
            Some(p) if p == parameter => {
                self.spec.drift_per_day * elapsed.num_seconds() as f64 / 86_400.0
            }
            _ => 0.0,
        }
    }

    fn spike(&mut self, sd: f64) -> f64 {
        if self.spec.spike_rate > 0.0 && self.rng.gen_bool(self.spec.spike_rate.min(1.0)) {
            let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            sign * SPIKE_SIGMAS * sd
        } else {
            0.0
        }
    }

    /// Sample `index`, or `None` past the end of the representable range.
    pub fn sample(&mut self, index: usize) -> Option<LineSample> {
        let elapsed = self.spec.offset(index)?;
        let timestamp = self.spec.start.checked_add_signed(elapsed)?;
        let run = index / self.spec.run_length.max(1);
        let product = PRODUCTS[run % PRODUCTS.len()];

        let torque = BASE_TORQUE
            + self.torque_noise.sample(&mut self.rng)
            + self.drift("torque", elapsed)
            + self.spike(TORQUE_SD);
        let brix = BASE_BRIX
            + self.brix_noise.sample(&mut self.rng)
            + self.drift("brix", elapsed)
            + self.spike(BRIX_SD);
        let net_content = BASE_NET_CONTENT
            + self.fill_noise.sample(&mut self.rng)
            + self.drift("net_content", elapsed)
            + self.spike(NET_CONTENT_SD);

        // Under-torqued caps fail the seal check far more often.
        let fail_rate = if torque < BASE_TORQUE - 3.0 * TORQUE_SD {
            0.5
        } else {
            SEAL_FAIL_RATE
        };
        let seal_pass = !self.rng.gen_bool(fail_rate);

        Some(LineSample {
            timestamp,
            product,
            torque,
            brix,
            net_content,
            seal_pass,
        })
    }

    /// Write the whole run as CSV with a header row.
    pub fn write_csv<W: Write>(&mut self, writer: W) -> Result<usize, csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(["timestamp", "product", "torque", "brix", "net_content", "seal_check"])?;
        for i in 0..self.spec.samples {
            // The span is checked in `new`, so every index in range has a timestamp.
            let Some(s) = self.sample(i) else { break };
            out.write_record([
                s.timestamp.to_rfc3339(),
                s.product.to_string(),
                format!("{:.3}", s.torque),
                format!("{:.3}", s.brix),
                format!("{:.2}", s.net_content),
                if s.seal_pass { "pass" } else { "fail" }.to_string(),
            ])?;
        }
        out.flush()?;
        Ok(self.spec.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(samples: usize) -> SimulationSpec {
        SimulationSpec {
            start: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            samples,
            interval: Duration::minutes(10),
            drift_parameter: None,
            drift_per_day: 0.0,
            spike_rate: 0.0,
            run_length: 48,
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut a = LineSimulator::new(spec(5), Some(7)).unwrap();
        let mut b = LineSimulator::new(spec(5), Some(7)).unwrap();
        assert_eq!(a.sample(3), b.sample(3));
    }

    #[test]
    fn test_large_index_uses_full_width_offset() {
        let mut sim = LineSimulator::new(spec(1), Some(3)).unwrap();
        // 10 minutes × 2^36 does not fit an i32 multiplier, and lands past year 262143
        let index = 1usize << 36;
        let expected = Duration::minutes(10 * (1i64 << 36));
        assert_eq!(sim.spec.offset(index), Some(expected));
        assert!(sim.sample(index).is_none());
    }

    #[test]
    fn test_overflowing_span_is_rejected() {
        let mut s = spec(usize::MAX);
        s.interval = Duration::days(365);
        assert!(matches!(
            LineSimulator::new(s, Some(1)),
            Err(SimulationError::SpanOverflow { .. })
        ));
    }

    #[test]
    fn test_drift_moves_parameter() {
        let mut s = spec(1);
        s.drift_parameter = Some("brix".to_string());
        s.drift_per_day = 1.0;
        let sim = LineSimulator::new(s, Some(1)).unwrap();
        assert!((sim.drift("brix", Duration::days(2)) - 2.0).abs() < 1e-12);
        assert_eq!(sim.drift("torque", Duration::days(2)), 0.0);
    }

    #[test]
    fn test_csv_parses_back() {
        let mut sim = LineSimulator::new(spec(20), Some(42)).unwrap();
        let mut buf = Vec::new();
        assert_eq!(sim.write_csv(&mut buf).unwrap(), 20);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 21);
        assert!(text.starts_with("timestamp,product,torque,brix,net_content,seal_check"));
    }
}
