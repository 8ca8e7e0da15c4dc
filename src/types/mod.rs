//! Shared data structures for the quality-monitoring engines
//!
//! - `measurement`: records, tables, filters and per-parameter series
//!   drawn from the external record store
//! - `limits`: specification limits (LSL/USL)
//! - `anomaly`: persisted anomaly configuration and alert rows

mod anomaly;
mod limits;
mod measurement;

pub use anomaly::*;
pub use limits::*;
pub use measurement::*;
