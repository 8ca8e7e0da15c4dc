//! Statistical Process Control
//!
//! - `control_limits`: individual-value and moving-range chart limits,
//!   out-of-control classification, I-MR chart assembly
//! - `capability`: Cp/Cpk/Pp/Ppk, out-of-spec percentage, rating bands
//!
//! Both are stateless functions over a borrowed slice; insufficient data
//! yields an all-`None` sentinel, never an error.

pub mod capability;
pub mod control_limits;

pub use capability::{
    classify_cpk, compute_capability, CapabilityRating, CapabilityResult, MIN_CAPABILITY_SAMPLES,
};
pub use control_limits::{
    compute_control_limits, compute_moving_range_limits, moving_ranges, out_of_control_points,
    ControlChart, ControlLimits, D2_SPAN_2, DEFAULT_N_SIGMA, MIN_CONTROL_SAMPLES,
};
