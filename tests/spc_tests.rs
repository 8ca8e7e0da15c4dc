//! Control-limit and capability engine tests
//!
//! Exercises the public SPC surface the way the reporting layer calls it:
//! plain slices in, plain structs out.

#![allow(clippy::unwrap_used)]

use linewatch::spc::{
    classify_cpk, compute_capability, compute_control_limits, out_of_control_points,
    CapabilityRating, ControlChart,
};
use linewatch::SpecLimits;

fn close(a: Option<f64>, b: f64, eps: f64) -> bool {
    a.is_some_and(|a| (a - b).abs() < eps)
}

// ============================================================================
// Control limits
// ============================================================================

#[test]
fn limits_are_ordered_for_varied_series() {
    let series: [&[f64]; 4] = [
        &[1.0, 2.0, 3.0, 4.0, 5.0],
        &[500.2, 499.1, 501.4, 498.7, 500.0, 502.3],
        &[-3.0, 4.0, -1.5, 2.5],
        &[0.1, 0.1, 0.1, 9.0],
    ];
    for s in series {
        let limits = compute_control_limits(s, 3.0);
        let (lcl, cl, ucl) = (
            limits.lower_limit.unwrap(),
            limits.center_line.unwrap(),
            limits.upper_limit.unwrap(),
        );
        assert!(lcl <= cl && cl <= ucl, "unordered limits for {s:?}");
    }
}

#[test]
fn near_constant_series_has_finite_limits_and_no_violations() {
    let mut values = vec![10.0; 9];
    values.extend([9.0, 11.0]);
    let limits = compute_control_limits(&values, 3.0);

    assert!(close(limits.center_line, 10.0, 1e-12));
    assert!(limits.sigma.unwrap() > 0.0);
    assert!(limits.upper_limit.unwrap().is_finite());
    assert!(limits.lower_limit.unwrap().is_finite());
    assert!(out_of_control_points(&values, &limits).is_empty());
}

#[test]
fn single_value_is_insufficient() {
    let limits = compute_control_limits(&[4.2], 3.0);
    assert!(limits.is_insufficient());
    assert!(limits.upper_limit.is_none());
    assert!(out_of_control_points(&[4.2], &limits).is_empty());
}

#[test]
fn imr_chart_flags_a_fill_excursion() {
    let mut fills: Vec<f64> = (0..40)
        .map(|i| 500.0 + if i % 2 == 0 { 0.4 } else { -0.4 })
        .collect();
    fills[30] = 512.0;
    let chart = ControlChart::build(&fills, 3.0);
    assert!(!chart.in_control());
    assert!(chart.individual_violations.contains(&30));
    assert_eq!(chart.ranges.len(), fills.len() - 1);
    assert_eq!(chart.moving_range.lower_limit, Some(0.0));
}

// ============================================================================
// Capability
// ============================================================================

/// 20 values with mean exactly 8.5 and sample std exactly 0.5.
fn brix_like() -> Vec<f64> {
    let a = 0.2375_f64.sqrt();
    (0..20)
        .map(|i| if i % 2 == 0 { 8.5 + a } else { 8.5 - a })
        .collect()
}

#[test]
fn capability_matches_hand_calculation() {
    let values = brix_like();
    let result = compute_capability(&values, SpecLimits::two_sided(8.0, 9.5));

    assert!(close(result.mean, 8.5, 1e-9));
    assert!(close(result.std, 0.5, 1e-9));
    assert!(close(result.cp, 0.5, 1e-9));
    // cpu = 0.667, cpl = 0.333; the lower side governs
    assert!(close(result.cpk, 1.0 / 3.0, 1e-9));
    assert!(close(result.pp, 0.5, 1e-9));
    assert!(close(result.ppk, 1.0 / 3.0, 1e-9));
    assert_eq!(result.rating(), Some(CapabilityRating::NotCapable));
}

#[test]
fn cpk_never_exceeds_cp_when_off_center() {
    let base = brix_like();
    let limits = SpecLimits::two_sided(7.0, 10.0);
    for shift in [-1.0, -0.4, 0.0, 0.3, 0.9] {
        let shifted: Vec<f64> = base.iter().map(|v| v + shift).collect();
        let r = compute_capability(&shifted, limits);
        assert!(r.cpk.unwrap() <= r.cp.unwrap() + 1e-12, "shift {shift}");
    }
}

#[test]
fn capability_is_null_below_ten_samples() {
    for n in 0..10 {
        let values: Vec<f64> = (0..n).map(|i| 10.0 + i as f64 * 0.1).collect();
        let r = compute_capability(&values, SpecLimits::two_sided(9.0, 12.0));
        assert!(r.is_insufficient());
        assert!(r.cp.is_none() && r.cpk.is_none() && r.pp.is_none() && r.ppk.is_none());
        assert!(r.std.is_none() && r.out_of_spec_percent.is_none());
    }
}

#[test]
fn out_of_spec_percent_counts_both_sides() {
    let mut values = vec![500.0; 16];
    values.extend([490.0, 489.0, 511.0, 512.0]);
    let r = compute_capability(&values, SpecLimits::two_sided(495.0, 505.0));
    assert!(close(r.out_of_spec_percent, 20.0, 1e-9));
}

#[test]
fn rating_strings_are_stable() {
    assert_eq!(classify_cpk(0.9).to_string(), "not capable");
    assert_eq!(classify_cpk(1.2).to_string(), "marginally capable");
    assert_eq!(classify_cpk(1.5).to_string(), "capable");
    assert_eq!(classify_cpk(2.0).to_string(), "highly capable");
}
