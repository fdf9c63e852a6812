//! Pure bound arithmetic.
//!
//! These functions turn a configured base value and a buffer percentage into
//! the effective pass/fail bound. Validation here is load-bearing:
//! misconfigured tests would otherwise silently produce negative or
//! nonsensical bounds, so out-of-range inputs fail before any iteration runs.

use crate::error::{HarnessError, Result};

/// Effective bound for a max-style metric: `base * (1 + buffer_pct / 100)`,
/// rounded up to a whole number when `round` is set.
///
/// Used for "must not exceed" metrics such as durations and heap growth.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] when `base` is negative or not finite,
/// or when `buffer_pct` is outside `[0, 100]`.
///
/// # Examples
///
/// ```
/// use perf_harness::thresholds::effective_threshold;
///
/// assert_eq!(effective_threshold(100.0, 20.0, false).unwrap(), 120.0);
/// assert_eq!(effective_threshold(100.0, 0.0, false).unwrap(), 100.0);
/// assert_eq!(effective_threshold(3.0, 10.0, true).unwrap(), 4.0);
/// ```
pub fn effective_threshold(base: f64, buffer_pct: f64, round: bool) -> Result<f64> {
    validate(base, buffer_pct)?;
    let bound = base * (1.0 + buffer_pct / 100.0);
    Ok(if round { bound.ceil() } else { bound })
}

/// Effective bound for a min-style metric: `base * (1 - buffer_pct / 100)`,
/// rounded down to a whole number when `round` is set.
///
/// Used for "must not fall below" metrics, i.e. fps.
///
/// # Errors
///
/// Same validation as [`effective_threshold`].
///
/// # Examples
///
/// ```
/// use perf_harness::thresholds::effective_min_threshold;
///
/// assert_eq!(effective_min_threshold(30.0, 20.0, false).unwrap(), 24.0);
/// assert_eq!(effective_min_threshold(30.0, 0.0, false).unwrap(), 30.0);
/// ```
pub fn effective_min_threshold(base: f64, buffer_pct: f64, round: bool) -> Result<f64> {
    validate(base, buffer_pct)?;
    let bound = base * (1.0 - buffer_pct / 100.0);
    Ok(if round { bound.floor() } else { bound })
}

fn validate(base: f64, buffer_pct: f64) -> Result<()> {
    if !base.is_finite() || base < 0.0 {
        return Err(HarnessError::config(format!(
            "threshold base must be a non-negative number, got {base}"
        )));
    }
    if !buffer_pct.is_finite() || !(0.0..=100.0).contains(&buffer_pct) {
        return Err(HarnessError::config(format!(
            "buffer percentage must be within [0, 100], got {buffer_pct}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_at_zero_buffer() {
        assert_eq!(effective_threshold(250.0, 0.0, false).unwrap(), 250.0);
        assert_eq!(effective_min_threshold(60.0, 0.0, false).unwrap(), 60.0);
    }

    #[test]
    fn test_max_style_adds_buffer() {
        assert_eq!(effective_threshold(16.0, 25.0, false).unwrap(), 20.0);
    }

    #[test]
    fn test_min_style_subtracts_buffer() {
        // The fps gate from the docs: 30 fps with a 20% buffer -> 24.
        assert_eq!(effective_min_threshold(30.0, 20.0, false).unwrap(), 24.0);
    }

    #[test]
    fn test_rounding_is_outward() {
        // Max-style rounds up, min-style rounds down.
        assert_eq!(effective_threshold(10.0, 15.0, true).unwrap(), 12.0);
        assert_eq!(effective_min_threshold(10.0, 15.0, true).unwrap(), 8.0);
    }

    #[test]
    fn test_negative_base_rejected() {
        assert!(matches!(
            effective_threshold(-1.0, 20.0, false),
            Err(HarnessError::Config(_))
        ));
        assert!(matches!(
            effective_min_threshold(-10.0, 20.0, false),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_buffer_rejected() {
        assert!(matches!(
            effective_threshold(100.0, -5.0, false),
            Err(HarnessError::Config(_))
        ));
        assert!(matches!(
            effective_threshold(100.0, 150.0, false),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_non_finite_inputs_rejected() {
        assert!(effective_threshold(f64::NAN, 10.0, false).is_err());
        assert!(effective_threshold(f64::INFINITY, 10.0, false).is_err());
        assert!(effective_min_threshold(10.0, f64::NAN, false).is_err());
    }

    proptest! {
        #[test]
        fn prop_max_bound_never_below_base(base in 0.0f64..1e9, pct in 0.0f64..=100.0) {
            let bound = effective_threshold(base, pct, false).unwrap();
            prop_assert!(bound >= base);
        }

        #[test]
        fn prop_min_bound_never_above_base(base in 0.0f64..1e9, pct in 0.0f64..=100.0) {
            let bound = effective_min_threshold(base, pct, false).unwrap();
            prop_assert!(bound <= base);
            prop_assert!(bound >= 0.0);
        }

        #[test]
        fn prop_rounded_bounds_are_whole_and_outward(base in 0.0f64..1e6, pct in 0.0f64..=100.0) {
            let up = effective_threshold(base, pct, true).unwrap();
            let down = effective_min_threshold(base, pct, true).unwrap();
            prop_assert_eq!(up, up.trunc());
            prop_assert_eq!(down, down.trunc());
            prop_assert!(up >= effective_threshold(base, pct, false).unwrap());
            prop_assert!(down <= effective_min_threshold(base, pct, false).unwrap());
        }
    }
}
