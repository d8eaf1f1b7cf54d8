//! Quantile estimation over sorted samples.

use crate::types::QuantileMethod;

/// Quantile `q` (clamped to `[0, 1]`) of an ascending slice.
///
/// Returns `None` for an empty slice. NaN samples must be filtered out by the
/// caller.
pub fn quantile_sorted(sorted: &[f64], q: f64, method: QuantileMethod) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };

    let h = last as f64 * q;
    let lo = (h.floor() as usize).min(last);
    let hi = (h.ceil() as usize).min(last);
    let frac = h - lo as f64;

    let value = match method {
        QuantileMethod::Linear => sorted[lo] + frac * (sorted[hi] - sorted[lo]),
        QuantileMethod::Lower => sorted[lo],
        QuantileMethod::Higher => sorted[hi],
        QuantileMethod::Nearest => {
            let rank = if frac > 0.5 || (frac == 0.5 && lo % 2 == 1) {
                hi
            } else {
                lo
            };
            sorted[rank]
        }
        QuantileMethod::Midpoint => (sorted[lo] + sorted[hi]) / 2.0,
    };

    Some(value)
}

/// Quantile of unsorted samples; NaN samples are ignored.
pub fn quantile(samples: &[f64], q: f64, method: QuantileMethod) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q, method)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f64; 5] = [0.1, 0.2, 0.4, 0.7, 0.9];

    #[test]
    fn test_linear_matches_percentile_definition() {
        // h = 4 * 0.3 = 1.2 -> 0.2 + 0.2 * (0.4 - 0.2)
        let v = quantile_sorted(&SAMPLES, 0.3, QuantileMethod::Linear).unwrap();
        assert!((v - 0.24).abs() < 1e-12);

        assert_eq!(quantile_sorted(&SAMPLES, 0.0, QuantileMethod::Linear), Some(0.1));
        assert_eq!(quantile_sorted(&SAMPLES, 1.0, QuantileMethod::Linear), Some(0.9));
    }

    #[test]
    fn test_discrete_methods() {
        assert_eq!(quantile_sorted(&SAMPLES, 0.3, QuantileMethod::Lower), Some(0.2));
        assert_eq!(quantile_sorted(&SAMPLES, 0.3, QuantileMethod::Higher), Some(0.4));
        assert_eq!(quantile_sorted(&SAMPLES, 0.3, QuantileMethod::Nearest), Some(0.2));
        assert_eq!(quantile_sorted(&SAMPLES, 0.7, QuantileMethod::Nearest), Some(0.7));

        let mid = quantile_sorted(&SAMPLES, 0.3, QuantileMethod::Midpoint).unwrap();
        assert!((mid - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_ties_to_even_rank() {
        let sorted = [0.0, 1.0, 2.0];
        // h = 2 * 0.25 = 0.5 -> ranks 0 and 1, even rank 0 wins
        assert_eq!(quantile_sorted(&sorted, 0.25, QuantileMethod::Nearest), Some(0.0));
        // h = 2 * 0.75 = 1.5 -> ranks 1 and 2, even rank 2 wins
        assert_eq!(quantile_sorted(&sorted, 0.75, QuantileMethod::Nearest), Some(2.0));
    }

    #[test]
    fn test_out_of_range_q_is_clamped() {
        assert_eq!(quantile_sorted(&SAMPLES, -0.5, QuantileMethod::Linear), Some(0.1));
        assert_eq!(quantile_sorted(&SAMPLES, 1.5, QuantileMethod::Linear), Some(0.9));
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(quantile_sorted(&[], 0.5, QuantileMethod::Linear), None);
        assert_eq!(quantile_sorted(&[0.3], 0.5, QuantileMethod::Linear), Some(0.3));
    }

    #[test]
    fn test_unsorted_ignores_nan() {
        let samples = [0.9, f64::NAN, 0.1, 0.5];
        assert_eq!(quantile(&samples, 0.5, QuantileMethod::Linear), Some(0.5));
    }
}
