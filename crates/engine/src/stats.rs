//! Numeric primitives shared by the reducer: percentiles, moments, drawdown

use crate::types::PercentileSet;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between order statistics
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    let sorted = sorted_copy(values);
    percentile_sorted(&sorted, pct)
}

/// Same as [`percentile`] for input that is already sorted ascending.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                return sorted[lo];
            }
            let frac = rank - lo as f64;
            let value = sorted[lo] + (sorted[hi] - sorted[lo]) * frac;
            // keep rounding from stepping outside the bracketing order statistics
            value.max(sorted[lo]).min(sorted[hi])
        }
    }
}

pub fn percentile_set(values: &[f64]) -> PercentileSet {
    let sorted = sorted_copy(values);
    percentile_set_sorted(&sorted)
}

pub fn percentile_set_sorted(sorted: &[f64]) -> PercentileSet {
    PercentileSet {
        p10: percentile_sorted(sorted, 10.0),
        p25: percentile_sorted(sorted, 25.0),
        p50: percentile_sorted(sorted, 50.0),
        p75: percentile_sorted(sorted, 75.0),
        p90: percentile_sorted(sorted, 90.0),
    }
}

pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Maximum of `(running_max - value) / running_max * 100` over the series
pub fn max_drawdown_pct(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Maximum of `running_max - value` over the series
pub fn max_drawdown_abs(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &value in values {
        if value > peak {
            peak = value;
        }
        let dd = peak - value;
        if dd > max_dd {
            max_dd = dd;
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        // rank = 0.1 * 4 = 0.4 -> 1.4
        assert!((percentile(&values, 10.0) - 1.4).abs() < 1e-12);
        // rank = 0.9 * 4 = 3.6 -> 4.6
        assert!((percentile(&values, 90.0) - 4.6).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        let values = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(percentile(&values, 25.0), 2.0);
        assert_eq!(median(&values), 3.0);
    }

    #[test]
    fn test_percentile_edge_sizes() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.5], 90.0), 7.5);
    }

    #[test]
    fn test_percentile_set_is_ordered() {
        let values: Vec<f64> = (0..97).map(|i| ((i * 37) % 97) as f64 * 0.731).collect();
        let set = percentile_set(&values);
        assert!(set.p10 <= set.p25);
        assert!(set.p25 <= set.p50);
        assert!(set.p50 <= set.p75);
        assert!(set.p75 <= set.p90);
    }

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(std_dev(&values), 2.0);
        assert_eq!(std_dev(&[3.0, 3.0, 3.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_drawdown_pct_and_abs() {
        let curve = [100.0, 120.0, 90.0, 130.0, 117.0];
        // peak 120 -> 90 is 25%, peak 130 -> 117 is 10%
        assert!((max_drawdown_pct(&curve) - 25.0).abs() < 1e-12);
        assert_eq!(max_drawdown_abs(&curve), 30.0);
    }

    #[test]
    fn test_drawdown_to_zero_is_full() {
        let curve = [1000.0, 0.0, 0.0];
        assert_eq!(max_drawdown_pct(&curve), 100.0);
        assert_eq!(max_drawdown_abs(&curve), 1000.0);
    }

    #[test]
    fn test_drawdown_monotone_growth_is_zero() {
        let curve = [1000.0, 1200.0, 1440.0];
        assert_eq!(max_drawdown_pct(&curve), 0.0);
    }
}
