//! NaN-aware statistics over time-of-flight results.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of a set of computed time-of-flight values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofStatistics {
    /// Number of values.
    pub total: usize,
    /// Number of NaN values (masked or out of range).
    pub nan_count: usize,
    /// Smallest finite value.
    pub min: Option<f64>,
    /// Largest finite value.
    pub max: Option<f64>,
}

impl TofStatistics {
    /// Collects statistics over `values`.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        let mut stats = Self {
            total: values.len(),
            ..Self::default()
        };
        for &v in values {
            if v.is_nan() {
                stats.nan_count += 1;
            } else if v.is_finite() {
                stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
                stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
            }
        }
        stats
    }

    /// Fraction of NaN values, 0 for an empty set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn nan_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.nan_count as f64 / self.total as f64
        }
    }

    /// Number of usable values.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.total - self.nan_count
    }
}

/// Percentile `q` (0..=100) of the non-NaN values, linear interpolation between ranks.
///
/// Returns `None` if every value is NaN.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn nan_percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Median of the non-NaN values.
#[must_use]
pub fn nan_median(values: &[f64]) -> Option<f64> {
    nan_percentile(values, 50.0)
}

/// Smallest and largest non-NaN values.
#[must_use]
pub fn nan_min_max(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_statistics() {
        let stats = TofStatistics::from_values(&[1.0, f64::NAN, 3.0, f64::NAN]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.nan_count, 2);
        assert_eq!(stats.valid_count(), 2);
        assert_relative_eq!(stats.nan_fraction(), 0.5);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(3.0));
        assert_relative_eq!(TofStatistics::default().nan_fraction(), 0.0);
    }

    #[test]
    fn test_percentiles_ignore_nan() {
        let values = [4.0, f64::NAN, 1.0, 3.0, 2.0];
        assert_relative_eq!(nan_median(&values).unwrap(), 2.5);
        assert_relative_eq!(nan_percentile(&values, 100.0).unwrap(), 4.0);
        assert_relative_eq!(nan_percentile(&values, 0.0).unwrap(), 1.0);
        assert!(nan_median(&[f64::NAN]).is_none());
        assert_eq!(nan_min_max(&values), Some((1.0, 4.0)));
    }
}
