//! Per-variant sufficient statistics
//!
//! Welford's online algorithm keeps the running mean and sum of squared
//! deviations numerically stable over arbitrarily long streams, and the
//! Chan et al. pairwise merge makes the fold associative: ingesting a
//! set of observations in any order, or in parallel shards merged at the
//! end, yields the same statistics up to floating tolerance.

use serde::{Deserialize, Serialize};

/// Sufficient statistics for one variant of one experiment.
///
/// Holds exactly what the significance tests need (count, mean,
/// variance via `m2`, success count) so raw observations never have
/// to be retained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantStatistics {
    sample_count: u64,
    mean: f64,
    /// Running sum of squared deviations from the mean (Welford's M2).
    m2: f64,
    /// Observations with a nonzero value; the numerator for proportion
    /// metrics encoded as 0/1.
    success_count: u64,
}

impl VariantStatistics {
    /// Create empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct statistics from stored components.
    ///
    /// Intended for hydrating from a repository snapshot; `m2` is the
    /// sum of squared deviations, i.e. `variance * (n - 1)`.
    #[must_use]
    pub const fn from_parts(sample_count: u64, mean: f64, m2: f64, success_count: u64) -> Self {
        Self {
            sample_count,
            mean,
            m2,
            success_count,
        }
    }

    /// Fold one observation value into the statistics (Welford update).
    pub fn record(&mut self, value: f64) {
        self.sample_count += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.sample_count as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        if value != 0.0 {
            self.success_count += 1;
        }
    }

    /// Combine two statistics computed over disjoint observation sets
    /// (Chan et al. parallel variance).
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.sample_count == 0 {
            return *other;
        }
        if other.sample_count == 0 {
            return *self;
        }
        let n_a = u64_to_f64(self.sample_count);
        let n_b = u64_to_f64(other.sample_count);
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        Self {
            sample_count: self.sample_count + other.sample_count,
            mean: self.mean + delta * n_b / n,
            m2: self.m2 + other.m2 + delta * delta * n_a * n_b / n,
            success_count: self.success_count + other.success_count,
        }
    }

    /// Number of observations folded in.
    #[must_use]
    pub const fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Running mean; 0.0 when empty.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Running sum of squared deviations from the mean.
    #[must_use]
    pub const fn sum_squared_deviations(&self) -> f64 {
        self.m2
    }

    /// Sample variance (`m2 / (n - 1)`); 0.0 with fewer than two
    /// observations.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.sample_count < 2 {
            0.0
        } else {
            self.m2 / (u64_to_f64(self.sample_count) - 1.0)
        }
    }

    /// Sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Count of nonzero observations.
    #[must_use]
    pub const fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Success fraction for proportion metrics; 0.0 when empty.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            u64_to_f64(self.success_count) / u64_to_f64(self.sample_count)
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn u64_to_f64(n: u64) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_empty_statistics() {
        let stats = VariantStatistics::new();
        assert_eq!(stats.sample_count(), 0);
        assert!(stats.mean().abs() < TOLERANCE);
        assert!(stats.variance().abs() < TOLERANCE);
        assert!(stats.success_rate().abs() < TOLERANCE);
    }

    #[test]
    fn test_welford_matches_two_pass() {
        let values = [3.1, -0.4, 2.2, 8.9, 0.0, 5.5, -2.3, 4.4];
        let mut stats = VariantStatistics::new();
        for v in values {
            stats.record(v);
        }

        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

        assert!((stats.mean() - mean).abs() < TOLERANCE);
        assert!((stats.variance() - variance).abs() < TOLERANCE);
    }

    #[test]
    fn test_order_independence() {
        let forward = [0.1, 0.9, 0.4, 0.7, 0.2, 0.6];
        let mut a = VariantStatistics::new();
        let mut b = VariantStatistics::new();
        for v in forward {
            a.record(v);
        }
        for v in forward.iter().rev() {
            b.record(*v);
        }
        assert!((a.mean() - b.mean()).abs() < TOLERANCE);
        assert!((a.variance() - b.variance()).abs() < TOLERANCE);
        assert_eq!(a.sample_count(), b.sample_count());
    }

    #[test]
    fn test_merge_matches_sequential() {
        let values = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0, -5.0];
        let mut sequential = VariantStatistics::new();
        for v in values {
            sequential.record(v);
        }

        let mut left = VariantStatistics::new();
        let mut right = VariantStatistics::new();
        for v in &values[..3] {
            left.record(*v);
        }
        for v in &values[3..] {
            right.record(*v);
        }
        let merged = left.merge(&right);

        assert_eq!(merged.sample_count(), sequential.sample_count());
        assert!((merged.mean() - sequential.mean()).abs() < TOLERANCE);
        assert!((merged.variance() - sequential.variance()).abs() < TOLERANCE);
        assert_eq!(merged.success_count(), sequential.success_count());
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let mut stats = VariantStatistics::new();
        stats.record(1.5);
        stats.record(2.5);
        let empty = VariantStatistics::new();
        assert_eq!(stats.merge(&empty), stats);
        assert_eq!(empty.merge(&stats), stats);
    }

    #[test]
    fn test_success_counting_binary_metric() {
        let mut stats = VariantStatistics::new();
        for v in [1.0, 0.0, 1.0, 1.0, 0.0] {
            stats.record(v);
        }
        assert_eq!(stats.success_count(), 3);
        assert!((stats.success_rate() - 0.6).abs() < TOLERANCE);
        assert!((stats.mean() - 0.6).abs() < TOLERANCE);
    }

    #[test]
    fn test_zero_variance_stream() {
        let mut stats = VariantStatistics::new();
        for _ in 0..100 {
            stats.record(4.2);
        }
        assert!(stats.variance().abs() < TOLERANCE);
        assert!((stats.mean() - 4.2).abs() < TOLERANCE);
    }
}
