//! Welch's two-sample t-test for continuous metrics
//!
//! Unequal variances assumed; degrees of freedom via Welch–Satterthwaite.
//! Effect size is Cohen's d over the pooled standard deviation, and the
//! confidence interval on the mean difference comes from the
//! t-distribution at `1 - alpha`.

use super::dist;
use super::TestSummary;
use crate::aggregator::VariantStatistics;
use crate::error::{Error, Result};

/// Run Welch's t-test of `treatment` against `control`.
///
/// # Errors
///
/// Returns [`Error::StatisticalComputation`] when the test is undefined:
/// fewer than two observations in an arm, or zero variance in both arms
/// with differing means. Zero variance in both arms with identical means
/// is not an error; it yields `p = 1.0` (no detectable effect).
pub fn welch_t_test(
    control_name: &str,
    treatment_name: &str,
    control: &VariantStatistics,
    treatment: &VariantStatistics,
    alpha: f64,
) -> Result<TestSummary> {
    let undefined = |message: String| Error::StatisticalComputation {
        control: control_name.to_string(),
        treatment: treatment_name.to_string(),
        message,
    };

    if control.sample_count() < 2 || treatment.sample_count() < 2 {
        return Err(undefined(
            "Welch's t-test needs at least two observations per arm".to_string(),
        ));
    }

    #[allow(clippy::cast_precision_loss)]
    let (n1, n2) = (
        control.sample_count() as f64,
        treatment.sample_count() as f64,
    );
    let (v1, v2) = (control.variance(), treatment.variance());
    let difference = treatment.mean() - control.mean();

    if v1 == 0.0 && v2 == 0.0 {
        if difference == 0.0 {
            return Ok(TestSummary {
                statistic: 0.0,
                degrees_of_freedom: Some(n1 + n2 - 2.0),
                p_value: 1.0,
                effect_size: 0.0,
                confidence_interval: (0.0, 0.0),
            });
        }
        return Err(undefined(format!(
            "zero variance in both arms with differing means ({} vs {})",
            control.mean(),
            treatment.mean()
        )));
    }

    let standard_error = (v1 / n1 + v2 / n2).sqrt();
    let statistic = difference / standard_error;

    // Welch–Satterthwaite degrees of freedom
    let numerator = (v1 / n1 + v2 / n2).powi(2);
    let denominator = (v1 / n1).powi(2) / (n1 - 1.0) + (v2 / n2).powi(2) / (n2 - 1.0);
    let df = numerator / denominator;

    let p_value = 2.0 * (1.0 - dist::student_t_cdf(statistic.abs(), df));

    // Cohen's d over the pooled standard deviation
    let pooled_variance =
        ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / (n1 + n2 - 2.0);
    let effect_size = difference / pooled_variance.sqrt();

    let critical = dist::student_t_quantile(1.0 - alpha / 2.0, df);
    let confidence_interval = (
        difference - critical * standard_error,
        difference + critical * standard_error,
    );

    Ok(TestSummary {
        statistic,
        degrees_of_freedom: Some(df),
        p_value: p_value.clamp(0.0, 1.0),
        effect_size,
        confidence_interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(count: u64, mean: f64, std_dev: f64) -> VariantStatistics {
        #[allow(clippy::cast_precision_loss)]
        let m2 = std_dev * std_dev * (count as f64 - 1.0);
        VariantStatistics::from_parts(count, mean, m2, 0)
    }

    #[test]
    fn test_clear_difference_is_significant() {
        let control = stats(5000, 0.15, 0.05);
        let treatment = stats(5000, 0.18, 0.05);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(summary.p_value < 0.001);
        assert!(summary.statistic > 0.0);
        assert!(summary.confidence_interval.0 > 0.0);
    }

    #[test]
    fn test_identical_arms_not_significant() {
        let control = stats(1000, 0.5, 0.1);
        let treatment = stats(1000, 0.5, 0.1);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(summary.p_value > 0.99);
        assert!(summary.statistic.abs() < 1e-9);
        assert!(summary.effect_size.abs() < 1e-9);
    }

    #[test]
    fn test_known_value_reproduction() {
        // Spread chosen so the 0.026 lift sits just inside significance.
        let control = stats(5000, 0.152, 0.5725);
        let treatment = stats(5000, 0.178, 0.5725);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(
            (summary.p_value - 0.023).abs() < 0.002,
            "p_value {}",
            summary.p_value
        );
        assert!(summary.p_value < 0.05);
        // CI excludes zero at this alpha
        assert!(summary.confidence_interval.0 > 0.0);
    }

    #[test]
    fn test_welch_satterthwaite_unequal_variances() {
        // Highly unequal variances pull df well below n1 + n2 - 2.
        let control = stats(50, 10.0, 1.0);
        let treatment = stats(50, 10.5, 5.0);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        let df = summary.degrees_of_freedom.unwrap();
        assert!(df < 98.0);
        assert!(df > 40.0);
    }

    #[test]
    fn test_zero_variance_identical_means() {
        let control = stats(100, 3.0, 0.0);
        let treatment = stats(100, 3.0, 0.0);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!((summary.p_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_variance_differing_means_is_error() {
        let control = stats(100, 3.0, 0.0);
        let treatment = stats(100, 4.0, 0.0);
        let err = welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap_err();
        assert!(matches!(err, Error::StatisticalComputation { .. }));
    }

    #[test]
    fn test_single_observation_arm_is_error() {
        let control = stats(1, 3.0, 0.0);
        let treatment = stats(100, 4.0, 1.0);
        let err = welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap_err();
        assert!(matches!(err, Error::StatisticalComputation { .. }));
    }

    #[test]
    fn test_cohens_d_magnitude() {
        // One pooled-sd difference in means is d = 1 by construction.
        let control = stats(200, 0.0, 1.0);
        let treatment = stats(200, 1.0, 1.0);
        let summary =
            welch_t_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!((summary.effect_size - 1.0).abs() < 1e-9);
    }
}
