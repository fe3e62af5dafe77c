//! Two-proportion z-test for binary metrics
//!
//! Pooled standard error under the null of equal proportions; effect
//! size reported as relative lift; confidence interval on the rate
//! difference via the normal approximation with unpooled standard error.

use super::dist;
use super::TestSummary;
use crate::aggregator::VariantStatistics;
use crate::error::{Error, Result};

/// Run a pooled two-proportion z-test of `treatment` against `control`.
///
/// Success counts come from the statistics' nonzero-observation tally,
/// so 0/1-encoded metrics feed the test directly.
///
/// # Errors
///
/// Returns [`Error::StatisticalComputation`] when the test is undefined:
/// an empty arm, or a zero control rate with a nonzero treatment rate
/// (relative lift has no finite value). Equal rates with zero pooled
/// standard error yield `p = 1.0`, not an error.
pub fn two_proportion_z_test(
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

    if control.sample_count() == 0 || treatment.sample_count() == 0 {
        return Err(undefined("empty arm in proportion test".to_string()));
    }

    #[allow(clippy::cast_precision_loss)]
    let (n1, n2) = (
        control.sample_count() as f64,
        treatment.sample_count() as f64,
    );
    let (p1, p2) = (control.success_rate(), treatment.success_rate());
    let difference = p2 - p1;

    #[allow(clippy::cast_precision_loss)]
    let pooled = (control.success_count() + treatment.success_count()) as f64 / (n1 + n2);
    let pooled_se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    // Pooled SE of zero means every observation agreed (all successes
    // or all failures), so the rates are necessarily equal.
    if pooled_se == 0.0 {
        return Ok(TestSummary {
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
            effect_size: 0.0,
            confidence_interval: (0.0, 0.0),
        });
    }

    if p1 == 0.0 {
        return Err(undefined(
            "control success rate is zero; relative lift is undefined".to_string(),
        ));
    }

    let statistic = difference / pooled_se;
    let p_value = 2.0 * (1.0 - dist::normal_cdf(statistic.abs()));

    // Relative lift doubles as the effect size for proportion metrics.
    let effect_size = difference / p1;

    let unpooled_se = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();
    let critical = dist::normal_quantile(1.0 - alpha / 2.0);
    let confidence_interval = (
        difference - critical * unpooled_se,
        difference + critical * unpooled_se,
    );

    Ok(TestSummary {
        statistic,
        degrees_of_freedom: None,
        p_value: p_value.clamp(0.0, 1.0),
        effect_size,
        confidence_interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(count: u64, successes: u64) -> VariantStatistics {
        #[allow(clippy::cast_precision_loss)]
        let rate = successes as f64 / count as f64;
        #[allow(clippy::cast_precision_loss)]
        let m2 = rate * (1.0 - rate) * count as f64;
        VariantStatistics::from_parts(count, rate, m2, successes)
    }

    #[test]
    fn test_clear_lift_is_significant() {
        // 15.2% vs 17.8% on 5000 per arm: z over 3, comfortably significant.
        let control = stats(5000, 760);
        let treatment = stats(5000, 890);
        let summary =
            two_proportion_z_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(summary.p_value < 0.001);
        assert!((summary.effect_size - 0.171).abs() < 0.001);
        assert!(summary.confidence_interval.0 > 0.0);
    }

    #[test]
    fn test_equal_rates_not_significant() {
        let control = stats(2000, 300);
        let treatment = stats(2000, 300);
        let summary =
            two_proportion_z_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(summary.p_value > 0.99);
        assert!(summary.effect_size.abs() < 1e-12);
    }

    #[test]
    fn test_small_difference_small_sample_not_significant() {
        let control = stats(400, 60);
        let treatment = stats(400, 66);
        let summary =
            two_proportion_z_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!(summary.p_value > 0.05);
        // CI straddles zero
        assert!(summary.confidence_interval.0 < 0.0);
        assert!(summary.confidence_interval.1 > 0.0);
    }

    #[test]
    fn test_all_failures_both_arms() {
        let control = stats(100, 0);
        let treatment = stats(100, 0);
        let summary =
            two_proportion_z_test("control", "treatment", &control, &treatment, 0.05).unwrap();
        assert!((summary.p_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_control_rate_with_lift_is_error() {
        let control = stats(100, 0);
        let treatment = stats(100, 10);
        let err = two_proportion_z_test("control", "treatment", &control, &treatment, 0.05)
            .unwrap_err();
        assert!(matches!(err, Error::StatisticalComputation { .. }));
    }

    #[test]
    fn test_empty_arm_is_error() {
        let control = stats(100, 10);
        let empty = VariantStatistics::new();
        let err =
            two_proportion_z_test("control", "treatment", &control, &empty, 0.05).unwrap_err();
        assert!(matches!(err, Error::StatisticalComputation { .. }));
    }

    #[test]
    fn test_statistic_sign_follows_direction() {
        let control = stats(1000, 200);
        let worse = stats(1000, 150);
        let summary =
            two_proportion_z_test("control", "treatment", &control, &worse, 0.05).unwrap();
        assert!(summary.statistic < 0.0);
        assert!(summary.effect_size < 0.0);
    }
}
