//! Statistical analysis over aggregated statistics
//!
//! `analyze` turns an experiment's per-variant sufficient statistics
//! into an immutable [`ExperimentResult`]: one comparison of each
//! treatment against the control, with significance test, effect size
//! and confidence interval chosen by the metric family.
//!
//! ## Sequential-testing guard
//!
//! The analyzer assumes a fixed-horizon design. Calling `analyze`
//! repeatedly and stopping at the first significant result inflates the
//! false-positive rate; that discipline is the caller's obligation. Each
//! result carries `computed_at` so repeated looks stay auditable.

mod dist;
pub mod proportion;
pub mod welch;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::VariantStatistics;
use crate::error::{Error, Result};
use crate::experiment::{Experiment, ExperimentStatus, MetricKind};

/// Raw output of one significance test, shared by both test families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestSummary {
    /// Test statistic (t or z).
    pub statistic: f64,
    /// Welch–Satterthwaite degrees of freedom; `None` for the z-test.
    pub degrees_of_freedom: Option<f64>,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Cohen's d (continuous) or relative lift (proportion).
    pub effect_size: f64,
    /// Confidence interval on the mean/rate difference at `1 - alpha`.
    pub confidence_interval: (f64, f64),
}

/// One treatment-versus-control comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Control arm name.
    pub control: String,
    /// Treatment arm name.
    pub treatment: String,
    /// Control mean (success rate for proportion metrics).
    pub control_mean: f64,
    /// Treatment mean.
    pub treatment_mean: f64,
    /// Treatment mean minus control mean.
    pub mean_difference: f64,
    /// `(treatment - control) / control`; `None` when the control mean
    /// is zero.
    pub relative_lift: Option<f64>,
    /// Test statistic (t or z).
    pub test_statistic: f64,
    /// Degrees of freedom for the t-test; `None` for the z-test.
    pub degrees_of_freedom: Option<f64>,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Statistical significance only: `p < alpha` with the sample-size
    /// precondition already met. Practical significance is a separate
    /// judgment; read `relative_lift` for that.
    pub is_significant: bool,
    /// Cohen's d or relative lift, by metric family.
    pub effect_size: f64,
    /// Confidence interval on the difference at `1 - alpha`.
    pub confidence_interval: (f64, f64),
}

/// Immutable analysis result.
///
/// A new computation produces a new result; nothing mutates a prior one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    experiment_id: String,
    computed_at: DateTime<Utc>,
    significance_level: f64,
    statistics: BTreeMap<String, VariantStatistics>,
    comparisons: Vec<VariantComparison>,
}

impl ExperimentResult {
    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the computation timestamp (the audit trail for repeated
    /// looks).
    #[must_use]
    pub const fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Get the significance level the comparisons were tested at.
    #[must_use]
    pub const fn significance_level(&self) -> f64 {
        self.significance_level
    }

    /// Get the per-variant statistics snapshot the result was computed
    /// from, keyed by variant name.
    #[must_use]
    pub const fn statistics(&self) -> &BTreeMap<String, VariantStatistics> {
        &self.statistics
    }

    /// Get the treatment-versus-control comparisons in treatment name
    /// order.
    #[must_use]
    pub fn comparisons(&self) -> &[VariantComparison] {
        &self.comparisons
    }

    /// Compact reporting rows for a dashboard layer: one line per
    /// comparison, values rounded to four decimals, improvement as a
    /// percentage.
    #[must_use]
    pub fn summary(&self) -> Vec<ComparisonSummary> {
        self.comparisons
            .iter()
            .map(|c| ComparisonSummary {
                treatment: c.treatment.clone(),
                control_mean: round4(c.control_mean),
                treatment_mean: round4(c.treatment_mean),
                improvement_percentage: c.relative_lift.map(|lift| round2(lift * 100.0)),
                p_value: round4(c.p_value),
                is_significant: c.is_significant,
                effect_size: round4(c.effect_size),
                confidence_interval: (
                    round4(c.confidence_interval.0),
                    round4(c.confidence_interval.1),
                ),
                sample_sizes: (
                    self.statistics
                        .get(&c.control)
                        .map_or(0, VariantStatistics::sample_count),
                    self.statistics
                        .get(&c.treatment)
                        .map_or(0, VariantStatistics::sample_count),
                ),
            })
            .collect()
    }
}

/// One rounded reporting row from [`ExperimentResult::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// Treatment arm name.
    pub treatment: String,
    /// Control mean, rounded.
    pub control_mean: f64,
    /// Treatment mean, rounded.
    pub treatment_mean: f64,
    /// Relative lift as a percentage; `None` when undefined.
    pub improvement_percentage: Option<f64>,
    /// Two-sided p-value, rounded.
    pub p_value: f64,
    /// Whether the comparison met significance.
    pub is_significant: bool,
    /// Effect size, rounded.
    pub effect_size: f64,
    /// Confidence interval, rounded.
    pub confidence_interval: (f64, f64),
    /// `(control, treatment)` sample counts.
    pub sample_sizes: (u64, u64),
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Analyze an experiment from its aggregated statistics.
///
/// Pure function of its inputs: safe to call concurrently, no shared
/// state, no I/O.
///
/// # Errors
///
/// - [`Error::Validation`] when the experiment is still in Draft.
/// - [`Error::InsufficientData`] when any arm (control included) has
///   fewer than `minimum_sample_size` observations, naming each
///   under-sampled arm and its count. Recoverable by collecting more
///   data, not by recomputation.
/// - [`Error::StatisticalComputation`] for degenerate test input.
pub fn analyze(
    experiment: &Experiment,
    statistics: &HashMap<String, VariantStatistics>,
) -> Result<ExperimentResult> {
    if experiment.status() == ExperimentStatus::Draft {
        return Err(Error::validation(
            "status",
            "draft experiment has no data to analyze; start it first",
        ));
    }

    let minimum = experiment.minimum_sample_size();
    let mut undersampled: Vec<(String, u64)> = experiment
        .variants()
        .iter()
        .filter(|variant| variant.allocation() > 0.0)
        .filter_map(|variant| {
            let count = statistics
                .get(variant.name())
                .map_or(0, VariantStatistics::sample_count);
            (count < minimum).then(|| (variant.name().to_string(), count))
        })
        .collect();
    if !undersampled.is_empty() {
        undersampled.sort();
        return Err(Error::InsufficientData {
            experiment_id: experiment.id().to_string(),
            undersampled,
            minimum_sample_size: minimum,
        });
    }

    let control = experiment.control();
    let control_stats = statistics
        .get(control.name())
        .copied()
        .unwrap_or_default();
    let alpha = experiment.significance_level();

    let mut comparisons = Vec::new();
    for treatment in experiment.treatments() {
        // Zero-allocation arms receive no traffic; nothing to compare.
        if treatment.allocation() == 0.0 {
            continue;
        }
        let treatment_stats = statistics
            .get(treatment.name())
            .copied()
            .unwrap_or_default();

        let summary = match experiment.metric_kind() {
            MetricKind::Continuous => welch::welch_t_test(
                control.name(),
                treatment.name(),
                &control_stats,
                &treatment_stats,
                alpha,
            )?,
            MetricKind::Proportion => proportion::two_proportion_z_test(
                control.name(),
                treatment.name(),
                &control_stats,
                &treatment_stats,
                alpha,
            )?,
        };

        let control_mean = match experiment.metric_kind() {
            MetricKind::Continuous => control_stats.mean(),
            MetricKind::Proportion => control_stats.success_rate(),
        };
        let treatment_mean = match experiment.metric_kind() {
            MetricKind::Continuous => treatment_stats.mean(),
            MetricKind::Proportion => treatment_stats.success_rate(),
        };
        let mean_difference = treatment_mean - control_mean;
        let relative_lift = if control_mean == 0.0 {
            None
        } else {
            Some(mean_difference / control_mean)
        };

        comparisons.push(VariantComparison {
            control: control.name().to_string(),
            treatment: treatment.name().to_string(),
            control_mean,
            treatment_mean,
            mean_difference,
            relative_lift,
            test_statistic: summary.statistic,
            degrees_of_freedom: summary.degrees_of_freedom,
            p_value: summary.p_value,
            is_significant: summary.p_value < alpha,
            effect_size: summary.effect_size,
            confidence_interval: summary.confidence_interval,
        });
    }

    let result = ExperimentResult {
        experiment_id: experiment.id().to_string(),
        computed_at: Utc::now(),
        significance_level: alpha,
        statistics: statistics
            .iter()
            .map(|(name, stats)| (name.clone(), *stats))
            .collect(),
        comparisons,
    };

    info!(
        experiment_id = experiment.id(),
        comparisons = result.comparisons().len(),
        significant = result.comparisons().iter().filter(|c| c.is_significant).count(),
        "analysis complete"
    );
    Ok(result)
}
