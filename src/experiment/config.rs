//! Experiment configuration: variants, allocations, target metric

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExperimentStatus;
use crate::error::{Error, Result};

/// Tolerance for allocation fractions summing to 1.0.
pub const ALLOCATION_TOLERANCE: f64 = 1e-6;

/// Metric family the target metric belongs to.
///
/// A closed tag rather than trait dispatch: the analyzer branches on it
/// to pick between Welch's t-test and the two-proportion z-test, keeping
/// both test implementations independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Real-valued metric (dwell time, scroll depth, ...).
    Continuous,
    /// Binary metric encoded as 0/1 (click-through, conversion, ...).
    Proportion,
}

/// A named arm of an experiment: the control or one treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    name: String,
    allocation: f64,
    is_control: bool,
    config: Option<serde_json::Value>,
}

impl Variant {
    /// Create the control arm with the given traffic allocation.
    #[must_use]
    pub fn control(name: impl Into<String>, allocation: f64) -> Self {
        Self {
            name: name.into(),
            allocation,
            is_control: true,
            config: None,
        }
    }

    /// Create a treatment arm with the given traffic allocation.
    #[must_use]
    pub fn treatment(name: impl Into<String>, allocation: f64) -> Self {
        Self {
            name: name.into(),
            allocation,
            is_control: false,
            config: None,
        }
    }

    /// Attach an arbitrary rendering payload to this arm (headline
    /// style, layout, model parameters, ...). Opaque to the engine.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Get the variant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the traffic allocation fraction in [0, 1].
    #[must_use]
    pub const fn allocation(&self) -> f64 {
        self.allocation
    }

    /// Whether this arm is the designated control.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.is_control
    }

    /// Get the rendering payload, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }
}

/// A fully configured experiment.
///
/// Construct through [`Experiment::builder`]; `build` validates the
/// configuration and rejects anything malformed before it can exist.
/// Variants are held sorted by name so that allocation boundaries are
/// deterministic regardless of declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    id: String,
    name: String,
    status: ExperimentStatus,
    variants: Vec<Variant>,
    target_metric: String,
    metric_kind: MetricKind,
    minimum_sample_size: u64,
    significance_level: f64,
    created_at: DateTime<Utc>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

impl Experiment {
    /// Create a builder for the experiment with the given ID and name.
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the variants, sorted by name.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Look up a variant by name.
    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name() == name)
    }

    /// Get the control arm.
    ///
    /// # Panics
    ///
    /// Never panics on a validated experiment; exactly one control is a
    /// construction invariant.
    #[must_use]
    pub fn control(&self) -> &Variant {
        self.variants
            .iter()
            .find(|v| v.is_control())
            .expect("validated experiment has exactly one control")
    }

    /// Iterate over the non-control arms in name order.
    pub fn treatments(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| !v.is_control())
    }

    /// Get the name of the target metric.
    #[must_use]
    pub fn target_metric(&self) -> &str {
        &self.target_metric
    }

    /// Get the metric family of the target metric.
    #[must_use]
    pub const fn metric_kind(&self) -> MetricKind {
        self.metric_kind
    }

    /// Get the per-variant minimum sample size.
    #[must_use]
    pub const fn minimum_sample_size(&self) -> u64 {
        self.minimum_sample_size
    }

    /// Get the significance level (alpha).
    #[must_use]
    pub const fn significance_level(&self) -> f64 {
        self.significance_level
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the start timestamp, set on the transition to Running.
    #[must_use]
    pub const fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// Get the end timestamp, set on the transition to Completed.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub(crate) fn set_status(&mut self, status: ExperimentStatus) {
        if self.start_date.is_none() && status == ExperimentStatus::Running {
            self.start_date = Some(Utc::now());
        }
        if status == ExperimentStatus::Completed {
            self.end_date = Some(Utc::now());
        }
        self.status = status;
    }

    /// Replace the traffic allocations while still in Draft.
    ///
    /// The variant set itself is fixed at build time; only the fractions
    /// may be retuned before launch. Re-validates the full configuration.
    pub(crate) fn set_allocations(&mut self, allocations: &[(String, f64)]) -> Result<()> {
        if !self.status.is_mutable() {
            return Err(Error::validation(
                "traffic_split",
                format!(
                    "allocations are immutable once status leaves draft (status: {:?})",
                    self.status
                ),
            ));
        }
        let mut updated = self.variants.clone();
        for (name, allocation) in allocations {
            let variant = updated
                .iter_mut()
                .find(|v| v.name() == name)
                .ok_or_else(|| {
                    Error::validation("traffic_split", format!("unknown variant '{name}'"))
                })?;
            variant.allocation = *allocation;
        }
        let candidate = Self {
            variants: updated,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Validate the full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending field when the
    /// configuration violates any rule: fewer than two variants,
    /// duplicate variant names, not exactly one control, allocations
    /// outside [0, 1] or not summing to 1.0 within tolerance,
    /// `significance_level` outside (0, 1), a zero minimum sample size,
    /// or `end_date` before `start_date`.
    pub fn validate(&self) -> Result<()> {
        if self.variants.len() < 2 {
            return Err(Error::validation(
                "variants",
                format!("at least 2 variants required, got {}", self.variants.len()),
            ));
        }
        for pair in self.variants.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(Error::validation(
                    "variants",
                    format!("duplicate variant name '{}'", pair[0].name()),
                ));
            }
        }
        let controls = self.variants.iter().filter(|v| v.is_control()).count();
        if controls != 1 {
            return Err(Error::validation(
                "variants",
                format!("exactly one control required, got {controls}"),
            ));
        }
        let mut total = 0.0_f64;
        for variant in &self.variants {
            let allocation = variant.allocation();
            if !allocation.is_finite() || !(0.0..=1.0).contains(&allocation) {
                return Err(Error::validation(
                    "traffic_split",
                    format!(
                        "allocation for '{}' must be in [0, 1], got {allocation}",
                        variant.name()
                    ),
                ));
            }
            total += allocation;
        }
        if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
            return Err(Error::validation(
                "traffic_split",
                format!("allocations must sum to 1.0 +/- {ALLOCATION_TOLERANCE}, got {total}"),
            ));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(Error::validation(
                "significance_level",
                format!("must be in (0, 1), got {}", self.significance_level),
            ));
        }
        if self.minimum_sample_size == 0 {
            return Err(Error::validation(
                "minimum_sample_size",
                "must be a positive integer",
            ));
        }
        if self.target_metric.is_empty() {
            return Err(Error::validation("target_metric", "must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::validation(
                    "end_date",
                    format!("must be >= start_date ({start} > {end})"),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`Experiment`].
///
/// Defaults: `significance_level` 0.05, `minimum_sample_size` 1000,
/// continuous metric.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: String,
    name: String,
    variants: Vec<Variant>,
    target_metric: String,
    metric_kind: MetricKind,
    minimum_sample_size: u64,
    significance_level: f64,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            variants: Vec::new(),
            target_metric: String::new(),
            metric_kind: MetricKind::Continuous,
            minimum_sample_size: 1000,
            significance_level: 0.05,
            start_date: None,
            end_date: None,
        }
    }

    /// Add an arm to the experiment.
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Set the target metric name and its family.
    #[must_use]
    pub fn target_metric(mut self, name: impl Into<String>, kind: MetricKind) -> Self {
        self.target_metric = name.into();
        self.metric_kind = kind;
        self
    }

    /// Set the per-variant minimum sample size.
    #[must_use]
    pub const fn minimum_sample_size(mut self, size: u64) -> Self {
        self.minimum_sample_size = size;
        self
    }

    /// Set the significance level (alpha).
    #[must_use]
    pub const fn significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    /// Set a planned end date.
    #[must_use]
    pub const fn end_date(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    /// Build and validate the experiment.
    ///
    /// The resulting experiment is in [`ExperimentStatus::Draft`] with
    /// variants sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the configuration violates any
    /// rule listed on [`Experiment::validate`].
    pub fn build(mut self) -> Result<Experiment> {
        self.variants.sort_by(|a, b| a.name().cmp(b.name()));
        let experiment = Experiment {
            id: self.id,
            name: self.name,
            status: ExperimentStatus::Draft,
            variants: self.variants,
            target_metric: self.target_metric,
            metric_kind: self.metric_kind,
            minimum_sample_size: self.minimum_sample_size,
            significance_level: self.significance_level,
            created_at: Utc::now(),
            start_date: self.start_date,
            end_date: self.end_date,
        };
        experiment.validate()?;
        Ok(experiment)
    }
}
