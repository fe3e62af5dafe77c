//! Metric aggregation: fold observations into sufficient statistics
//!
//! Ingestion is a pure fold per `(experiment_id, variant)` pair. The
//! sharded map's entry lock serializes concurrent updates to the same
//! pair, since the Welford read-modify-write is not safe unsynchronized,
//! while cross-variant and cross-experiment ingestion proceeds fully in
//! parallel.
//!
//! Observations that name an unknown variant, or a user whose computed
//! assignment disagrees with the tagged variant, are rejected with a
//! structured error before any statistic is touched. A misattributed
//! observation that slipped into the fold could never be backed out.

mod stats;

pub use stats::VariantStatistics;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::splitter;

/// A single per-user metric observation reported by the external
/// tracker. Created once, consumed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    experiment_id: String,
    variant: String,
    user_key: String,
    metric_value: f64,
    observed_at: DateTime<Utc>,
}

impl MetricObservation {
    /// Create a new observation stamped with the current time.
    ///
    /// Boolean metrics are represented as 0.0 / 1.0.
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        variant: impl Into<String>,
        user_key: impl Into<String>,
        metric_value: f64,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant: variant.into(),
            user_key: user_key.into(),
            metric_value,
            observed_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the variant the tracker attributed this observation to.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Get the user key.
    #[must_use]
    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Get the metric value.
    #[must_use]
    pub const fn metric_value(&self) -> f64 {
        self.metric_value
    }

    /// Get the observation timestamp.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

/// Concurrent per-variant statistics accumulator.
#[derive(Debug, Default)]
pub struct MetricAggregator {
    stats: DashMap<(String, String), VariantStatistics>,
}

impl MetricAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the target variant's statistics.
    ///
    /// The experiment configuration is the integrity oracle: the tagged
    /// variant must exist, the experiment must currently accept
    /// observations, the value must be finite, and the user's computed
    /// assignment must match the tag (the assignment is a pure function,
    /// so mismatch means tracker corruption, not missing state).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataIntegrity`] describing the offending
    /// observation; aggregated statistics are untouched on failure.
    pub fn ingest(&self, experiment: &Experiment, observation: &MetricObservation) -> Result<()> {
        let reject = |reason: String| {
            warn!(
                experiment_id = observation.experiment_id(),
                variant = observation.variant(),
                user_key = observation.user_key(),
                reason = %reason,
                "observation rejected"
            );
            Err(Error::DataIntegrity {
                experiment_id: observation.experiment_id().to_string(),
                variant: observation.variant().to_string(),
                user_key: observation.user_key().to_string(),
                reason,
            })
        };

        if observation.experiment_id() != experiment.id() {
            return reject(format!(
                "observation addressed to experiment '{}'",
                observation.experiment_id()
            ));
        }
        if !experiment.status().accepts_observations() {
            return reject(format!(
                "experiment is {:?} and not accepting observations",
                experiment.status()
            ));
        }
        if !observation.metric_value().is_finite() {
            return reject(format!(
                "metric value {} is not finite",
                observation.metric_value()
            ));
        }
        if experiment.variant(observation.variant()).is_none() {
            return reject(format!(
                "variant '{}' is not part of the experiment",
                observation.variant()
            ));
        }
        match splitter::expected_variant(experiment, observation.user_key()) {
            Some(assigned) if assigned.name() == observation.variant() => {}
            Some(assigned) => {
                return reject(format!(
                    "user is assigned to '{}', not '{}'",
                    assigned.name(),
                    observation.variant()
                ));
            }
            None => {
                return reject("user has no assignment in this experiment".to_string());
            }
        }

        // Entry lock serializes concurrent updates to this pair.
        self.stats
            .entry((
                observation.experiment_id().to_string(),
                observation.variant().to_string(),
            ))
            .or_default()
            .record(observation.metric_value());

        debug!(
            experiment_id = observation.experiment_id(),
            variant = observation.variant(),
            value = observation.metric_value(),
            "observation ingested"
        );
        Ok(())
    }

    /// Seed the statistics for one variant, e.g. from a repository
    /// snapshot. Merges with anything already accumulated.
    pub fn seed(&self, experiment_id: &str, variant: &str, statistics: VariantStatistics) {
        self.stats
            .entry((experiment_id.to_string(), variant.to_string()))
            .and_modify(|existing| *existing = existing.merge(&statistics))
            .or_insert(statistics);
    }

    /// Snapshot the per-variant statistics for an experiment.
    ///
    /// Variants with no observations yet are absent from the map.
    #[must_use]
    pub fn snapshot(&self, experiment_id: &str) -> HashMap<String, VariantStatistics> {
        self.stats
            .iter()
            .filter(|entry| entry.key().0 == experiment_id)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect()
    }
}
