//! Persistence and consent boundaries
//!
//! The engine owns no storage and no consent logic; both are consumed
//! through these traits as synchronous calls at the edge of the pure
//! computation. Timeout and cancellation policy for a real backend
//! belongs to the implementation, not the engine.
//!
//! [`MemoryRepository`] is the bundled cache/test double. Because
//! assignment is computed, losing its contents loses nothing
//! authoritative.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::aggregator::{MetricObservation, VariantStatistics};
use crate::analysis::ExperimentResult;
use crate::error::{Error, Result};
use crate::experiment::Experiment;

/// Durable storage consumed by the engine.
pub trait Repository: Send + Sync {
    /// Load an experiment configuration by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID, or a
    /// backend-specific error.
    fn load_experiment(&self, experiment_id: &str) -> Result<Experiment>;

    /// Persist an experiment configuration (insert or replace).
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error on write failure.
    fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// Load the per-variant statistics snapshot for an experiment.
    /// Unknown experiments yield an empty map, not an error; statistics
    /// accrue lazily.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error on read failure.
    fn load_statistics(&self, experiment_id: &str) -> Result<HashMap<String, VariantStatistics>>;

    /// Persist the per-variant statistics snapshot for an experiment.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error on write failure.
    fn save_statistics(
        &self,
        experiment_id: &str,
        statistics: &HashMap<String, VariantStatistics>,
    ) -> Result<()>;

    /// Append one observation to the experiment's audit log.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error on write failure.
    fn append_observation(&self, observation: &MetricObservation) -> Result<()>;

    /// Persist an analysis result. Results are immutable; each call
    /// appends a new record.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error on write failure.
    fn save_result(&self, result: &ExperimentResult) -> Result<()>;
}

impl<T: Repository + ?Sized> Repository for &T {
    fn load_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        (**self).load_experiment(experiment_id)
    }

    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        (**self).save_experiment(experiment)
    }

    fn load_statistics(&self, experiment_id: &str) -> Result<HashMap<String, VariantStatistics>> {
        (**self).load_statistics(experiment_id)
    }

    fn save_statistics(
        &self,
        experiment_id: &str,
        statistics: &HashMap<String, VariantStatistics>,
    ) -> Result<()> {
        (**self).save_statistics(experiment_id, statistics)
    }

    fn append_observation(&self, observation: &MetricObservation) -> Result<()> {
        (**self).append_observation(observation)
    }

    fn save_result(&self, result: &ExperimentResult) -> Result<()> {
        (**self).save_result(result)
    }
}

/// External consent authority, consulted before every assignment.
pub trait ConsentAuthority: Send + Sync {
    /// Whether the user has opted out of experimentation. An opted-out
    /// user is never assigned and never counted.
    fn is_opted_out(&self, user_key: &str) -> bool;
}

impl<T: ConsentAuthority + ?Sized> ConsentAuthority for &T {
    fn is_opted_out(&self, user_key: &str) -> bool {
        (**self).is_opted_out(user_key)
    }
}

/// Consent authority that never opts anyone out. For embedding in
/// systems that gate consent upstream, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOptOuts;

impl ConsentAuthority for NoOptOuts {
    fn is_opted_out(&self, _user_key: &str) -> bool {
        false
    }
}

/// Consent authority backed by an explicit opt-out set.
#[derive(Debug, Default)]
pub struct OptOutList {
    opted_out: DashMap<String, ()>,
}

impl OptOutList {
    /// Create an empty opt-out list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as opted out.
    pub fn opt_out(&self, user_key: impl Into<String>) {
        self.opted_out.insert(user_key.into(), ());
    }

    /// Remove a user's opt-out.
    pub fn opt_in(&self, user_key: &str) {
        self.opted_out.remove(user_key);
    }
}

impl ConsentAuthority for OptOutList {
    fn is_opted_out(&self, user_key: &str) -> bool {
        self.opted_out.contains_key(user_key)
    }
}

/// In-memory repository over sharded concurrent maps.
///
/// Thread-safe; data is lost on process restart, which only costs the
/// caches. Configuration aside, everything stored here is recomputable
/// or re-reportable.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    experiments: DashMap<String, Experiment>,
    statistics: DashMap<String, HashMap<String, VariantStatistics>>,
    observations: DashMap<String, Vec<MetricObservation>>,
    results: DashMap<String, Vec<ExperimentResult>>,
}

impl MemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observations logged for an experiment.
    #[must_use]
    pub fn observation_count(&self, experiment_id: &str) -> usize {
        self.observations
            .get(experiment_id)
            .map_or(0, |entries| entries.len())
    }

    /// All results persisted for an experiment, oldest first.
    #[must_use]
    pub fn results(&self, experiment_id: &str) -> Vec<ExperimentResult> {
        self.results
            .get(experiment_id)
            .map_or_else(Vec::new, |entries| entries.clone())
    }
}

impl Repository for MemoryRepository {
    fn load_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.experiments
            .get(experiment_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound {
                experiment_id: experiment_id.to_string(),
            })
    }

    fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.experiments
            .insert(experiment.id().to_string(), experiment.clone());
        Ok(())
    }

    fn load_statistics(&self, experiment_id: &str) -> Result<HashMap<String, VariantStatistics>> {
        Ok(self
            .statistics
            .get(experiment_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    fn save_statistics(
        &self,
        experiment_id: &str,
        statistics: &HashMap<String, VariantStatistics>,
    ) -> Result<()> {
        self.statistics
            .insert(experiment_id.to_string(), statistics.clone());
        Ok(())
    }

    fn append_observation(&self, observation: &MetricObservation) -> Result<()> {
        self.observations
            .entry(observation.experiment_id().to_string())
            .or_default()
            .push(observation.clone());
        Ok(())
    }

    fn save_result(&self, result: &ExperimentResult) -> Result<()> {
        self.results
            .entry(result.experiment_id().to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }
}
