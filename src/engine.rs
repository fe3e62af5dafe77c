//! Engine facade: registry, aggregator and analyzer behind one surface
//!
//! The engine wires the pure components to the persistence and consent
//! boundaries. All I/O happens here, synchronously, at the edges; the
//! splitter and analyzer stay side-effect-free and the aggregator's
//! per-pair entry locks are the only synchronization anywhere.

use tracing::{debug, info};

use crate::aggregator::{MetricAggregator, MetricObservation};
use crate::analysis::{self, ExperimentResult};
use crate::error::{Error, Result};
use crate::experiment::{Experiment, ExperimentRegistry, ExperimentStatus, ExperimentSummary};
use crate::repository::{ConsentAuthority, Repository};
use crate::splitter::{self, Assignment};

/// The experimentation engine.
///
/// Generic over its repository and consent authority so embedders bring
/// their own storage and GDPR bookkeeping; the bundled
/// [`crate::repository::MemoryRepository`] and
/// [`crate::repository::NoOptOuts`] cover tests and cache-only use.
pub struct Engine<R: Repository, C: ConsentAuthority> {
    registry: ExperimentRegistry,
    aggregator: MetricAggregator,
    repository: R,
    consent: C,
}

impl<R: Repository, C: ConsentAuthority> Engine<R, C> {
    /// Create an engine over the given boundaries.
    pub fn new(repository: R, consent: C) -> Self {
        Self {
            registry: ExperimentRegistry::new(),
            aggregator: MetricAggregator::new(),
            repository,
            consent,
        }
    }

    /// The registry, for direct configuration queries.
    pub const fn registry(&self) -> &ExperimentRegistry {
        &self.registry
    }

    /// Register and persist a new experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for invalid configuration or a
    /// duplicate ID; nothing is persisted on failure.
    pub fn create_experiment(&self, experiment: Experiment) -> Result<Experiment> {
        let created = self.registry.create(experiment)?;
        self.repository.save_experiment(&created)?;
        Ok(created)
    }

    /// Load a previously persisted experiment into the registry, along
    /// with any stored statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the repository has no such
    /// experiment, or [`Error::Validation`] when it is already loaded.
    pub fn restore_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        let experiment = self.repository.load_experiment(experiment_id)?;
        let restored = self.registry.create(experiment)?;
        for (variant, statistics) in self.repository.load_statistics(experiment_id)? {
            self.aggregator.seed(experiment_id, &variant, statistics);
        }
        info!(experiment_id, "experiment restored from repository");
        Ok(restored)
    }

    /// Fetch an experiment by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID.
    pub fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.registry.get(experiment_id)
    }

    /// List all registered experiments.
    pub fn list_experiments(&self) -> Vec<ExperimentSummary> {
        self.registry.list()
    }

    /// Start a Draft (or resume a Paused) experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the lifecycle edge is
    /// illegal.
    pub fn start(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(experiment_id, ExperimentStatus::Running)
    }

    /// Pause a Running experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the lifecycle edge is
    /// illegal.
    pub fn pause(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(experiment_id, ExperimentStatus::Paused)
    }

    /// Complete a Running or Paused experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the lifecycle edge is
    /// illegal.
    pub fn complete(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(experiment_id, ExperimentStatus::Completed)
    }

    /// Move an experiment to an arbitrary lifecycle status and persist
    /// the updated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::InvalidTransition`]; the
    /// stored state is unchanged on failure.
    pub fn transition(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Experiment> {
        let updated = self.registry.transition(experiment_id, status)?;
        self.repository.save_experiment(&updated)?;
        Ok(updated)
    }

    /// Deterministically assign a user to a variant.
    ///
    /// Consent is consulted first and short-circuits before any hashing.
    /// `Ok(None)` means no assignment: the user opted out or the
    /// experiment is not Running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown experiment.
    pub fn assign(&self, experiment_id: &str, user_key: &str) -> Result<Option<Assignment>> {
        if self.consent.is_opted_out(user_key) {
            debug!(experiment_id, user_key, "assignment skipped: opted out");
            return Ok(None);
        }
        let experiment = self.registry.get(experiment_id)?;
        Ok(splitter::assign(&experiment, user_key, false)
            .map(|variant| Assignment::new(experiment_id, user_key, variant.name())))
    }

    /// Record one metric observation from the external tracker.
    ///
    /// Validates integrity against the experiment configuration, folds
    /// the value into the per-variant statistics, and appends the
    /// observation and refreshed snapshot to the repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown experiment and
    /// [`Error::DataIntegrity`] for an observation that names an unknown
    /// variant, a misattributed or unassigned user, an opted-out user,
    /// or a non-finite value. Statistics are untouched on failure.
    pub fn record_observation(&self, observation: &MetricObservation) -> Result<()> {
        if self.consent.is_opted_out(observation.user_key()) {
            return Err(Error::DataIntegrity {
                experiment_id: observation.experiment_id().to_string(),
                variant: observation.variant().to_string(),
                user_key: observation.user_key().to_string(),
                reason: "user has opted out; observations are excluded".to_string(),
            });
        }
        let experiment = self.registry.get(observation.experiment_id())?;
        self.aggregator.ingest(&experiment, observation)?;
        self.repository.append_observation(observation)?;
        self.repository.save_statistics(
            experiment.id(),
            &self.aggregator.snapshot(experiment.id()),
        )?;
        Ok(())
    }

    /// Analyze an experiment's accumulated statistics and persist the
    /// immutable result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`], [`Error::Validation`] (Draft),
    /// [`Error::InsufficientData`], or
    /// [`Error::StatisticalComputation`]; see [`analysis::analyze`].
    pub fn analyze(&self, experiment_id: &str) -> Result<ExperimentResult> {
        let experiment = self.registry.get(experiment_id)?;
        let statistics = self.aggregator.snapshot(experiment_id);
        let result = analysis::analyze(&experiment, &statistics)?;
        self.repository.save_result(&result)?;
        Ok(result)
    }
}
