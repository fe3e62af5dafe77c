//! Experiment registry: owns configuration and lifecycle state
//!
//! The registry is an explicit object passed by reference to whatever
//! needs it; there is no process-wide hidden state. It is the source of
//! truth consulted by the splitter and the analyzer.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Experiment, ExperimentStatus};
use crate::error::{Error, Result};

/// Compact listing view of a registered experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Experiment ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle status.
    pub status: ExperimentStatus,
    /// Variant names in boundary order.
    pub variants: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Start timestamp, if the experiment has run.
    pub start_date: Option<DateTime<Utc>>,
    /// End timestamp, if the experiment has completed.
    pub end_date: Option<DateTime<Utc>>,
}

/// Concurrent experiment registry.
///
/// Backed by a sharded concurrent map; lookups clone the configuration
/// out so callers never hold a lock across their own work. Mutations
/// (create, transition, allocation updates) validate before touching
/// state, so a rejected call leaves the registry unchanged.
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    experiments: DashMap<String, Experiment>,
}

impl ExperimentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether the registry holds no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Register a new experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the configuration is invalid
    /// or the ID is already registered. Nothing is persisted on failure.
    pub fn create(&self, experiment: Experiment) -> Result<Experiment> {
        experiment.validate()?;
        match self.experiments.entry(experiment.id().to_string()) {
            Entry::Occupied(_) => Err(Error::validation(
                "id",
                format!("experiment '{}' already exists", experiment.id()),
            )),
            Entry::Vacant(slot) => {
                info!(
                    experiment_id = experiment.id(),
                    name = experiment.name(),
                    variants = experiment.variants().len(),
                    "experiment created"
                );
                slot.insert(experiment.clone());
                Ok(experiment)
            }
        }
    }

    /// Fetch an experiment by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID.
    pub fn get(&self, experiment_id: &str) -> Result<Experiment> {
        self.experiments
            .get(experiment_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound {
                experiment_id: experiment_id.to_string(),
            })
    }

    /// Move an experiment to a new lifecycle status.
    ///
    /// The transition to Running stamps `start_date` on first entry;
    /// the transition to Completed stamps `end_date`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID and
    /// [`Error::InvalidTransition`] for an illegal lifecycle edge; in
    /// either case the stored state is unchanged.
    pub fn transition(
        &self,
        experiment_id: &str,
        next: ExperimentStatus,
    ) -> Result<Experiment> {
        let mut entry =
            self.experiments
                .get_mut(experiment_id)
                .ok_or_else(|| Error::NotFound {
                    experiment_id: experiment_id.to_string(),
                })?;
        let current = entry.status();
        if !current.can_transition(next) {
            return Err(Error::InvalidTransition {
                experiment_id: experiment_id.to_string(),
                from: current,
                to: next,
            });
        }
        entry.set_status(next);
        info!(
            experiment_id,
            from = ?current,
            to = ?next,
            "experiment transitioned"
        );
        Ok(entry.clone())
    }

    /// Replace traffic allocations for a Draft experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID and
    /// [`Error::Validation`] when the experiment has left Draft or the
    /// new fractions are invalid; the stored allocations are unchanged
    /// on failure.
    pub fn update_allocations(
        &self,
        experiment_id: &str,
        allocations: &[(String, f64)],
    ) -> Result<Experiment> {
        let mut entry =
            self.experiments
                .get_mut(experiment_id)
                .ok_or_else(|| Error::NotFound {
                    experiment_id: experiment_id.to_string(),
                })?;
        entry.set_allocations(allocations)?;
        Ok(entry.clone())
    }

    /// List every registered experiment as a summary, sorted by ID.
    #[must_use]
    pub fn list(&self) -> Vec<ExperimentSummary> {
        let mut summaries: Vec<ExperimentSummary> = self
            .experiments
            .iter()
            .map(|entry| ExperimentSummary {
                id: entry.id().to_string(),
                name: entry.name().to_string(),
                status: entry.status(),
                variants: entry
                    .variants()
                    .iter()
                    .map(|v| v.name().to_string())
                    .collect(),
                created_at: entry.created_at(),
                start_date: entry.start_date(),
                end_date: entry.end_date(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{MetricKind, Variant};

    fn experiment(id: &str) -> Experiment {
        Experiment::builder(id, "Test")
            .variant(Variant::control("control", 0.5))
            .variant(Variant::treatment("treatment", 0.5))
            .target_metric("ctr", MetricKind::Proportion)
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();
        let fetched = registry.get("exp-1").unwrap();
        assert_eq!(fetched.id(), "exp-1");
        assert_eq!(fetched.status(), ExperimentStatus::Draft);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();
        let err = registry.create(experiment("exp-1")).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "id"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = ExperimentRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_transition_stamps_dates() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();

        let running = registry
            .transition("exp-1", ExperimentStatus::Running)
            .unwrap();
        assert!(running.start_date().is_some());
        assert!(running.end_date().is_none());

        let completed = registry
            .transition("exp-1", ExperimentStatus::Completed)
            .unwrap();
        assert!(completed.end_date().is_some());
        assert!(completed.end_date() >= completed.start_date());
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();
        let err = registry
            .transition("exp-1", ExperimentStatus::Completed)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ExperimentStatus::Draft,
                to: ExperimentStatus::Completed,
                ..
            }
        ));
        assert_eq!(registry.get("exp-1").unwrap().status(), ExperimentStatus::Draft);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();
        registry.transition("exp-1", ExperimentStatus::Running).unwrap();
        registry.transition("exp-1", ExperimentStatus::Paused).unwrap();
        let resumed = registry
            .transition("exp-1", ExperimentStatus::Running)
            .unwrap();
        assert_eq!(resumed.status(), ExperimentStatus::Running);
    }

    #[test]
    fn test_list_sorted_by_id() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-b")).unwrap();
        registry.create(experiment("exp-a")).unwrap();
        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "exp-a");
        assert_eq!(listed[1].id, "exp-b");
        assert_eq!(listed[0].variants, vec!["control", "treatment"]);
    }

    #[test]
    fn test_update_allocations_after_launch_rejected() {
        let registry = ExperimentRegistry::new();
        registry.create(experiment("exp-1")).unwrap();
        registry.transition("exp-1", ExperimentStatus::Running).unwrap();
        let err = registry
            .update_allocations("exp-1", &[("control".into(), 0.6), ("treatment".into(), 0.4)])
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
