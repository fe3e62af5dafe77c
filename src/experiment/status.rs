//! Experiment lifecycle states and the legal transition table

use serde::{Deserialize, Serialize};

/// Lifecycle status of an experiment.
///
/// The state machine is
/// `Draft -> Running -> {Paused <-> Running} -> Completed -> Archived`.
/// `Draft` and `Archived` have no outward edges other than their single
/// forward edge; every other move is an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Configured but not yet serving traffic. The only state in which
    /// variants and allocations may still change.
    Draft,
    /// Serving traffic; assignments are handed out and observations
    /// accepted.
    Running,
    /// Temporarily not assigning new users. Observations from already
    /// assigned users are still accepted.
    Paused,
    /// Finished collecting data; eligible for analysis, closed to new
    /// assignments and observations.
    Completed,
    /// Retired. Terminal.
    Archived,
}

impl ExperimentStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle edge.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Paused | Self::Completed)
                | (Self::Paused, Self::Running | Self::Completed)
                | (Self::Completed, Self::Archived)
        )
    }

    /// Whether new metric observations are accepted in this state.
    #[must_use]
    pub const fn accepts_observations(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Whether configuration (variants, allocations) is still mutable.
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Draft)
    }
}
