//! Error types for holdout
//!
//! Every variant carries enough structured detail (offending field,
//! variant name, observed counts) for the caller to act on. Validation
//! happens before any mutation, so no error leaves registry or
//! aggregator state corrupted.

use thiserror::Error;

use crate::experiment::ExperimentStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Holdout error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Experiment configuration rejected at creation or mutation
    #[error("invalid experiment configuration: {field}: {message}")]
    Validation {
        /// Offending configuration field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// Illegal lifecycle move; the experiment state is unchanged
    #[error("invalid transition for experiment '{experiment_id}': {from:?} -> {to:?}")]
    InvalidTransition {
        /// Experiment the transition was attempted on
        experiment_id: String,
        /// Status before the attempt (still current)
        from: ExperimentStatus,
        /// Requested status
        to: ExperimentStatus,
    },

    /// Unknown experiment identifier
    #[error("experiment '{experiment_id}' not found")]
    NotFound {
        /// The identifier that failed to resolve
        experiment_id: String,
    },

    /// Observation for an unknown variant or an unassigned user.
    /// Rejected before touching aggregated statistics.
    #[error(
        "data integrity violation for experiment '{experiment_id}', \
         variant '{variant}', user '{user_key}': {reason}"
    )]
    DataIntegrity {
        /// Experiment the observation claimed to belong to
        experiment_id: String,
        /// Variant named by the observation
        variant: String,
        /// User the observation was recorded for
        user_key: String,
        /// Why the observation was rejected
        reason: String,
    },

    /// Analysis requested before every arm reached the minimum sample
    /// size. Recoverable by waiting for more data, not by retrying.
    #[error(
        "insufficient data for experiment '{experiment_id}': \
         variants below minimum sample size {minimum_sample_size}: {undersampled:?}"
    )]
    InsufficientData {
        /// Experiment under analysis
        experiment_id: String,
        /// Per-variant observed counts that fell short, as (variant, count)
        undersampled: Vec<(String, u64)>,
        /// The configured per-variant minimum
        minimum_sample_size: u64,
    },

    /// Degenerate input to a significance test (e.g. zero variance with
    /// differing means). Surfaced, never silently approximated.
    #[error("statistical computation failed comparing '{treatment}' against '{control}': {message}")]
    StatisticalComputation {
        /// Control arm of the failed comparison
        control: String,
        /// Treatment arm of the failed comparison
        treatment: String,
        /// What made the test undefined
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with owned strings.
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
