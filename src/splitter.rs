//! Deterministic traffic splitting
//!
//! **Problem**: persisted random assignment needs a "check storage, else
//! assign and store" dance that races under concurrent first-time
//! assignment.
//!
//! **Solution**: compute the variant from a stable digest of
//! `(experiment_id, user_key)`. Same inputs, same variant: on every
//! call, across processes, with no shared mutable state. Storage becomes
//! an optional cache, never the source of truth.
//!
//! The digest is SHA-256; the requirement is uniformity and stability,
//! not secrecy. The top 53 bits map to a point in [0, 1), and cumulative
//! allocation boundaries over the variants (lexicographic name order)
//! pick the arm whose interval contains the point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::experiment::{Experiment, ExperimentStatus, Variant};

/// A recorded user-to-variant assignment.
///
/// Purely informational: the mapping is recomputed from the experiment
/// configuration on demand, so an `Assignment` can always be rebuilt and
/// any stored copy is a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    experiment_id: String,
    user_key: String,
    variant: String,
    assigned_at: DateTime<Utc>,
}

impl Assignment {
    pub(crate) fn new(
        experiment_id: impl Into<String>,
        user_key: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            user_key: user_key.into(),
            variant: variant.into(),
            assigned_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the user key.
    #[must_use]
    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Get the assigned variant name.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Get the timestamp this record was produced at.
    #[must_use]
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }
}

/// Map `(experiment_id, user_key)` to a uniform point in [0, 1).
///
/// Stable across calls, processes and machines: SHA-256 of
/// `experiment_id || ':' || user_key`, top 53 bits of the digest scaled
/// into the unit interval (53 bits fit an f64 mantissa exactly).
#[must_use]
pub fn unit_point(experiment_id: &str, user_key: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update(b":");
    hasher.update(user_key.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) >> 11;

    #[allow(clippy::cast_precision_loss)]
    let point = bucket as f64 / (1_u64 << 53) as f64;
    point
}

/// Deterministically assign a user to a variant.
///
/// # Arguments
///
/// * `experiment` - The experiment configuration (source of truth)
/// * `user_key` - Stable user identifier
/// * `opted_out` - The external consent authority's decision
///
/// # Returns
///
/// The selected variant, or `None` when the user opted out (checked
/// before any hashing) or the experiment is not Running.
///
/// Allocation fractions are normalized before boundary computation, so
/// accumulated floating error in the configured sum cannot leave a gap
/// at the top of the unit interval. Zero-allocation variants are skipped
/// and never selected.
#[must_use]
pub fn assign<'a>(
    experiment: &'a Experiment,
    user_key: &str,
    opted_out: bool,
) -> Option<&'a Variant> {
    if opted_out {
        return None;
    }
    if experiment.status() != ExperimentStatus::Running {
        return None;
    }
    expected_variant(experiment, user_key)
}

/// The variant the configuration maps `user_key` to, ignoring lifecycle
/// status and consent.
///
/// This is the integrity oracle: because assignment is computed, the arm
/// a user *would* be in is answerable for paused or completed
/// experiments too, which is what observation validation needs.
#[must_use]
pub fn expected_variant<'a>(experiment: &'a Experiment, user_key: &str) -> Option<&'a Variant> {
    let total: f64 = experiment.variants().iter().map(Variant::allocation).sum();
    if total <= 0.0 {
        return None;
    }

    let point = unit_point(experiment.id(), user_key);

    // Variants are stored sorted by name; accumulate [low, high)
    // boundaries in that fixed order.
    let mut cumulative = 0.0_f64;
    let mut last_nonzero = None;
    for variant in experiment.variants() {
        if variant.allocation() == 0.0 {
            continue;
        }
        cumulative += variant.allocation() / total;
        if point < cumulative {
            return Some(variant);
        }
        last_nonzero = Some(variant);
    }
    // point landed in the residual left by normalized-sum rounding;
    // it belongs to the topmost non-empty interval.
    last_nonzero
}
