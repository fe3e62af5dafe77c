//! Experiment configuration, lifecycle, and registry
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variant (N, exactly one control)
//!      │
//!      └── ExperimentStatus: draft → running → {paused ↔ running}
//!                                  → completed → archived
//! ```
//!
//! Traffic allocations and the variant set freeze the moment an
//! experiment leaves Draft; changing them afterwards would silently
//! reshuffle users who were already assigned.

mod config;
mod registry;
mod status;

pub use config::{Experiment, ExperimentBuilder, MetricKind, Variant, ALLOCATION_TOLERANCE};
pub use registry::{ExperimentRegistry, ExperimentSummary};
pub use status::ExperimentStatus;
