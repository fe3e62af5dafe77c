//! # Holdout: Deterministic A/B Experimentation Engine
//!
//! Holdout is an embeddable experimentation engine: deterministic
//! user-to-variant assignment, experiment lifecycle management, and
//! statistical inference over streamed metric observations.
//!
//! ## Design Principles
//!
//! - **Computed assignment**: the variant for a `(experiment, user)` pair
//!   is a pure function of a stable digest, never persisted state. Storage
//!   is a cache, not a source of truth, so concurrent first-time
//!   assignment has no race to lose.
//! - **Sufficient statistics**: the aggregator folds observations into
//!   count/mean/variance (Welford) and never retains raw values.
//! - **Fail loudly**: malformed configuration, integrity violations and
//!   degenerate test inputs are structured errors, never silent
//!   approximations.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use holdout::engine::Engine;
//! use holdout::experiment::{Experiment, MetricKind, Variant};
//! use holdout::repository::{MemoryRepository, NoOptOuts};
//!
//! let engine = Engine::new(MemoryRepository::new(), NoOptOuts);
//!
//! let experiment = Experiment::builder("exp-001", "Headline Test")
//!     .variant(Variant::control("control", 0.5))
//!     .variant(Variant::treatment("treatment", 0.5))
//!     .target_metric("ctr", MetricKind::Proportion)
//!     .build()?;
//!
//! engine.create_experiment(experiment)?;
//! engine.start("exp-001")?;
//!
//! if let Some(assignment) = engine.assign("exp-001", "user-42")? {
//!     println!("render variant: {}", assignment.variant());
//! }
//! # Ok::<(), holdout::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregator;
pub mod analysis;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod repository;
pub mod splitter;

pub use error::{Error, Result};
