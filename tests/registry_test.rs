//! Experiment registry integration tests: validation and lifecycle

use holdout::experiment::{
    Experiment, ExperimentRegistry, ExperimentStatus, MetricKind, Variant,
};
use holdout::Error;

fn valid(id: &str) -> Experiment {
    Experiment::builder(id, "Registry Integration")
        .variant(Variant::control("control", 0.5))
        .variant(Variant::treatment("treatment", 0.5))
        .target_metric("ctr", MetricKind::Proportion)
        .minimum_sample_size(1000)
        .build()
        .unwrap()
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_variant_payloads_survive_registration() {
    let registry = ExperimentRegistry::new();
    let experiment = Experiment::builder("exp-1", "Headline Test")
        .variant(
            Variant::control("control", 0.5)
                .with_config(serde_json::json!({"headline_style": "traditional"})),
        )
        .variant(
            Variant::treatment("treatment", 0.5)
                .with_config(serde_json::json!({"headline_style": "question"})),
        )
        .target_metric("ctr", MetricKind::Proportion)
        .build()
        .unwrap();
    registry.create(experiment).unwrap();

    let fetched = registry.get("exp-1").unwrap();
    assert_eq!(
        fetched.variant("treatment").unwrap().config().unwrap()["headline_style"],
        "question"
    );
}

#[test]
fn test_builder_rejects_missing_control() {
    let err = Experiment::builder("exp-1", "No Control")
        .variant(Variant::treatment("a", 0.5))
        .variant(Variant::treatment("b", 0.5))
        .target_metric("ctr", MetricKind::Proportion)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "variants"));
}

#[test]
fn test_builder_rejects_duplicate_names() {
    let err = Experiment::builder("exp-1", "Duplicates")
        .variant(Variant::control("same", 0.5))
        .variant(Variant::treatment("same", 0.5))
        .target_metric("ctr", MetricKind::Proportion)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "variants"));
}

#[test]
fn test_builder_rejects_negative_allocation() {
    let err = Experiment::builder("exp-1", "Negative")
        .variant(Variant::control("control", 1.2))
        .variant(Variant::treatment("treatment", -0.2))
        .target_metric("ctr", MetricKind::Proportion)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "traffic_split"));
}

// =============================================================================
// Lifecycle state machine
// =============================================================================

#[test]
fn test_full_lifecycle_walk() {
    let registry = ExperimentRegistry::new();
    registry.create(valid("exp-1")).unwrap();

    for status in [
        ExperimentStatus::Running,
        ExperimentStatus::Paused,
        ExperimentStatus::Running,
        ExperimentStatus::Completed,
        ExperimentStatus::Archived,
    ] {
        let updated = registry.transition("exp-1", status).unwrap();
        assert_eq!(updated.status(), status);
    }
}

#[test]
fn test_completed_rejects_restart() {
    let registry = ExperimentRegistry::new();
    registry.create(valid("exp-1")).unwrap();
    registry.transition("exp-1", ExperimentStatus::Running).unwrap();
    registry.transition("exp-1", ExperimentStatus::Completed).unwrap();

    let err = registry
        .transition("exp-1", ExperimentStatus::Running)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: ExperimentStatus::Completed,
            to: ExperimentStatus::Running,
            ..
        }
    ));
}

#[test]
fn test_archived_is_terminal() {
    let registry = ExperimentRegistry::new();
    registry.create(valid("exp-1")).unwrap();
    registry.transition("exp-1", ExperimentStatus::Running).unwrap();
    registry.transition("exp-1", ExperimentStatus::Completed).unwrap();
    registry.transition("exp-1", ExperimentStatus::Archived).unwrap();

    for status in [
        ExperimentStatus::Draft,
        ExperimentStatus::Running,
        ExperimentStatus::Paused,
        ExperimentStatus::Completed,
    ] {
        assert!(registry.transition("exp-1", status).is_err());
    }
}

#[test]
fn test_transition_unknown_experiment() {
    let registry = ExperimentRegistry::new();
    let err = registry
        .transition("missing", ExperimentStatus::Running)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

// =============================================================================
// Allocation immutability
// =============================================================================

#[test]
fn test_draft_allocations_tunable() {
    let registry = ExperimentRegistry::new();
    registry.create(valid("exp-1")).unwrap();
    let updated = registry
        .update_allocations(
            "exp-1",
            &[("control".to_string(), 0.8), ("treatment".to_string(), 0.2)],
        )
        .unwrap();
    assert!((updated.variant("treatment").unwrap().allocation() - 0.2).abs() < f64::EPSILON);
}

#[test]
fn test_running_allocations_frozen() {
    let registry = ExperimentRegistry::new();
    registry.create(valid("exp-1")).unwrap();
    registry.transition("exp-1", ExperimentStatus::Running).unwrap();

    let err = registry
        .update_allocations(
            "exp-1",
            &[("control".to_string(), 0.8), ("treatment".to_string(), 0.2)],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "traffic_split"));

    // The 50/50 split is untouched.
    let experiment = registry.get("exp-1").unwrap();
    assert!((experiment.variant("control").unwrap().allocation() - 0.5).abs() < f64::EPSILON);
}
