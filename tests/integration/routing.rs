//! Router behavior over catalogs and observed call statistics.

use std::sync::Arc;

use hive::catalog::ModelCatalog;
use hive::core::{Priority, TaskType};
use hive::metrics::{CallOutcome, MetricsStore, ModelCall};
use hive::router::{CapabilityRequirements, ModelRouter, SelectOptions, TaskSpec};

use crate::fixtures::profile;

fn spec(task_type: TaskType) -> TaskSpec {
    TaskSpec::new(task_type)
}

#[tokio::test]
async fn override_beats_scoring_and_requirements() {
    let catalog = Arc::new(
        ModelCatalog::new(vec![
            profile("strong", true, TaskType::Search, 0.95),
            profile("weak", true, TaskType::Search, 0.1),
        ])
        .unwrap(),
    );
    let router = ModelRouter::new(catalog, Arc::new(MetricsStore::new()));

    // Even with a requirement "weak" cannot meet, the override wins.
    let selection = router
        .select(
            &spec(TaskType::Search).with_requirements(CapabilityRequirements {
                tools: true,
                ..Default::default()
            }),
            &SelectOptions {
                override_model: Some("weak".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(selection.primary.id, "weak");
    assert_eq!(selection.reason, "manual_override");
    assert_eq!(selection.candidates.len(), 1);
}

#[tokio::test]
async fn recorded_errors_change_the_next_selection() {
    // The feedback loop: pick a model, observe it failing, pick again.
    let catalog = Arc::new(
        ModelCatalog::new(vec![
            profile("first", true, TaskType::MarketAnalysis, 0.9),
            profile("second", true, TaskType::MarketAnalysis, 0.7),
        ])
        .unwrap(),
    );
    let metrics = Arc::new(MetricsStore::new());
    let router = ModelRouter::new(catalog, Arc::clone(&metrics));

    let initial = router
        .select(&spec(TaskType::MarketAnalysis), &SelectOptions::default())
        .await
        .unwrap();
    assert_eq!(initial.primary.id, "first");

    for _ in 0..20 {
        metrics
            .record(&ModelCall::new(
                "first",
                TaskType::MarketAnalysis,
                800.0,
                CallOutcome::Error,
            ))
            .await;
    }

    let after = router
        .select(&spec(TaskType::MarketAnalysis), &SelectOptions::default())
        .await
        .unwrap();
    assert_eq!(after.primary.id, "second");
    // The failing model is still offered as a fallback, just demoted.
    assert!(after.candidates.iter().any(|p| p.id == "first"));
}

#[tokio::test]
async fn error_history_is_scoped_to_task_type() {
    let catalog = Arc::new(
        ModelCatalog::new(vec![
            profile("a", true, TaskType::Search, 0.8),
            profile("b", true, TaskType::Search, 0.7),
        ])
        .unwrap(),
    );
    let metrics = Arc::new(MetricsStore::new());
    // Errors recorded for a *different* task type must not demote "a" for
    // search.
    for _ in 0..20 {
        metrics
            .record(&ModelCall::new(
                "a",
                TaskType::Summarization,
                500.0,
                CallOutcome::Error,
            ))
            .await;
    }
    let router = ModelRouter::new(catalog, metrics);

    let selection = router
        .select(&spec(TaskType::Search), &SelectOptions::default())
        .await
        .unwrap();
    assert_eq!(selection.primary.id, "a");
}

#[tokio::test]
async fn disabled_profile_serves_when_no_default_satisfies() {
    let mut only_capable = profile("capable", false, TaskType::Extraction, 0.6);
    only_capable.supports_tools = true;
    let catalog = Arc::new(
        ModelCatalog::new(vec![
            profile("default-a", true, TaskType::Extraction, 0.9),
            only_capable,
        ])
        .unwrap(),
    );
    let router = ModelRouter::new(catalog, Arc::new(MetricsStore::new()));

    let selection = router
        .select(
            &spec(TaskType::Extraction).with_requirements(CapabilityRequirements {
                tools: true,
                ..Default::default()
            }),
            &SelectOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(selection.primary.id, "capable");
}

#[tokio::test]
async fn allowlist_reshapes_tier_one() {
    // With only the local model allow-listed, it becomes the sole
    // enabled-by-default profile and wins tier 1 for a spec it satisfies.
    let catalog = Arc::new(ModelCatalog::builtin().with_allowlist("local-llama"));
    let router = ModelRouter::new(catalog, Arc::new(MetricsStore::new()));

    let selection = router
        .select(&spec(TaskType::Summarization), &SelectOptions::default())
        .await
        .unwrap();
    assert_eq!(selection.primary.id, "local-llama");
}

#[tokio::test]
async fn priority_shows_up_in_the_reason_tag() {
    let catalog = Arc::new(ModelCatalog::builtin());
    let router = ModelRouter::new(catalog, Arc::new(MetricsStore::new()));

    let selection = router
        .select(
            &spec(TaskType::TradingDecision).with_priority(Priority::Cost),
            &SelectOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(selection.reason, "auto:trading_decision:cost");
    assert!(!selection.candidates.is_empty());
    assert_eq!(selection.primary.id, selection.candidates[0].id);
}

#[tokio::test]
async fn snapshot_reflects_recorded_traffic() {
    let metrics = MetricsStore::new();
    metrics
        .record(
            &ModelCall::new("m1", TaskType::Search, 400.0, CallOutcome::Success).with_cost(0.002),
        )
        .await;
    metrics
        .record(&ModelCall::new(
            "m1",
            TaskType::Search,
            600.0,
            CallOutcome::FallbackError,
        ))
        .await;

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    let row = &snapshot[0];
    assert_eq!(row.model_id, "m1");
    assert_eq!(row.stats.calls, 2);
    assert_eq!(row.stats.errors, 1);
    // 0.2 * 600 + 0.8 * 400
    assert!((row.stats.ewma_latency_ms - 440.0).abs() < 1e-9);
    assert_eq!(row.stats.ewma_cost, Some(0.002));
}
