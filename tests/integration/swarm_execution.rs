//! Staged execution, failure isolation, deadlines, and parallelism
//! diagnostics, end to end.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hive::registry::{CommandWorker, RegistryWorker, WorkerRegistry};
use hive::swarm::{SwarmScheduler, SCHEDULER_OVERHEAD_STEPS};
use hive::Error;

use tokio_test::assert_ok;

use crate::fixtures::{task, task_with_deps, ScriptedWorker};

const DEADLINE: Duration = Duration::from_secs(30);

#[tokio::test]
async fn fan_out_fan_in_produces_exactly_two_stages() {
    let scheduler = SwarmScheduler::new();
    let tasks = vec![
        task("t1", "tech"),
        task("t2", "news"),
        task_with_deps("t3", "synth", &["t1", "t2"]),
    ];

    let trace = scheduler
        .run(tasks, Arc::new(ScriptedWorker::new()), DEADLINE)
        .await
        .unwrap();

    assert_eq!(trace.stages.len(), 2);
    let stage1: HashSet<&str> = trace.stages[0]
        .results
        .iter()
        .map(|r| r.task_id.as_str())
        .collect();
    assert_eq!(stage1, HashSet::from(["t1", "t2"]));
    assert_eq!(trace.stages[1].results[0].task_id, "t3");
    // t3 saw both dependency results in its context.
    assert_eq!(
        trace.stages[1].results[0].outcome.output(),
        Some("t3 done deps=2")
    );
}

#[tokio::test]
async fn stage_one_runs_concurrently_not_serially() {
    // Three 100ms tasks in one stage should take ~100ms, not ~300ms.
    let scheduler = SwarmScheduler::new();
    let worker = ScriptedWorker::new()
        .delay("a", Duration::from_millis(100))
        .delay("b", Duration::from_millis(100))
        .delay("c", Duration::from_millis(100));

    let started = Instant::now();
    let trace = scheduler
        .run(
            vec![task("a", "w"), task("b", "w"), task("c", "w")],
            Arc::new(worker),
            DEADLINE,
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(trace.stages.len(), 1);
    assert!(
        elapsed < Duration::from_millis(280),
        "stage took {:?}, tasks ran serially",
        elapsed
    );

    let metrics = trace.metrics();
    assert!(metrics.latency_reduction > 1.5);
    assert!(!metrics.serial_collapse);
}

#[tokio::test]
async fn cycle_raises_before_any_stage_executes() {
    let scheduler = SwarmScheduler::new();
    let result = scheduler
        .run(
            vec![
                task_with_deps("a", "w", &["b"]),
                task_with_deps("b", "w", &["a"]),
            ],
            Arc::new(ScriptedWorker::new()),
            DEADLINE,
        )
        .await;

    match result {
        Err(Error::CircularDependency { remaining }) => {
            assert_eq!(remaining, vec!["a", "b"]);
        }
        _ => panic!("Expected CircularDependency"),
    }
}

#[tokio::test]
async fn deadline_shorter_than_slowest_task_fails() {
    let scheduler = SwarmScheduler::new();
    let worker = ScriptedWorker::new().delay("slow", Duration::from_secs(60));

    let started = Instant::now();
    let result = scheduler
        .run(
            vec![task("fast", "w"), task("slow", "w")],
            Arc::new(worker),
            Duration::from_millis(100),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
}

#[tokio::test]
async fn serial_collapse_flag_tracks_task_count() {
    for (count, expected) in [(0usize, true), (1, true), (2, true), (3, false), (10, false)] {
        let scheduler = SwarmScheduler::new();
        let tasks: Vec<_> = (0..count)
            .map(|i| task(&format!("t{}", i), "w"))
            .collect();
        let trace = scheduler
            .run(tasks, Arc::new(ScriptedWorker::new()), DEADLINE)
            .await
            .unwrap();
        assert_eq!(
            trace.metrics().serial_collapse,
            expected,
            "collapse flag wrong for {} tasks",
            count
        );
    }
}

#[tokio::test]
async fn empty_graph_completes_immediately() {
    let scheduler = SwarmScheduler::new();
    let trace = assert_ok!(
        scheduler
            .run(Vec::new(), Arc::new(ScriptedWorker::new()), DEADLINE)
            .await
    );
    assert!(trace.stages.is_empty());
    assert_eq!(trace.wall_clock, Duration::ZERO);
    assert_eq!(trace.metrics().critical_steps, SCHEDULER_OVERHEAD_STEPS);
}

#[tokio::test]
async fn failed_specialist_does_not_block_the_graph() {
    let scheduler = SwarmScheduler::new();
    let worker = ScriptedWorker::new().fail("risk");
    let tasks = vec![
        task("tech", "w"),
        task("risk", "w"),
        task_with_deps("decision", "w", &["tech", "risk"]),
    ];

    let trace = scheduler.run(tasks, Arc::new(worker), DEADLINE).await.unwrap();

    assert_eq!(trace.stages.len(), 2);
    let risk = trace.results().find(|r| r.task_id == "risk").unwrap();
    assert!(risk.is_failure());
    let decision = trace.results().find(|r| r.task_id == "decision").unwrap();
    assert!(!decision.is_failure());
}

#[tokio::test]
async fn unknown_worker_id_is_an_isolated_task_failure() {
    // Through the registry seam, a task naming an unregistered worker
    // fails alone; the rest of the graph still executes.
    let mut registry = WorkerRegistry::new();
    registry.register(
        "shell",
        Arc::new(CommandWorker::new("sh", vec!["-c".to_string(), "echo ok".to_string()]).unwrap()),
    );
    let worker = Arc::new(RegistryWorker::new(Arc::new(registry)));

    let scheduler = SwarmScheduler::new();
    let trace = scheduler
        .run(
            vec![task("good", "shell"), task("orphan", "ghost")],
            worker,
            DEADLINE,
        )
        .await
        .unwrap();

    let good = trace.results().find(|r| r.task_id == "good").unwrap();
    assert_eq!(good.outcome.output(), Some("ok"));
    let orphan = trace.results().find(|r| r.task_id == "orphan").unwrap();
    assert!(orphan.is_failure());
}

#[tokio::test]
async fn subprocess_pipeline_passes_dependency_output_downstream() {
    // Producers emit payloads on stdout; the consumer (`cat`) reads the
    // rendered dependency context from stdin.
    let mut registry = WorkerRegistry::new();
    registry.register(
        "producer",
        Arc::new(
            CommandWorker::new("sh", vec!["-c".to_string(), "echo payload-$$".to_string()])
                .unwrap(),
        ),
    );
    registry.register(
        "consumer",
        Arc::new(CommandWorker::new("sh", vec!["-c".to_string(), "cat".to_string()]).unwrap()),
    );
    let worker = Arc::new(RegistryWorker::new(Arc::new(registry)));

    let scheduler = SwarmScheduler::new();
    let trace = scheduler
        .run(
            vec![
                task("p1", "producer"),
                task("p2", "producer"),
                task_with_deps("sink", "consumer", &["p1", "p2"]),
            ],
            worker,
            DEADLINE,
        )
        .await
        .unwrap();

    assert_eq!(trace.stages.len(), 2);
    let sink = trace.results().find(|r| r.task_id == "sink").unwrap();
    let output = sink.outcome.output().unwrap();
    assert!(output.contains("### p1 ###"));
    assert!(output.contains("### p2 ###"));
    assert!(output.contains("payload-"));
}

#[tokio::test]
async fn plan_matches_executed_stages() {
    let tasks = vec![
        task("a", "w"),
        task_with_deps("b", "w", &["a"]),
        task_with_deps("c", "w", &["a"]),
        task_with_deps("d", "w", &["b", "c"]),
    ];

    let scheduler = SwarmScheduler::new();
    let planned = scheduler.plan(tasks.clone()).unwrap();
    let trace = scheduler
        .run(tasks, Arc::new(ScriptedWorker::new()), DEADLINE)
        .await
        .unwrap();

    let executed: Vec<Vec<String>> = trace
        .stages
        .iter()
        .map(|stage| {
            let mut ids: Vec<String> =
                stage.results.iter().map(|r| r.task_id.clone()).collect();
            ids.sort();
            ids
        })
        .collect();
    assert_eq!(planned, executed);
}

#[tokio::test]
async fn bottleneck_and_critical_steps_reflect_the_slow_specialist() {
    let scheduler = SwarmScheduler::new();
    let worker = ScriptedWorker::new()
        .delay("slow", Duration::from_millis(150))
        .steps("slow", 6)
        .steps("fast", 2)
        .steps("sink", 3);
    let tasks = vec![
        task("fast", "w"),
        task("slow", "w"),
        task_with_deps("sink", "w", &["fast", "slow"]),
    ];

    let trace = scheduler.run(tasks, Arc::new(worker), DEADLINE).await.unwrap();
    let metrics = trace.metrics();

    assert_eq!(metrics.total_tasks, 3);
    // overhead + max(6, 2) + 3
    assert_eq!(metrics.critical_steps, SCHEDULER_OVERHEAD_STEPS + 9);
    let bottleneck = metrics.bottleneck.unwrap();
    assert_eq!(bottleneck.task_id, "slow");
    assert!(bottleneck.latency >= Duration::from_millis(150));
}
