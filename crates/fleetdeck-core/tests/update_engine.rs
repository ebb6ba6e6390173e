mod common;

use std::time::Duration;

use fleetdeck_core::*;
use fleetdeck_engine::{ContainerConfig, ContainerDetails, ContainerSpec, EngineError};

use common::*;

const ORIGINAL_ID: &str = "orig00000001";

fn original() -> ContainerDetails {
    ContainerDetails {
        id: ORIGINAL_ID.to_string(),
        name: "web".to_string(),
        running: true,
        spec: ContainerSpec {
            config: ContainerConfig {
                image: Some("nginx:1.27".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

fn validation(running: bool, exit_code: i64, health: Option<&str>) -> ContainerDetails {
    ContainerDetails {
        id: VALIDATION_ID.to_string(),
        name: "web-validate".to_string(),
        running,
        exit_code,
        health: health.map(str::to_string),
        ..Default::default()
    }
}

fn engine_with(validation_details: ContainerDetails) -> std::sync::Arc<MockEngine> {
    let engine = MockEngine::new(EngineState::default());
    engine.set_details(ORIGINAL_ID, original());
    engine.set_details(VALIDATION_ID, validation_details);
    engine
}

#[tokio::test(start_paused = true)]
async fn test_healthy_validation_swaps_container() {
    let engine = engine_with(validation(true, 0, Some("healthy")));
    let outcome = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap();

    assert_eq!(outcome.previous_id, ORIGINAL_ID);
    assert_eq!(outcome.new_id, REPLACEMENT_ID);
    assert_eq!(outcome.name, "web");
    assert_eq!(outcome.image, "nginx:1.27");

    let calls = engine.calls();
    let position = |call: &str| {
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("missing call {call}: {calls:?}"))
    };
    assert!(position("pull:nginx:1.27") < position("create:validation"));
    assert!(position(&format!("start:{VALIDATION_ID}")) < position(&format!("remove:{VALIDATION_ID}")));
    assert!(position(&format!("remove:{VALIDATION_ID}")) < position(&format!("stop:{ORIGINAL_ID}")));
    assert!(position(&format!("stop:{ORIGINAL_ID}")) < position(&format!("remove:{ORIGINAL_ID}")));
    assert!(position(&format!("remove:{ORIGINAL_ID}")) < position("create:web"));
    assert!(position("create:web") < position(&format!("start:{REPLACEMENT_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_failed_validation_leaves_original_untouched() {
    let engine = engine_with(validation(false, 1, None));
    let err = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::ValidationUnhealthy { .. }));
    assert_eq!(err.step(), UpdateStep::RollingBack);
    assert!(!err.original_removed());

    assert!(engine.called(&format!("remove:{VALIDATION_ID}")));
    assert!(!engine.called(&format!("stop:{ORIGINAL_ID}")));
    assert!(!engine.called(&format!("remove:{ORIGINAL_ID}")));
    assert!(!engine.called("create:web"));
}

#[tokio::test(start_paused = true)]
async fn test_clean_exit_counts_as_healthy() {
    let engine = engine_with(validation(false, 0, None));
    let outcome = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap();
    assert_eq!(outcome.new_id, REPLACEMENT_ID);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_health_check_rolls_back() {
    let engine = engine_with(validation(true, 0, Some("unhealthy")));
    let err = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::ValidationUnhealthy { .. }));
    assert!(engine.called(&format!("remove:{VALIDATION_ID}")));
    assert!(!engine.called(&format!("stop:{ORIGINAL_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_validation_times_out_while_starting() {
    let engine = engine_with(validation(true, 0, Some("starting")));
    let err = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap_err();

    match err {
        UpdateError::ValidationTimeout { waited } => {
            assert!(waited >= Duration::from_secs(30));
            assert!(waited < Duration::from_secs(32));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(engine.called(&format!("remove:{VALIDATION_ID}")));
    assert!(!engine.called(&format!("stop:{ORIGINAL_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_running_without_health_check_passes_after_grace() {
    let engine = engine_with(validation(true, 0, None));
    let outcome = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap();
    assert_eq!(outcome.new_id, REPLACEMENT_ID);

    // polled once per second until the grace period was exceeded
    let polls = engine
        .calls()
        .iter()
        .filter(|c| *c == &format!("inspect:{VALIDATION_ID}"))
        .count();
    assert_eq!(polls, 6);
}

#[tokio::test(start_paused = true)]
async fn test_replacement_failure_is_flagged() {
    let engine = engine_with(validation(true, 0, Some("healthy")));
    engine.state.lock().unwrap().create_replacement_error = Some(EngineError::Api {
        status: 409,
        message: "name already in use".into(),
    });

    let err = UpdateEngine::default()
        .run(engine.clone(), ORIGINAL_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::CreateReplacement(_)));
    assert_eq!(err.step(), UpdateStep::Swapping);
    assert!(err.original_removed());
}

#[tokio::test(start_paused = true)]
async fn test_missing_container_fails_at_inspect() {
    let engine = MockEngine::new(EngineState::default());
    let err = UpdateEngine::default()
        .run(engine.clone(), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::Inspect(EngineError::NotFound(_))));
    assert_eq!(err.step(), UpdateStep::Inspecting);
    assert!(engine.calls().iter().all(|c| !c.starts_with("pull:")));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_still_removes_validation_container() {
    let engine = engine_with(validation(true, 0, Some("starting")));
    let updater = UpdateEngine::default();

    let cancelled = tokio::time::timeout(
        Duration::from_secs(5),
        updater.run(engine.clone(), ORIGINAL_ID),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(engine.called(&format!("remove:{VALIDATION_ID}")));
    assert!(!engine.called(&format!("stop:{ORIGINAL_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_reports_step_and_swap_completes() {
    let engine = engine_with(validation(true, 0, Some("healthy")));
    engine.state.lock().unwrap().create_replacement_delay = Some(Duration::from_secs(120));

    let err = UpdateEngine::default()
        .spawn(engine.clone(), ORIGINAL_ID)
        .wait(Duration::from_secs(60))
        .await
        .unwrap_err();
    match err {
        UpdateError::DeadlineExceeded { step, waited } => {
            assert_eq!(step, UpdateStep::Swapping);
            assert_eq!(waited, Duration::from_secs(60));
        }
        other => panic!("expected deadline, got {other:?}"),
    }
    assert!(engine.called(&format!("remove:{ORIGINAL_ID}")));
    assert!(!engine.called(&format!("start:{REPLACEMENT_ID}")));

    // the run carries on after the caller gave up
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(engine.called(&format!("start:{REPLACEMENT_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_task_finishes_update() {
    let engine = engine_with(validation(true, 0, Some("healthy")));
    let task = UpdateEngine::default().spawn(engine.clone(), ORIGINAL_ID);
    drop(task);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(engine.called(&format!("start:{REPLACEMENT_ID}")));
    assert!(engine.called(&format!("remove:{VALIDATION_ID}")));
}

#[tokio::test(start_paused = true)]
async fn test_spawned_task_returns_outcome() {
    let engine = engine_with(validation(false, 0, None));
    let task = UpdateEngine::default().spawn(engine.clone(), ORIGINAL_ID);
    let outcome = task.wait(Duration::from_secs(600)).await.unwrap();
    assert_eq!(outcome.new_id, REPLACEMENT_ID);
}
