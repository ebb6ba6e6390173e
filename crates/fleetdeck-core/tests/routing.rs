mod common;

use std::sync::Arc;

use fleetdeck_api::models::ContainerAction;
use fleetdeck_core::*;
use fleetdeck_engine::EngineError;
use fleetdeck_exec::{ExecError, PtySize};

use common::*;

const ID: &str = "abc123def456";

fn controller(engine: Arc<MockEngine>, shell: Arc<MockShell>) -> ContainerController {
    let registry = Arc::new(HostRegistry::new(vec![host("nas")]));
    let pool = Arc::new(ConnectionPool::new(
        registry.clone(),
        MockConnector::with(vec![("nas", engine)]),
    ));
    ContainerController::new(registry, pool, shell)
}

#[tokio::test]
async fn test_action_uses_engine_api_first() {
    let engine = MockEngine::new(EngineState::default());
    let shell = MockShell::ok("");
    let route = controller(engine.clone(), shell.clone())
        .perform("nas", ID, ContainerAction::Restart)
        .await
        .unwrap();

    assert_eq!(route, Route::EngineApi);
    assert!(engine.called(&format!("restart:{ID}")));
    assert!(shell.commands().is_empty());
}

#[tokio::test]
async fn test_unreachable_engine_falls_back_to_shell() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::Unreachable("connection refused".into())),
        ..Default::default()
    });
    let shell = MockShell::ok(ID);
    let route = controller(engine, shell.clone())
        .perform("nas", ID, ContainerAction::Restart)
        .await
        .unwrap();

    assert_eq!(route, Route::RemoteShell);
    assert_eq!(shell.commands(), vec![format!("nas: docker restart {ID}")]);
}

#[tokio::test]
async fn test_rejected_request_falls_back_to_shell() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::Rejected {
            status: 403,
            message: "authorization denied by plugin".into(),
        }),
        ..Default::default()
    });
    let shell = MockShell::ok("");
    let route = controller(engine, shell.clone())
        .perform("nas", ID, ContainerAction::Stop)
        .await
        .unwrap();

    assert_eq!(route, Route::RemoteShell);
    assert_eq!(shell.commands(), vec![format!("nas: docker stop {ID}")]);
}

#[tokio::test]
async fn test_not_found_does_not_fall_back() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::NotFound(ID.into())),
        ..Default::default()
    });
    let shell = MockShell::ok("");
    let err = controller(engine, shell.clone())
        .perform("nas", ID, ContainerAction::Start)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Engine(EngineError::NotFound(_))));
    assert!(err.is_not_found());
    assert!(shell.commands().is_empty());
}

#[tokio::test]
async fn test_failed_shell_command_reports_output() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::Timeout),
        ..Default::default()
    });
    let shell = Arc::new(MockShell {
        status: 1,
        stdout: "Error response from daemon: No such container".into(),
        ..Default::default()
    });
    let err = controller(engine, shell)
        .perform("nas", ID, ContainerAction::Restart)
        .await
        .unwrap_err();

    match err {
        CoreError::CommandFailed { action, output } => {
            assert_eq!(action, "restart");
            assert!(output.contains("No such container"));
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shell_transport_error_is_returned() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::Timeout),
        ..Default::default()
    });
    let shell = Arc::new(MockShell {
        fail: Some(ExecError::ConnectionFailed("no route to host".into())),
        ..Default::default()
    });
    let err = controller(engine, shell)
        .perform("nas", ID, ContainerAction::Restart)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Shell(_)));
}

#[tokio::test]
async fn test_unsafe_container_ref_is_rejected() {
    let engine = MockEngine::new(EngineState::default());
    let shell = MockShell::ok("");
    let err = controller(engine.clone(), shell.clone())
        .perform("nas", "abc; reboot", ContainerAction::Stop)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidContainerRef(_)));
    assert!(err.is_invalid_input());
    assert!(engine.calls().is_empty());
    assert!(shell.commands().is_empty());
}

#[tokio::test]
async fn test_unknown_host_is_not_found() {
    let engine = MockEngine::new(EngineState::default());
    let err = controller(engine, MockShell::ok(""))
        .perform("attic", ID, ContainerAction::Stop)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::HostNotFound(_)));
}

#[tokio::test]
async fn test_container_terminal_falls_back_to_shell() {
    let engine = MockEngine::new(EngineState {
        action_error: Some(EngineError::Unreachable("refused".into())),
        ..Default::default()
    });
    let shell = MockShell::ok("");
    let (_bridge, route) = controller(engine.clone(), shell.clone())
        .open_container_terminal("nas", ID, PtySize::container_default())
        .await
        .unwrap();

    assert_eq!(route, Route::RemoteShell);
    assert!(engine.called(&format!("exec:{ID}")));
    assert_eq!(shell.commands().len(), 1);
    assert!(shell.commands()[0].contains("ContainerExec"));
}

#[tokio::test]
async fn test_host_terminal_goes_through_shell() {
    let engine = MockEngine::new(EngineState::default());
    let shell = MockShell::ok("");
    controller(engine.clone(), shell.clone())
        .open_host_terminal("nas", PtySize::host_default())
        .await
        .unwrap();

    assert!(engine.calls().is_empty());
    assert_eq!(shell.commands(), vec!["nas: terminal HostShell".to_string()]);
}
