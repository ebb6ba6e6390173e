//! Ordered strategies for container actions and terminals
//!
//! An operation is tried route by route. A route either finishes it, hands
//! over to the next route with a reason, or fails it outright. Hand-over is
//! decided from structured error kinds, never from message text.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use fleetdeck_api::models::{ContainerAction, HostDescriptor};
use fleetdeck_engine::EngineError;
use fleetdeck_exec::terminal::{CONTAINER_SHELL, is_valid_container_ref};
use fleetdeck_exec::{PtySize, RemoteShell, TerminalBridge, TerminalTarget};
use tracing::{info, instrument, warn};

use crate::error::CoreError;
use crate::pool::ConnectionPool;
use crate::registry::HostRegistry;

/// A way of reaching a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The engine API client
    EngineApi,
    /// The remote shell, driving the engine CLI
    RemoteShell,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineApi => f.write_str("engine-api"),
            Self::RemoteShell => f.write_str("remote-shell"),
        }
    }
}

/// Routes for lifecycle actions
pub const ACTION_ROUTES: &[Route] = &[Route::EngineApi, Route::RemoteShell];

/// Routes for a shell inside a container
pub const CONTAINER_TERMINAL_ROUTES: &[Route] = &[Route::EngineApi, Route::RemoteShell];

/// Routes for a host login shell
pub const HOST_TERMINAL_ROUTES: &[Route] = &[Route::RemoteShell];

/// Result of trying one route
#[derive(Debug)]
pub enum Attempt<T> {
    /// The route completed the operation
    Done(T),
    /// The route cannot serve this request; try the next one
    Fallback(String),
    /// The operation failed and must not be retried elsewhere
    Failed(CoreError),
}

impl<T> Attempt<T> {
    /// Classify an engine result
    fn from_engine(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(e) if e.is_fallback_trigger() => Attempt::Fallback(e.to_string()),
            Err(e) => Attempt::Failed(CoreError::Engine(e)),
        }
    }
}

/// Try each route in order until one finishes or fails the operation
///
/// # Errors
/// Returns the failing route's error, or `CoreError::NoRouteSucceeded` when
/// every route fell through
pub async fn run_routes<T, F, Fut>(
    operation: &str,
    routes: &[Route],
    mut attempt: F,
) -> Result<(T, Route), CoreError>
where
    F: FnMut(Route) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut reason = String::from("no routes configured");
    for &route in routes {
        match attempt(route).await {
            Attempt::Done(value) => return Ok((value, route)),
            Attempt::Fallback(why) => {
                info!(operation, route = %route, reason = %why, "route unavailable, falling back");
                reason = why;
            }
            Attempt::Failed(e) => return Err(e),
        }
    }
    warn!(operation, reason = %reason, "all routes exhausted");
    Err(CoreError::NoRouteSucceeded {
        operation: operation.to_string(),
        reason,
    })
}

/// Performs container actions and opens terminals through the route lists
pub struct ContainerController {
    registry: Arc<HostRegistry>,
    pool: Arc<ConnectionPool>,
    shell: Arc<dyn RemoteShell>,
}

impl ContainerController {
    #[must_use]
    pub fn new(
        registry: Arc<HostRegistry>,
        pool: Arc<ConnectionPool>,
        shell: Arc<dyn RemoteShell>,
    ) -> Self {
        Self {
            registry,
            pool,
            shell,
        }
    }

    fn host(&self, host_id: &str) -> Result<HostDescriptor, CoreError> {
        self.registry
            .get(host_id)
            .ok_or_else(|| CoreError::HostNotFound(host_id.to_string()))
    }

    /// Apply a lifecycle action, returning the route that carried it out
    ///
    /// # Errors
    /// Returns an error for unsafe container ids, unknown hosts, or when no
    /// route could perform the action
    #[instrument(skip(self), fields(host = %host_id, container = %container_id, action = %action))]
    pub async fn perform(
        &self,
        host_id: &str,
        container_id: &str,
        action: ContainerAction,
    ) -> Result<Route, CoreError> {
        if !is_valid_container_ref(container_id) {
            return Err(CoreError::InvalidContainerRef(container_id.to_string()));
        }
        let host = self.host(host_id)?;

        let (_, route) = run_routes(action.as_str(), ACTION_ROUTES, |route| {
            self.try_action(route, &host, container_id, action)
        })
        .await?;
        info!(route = %route, "container action applied");
        Ok(route)
    }

    async fn try_action(
        &self,
        route: Route,
        host: &HostDescriptor,
        container_id: &str,
        action: ContainerAction,
    ) -> Attempt<()> {
        match route {
            Route::EngineApi => match self.pool.get(&host.id) {
                Ok(engine) => Attempt::from_engine(engine.apply_action(container_id, action).await),
                Err(e) => Attempt::Fallback(e.to_string()),
            },
            Route::RemoteShell => {
                let cmd = format!("docker {} {container_id}", action.as_str());
                match self.shell.run_command(host, &cmd).await {
                    Ok(result) if result.success() => Attempt::Done(()),
                    Ok(result) => Attempt::Failed(CoreError::CommandFailed {
                        action: action.to_string(),
                        output: result.combined_output(),
                    }),
                    Err(e) => Attempt::Failed(CoreError::Shell(e)),
                }
            }
        }
    }

    /// Open a shell inside a container
    ///
    /// # Errors
    /// Returns an error for unsafe container ids, unknown hosts, or when no
    /// route could open the terminal
    #[instrument(skip(self), fields(host = %host_id, container = %container_id))]
    pub async fn open_container_terminal(
        &self,
        host_id: &str,
        container_id: &str,
        size: PtySize,
    ) -> Result<(TerminalBridge, Route), CoreError> {
        if !is_valid_container_ref(container_id) {
            return Err(CoreError::InvalidContainerRef(container_id.to_string()));
        }
        let host = self.host(host_id)?;

        run_routes("container terminal", CONTAINER_TERMINAL_ROUTES, |route| {
            self.try_container_terminal(route, &host, container_id, size)
        })
        .await
    }

    async fn try_container_terminal(
        &self,
        route: Route,
        host: &HostDescriptor,
        container_id: &str,
        size: PtySize,
    ) -> Attempt<TerminalBridge> {
        match route {
            Route::EngineApi => match self.pool.get(&host.id) {
                Ok(engine) => {
                    let command = vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        CONTAINER_SHELL.to_string(),
                    ];
                    Attempt::from_engine(engine.exec_terminal(container_id, command, size).await)
                }
                Err(e) => Attempt::Fallback(e.to_string()),
            },
            Route::RemoteShell => match self
                .shell
                .open_terminal(
                    host,
                    TerminalTarget::ContainerExec(container_id.to_string()),
                    size,
                )
                .await
            {
                Ok(bridge) => Attempt::Done(bridge),
                Err(e) => Attempt::Failed(CoreError::Shell(e)),
            },
        }
    }

    /// Open a login shell on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts or when the shell cannot be opened
    #[instrument(skip(self), fields(host = %host_id))]
    pub async fn open_host_terminal(
        &self,
        host_id: &str,
        size: PtySize,
    ) -> Result<TerminalBridge, CoreError> {
        let host = self.host(host_id)?;
        let (bridge, _) = run_routes("host terminal", HOST_TERMINAL_ROUTES, |route| {
            let host = &host;
            async move {
                match route {
                    Route::RemoteShell => {
                        match self
                            .shell
                            .open_terminal(host, TerminalTarget::HostShell, size)
                            .await
                        {
                            Ok(bridge) => Attempt::Done(bridge),
                            Err(e) => Attempt::Failed(CoreError::Shell(e)),
                        }
                    }
                    Route::EngineApi => {
                        Attempt::Fallback("engine API cannot reach the host shell".to_string())
                    }
                }
            }
        })
        .await?;
        Ok(bridge)
    }
}

impl fmt::Debug for ContainerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerController")
            .field("shell", &self.shell.shell_type())
            .finish_non_exhaustive()
    }
}
