//! Validated image updates
//!
//! A new image is proven in a throwaway copy of the container before the
//! original is touched. The copy runs without published ports or a restart
//! policy; if it comes up healthy the original is replaced by a container
//! with the original configuration, otherwise the original keeps running.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetdeck_engine::{ContainerDetails, ContainerEngine, EngineError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, error, info, instrument, warn};

/// Stages of an update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStep {
    Inspecting,
    Pulling,
    ValidatingHealth,
    Deciding,
    Swapping,
    RollingBack,
    Done,
    Failed,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inspecting => "inspecting",
            Self::Pulling => "pulling",
            Self::ValidatingHealth => "validating_health",
            Self::Deciding => "deciding",
            Self::Swapping => "swapping",
            Self::RollingBack => "rolling_back",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Timing of an update run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Deadline for the image pull
    pub pull_timeout: Duration,
    /// How long the validation copy may take to become healthy
    pub validation_window: Duration,
    /// Time between validation polls
    pub poll_interval: Duration,
    /// Running time after which a copy without a health check counts as healthy
    pub grace_period: Duration,
    /// Deadline for removing the validation copy
    pub cleanup_timeout: Duration,
    /// Grace given to the original when stopping it
    pub stop_grace: Duration,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_secs(5 * 60),
            validation_window: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            cleanup_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// A successful update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub name: String,
    pub image: String,
    pub previous_id: String,
    pub new_id: String,
}

/// Why an update stopped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("host not connected: {0}")]
    NotConnected(String),

    #[error("failed to inspect container: {0}")]
    Inspect(EngineError),

    #[error("failed to pull image: {0}")]
    Pull(EngineError),

    #[error("failed to create validation container: {0}")]
    CreateValidation(EngineError),

    #[error("failed to start validation container: {0}")]
    StartValidation(EngineError),

    #[error("validation container not healthy after {waited:?}")]
    ValidationTimeout { waited: Duration },

    #[error("validation container unhealthy: {reason}")]
    ValidationUnhealthy { reason: String },

    #[error("failed to stop original container: {0}")]
    StopOriginal(EngineError),

    #[error("failed to remove original container: {0}")]
    RemoveOriginal(EngineError),

    #[error("original container removed but replacement could not be created: {0}")]
    CreateReplacement(EngineError),

    #[error("replacement container created but failed to start: {0}")]
    StartReplacement(EngineError),

    #[error("update still {step} after {waited:?}, left to finish in the background")]
    DeadlineExceeded { step: UpdateStep, waited: Duration },

    #[error("update task ended abnormally: {0}")]
    Aborted(String),
}

impl UpdateError {
    /// Stage the run was in when it failed
    #[must_use]
    pub fn step(&self) -> UpdateStep {
        match self {
            Self::NotConnected(_) | Self::Inspect(_) => UpdateStep::Inspecting,
            Self::Pull(_) => UpdateStep::Pulling,
            Self::CreateValidation(_) | Self::StartValidation(_) => UpdateStep::ValidatingHealth,
            Self::ValidationTimeout { .. } | Self::ValidationUnhealthy { .. } => {
                UpdateStep::RollingBack
            }
            Self::StopOriginal(_)
            | Self::RemoveOriginal(_)
            | Self::CreateReplacement(_)
            | Self::StartReplacement(_) => UpdateStep::Swapping,
            Self::DeadlineExceeded { step, .. } => *step,
            Self::Aborted(_) => UpdateStep::Failed,
        }
    }

    /// Whether the original container no longer exists
    ///
    /// Such failures need manual attention: the service is down until a
    /// container is created again.
    #[must_use]
    pub fn original_removed(&self) -> bool {
        matches!(
            self,
            Self::CreateReplacement(_) | Self::StartReplacement(_)
        )
    }
}

/// Outcome of watching a validation container
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Healthy(String),
    Unhealthy(String),
    TimedOut(Duration),
}

/// Runs validated updates against one engine
#[derive(Debug, Clone, Default)]
pub struct UpdateEngine {
    policy: UpdatePolicy,
}

impl UpdateEngine {
    #[must_use]
    pub fn new(policy: UpdatePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    /// Run an update on its own task
    ///
    /// The run is owned by the task: dropping the returned `UpdateTask`, or
    /// giving up on it with [`UpdateTask::wait`], never interrupts a swap
    /// half way.
    pub fn spawn(
        &self,
        engine: Arc<dyn ContainerEngine>,
        container_id: impl Into<String>,
    ) -> UpdateTask {
        let (progress, step) = watch::channel(UpdateStep::Inspecting);
        let updater = self.clone();
        let container_id = container_id.into();
        let handle = tokio::spawn(async move {
            updater
                .run_reporting(engine, &container_id, Some(progress))
                .await
        });
        UpdateTask { handle, step }
    }

    /// Update a container to the latest version of its image
    ///
    /// Dropping this future still removes the validation container, but may
    /// leave a swap incomplete; use [`UpdateEngine::spawn`] when the caller
    /// can go away.
    ///
    /// # Errors
    /// Returns the failing stage's `UpdateError`. Unless
    /// `original_removed()` is set, the original container is unchanged.
    pub async fn run(
        &self,
        engine: Arc<dyn ContainerEngine>,
        container_id: &str,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.run_reporting(engine, container_id, None).await
    }

    #[instrument(skip(self, engine, progress), fields(container = %container_id))]
    async fn run_reporting(
        &self,
        engine: Arc<dyn ContainerEngine>,
        container_id: &str,
        progress: Option<watch::Sender<UpdateStep>>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let mut run = Run::start(container_id, progress);

        let original = engine
            .inspect_container(container_id)
            .await
            .map_err(|e| run.fail(UpdateError::Inspect(e)))?;
        let image = original.image().to_string();
        if image.is_empty() {
            return Err(run.fail(UpdateError::Inspect(EngineError::NotFound(format!(
                "{container_id} has no image reference"
            )))));
        }

        run.enter(UpdateStep::Pulling);
        match timeout(self.policy.pull_timeout, engine.pull_image(&image)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(run.fail(UpdateError::Pull(e))),
            Err(_) => return Err(run.fail(UpdateError::Pull(EngineError::Timeout))),
        }

        run.enter(UpdateStep::ValidatingHealth);
        let verdict = self
            .validate(&engine, &original)
            .await
            .map_err(|e| run.fail(e))?;

        run.enter(UpdateStep::Deciding);
        match verdict {
            Verdict::Healthy(reason) => debug!(reason = %reason, "validation passed"),
            Verdict::Unhealthy(reason) => {
                run.enter(UpdateStep::RollingBack);
                return Err(run.fail(UpdateError::ValidationUnhealthy { reason }));
            }
            Verdict::TimedOut(waited) => {
                run.enter(UpdateStep::RollingBack);
                return Err(run.fail(UpdateError::ValidationTimeout { waited }));
            }
        }

        run.enter(UpdateStep::Swapping);
        let new_id = self
            .swap(engine.as_ref(), &original)
            .await
            .map_err(|e| run.fail(e))?;

        run.enter(UpdateStep::Done);
        info!(image = %image, new_id = %new_id, "container updated");
        Ok(UpdateOutcome {
            name: original.name,
            image,
            previous_id: original.id,
            new_id,
        })
    }

    /// Run a throwaway copy of the original and judge it
    ///
    /// The copy is always removed before returning.
    async fn validate(
        &self,
        engine: &Arc<dyn ContainerEngine>,
        original: &ContainerDetails,
    ) -> Result<Verdict, UpdateError> {
        let name = format!("{}-validate-{}", original.name, Utc::now().timestamp());
        let validation_id = engine
            .create_container(&name, &original.spec.for_validation())
            .await
            .map_err(UpdateError::CreateValidation)?;
        debug!(validation = %validation_id, name = %name, "validation container created");
        let copy = ValidationCopy {
            engine: Arc::clone(engine),
            id: validation_id,
            cleanup_timeout: self.policy.cleanup_timeout,
            removed: false,
        };

        let verdict = match engine.start_container(&copy.id).await {
            Ok(()) => Ok(self.watch(engine.as_ref(), &copy.id).await),
            Err(e) => Err(UpdateError::StartValidation(e)),
        };

        copy.remove().await;
        verdict
    }

    /// Poll the validation copy until it proves itself or the window closes
    async fn watch(&self, engine: &dyn ContainerEngine, id: &str) -> Verdict {
        let started = Instant::now();
        let deadline = started + self.policy.validation_window;
        let mut ticker = interval_at(started + self.policy.poll_interval, self.policy.poll_interval);

        loop {
            ticker.tick().await;
            if Instant::now() > deadline {
                return Verdict::TimedOut(started.elapsed());
            }
            match engine.inspect_container(id).await {
                Ok(details) => {
                    if let Some(verdict) =
                        judge(&details, started.elapsed(), self.policy.grace_period)
                    {
                        return verdict;
                    }
                }
                Err(e) => {
                    return Verdict::Unhealthy(format!("validation container vanished: {e}"));
                }
            }
        }
    }

    /// Replace the original with a fresh container of the same configuration
    async fn swap(
        &self,
        engine: &dyn ContainerEngine,
        original: &ContainerDetails,
    ) -> Result<String, UpdateError> {
        engine
            .stop_container(&original.id, self.policy.stop_grace)
            .await
            .map_err(UpdateError::StopOriginal)?;
        engine
            .remove_container(&original.id, true)
            .await
            .map_err(UpdateError::RemoveOriginal)?;

        let new_id = engine
            .create_container(&original.name, &original.spec)
            .await
            .map_err(UpdateError::CreateReplacement)?;
        engine
            .start_container(&new_id)
            .await
            .map_err(UpdateError::StartReplacement)?;
        Ok(new_id)
    }
}

/// Judge one inspection of the validation copy; `None` means keep waiting
fn judge(details: &ContainerDetails, running_for: Duration, grace: Duration) -> Option<Verdict> {
    if !details.running {
        // a clean exit counts as healthy
        return Some(if details.exit_code == 0 {
            Verdict::Healthy("exited with code 0".to_string())
        } else {
            Verdict::Unhealthy(format!("exited with code {}", details.exit_code))
        });
    }
    match details.health.as_deref() {
        Some("healthy") => Some(Verdict::Healthy("health check passed".to_string())),
        Some("unhealthy") => Some(Verdict::Unhealthy("health check failed".to_string())),
        Some(_) => None,
        None if running_for > grace => Some(Verdict::Healthy(format!(
            "running for {}s without a health check",
            running_for.as_secs()
        ))),
        None => None,
    }
}

/// Step tracking and transition logging for one run
struct Run {
    container: String,
    step: UpdateStep,
    progress: Option<watch::Sender<UpdateStep>>,
}

impl Run {
    fn start(container: &str, progress: Option<watch::Sender<UpdateStep>>) -> Self {
        info!(container = %container, step = %UpdateStep::Inspecting, "update started");
        Self {
            container: container.to_string(),
            step: UpdateStep::Inspecting,
            progress,
        }
    }

    fn enter(&mut self, step: UpdateStep) {
        info!(container = %self.container, from = %self.step, to = %step, "update step");
        self.step = step;
        if let Some(progress) = &self.progress {
            progress.send_replace(step);
        }
    }

    fn fail(&mut self, err: UpdateError) -> UpdateError {
        error!(
            container = %self.container,
            step = %self.step,
            original_removed = err.original_removed(),
            error = %err,
            "update failed"
        );
        self.step = UpdateStep::Failed;
        if let Some(progress) = &self.progress {
            progress.send_replace(UpdateStep::Failed);
        }
        err
    }
}

/// An update running on its own task
#[derive(Debug)]
pub struct UpdateTask {
    handle: JoinHandle<Result<UpdateOutcome, UpdateError>>,
    step: watch::Receiver<UpdateStep>,
}

impl UpdateTask {
    /// Stage the run is currently in
    #[must_use]
    pub fn step(&self) -> UpdateStep {
        *self.step.borrow()
    }

    /// Wait for the run to finish, giving up after `deadline`
    ///
    /// Giving up does not stop the run.
    ///
    /// # Errors
    /// Returns the run's own `UpdateError`, or `DeadlineExceeded` carrying
    /// the stage the run was in when the deadline passed.
    pub async fn wait(mut self, deadline: Duration) -> Result<UpdateOutcome, UpdateError> {
        match timeout(deadline, &mut self.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(UpdateError::Aborted(e.to_string())),
            Err(_) => {
                let step = self.step();
                warn!(step = %step, waited = ?deadline, "update deadline passed, run continues");
                Err(UpdateError::DeadlineExceeded {
                    step,
                    waited: deadline,
                })
            }
        }
    }
}

/// The throwaway container of a run
///
/// Removed explicitly once judged; if the run is dropped first, removal is
/// handed to a background task.
struct ValidationCopy {
    engine: Arc<dyn ContainerEngine>,
    id: String,
    cleanup_timeout: Duration,
    removed: bool,
}

impl ValidationCopy {
    async fn remove(mut self) {
        remove_validation(self.engine.as_ref(), &self.id, self.cleanup_timeout).await;
        self.removed = true;
    }
}

impl Drop for ValidationCopy {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let engine = Arc::clone(&self.engine);
        let id = std::mem::take(&mut self.id);
        let cleanup_timeout = self.cleanup_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(validation = %id, "update cancelled, removing validation container");
                runtime.spawn(async move {
                    remove_validation(engine.as_ref(), &id, cleanup_timeout).await;
                });
            }
            Err(_) => {
                error!(validation = %id, "update cancelled outside a runtime, validation container left behind");
            }
        }
    }
}

/// Force-remove a validation container; failures are logged only
async fn remove_validation(engine: &dyn ContainerEngine, id: &str, cleanup_timeout: Duration) {
    match timeout(cleanup_timeout, engine.remove_container(id, true)).await {
        Ok(Ok(())) => debug!(validation = %id, "validation container removed"),
        Ok(Err(e)) => {
            warn!(validation = %id, error = %e, "failed to remove validation container");
        }
        Err(_) => warn!(validation = %id, "validation container removal timed out"),
    }
}
