#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_api::models::{HostDescriptor, HostFileEntry};
use fleetdeck_core::config::AggregatorTimeouts;
use fleetdeck_core::*;
use fleetdeck_engine::{
    ContainerDetails, ContainerEngine, ContainerListing, ContainerSpec, EngineConnector,
    EngineError, EngineInfo, ImageDetails, RawStatsSample,
};
use fleetdeck_exec::{
    CommandResult, ExecError, PtySize, RemoteFiles, RemoteShell, TerminalBridge, TerminalTarget,
};
use futures::stream::{self, BoxStream};

pub const VALIDATION_ID: &str = "validation0001";
pub const REPLACEMENT_ID: &str = "replacement001";

// Mock engine

#[derive(Default)]
pub struct EngineState {
    pub listing: Vec<ContainerListing>,
    pub list_error: Option<EngineError>,
    pub list_delay: Option<Duration>,
    pub ping_error: Option<EngineError>,
    pub info: EngineInfo,
    pub samples: HashMap<String, RawStatsSample>,
    pub details: HashMap<String, ContainerDetails>,
    pub action_error: Option<EngineError>,
    pub create_replacement_error: Option<EngineError>,
    pub create_replacement_delay: Option<Duration>,
    pub repo_digests: Vec<String>,
    pub registry_digest: Option<String>,
}

#[derive(Default)]
pub struct MockEngine {
    pub state: Mutex<EngineState>,
    pub calls: Mutex<Vec<String>>,
    pub registry_queries: AtomicUsize,
}

impl MockEngine {
    pub fn new(state: EngineState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    pub fn set_details(&self, id: &str, details: ContainerDetails) {
        self.state
            .lock()
            .unwrap()
            .details
            .insert(id.to_string(), details);
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        match self.state.lock().unwrap().ping_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn info(&self) -> Result<EngineInfo, EngineError> {
        Ok(self.state.lock().unwrap().info)
    }

    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerListing>, EngineError> {
        let delay = self.state.lock().unwrap().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        match &state.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.listing.clone()),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        self.record(format!("inspect:{id}"));
        self.state
            .lock()
            .unwrap()
            .details
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    async fn stats(&self, id: &str) -> Result<RawStatsSample, EngineError> {
        self.state
            .lock()
            .unwrap()
            .samples
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("start:{id}"));
        match self.state.lock().unwrap().action_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), EngineError> {
        self.record(format!("stop:{id}"));
        match self.state.lock().unwrap().action_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn restart_container(&self, id: &str, _grace: Duration) -> Result<(), EngineError> {
        self.record(format!("restart:{id}"));
        match self.state.lock().unwrap().action_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("pause:{id}"));
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("unpause:{id}"));
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        self.record(format!("remove:{id}"));
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        _spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        if name.contains("-validate-") {
            self.record("create:validation".to_string());
            return Ok(VALIDATION_ID.to_string());
        }
        self.record(format!("create:{name}"));
        let delay = self.state.lock().unwrap().create_replacement_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state.lock().unwrap().create_replacement_error.clone() {
            Some(e) => Err(e),
            None => Ok(REPLACEMENT_ID.to_string()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("pull:{image}"));
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageDetails, EngineError> {
        Ok(ImageDetails {
            id: format!("img-{image}"),
            repo_digests: self.state.lock().unwrap().repo_digests.clone(),
        })
    }

    async fn registry_digest(&self, image: &str) -> Result<String, EngineError> {
        self.registry_queries.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .registry_digest
            .clone()
            .ok_or_else(|| EngineError::NotFound(image.to_string()))
    }

    async fn logs(&self, _id: &str, tail: u32) -> Result<Vec<String>, EngineError> {
        Ok((0..tail).map(|i| format!("line {i}")).collect())
    }

    async fn follow_logs(
        &self,
        _id: &str,
        _tail: u32,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError> {
        Ok(Box::pin(stream::iter(vec![Ok("hello".to_string())])))
    }

    async fn exec_terminal(
        &self,
        id: &str,
        _command: Vec<String>,
        _size: PtySize,
    ) -> Result<TerminalBridge, EngineError> {
        self.record(format!("exec:{id}"));
        match self.state.lock().unwrap().action_error.clone() {
            Some(e) => Err(e),
            None => Ok(TerminalBridge::pair().0),
        }
    }

    fn engine_type(&self) -> &'static str {
        "mock"
    }
}

/// Hands out preconfigured engines by host id
#[derive(Default)]
pub struct MockConnector {
    pub engines: Mutex<HashMap<String, Arc<MockEngine>>>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn with(engines: Vec<(&str, Arc<MockEngine>)>) -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(
                engines
                    .into_iter()
                    .map(|(id, e)| (id.to_string(), e))
                    .collect(),
            ),
            connects: AtomicUsize::new(0),
        })
    }
}

impl EngineConnector for MockConnector {
    fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.engines
            .lock()
            .unwrap()
            .get(&host.id)
            .cloned()
            .map(|e| e as Arc<dyn ContainerEngine>)
            .ok_or_else(|| EngineError::Config(format!("no engine for {}", host.id)))
    }
}

// Mock shell

#[derive(Default)]
pub struct MockShell {
    pub commands: Mutex<Vec<String>>,
    pub status: i32,
    pub stdout: String,
    pub fail: Option<ExecError>,
    pub delay: Option<Duration>,
}

impl MockShell {
    pub fn ok(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            stdout: stdout.to_string(),
            ..Default::default()
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run_command(
        &self,
        host: &HostDescriptor,
        cmd: &str,
    ) -> Result<CommandResult, ExecError> {
        self.commands
            .lock()
            .unwrap()
            .push(format!("{}: {cmd}", host.id));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        Ok(CommandResult {
            status: self.status,
            stdout: self.stdout.clone(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn open_terminal(
        &self,
        host: &HostDescriptor,
        target: TerminalTarget,
        _size: PtySize,
    ) -> Result<TerminalBridge, ExecError> {
        self.commands
            .lock()
            .unwrap()
            .push(format!("{}: terminal {target:?}", host.id));
        Ok(TerminalBridge::pair().0)
    }

    fn shell_type(&self) -> &'static str {
        "mock"
    }
}

#[derive(Default)]
pub struct MockFiles;

#[async_trait]
impl RemoteFiles for MockFiles {
    async fn list_dir(
        &self,
        _host: &HostDescriptor,
        path: &str,
    ) -> Result<Vec<HostFileEntry>, ExecError> {
        if !path.starts_with('/') {
            return Err(ExecError::InvalidPath(path.to_string()));
        }
        Ok(vec![HostFileEntry {
            name: "etc".into(),
            path: "/etc".into(),
            size: 4096,
            mod_time: None,
            is_dir: true,
        }])
    }

    async fn read_file(&self, _host: &HostDescriptor, _path: &str) -> Result<Vec<u8>, ExecError> {
        Ok(b"contents".to_vec())
    }

    async fn write_file(
        &self,
        _host: &HostDescriptor,
        _path: &str,
        _data: &[u8],
    ) -> Result<(), ExecError> {
        Ok(())
    }

    async fn make_dir(&self, _host: &HostDescriptor, _path: &str) -> Result<(), ExecError> {
        Ok(())
    }

    async fn remove_path(&self, _host: &HostDescriptor, _path: &str) -> Result<(), ExecError> {
        Ok(())
    }
}

/// Records every notification
#[derive(Default)]
pub struct RecordingNotifier {
    pub state_changes: Mutex<Vec<(String, StateChange)>>,
    pub resource_alerts: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify_state_change(&self, container: &str, change: StateChange) {
        self.state_changes
            .lock()
            .unwrap()
            .push((container.to_string(), change));
    }

    fn notify_high_resource(&self, container: &str, cpu_percent: f64, _memory_percent: f64) {
        if cpu_percent > 80.0 {
            self.resource_alerts
                .lock()
                .unwrap()
                .push(container.to_string());
        }
    }
}

// Fixtures

pub fn host(id: &str) -> HostDescriptor {
    HostDescriptor::new(id, id.to_uppercase(), format!("tcp://{id}.lan:2375"), false)
}

pub fn listing(id: &str, name: &str, state: &str) -> ContainerListing {
    ContainerListing {
        id: id.to_string(),
        name: name.to_string(),
        image: "nginx:1.27".to_string(),
        status: state.to_string(),
        state: state.to_string(),
        ..Default::default()
    }
}

pub fn sample(cpu_delta: u64, system_delta: u64, usage: u64, limit: u64) -> RawStatsSample {
    RawStatsSample {
        cpu_total: 1_000 + cpu_delta,
        precpu_total: 1_000,
        system_cpu: Some(100_000 + system_delta),
        presystem_cpu: Some(100_000),
        online_cpus: Some(1),
        memory_usage: Some(usage),
        memory_limit: Some(limit),
        ..Default::default()
    }
}

/// Components wired the way `Fleet` wires them, exposed for inspection
pub struct Harness {
    pub registry: Arc<HostRegistry>,
    pub pool: Arc<ConnectionPool>,
    pub health: Arc<HealthTracker>,
    pub disk: Arc<DiskUsage>,
    pub shell: Arc<MockShell>,
    pub notifier: Arc<RecordingNotifier>,
    pub aggregator: Aggregator,
}

pub fn harness(hosts: Vec<HostDescriptor>, engines: Vec<(&str, Arc<MockEngine>)>) -> Harness {
    harness_with_shell(hosts, engines, MockShell::ok(""))
}

pub fn harness_with_shell(
    hosts: Vec<HostDescriptor>,
    engines: Vec<(&str, Arc<MockEngine>)>,
    shell: Arc<MockShell>,
) -> Harness {
    let registry = Arc::new(HostRegistry::new(hosts));
    let pool = Arc::new(ConnectionPool::new(
        registry.clone(),
        MockConnector::with(engines),
    ));
    let health = Arc::new(HealthTracker::new(Duration::from_secs(30)));
    let disk = Arc::new(DiskUsage::new(
        shell.clone(),
        Duration::from_secs(30),
        Duration::from_secs(5),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let aggregator = Aggregator::new(
        registry.clone(),
        pool.clone(),
        health.clone(),
        disk.clone(),
        Arc::new(LifecycleTracker::new(3)),
        notifier.clone(),
        AggregatorTimeouts::default(),
    );
    Harness {
        registry,
        pool,
        health,
        disk,
        shell,
        notifier,
        aggregator,
    }
}
