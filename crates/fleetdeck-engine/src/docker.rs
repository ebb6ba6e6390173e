//! Docker Engine API client using the bollard crate

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use chrono::{DateTime, Utc};
use fleetdeck_api::models::{ContainerState, HostDescriptor, PortMapping};
use fleetdeck_exec::terminal::{PtySize, TerminalBridge, TerminalInput};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::error::EngineError;
use crate::traits::{ContainerEngine, EngineConnector};
use crate::types::{
    BlkioEntry, ContainerDetails, ContainerListing, ContainerSpec, EngineInfo, ImageDetails,
    NetworkCounters, RawStatsSample,
};

/// Default per-request timeout applied by the HTTP client, in seconds
pub const DEFAULT_CLIENT_TIMEOUT: u64 = 120;

/// Engine client for one host
#[derive(Debug, Clone)]
pub struct DockerEngine {
    host_id: String,
    docker: Docker,
}

impl DockerEngine {
    /// Wrap an existing bollard client
    pub fn new(host_id: impl Into<String>, docker: Docker) -> Self {
        Self {
            host_id: host_id.into(),
            docker,
        }
    }

    /// Host this client talks to
    pub fn host_id(&self) -> &str {
        &self.host_id
    }
}

fn strip_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        // zero value reported for containers that never started
        .filter(|dt| dt.timestamp() > 0)
}

fn listing_from_summary(summary: bollard::models::ContainerSummary) -> ContainerListing {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| strip_name(n))
        .unwrap_or_default();

    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PortMapping {
            private: p.private_port,
            public: p.public_port,
            kind: p.typ.map(|t| t.to_string()).unwrap_or_else(|| "tcp".to_string()),
        })
        .collect();

    let networks = summary
        .network_settings
        .and_then(|ns| ns.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| (name, endpoint.ip_address.unwrap_or_default()))
        .collect();

    ContainerListing {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        created: summary.created.unwrap_or_default(),
        ports,
        labels: summary.labels.unwrap_or_default(),
        networks,
        mounts: summary.mounts.map_or(0, |m| m.len()),
    }
}

fn details_from_inspect(inspect: bollard::models::ContainerInspectResponse) -> ContainerDetails {
    let state = inspect.state.unwrap_or_default();
    let health = state
        .health
        .and_then(|h| h.status)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty() && s != "none");
    let config = inspect.config.unwrap_or_default();
    let labels = config.labels.clone().unwrap_or_default();

    ContainerDetails {
        id: inspect.id.unwrap_or_default(),
        name: inspect.name.as_deref().map(strip_name).unwrap_or_default(),
        state: state
            .status
            .map(|s| ContainerState::from_engine(&s.to_string())),
        running: state.running.unwrap_or(false),
        exit_code: state.exit_code.unwrap_or_default(),
        health,
        started_at: state.started_at.as_deref().and_then(parse_timestamp),
        labels,
        spec: ContainerSpec {
            config,
            host_config: inspect.host_config.unwrap_or_default(),
        },
    }
}

fn sample_from_stats(stats: bollard::container::Stats) -> RawStatsSample {
    let networks = stats
        .networks
        .unwrap_or_default()
        .into_values()
        .map(|n| NetworkCounters {
            rx_bytes: n.rx_bytes,
            tx_bytes: n.tx_bytes,
        })
        .collect();

    let blkio = stats
        .blkio_stats
        .io_service_bytes_recursive
        .unwrap_or_default()
        .into_iter()
        .map(|e| BlkioEntry {
            op: e.op,
            value: e.value,
        })
        .collect();

    RawStatsSample {
        cpu_total: stats.cpu_stats.cpu_usage.total_usage,
        precpu_total: stats.precpu_stats.cpu_usage.total_usage,
        system_cpu: stats.cpu_stats.system_cpu_usage,
        presystem_cpu: stats.precpu_stats.system_cpu_usage,
        online_cpus: stats.cpu_stats.online_cpus,
        percpu_count: stats
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map_or(0, Vec::len),
        memory_usage: stats.memory_stats.usage,
        memory_limit: stats.memory_stats.limit,
        networks,
        blkio,
    }
}

fn grace_secs(grace: Duration) -> i64 {
    i64::try_from(grace.as_secs()).unwrap_or(i64::MAX)
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn info(&self) -> Result<EngineInfo, EngineError> {
        let info = self.docker.info().await?;
        Ok(EngineInfo {
            mem_total: info.mem_total.map_or(0, |m| u64::try_from(m).unwrap_or(0)),
            ncpu: info.ncpu.map_or(0, |n| u64::try_from(n).unwrap_or(0)),
        })
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerListing>, EngineError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        debug!(count = summaries.len(), "listed containers");
        Ok(summaries.into_iter().map(listing_from_summary).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self.docker.inspect_container(id, None).await?;
        Ok(details_from_inspect(inspect))
    }

    async fn stats(&self, id: &str) -> Result<RawStatsSample, EngineError> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(stats)) => Ok(sample_from_stats(stats)),
            Some(Err(e)) => Err(e.into()),
            None => Err(EngineError::Stream(format!("no stats sample for {id}"))),
        }
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: grace_secs(grace),
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn restart_container(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let options = RestartContainerOptions {
            t: isize::try_from(grace.as_secs()).unwrap_or(isize::MAX),
        };
        self.docker
            .restart_container(id, Some(options))
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker.pause_container(id).await.map_err(Into::into)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker.unpause_container(id).await.map_err(Into::into)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self, spec), fields(host = %self.host_id))]
    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let mut config: Config<String> = spec.config.clone().into();
        config.host_config = Some(spec.host_config.clone());

        let created = self.docker.create_container(Some(options), config).await?;
        for warning in &created.warnings {
            warn!(container = %name, warning = %warning, "engine warning on create");
        }
        Ok(created.id)
    }

    #[instrument(skip(self), fields(host = %self.host_id))]
    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "pull progress");
                    }
                }
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code,
                    message,
                }) => {
                    return Err(bollard::errors::Error::DockerResponseServerError {
                        status_code,
                        message,
                    }
                    .into());
                }
                Err(e) => return Err(EngineError::Stream(e.to_string())),
            }
        }

        info!(image = %image, "image pulled");
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageDetails, EngineError> {
        let inspect = self.docker.inspect_image(image).await?;
        Ok(ImageDetails {
            id: inspect.id.unwrap_or_default(),
            repo_digests: inspect.repo_digests.unwrap_or_default(),
        })
    }

    async fn registry_digest(&self, image: &str) -> Result<String, EngineError> {
        let distribution = self.docker.inspect_registry_image(image, None).await?;
        distribution
            .descriptor
            .digest
            .filter(|d| !d.is_empty())
            .ok_or_else(|| EngineError::NotFound(format!("no registry digest for {image}")))
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<Vec<String>, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            lines.extend(chunk.to_string().lines().map(str::to_string));
        }
        Ok(lines)
    }

    async fn follow_logs(
        &self,
        id: &str,
        tail: u32,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError> {
        // surface a missing container before handing out a stream
        self.docker.inspect_container(id, None).await?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let stream = self
            .docker
            .logs(id, Some(options))
            .map(|chunk| {
                chunk
                    .map(|c| c.to_string().trim_end_matches('\n').to_string())
                    .map_err(|e| EngineError::Stream(e.to_string()))
            })
            .boxed();
        Ok(stream)
    }

    #[instrument(skip(self, command), fields(host = %self.host_id))]
    async fn exec_terminal(
        &self,
        id: &str,
        command: Vec<String>,
        size: PtySize,
    ) -> Result<TerminalBridge, EngineError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    env: Some(vec!["TERM=xterm-256color".to_string()]),
                    cmd: Some(command),
                    ..Default::default()
                },
            )
            .await?;

        let StartExecResults::Attached {
            mut output,
            mut input,
        } = self.docker.start_exec(&exec.id, None).await?
        else {
            return Err(EngineError::Stream("exec started detached".to_string()));
        };

        let resize = ResizeExecOptions {
            height: size.rows,
            width: size.cols,
        };
        if let Err(e) = self.docker.resize_exec(&exec.id, resize).await {
            debug!(error = %e, "initial exec resize failed");
        }

        let (bridge, mut ends) = TerminalBridge::pair();
        let docker = self.docker.clone();
        let exec_id = exec.id;
        let container = id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    chunk = output.next() => match chunk {
                        Some(Ok(chunk)) => {
                            if ends.output.send(chunk.into_bytes().to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            debug!(container = %container, error = %e, "exec output failed");
                            break;
                        }
                        None => break,
                    },
                    msg = ends.input.recv() => match msg {
                        Some(TerminalInput::Data(bytes)) => {
                            if input.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Some(TerminalInput::Resize(size)) => {
                            let resize = ResizeExecOptions {
                                height: size.rows,
                                width: size.cols,
                            };
                            if let Err(e) = docker.resize_exec(&exec_id, resize).await {
                                debug!(container = %container, error = %e, "exec resize failed");
                            }
                        }
                        None => break,
                    },
                }
            }
            if let Err(e) = input.shutdown().await {
                debug!(container = %container, error = %e, "exec input shutdown failed");
            }
            info!(container = %container, "exec terminal closed");
        });

        Ok(bridge)
    }

    fn engine_type(&self) -> &'static str {
        "docker"
    }
}

/// Connects to local sockets and remote HTTP endpoints
#[derive(Debug, Clone)]
pub struct DockerConnector {
    timeout_secs: u64,
}

impl Default for DockerConnector {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

impl DockerConnector {
    /// Create a connector with a custom client timeout
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    fn client_for(&self, host: &HostDescriptor) -> Result<Docker, EngineError> {
        let address = host.address.trim();

        if let Some(path) = address.strip_prefix("unix://") {
            return Docker::connect_with_socket(path, self.timeout_secs, API_DEFAULT_VERSION)
                .map_err(|e| EngineError::Config(e.to_string()));
        }

        if host.is_local && address.is_empty() {
            return Docker::connect_with_local_defaults()
                .map_err(|e| EngineError::Config(e.to_string()));
        }

        if address.starts_with("https://") {
            return Err(EngineError::Config(format!(
                "TLS engine endpoints are not supported: {address}"
            )));
        }

        if address.is_empty() {
            return Err(EngineError::Config(format!(
                "no engine address for host {}",
                host.id
            )));
        }

        Docker::connect_with_http(address, self.timeout_secs, API_DEFAULT_VERSION)
            .map_err(|e| EngineError::Config(e.to_string()))
    }
}

impl EngineConnector for DockerConnector {
    fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        let docker = self.client_for(host)?;
        info!(host = %host.id, address = %host.address, "engine client created");
        Ok(Arc::new(DockerEngine::new(host.id.clone(), docker)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_name() {
        assert_eq!(strip_name("/web"), "web");
        assert_eq!(strip_name("db"), "db");
    }

    #[test]
    fn test_zero_start_time_is_none() {
        assert!(parse_timestamp("0001-01-01T00:00:00Z").is_none());
        assert!(parse_timestamp("2024-05-01T10:00:00.123456789Z").is_some());
    }

    #[test]
    fn test_listing_conversion() {
        let summary = bollard::models::ContainerSummary {
            id: Some("0123456789abcdef".to_string()),
            names: Some(vec!["/web".to_string()]),
            image: Some("nginx:1.27".to_string()),
            state: Some("running".to_string()),
            status: Some("Up 2 hours".to_string()),
            ports: Some(vec![bollard::models::Port {
                ip: None,
                private_port: 80,
                public_port: Some(8080),
                typ: Some(bollard::models::PortTypeEnum::TCP),
            }]),
            ..Default::default()
        };

        let listing = listing_from_summary(summary);
        assert_eq!(listing.name, "web");
        assert_eq!(listing.ports[0].public, Some(8080));
        assert_eq!(listing.ports[0].kind, "tcp");
        assert_eq!(listing.mounts, 0);
    }

    #[test]
    fn test_connector_rejects_tls_and_empty_remote() {
        let connector = DockerConnector::default();
        let tls = HostDescriptor::new("a", "A", "https://a:2376", false);
        assert!(matches!(
            connector.connect(&tls),
            Err(EngineError::Config(_))
        ));
        let empty = HostDescriptor::new("b", "B", "", false);
        assert!(matches!(
            connector.connect(&empty),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connector_builds_http_client_lazily() {
        let connector = DockerConnector::default();
        let host = HostDescriptor::new("nas", "NAS", "tcp://192.0.2.10:2375", false);
        let engine = connector.connect(&host).unwrap();
        assert_eq!(engine.engine_type(), "docker");
    }
}
