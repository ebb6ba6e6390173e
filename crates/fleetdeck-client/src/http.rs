//! HTTP client for the fleetdeck daemon

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use fleetdeck_api::{
    models::{
        ContainerAction, ContainerSnapshot, ContainerStatsSnapshot, HostDescriptor,
        HostFileEntry, HostStatsSnapshot, ImageUpdateRecord, StackSummary,
    },
    requests::{MkdirRequest, UpsertHostRequest},
    responses::{ActionResponse, HealthResponse, LogsResponse, UpdateResponse, UpdatesResponse},
};

use crate::error::{ClientError, Result};

/// HTTP client for communicating with the fleetdeck daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetdeck_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self { client, base_url })
    }

    /// Base URL the client talks to
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// WebSocket URL of the live event feed
    ///
    /// # Errors
    /// Returns an error if the base URL scheme has no WebSocket counterpart.
    pub fn events_url(&self) -> Result<Url> {
        let mut url = self.endpoint(&["ws", "events"])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::WebSocket(format!("cannot derive a socket URL from {url}")))?;
        Ok(url)
    }

    /// Send a request and fail on non-success statuses
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_response(status.as_u16(), &body))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        Ok(self.send(self.client.get(url)).await?.json().await?)
    }

    async fn post<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        Ok(self.send(self.client.post(url)).await?.json().await?)
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get(self.endpoint(&["health"])?).await
    }

    // Container endpoints

    /// Every container across the fleet
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    ///
    /// # Example
    /// ```no_run
    /// # use fleetdeck_client::HttpClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// for container in client.containers().await? {
    ///     println!("{} on {}: {}", container.name, container.host_name, container.state);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn containers(&self) -> Result<Vec<ContainerSnapshot>> {
        self.get(self.endpoint(&["api", "containers"])?).await
    }

    /// Containers matching a free-text query
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn search(&self, query: &str) -> Result<Vec<ContainerSnapshot>> {
        let mut url = self.endpoint(&["api", "search"])?;
        url.query_pairs_mut().append_pair("q", query);
        self.get(url).await
    }

    /// Compose stacks, optionally limited to one host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn stacks(&self, host: Option<&str>) -> Result<Vec<StackSummary>> {
        let mut url = self.endpoint(&["api", "stacks"])?;
        if let Some(host) = host {
            url.query_pairs_mut().append_pair("hostId", host);
        }
        self.get(url).await
    }

    /// Resource usage of every running container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn stats(&self) -> Result<Vec<ContainerStatsSnapshot>> {
        self.get(self.endpoint(&["api", "stats"])?).await
    }

    /// Resource usage of one container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn container_stats(&self, host: &str, id: &str) -> Result<ContainerStatsSnapshot> {
        self.get(self.endpoint(&["api", "stats", host, id])?).await
    }

    /// Apply a lifecycle action to a container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    ///
    /// # Example
    /// ```no_run
    /// # use fleetdeck_client::HttpClient;
    /// # use fleetdeck_api::models::ContainerAction;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// let result = client.container_action("nas", "3f2a1c9b0d4e", ContainerAction::Restart).await?;
    /// println!("{}", result.message);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn container_action(
        &self,
        host: &str,
        id: &str,
        action: ContainerAction,
    ) -> Result<ActionResponse> {
        self.post(self.endpoint(&["api", "containers", host, id, action.as_str()])?)
            .await
    }

    /// Pull the latest image and swap the container after validating it
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    /// A failed validation arrives as `ClientError::Api` with status 409.
    pub async fn update_container(&self, host: &str, id: &str) -> Result<UpdateResponse> {
        self.post(self.endpoint(&["api", "containers", host, id, "update"])?)
            .await
    }

    /// Trailing log lines of a container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn logs(&self, host: &str, id: &str, tail: u32) -> Result<LogsResponse> {
        let mut url = self.endpoint(&["api", "logs", host, id])?;
        url.query_pairs_mut().append_pair("tail", &tail.to_string());
        self.get(url).await
    }

    // Host endpoints

    /// Per-host summaries, offline hosts included
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn hosts(&self) -> Result<Vec<HostStatsSnapshot>> {
        self.get(self.endpoint(&["api", "hosts"])?).await
    }

    /// Add a host or replace its descriptor
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn upsert_host(&self, id: &str, request: &UpsertHostRequest) -> Result<HostDescriptor> {
        let url = self.endpoint(&["api", "hosts", id])?;
        Ok(self
            .send(self.client.put(url).json(request))
            .await?
            .json()
            .await?)
    }

    /// Remove a host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn remove_host(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "hosts", id])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    /// List a directory on a host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn list_files(&self, host: &str, path: &str) -> Result<Vec<HostFileEntry>> {
        let mut url = self.endpoint(&["api", "hosts", host, "files"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.get(url).await
    }

    /// Download a file from a host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn read_file(&self, host: &str, path: &str) -> Result<Vec<u8>> {
        let mut url = self.endpoint(&["api", "hosts", host, "files", "content"])?;
        url.query_pairs_mut().append_pair("path", path);
        let response = self.send(self.client.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload a file to a host, replacing any existing file
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn write_file(&self, host: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let mut url = self.endpoint(&["api", "hosts", host, "files", "content"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.send(self.client.put(url).body(data)).await?;
        Ok(())
    }

    /// Create a directory on a host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn make_dir(&self, host: &str, path: &str) -> Result<()> {
        let url = self.endpoint(&["api", "hosts", host, "files", "mkdir"])?;
        let body = MkdirRequest {
            path: path.to_string(),
        };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    /// Remove a file or empty directory on a host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn remove_path(&self, host: &str, path: &str) -> Result<()> {
        let mut url = self.endpoint(&["api", "hosts", host, "files"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    // Update endpoints

    /// Update status of every running container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn updates(&self) -> Result<UpdatesResponse> {
        self.get(self.endpoint(&["api", "updates"])?).await
    }

    /// Check one container for a newer image
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn check_update(&self, host: &str, id: &str) -> Result<ImageUpdateRecord> {
        self.post(self.endpoint(&["api", "updates", host, id, "check"])?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new("http://localhost:8080");
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(HttpClient::new("not a url").is_err());
        assert!(HttpClient::new("mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_endpoint_building() {
        let client = HttpClient::new("http://localhost:8080").unwrap();
        let url = client.endpoint(&["api", "containers", "nas", "abc123", "restart"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/containers/nas/abc123/restart"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = HttpClient::new("http://localhost:8080/").unwrap();
        let url = client.endpoint(&["api", "hosts", "rack 1/a"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/hosts/rack%201%2Fa");
    }

    #[test]
    fn test_events_url_scheme() {
        let plain = HttpClient::new("http://localhost:8080").unwrap();
        assert_eq!(plain.events_url().unwrap().as_str(), "ws://localhost:8080/ws/events");

        let tls = HttpClient::new("https://fleet.example.com").unwrap();
        assert_eq!(tls.events_url().unwrap().as_str(), "wss://fleet.example.com/ws/events");
    }
}
