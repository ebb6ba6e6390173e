//! WebSocket client for the fleetdeck event feed

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use fleetdeck_api::events::WsEvent;

use crate::error::{ClientError, Result};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// WebSocket client for receiving live events from the fleetdeck daemon
#[derive(Debug)]
pub struct WsClient {
    url: Url,
    receiver: mpsc::Receiver<WsEvent>,
    task_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Connect to the WebSocket endpoint
    ///
    /// Automatically reconnects on connection loss with exponential backoff.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetdeck_client::WsClient;
    /// use fleetdeck_api::events::WsEvent;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut client = WsClient::connect("ws://localhost:8080/ws/events").await?;
    ///
    /// while let Some(event) = client.recv().await {
    ///     if let WsEvent::Containers(containers) = event {
    ///         println!("{} containers", containers.len());
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::unused_async)]
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::WebSocket(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        let (tx, rx) = mpsc::channel(100);

        let task_url = url.clone();
        let task_handle = tokio::spawn(async move {
            Self::connection_loop(task_url, tx).await;
        });

        Ok(Self {
            url,
            receiver: rx,
            task_handle,
        })
    }

    /// Endpoint this client follows
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Receive the next event from the stream
    ///
    /// Returns `None` once the connection loop has stopped.
    pub async fn recv(&mut self) -> Option<WsEvent> {
        self.receiver.recv().await
    }

    /// Connection loop with auto-reconnection
    async fn connection_loop(url: Url, tx: mpsc::Sender<WsEvent>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match Self::connect_and_receive(&url, &tx, &mut backoff).await {
                Ok(()) => {
                    tracing::debug!("event receiver dropped, stopping");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?backoff, "event feed lost, reconnecting");
                    sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
            if tx.is_closed() {
                break;
            }
        }
    }

    /// Connect and forward events until the socket fails or the receiver goes away
    async fn connect_and_receive(
        url: &Url,
        tx: &mpsc::Sender<WsEvent>,
        backoff: &mut Duration,
    ) -> Result<()> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))?;

        tracing::info!(url = %url, "event feed connected");
        *backoff = INITIAL_BACKOFF;

        let (_write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| ClientError::WebSocket(e.to_string()))?;

            match msg {
                Message::Text(text) => match serde_json::from_str::<WsEvent>(&text) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse event");
                    }
                },
                Message::Close(_) => {
                    return Err(ClientError::ConnectionClosed(
                        "server closed connection".into(),
                    ));
                }
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }

        Err(ClientError::ConnectionClosed("stream ended".into()))
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[tokio::test]
    async fn test_rejects_http_scheme() {
        let err = WsClient::connect("http://localhost:8080/ws/events")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WebSocket(_)));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = WsClient::connect("not a url").await.unwrap_err();
        assert!(matches!(err, ClientError::Url(_)));
    }
}
