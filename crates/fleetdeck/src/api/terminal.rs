//! Interactive terminals over WebSocket
//!
//! The browser sends `input` and `resize` messages and receives `output`,
//! `info` and `error` messages. Container shells prefer the engine's exec
//! API and fall back to the remote shell; host shells always use the remote
//! shell.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use fleetdeck_api::events::{TerminalClientMessage, TerminalServerMessage};
use fleetdeck_exec::{PtySize, TerminalBridge, TerminalInput};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Open a shell inside a container
pub async fn container_terminal(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |mut socket| async move {
        send(&mut socket, TerminalServerMessage::Info(format!("connecting to {id} on {host}"))).await;
        match state
            .fleet
            .open_container_terminal(&host, &id, PtySize::container_default())
            .await
        {
            Ok((bridge, route)) => {
                info!(host = %host, container = %id, route = %route, "container terminal opened");
                send(&mut socket, TerminalServerMessage::Info(format!("connected via {route}"))).await;
                pump(socket, bridge).await;
            }
            Err(e) => {
                warn!(host = %host, container = %id, error = %e, "container terminal failed");
                send(&mut socket, TerminalServerMessage::Error(e.to_string())).await;
            }
        }
    })
}

/// Open a login shell on a host
pub async fn host_terminal(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |mut socket| async move {
        send(&mut socket, TerminalServerMessage::Info(format!("connecting to {host}"))).await;
        match state
            .fleet
            .open_host_terminal(&host, PtySize::host_default())
            .await
        {
            Ok(bridge) => {
                info!(host = %host, "host terminal opened");
                pump(socket, bridge).await;
            }
            Err(e) => {
                warn!(host = %host, error = %e, "host terminal failed");
                send(&mut socket, TerminalServerMessage::Error(e.to_string())).await;
            }
        }
    })
}

async fn send(socket: &mut WebSocket, message: TerminalServerMessage) -> bool {
    let Ok(text) = serde_json::to_string(&message) else {
        return false;
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

/// Shuttle bytes between the socket and the session until either side ends
async fn pump(mut socket: WebSocket, mut bridge: TerminalBridge) {
    let mut pending = Vec::new();
    loop {
        tokio::select! {
            output = bridge.output.recv() => {
                let Some(bytes) = output else {
                    if !pending.is_empty() {
                        let tail = String::from_utf8_lossy(&pending).into_owned();
                        send(&mut socket, TerminalServerMessage::Output(tail)).await;
                    }
                    send(&mut socket, TerminalServerMessage::Info("session closed".to_string())).await;
                    break;
                };
                let text = decode_output(&mut pending, &bytes);
                if text.is_empty() {
                    continue;
                }
                if !send(&mut socket, TerminalServerMessage::Output(text)).await {
                    break;
                }
            }
            message = socket.recv() => {
                let input = match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str()) {
                        Ok(TerminalClientMessage::Input { data }) => TerminalInput::Data(data.into_bytes()),
                        Ok(TerminalClientMessage::Resize { cols, rows }) => {
                            TerminalInput::Resize(PtySize::new(cols, rows))
                        }
                        Err(e) => {
                            debug!(error = %e, "ignoring malformed terminal message");
                            continue;
                        }
                    },
                    Some(Ok(Message::Binary(bytes))) => TerminalInput::Data(bytes.to_vec()),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                if bridge.input.send(input).await.is_err() {
                    send(&mut socket, TerminalServerMessage::Info("session closed".to_string())).await;
                    break;
                }
            }
        }
    }
    debug!("terminal bridge closed");
}

/// Decode a chunk of terminal output, holding back a trailing partial character
///
/// Bytes that can never form valid UTF-8 are replaced with U+FFFD. An
/// incomplete sequence at the end stays in `pending` for the next chunk.
fn decode_output(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut text = String::with_capacity(pending.len());
    let mut rest = pending.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }
    let keep = rest.len();
    pending.drain(..pending.len() - keep);
    text
}
