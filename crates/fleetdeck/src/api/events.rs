//! Real-time fleet events over server-sent events and WebSocket
//!
//! Both transports carry the same `{"type": ..., "data": ...}` envelopes the
//! hub broadcasts every tick.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use fleetdeck_api::events::WsEvent;
use fleetdeck_core::{PushError, PushSubscriber};
use futures::stream::{SplitSink, Stream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::api::error::AppError;
use crate::state::AppState;

/// Envelopes buffered per server-sent events client before drops
const SSE_BUFFER: usize = 32;

/// Subscribe to fleet envelopes as server-sent events
///
/// A client that falls behind loses envelopes rather than slowing others.
pub async fn sse_events(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.fleet.subscribe(SSE_BUFFER).await?;
    debug!(subscriber = subscription.id, "sse client subscribed");

    let events = futures::stream::unfold(subscription.receiver, |mut receiver| async move {
        let text = receiver.recv().await?;
        Some((Ok(Event::default().data(&*text)), receiver))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Subscribe to fleet envelopes over a WebSocket
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_socket(socket, state))
}

/// Writes hub envelopes straight into the socket
struct SocketSubscriber {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl PushSubscriber for SocketSubscriber {
    async fn push(&mut self, text: &str) -> Result<(), PushError> {
        self.sink
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| PushError(e.to_string()))
    }
}

async fn handle_event_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    // current containers first so the client does not wait for a tick
    let initial = WsEvent::Containers(state.fleet.list_containers().await);
    match serde_json::to_string(&initial) {
        Ok(text) => {
            if sink.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize initial snapshot"),
    }

    let id = match state
        .fleet
        .subscribe_push(Box::new(SocketSubscriber { sink }))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to register websocket subscriber");
            return;
        }
    };
    info!(subscriber = id, "websocket client subscribed");

    // the client only ever closes; anything else it sends is ignored
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    if let Err(e) = state.fleet.unsubscribe(id).await {
        debug!(subscriber = id, error = %e, "unsubscribe after close failed");
    }
    info!(subscriber = id, "websocket client disconnected");
}
