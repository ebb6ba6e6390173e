//! Container log endpoints

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use fleetdeck_api::events::WsEvent;
use fleetdeck_api::requests::LogsQuery;
use fleetdeck_api::responses::LogsResponse;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::api::error::AppError;
use crate::state::AppState;

/// Last lines of a container's log
#[utoipa::path(
    get,
    path = "/api/logs/{host}/{id}",
    tag = "logs",
    params(
        ("host" = String, Path, description = "Host id"),
        ("id" = String, Path, description = "Container id or name"),
        ("tail" = Option<u32>, Query, description = "Number of lines, 100 by default")
    ),
    responses((status = 200, description = "Log lines", body = LogsResponse))
)]
pub async fn tail_logs(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, AppError> {
    let lines = state.fleet.container_logs(&host, &id, query.tail).await?;
    Ok(Json(LogsResponse { lines }))
}

/// Follow a container's log as server-sent `log` envelopes
///
/// The stream ends when the container stops or the engine connection drops.
pub async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let lines = state.fleet.stream_logs(&host, &id, query.tail).await?;

    let events = lines
        .take_while(move |line| {
            let keep = line.is_ok();
            if let Err(e) = line {
                debug!(error = %e, "log stream ended");
            }
            futures::future::ready(keep)
        })
        .filter_map(|line| async move {
            let line = line.ok()?;
            let text = serde_json::to_string(&WsEvent::Log(line)).ok()?;
            Some(Ok(Event::default().data(text)))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
