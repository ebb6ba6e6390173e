//! Container query and control endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use fleetdeck_api::models::{
    ContainerAction, ContainerSnapshot, ContainerStatsSnapshot, StackSummary,
};
use fleetdeck_api::requests::{SearchQuery, StacksQuery};
use fleetdeck_api::responses::{ActionResponse, UpdateResponse};
use tracing::info;

use crate::api::error::AppError;
use crate::state::AppState;

/// Every container across the fleet, sorted by name
#[utoipa::path(
    get,
    path = "/api/containers",
    tag = "containers",
    responses((status = 200, description = "Fleet-wide container list", body = Vec<ContainerSnapshot>))
)]
pub async fn list_containers(State(state): State<Arc<AppState>>) -> Json<Vec<ContainerSnapshot>> {
    Json(state.fleet.list_containers().await)
}

/// Containers matching a free-text query
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "containers",
    params(("q" = String, Query, description = "Matched against name, image, host, stack and id")),
    responses((status = 200, description = "Matching containers", body = Vec<ContainerSnapshot>))
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<ContainerSnapshot>> {
    Json(state.fleet.search(&query.q).await)
}

/// Containers grouped by compose project
#[utoipa::path(
    get,
    path = "/api/stacks",
    tag = "containers",
    params(("hostId" = Option<String>, Query, description = "Limit to one host")),
    responses((status = 200, description = "Stacks", body = Vec<StackSummary>))
)]
pub async fn stacks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StacksQuery>,
) -> Json<Vec<StackSummary>> {
    Json(state.fleet.stacks(query.host_id.as_deref()).await)
}

/// Resource usage of every running container
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "containers",
    responses((status = 200, description = "Container stats", body = Vec<ContainerStatsSnapshot>))
)]
pub async fn all_stats(State(state): State<Arc<AppState>>) -> Json<Vec<ContainerStatsSnapshot>> {
    Json(state.fleet.all_stats().await)
}

/// Resource usage of one container
///
/// # Errors
/// Returns `AppError` if the host is unavailable or the container is unknown
#[utoipa::path(
    get,
    path = "/api/stats/{host}/{id}",
    tag = "containers",
    params(
        ("host" = String, Path, description = "Host id"),
        ("id" = String, Path, description = "Container id or name")
    ),
    responses(
        (status = 200, description = "Container stats", body = ContainerStatsSnapshot),
        (status = 404, description = "Unknown host or container", body = crate::api::error::ApiError)
    )
)]
pub async fn container_stats(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
) -> Result<Json<ContainerStatsSnapshot>, AppError> {
    Ok(Json(state.fleet.container_stats(&host, &id).await?))
}

/// Start, stop, restart, pause or unpause a container
///
/// # Errors
/// Returns `AppError` for unknown actions or when no route could apply it
#[utoipa::path(
    post,
    path = "/api/containers/{host}/{id}/{action}",
    tag = "containers",
    params(
        ("host" = String, Path, description = "Host id"),
        ("id" = String, Path, description = "Container id or name"),
        ("action" = ContainerAction, Path, description = "Lifecycle action")
    ),
    responses(
        (status = 200, description = "Action applied", body = ActionResponse),
        (status = 400, description = "Unknown action or unsafe id", body = crate::api::error::ApiError),
        (status = 502, description = "Every route failed", body = crate::api::error::ApiError)
    )
)]
pub async fn container_action(
    State(state): State<Arc<AppState>>,
    Path((host, id, action)): Path<(String, String, String)>,
) -> Result<Json<ActionResponse>, AppError> {
    let action: ContainerAction = action.parse()?;
    let route = state.fleet.container_action(&host, &id, action).await?;
    Ok(Json(ActionResponse::ok(format!(
        "{action} applied to {id} via {route}"
    ))))
}

/// Validated image update of one container
///
/// # Errors
/// Returns `AppError` describing the failed update stage
#[utoipa::path(
    post,
    path = "/api/containers/{host}/{id}/update",
    tag = "containers",
    params(
        ("host" = String, Path, description = "Host id"),
        ("id" = String, Path, description = "Container id or name")
    ),
    responses(
        (status = 200, description = "Container replaced", body = UpdateResponse),
        (status = 409, description = "New image failed validation; original untouched", body = crate::api::error::ApiError),
        (status = 502, description = "Update failed", body = crate::api::error::ApiError)
    )
)]
pub async fn update_container(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
) -> Result<Json<UpdateResponse>, AppError> {
    let outcome = state.fleet.update_container(&host, &id).await?;
    info!(host = %host, container = %outcome.name, image = %outcome.image, "update finished");
    Ok(Json(UpdateResponse {
        success: true,
        message: format!("{} updated to the latest {}", outcome.name, outcome.image),
        previous_id: outcome.previous_id,
        new_id: outcome.new_id,
    }))
}
