//! Image update check endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use fleetdeck_api::models::ImageUpdateRecord;
use fleetdeck_api::responses::UpdatesResponse;

use crate::api::error::AppError;
use crate::state::AppState;

/// Update status of every running container
///
/// Records younger than the cache lifetime are served without contacting
/// a registry.
#[utoipa::path(
    get,
    path = "/api/updates",
    tag = "updates",
    responses((status = 200, description = "Update records", body = UpdatesResponse))
)]
pub async fn list_updates(State(state): State<Arc<AppState>>) -> Json<UpdatesResponse> {
    Json(UpdatesResponse::new(state.fleet.check_updates().await))
}

/// Check one container for a newer image
#[utoipa::path(
    post,
    path = "/api/updates/{host}/{id}/check",
    tag = "updates",
    params(
        ("host" = String, Path, description = "Host id"),
        ("id" = String, Path, description = "Container id")
    ),
    responses(
        (status = 200, description = "Update record", body = ImageUpdateRecord),
        (status = 404, description = "Container not listed on the host", body = crate::api::error::ApiError)
    )
)]
pub async fn check_container(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
) -> Result<Json<ImageUpdateRecord>, AppError> {
    Ok(Json(state.fleet.check_container_update(&host, &id).await?))
}
