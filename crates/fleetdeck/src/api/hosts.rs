//! Host management and host file endpoints

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use fleetdeck_api::models::{HostDescriptor, HostFileEntry, HostStatsSnapshot};
use fleetdeck_api::requests::{FilesQuery, MkdirRequest, UpsertHostRequest};

use crate::api::error::{ApiError, AppError};
use crate::state::AppState;

/// Per-host summaries, offline hosts included
#[utoipa::path(
    get,
    path = "/api/hosts",
    tag = "hosts",
    responses((status = 200, description = "Host summaries in registry order", body = Vec<HostStatsSnapshot>))
)]
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Json<Vec<HostStatsSnapshot>> {
    Json(state.fleet.host_stats().await)
}

/// Add a host or replace its descriptor
#[utoipa::path(
    put,
    path = "/api/hosts/{host}",
    tag = "hosts",
    params(("host" = String, Path, description = "Host id")),
    request_body = UpsertHostRequest,
    responses(
        (status = 201, description = "Host added", body = HostDescriptor),
        (status = 200, description = "Host replaced", body = HostDescriptor),
        (status = 400, description = "Empty address", body = ApiError)
    )
)]
pub async fn upsert_host(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Json(req): Json<UpsertHostRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.address.trim().is_empty() && !req.is_local {
        return Err(AppError::bad_request("a remote host needs an address"));
    }
    let descriptor = HostDescriptor::new(host, req.name, req.address.trim(), req.is_local);
    let status = if state.fleet.upsert_host(descriptor.clone()) {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(descriptor)))
}

/// Remove a host
#[utoipa::path(
    delete,
    path = "/api/hosts/{host}",
    tag = "hosts",
    params(("host" = String, Path, description = "Host id")),
    responses(
        (status = 204, description = "Host removed"),
        (status = 404, description = "Unknown host", body = ApiError)
    )
)]
pub async fn remove_host(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.fleet.remove_host(&host) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("host not found: {host}"),
        )),
    }
}

/// List a directory on a host
#[utoipa::path(
    get,
    path = "/api/hosts/{host}/files",
    tag = "files",
    params(
        ("host" = String, Path, description = "Host id"),
        ("path" = Option<String>, Query, description = "Absolute directory path, `/` by default")
    ),
    responses(
        (status = 200, description = "Directories first, then files", body = Vec<HostFileEntry>),
        (status = 400, description = "Relative path", body = ApiError)
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Vec<HostFileEntry>>, AppError> {
    Ok(Json(state.fleet.list_host_files(&host, &query.path).await?))
}

/// Download a file from a host
#[utoipa::path(
    get,
    path = "/api/hosts/{host}/files/content",
    tag = "files",
    params(
        ("host" = String, Path, description = "Host id"),
        ("path" = String, Query, description = "Absolute file path")
    ),
    responses((status = 200, description = "File contents", body = Vec<u8>, content_type = "application/octet-stream"))
)]
pub async fn read_file(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.fleet.read_host_file(&host, &query.path).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

/// Upload a file to a host, replacing any existing file
#[utoipa::path(
    put,
    path = "/api/hosts/{host}/files/content",
    tag = "files",
    params(
        ("host" = String, Path, description = "Host id"),
        ("path" = String, Query, description = "Absolute file path")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses((status = 204, description = "File written"))
)]
pub async fn write_file(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Query(query): Query<FilesQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    state
        .fleet
        .write_host_file(&host, &query.path, &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a directory on a host
#[utoipa::path(
    post,
    path = "/api/hosts/{host}/files/mkdir",
    tag = "files",
    params(("host" = String, Path, description = "Host id")),
    request_body = MkdirRequest,
    responses((status = 201, description = "Directory created"))
)]
pub async fn make_dir(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Json(req): Json<MkdirRequest>,
) -> Result<StatusCode, AppError> {
    state.fleet.make_host_dir(&host, &req.path).await?;
    Ok(StatusCode::CREATED)
}

/// Remove a file or empty directory on a host
#[utoipa::path(
    delete,
    path = "/api/hosts/{host}/files",
    tag = "files",
    params(
        ("host" = String, Path, description = "Host id"),
        ("path" = String, Query, description = "Absolute path")
    ),
    responses((status = 204, description = "Path removed"))
)]
pub async fn remove_path(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Result<StatusCode, AppError> {
    if query.path.trim_end_matches('/').is_empty() {
        return Err(AppError::bad_request("refusing to remove the root directory"));
    }
    state.fleet.remove_host_path(&host, &query.path).await?;
    Ok(StatusCode::NO_CONTENT)
}
