//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::{ApiDoc, containers, events, hosts, logs, system, terminal, updates};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/api/openapi.json", get(system::openapi_json))
        // Containers
        .route("/api/containers", get(containers::list_containers))
        .route("/api/search", get(containers::search))
        .route("/api/stacks", get(containers::stacks))
        .route("/api/stats", get(containers::all_stats))
        .route("/api/stats/{host}/{id}", get(containers::container_stats))
        .route(
            "/api/containers/{host}/{id}/update",
            post(containers::update_container),
        )
        .route(
            "/api/containers/{host}/{id}/{action}",
            post(containers::container_action),
        )
        // Hosts and host files
        .route("/api/hosts", get(hosts::list_hosts))
        .route(
            "/api/hosts/{host}",
            put(hosts::upsert_host).delete(hosts::remove_host),
        )
        .route(
            "/api/hosts/{host}/files",
            get(hosts::list_files).delete(hosts::remove_path),
        )
        .route(
            "/api/hosts/{host}/files/content",
            get(hosts::read_file).put(hosts::write_file),
        )
        .route("/api/hosts/{host}/files/mkdir", post(hosts::make_dir))
        // Updates
        .route("/api/updates", get(updates::list_updates))
        .route(
            "/api/updates/{host}/{id}/check",
            post(updates::check_container),
        )
        // Logs
        .route("/api/logs/{host}/{id}", get(logs::tail_logs))
        .route("/api/logs/{host}/{id}/stream", get(logs::stream_logs))
        // Live feeds
        .route("/api/events", get(events::sse_events))
        .route("/ws/events", get(events::ws_events))
        .route("/ws/terminal/{host}/{id}", get(terminal::container_terminal))
        .route("/ws/ssh/{host}", get(terminal::host_terminal))
        // Docs
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        // State
        .with_state(state)
}
