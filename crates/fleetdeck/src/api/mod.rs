//! API route handlers

pub mod containers;
pub mod error;
pub mod events;
pub mod hosts;
pub mod logs;
pub mod system;
pub mod terminal;
pub mod updates;

use utoipa::OpenApi;

pub use error::ApiError;

/// OpenAPI document for the REST surface
#[derive(OpenApi)]
#[openapi(
    info(title = "fleetdeck", description = "Multi-host container fleet observer and controller"),
    paths(
        system::health,
        containers::list_containers,
        containers::search,
        containers::stacks,
        containers::all_stats,
        containers::container_stats,
        containers::container_action,
        containers::update_container,
        hosts::list_hosts,
        hosts::upsert_host,
        hosts::remove_host,
        hosts::list_files,
        hosts::read_file,
        hosts::write_file,
        hosts::make_dir,
        hosts::remove_path,
        updates::list_updates,
        updates::check_container,
        logs::tail_logs,
    ),
    components(schemas(
        ApiError,
        fleetdeck_api::events::WsEvent,
        fleetdeck_api::events::TerminalClientMessage,
        fleetdeck_api::events::TerminalServerMessage,
    )),
    tags(
        (name = "system", description = "Daemon status"),
        (name = "containers", description = "Fleet-wide container queries and control"),
        (name = "hosts", description = "Host registry"),
        (name = "files", description = "Host file access"),
        (name = "updates", description = "Image update checks"),
        (name = "logs", description = "Container logs"),
    )
)]
pub struct ApiDoc;
