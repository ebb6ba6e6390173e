//! fleetdeck-engine: Container engine abstraction
//!
//! The `ContainerEngine` trait covers everything the fleet core asks of an
//! engine; `DockerEngine` implements it over the Docker Engine API.

pub mod docker;
pub mod error;
pub mod traits;
pub mod types;

pub use bollard::models::{ContainerConfig, HostConfig};
pub use docker::{DockerConnector, DockerEngine};
pub use error::EngineError;
pub use traits::{ACTION_GRACE, ContainerEngine, EngineConnector};
pub use types::{
    BlkioEntry, ContainerDetails, ContainerListing, ContainerSpec, EngineInfo, ImageDetails,
    NetworkCounters, RawStatsSample,
};
