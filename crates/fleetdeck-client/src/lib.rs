//! fleetdeck-client: HTTP and WebSocket client library
//!
//! Talks to a running fleetdeck daemon over its REST surface and follows
//! the live event feed.
//!
//! # Examples
//!
//! ## HTTP Client
//!
//! ```no_run
//! use fleetdeck_client::HttpClient;
//! use fleetdeck_api::models::ContainerAction;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:8080")?;
//!
//! let health = client.health().await?;
//! println!("Status: {}", health.status);
//!
//! for host in client.hosts().await? {
//!     println!("{}: {} running", host.name, host.running_count);
//! }
//!
//! client.container_action("nas", "3f2a1c9b0d4e", ContainerAction::Restart).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## WebSocket Client
//!
//! ```no_run
//! use fleetdeck_client::{HttpClient, WsClient};
//! use fleetdeck_api::events::WsEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpClient::new("http://localhost:8080")?;
//! let mut client = WsClient::connect(http.events_url()?).await?;
//!
//! while let Some(event) = client.recv().await {
//!     match event {
//!         WsEvent::Hosts(hosts) => println!("{} hosts", hosts.len()),
//!         WsEvent::Log(line) => println!("{line}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod ws;

pub use error::{ClientError, Result};
pub use http::HttpClient;
pub use ws::WsClient;
