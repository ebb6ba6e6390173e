//! fleetdeck CLI
//!
//! Command-line interface for interacting with the fleetdeck daemon

use clap::{Parser, Subcommand};
use color_eyre::Result;
use fleetdeck_api::events::WsEvent;
use fleetdeck_api::models::{ContainerAction, ContainerSnapshot};
use fleetdeck_client::{HttpClient, WsClient};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetdeck")]
#[command(about = "Container fleet observer and controller CLI", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List containers across the fleet
    Containers {
        /// Only show containers on this host
        #[arg(long)]
        host: Option<String>,
    },
    /// Search containers by name, image or host
    Search { query: String },
    /// List hosts with their resource usage
    Hosts,
    /// Show compose stacks
    Stacks {
        #[arg(long)]
        host: Option<String>,
    },
    /// Show resource usage of running containers
    Stats,
    /// Start, stop, restart, pause or unpause a container
    Action {
        host: String,
        id: String,
        /// start, stop, restart, pause or unpause
        action: String,
    },
    /// Pull the latest image and swap the container after validating it
    Update { host: String, id: String },
    /// List image update status for running containers
    Updates {
        /// Only list containers with a newer image
        #[arg(long)]
        available: bool,
    },
    /// Check one container for a newer image
    Check { host: String, id: String },
    /// Print trailing log lines of a container
    Logs {
        host: String,
        id: String,
        #[arg(long, default_value_t = 100)]
        tail: u32,
    },
    /// Follow live fleet events
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.url)?;

    match cli.command {
        Commands::Containers { host } => {
            let mut containers = client.containers().await?;
            if let Some(host) = host {
                containers.retain(|c| c.host_id == host);
            }
            emit(cli.json, containers.as_slice(), print_containers)?;
        }
        Commands::Search { query } => {
            let containers = client.search(&query).await?;
            emit(cli.json, containers.as_slice(), print_containers)?;
        }
        Commands::Hosts => {
            let hosts = client.hosts().await?;
            emit(cli.json, &hosts, |hosts| {
                println!(
                    "{:<16} {:<20} {:>8} {:>10} {:>7} {:>7}",
                    "HOST", "SSH", "STATUS", "CONTAINERS", "CPU%", "MEM%"
                );
                for h in hosts {
                    println!(
                        "{:<16} {:<20} {:>8} {:>10} {:>7.1} {:>7.1}",
                        h.name,
                        h.ssh_host,
                        if h.online { "online" } else { "offline" },
                        format!("{}/{}", h.running_count, h.container_count),
                        h.cpu_percent,
                        h.memory_percent
                    );
                }
            })?;
        }
        Commands::Stacks { host } => {
            let stacks = client.stacks(host.as_deref()).await?;
            emit(cli.json, &stacks, |stacks| {
                for s in stacks {
                    println!(
                        "{} ({}) {}/{} running",
                        s.name,
                        s.host_id,
                        s.running_count,
                        s.containers.len()
                    );
                }
            })?;
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            emit(cli.json, &stats, |stats| {
                println!(
                    "{:<24} {:<12} {:>7} {:>12} {:>7}",
                    "NAME", "HOST", "CPU%", "MEM", "MEM%"
                );
                for s in stats {
                    println!(
                        "{:<24} {:<12} {:>7.1} {:>12} {:>7.1}",
                        s.name,
                        s.host_id,
                        s.cpu_percent,
                        human_bytes(s.memory_usage),
                        s.memory_percent
                    );
                }
            })?;
        }
        Commands::Action { host, id, action } => {
            let action: ContainerAction = action.parse()?;
            let result = client.container_action(&host, &id, action).await?;
            emit(cli.json, &result, |r| println!("{}", r.message))?;
        }
        Commands::Update { host, id } => {
            let result = client.update_container(&host, &id).await?;
            emit(cli.json, &result, |r| {
                println!("{}", r.message);
                println!("  {} -> {}", short(&r.previous_id), short(&r.new_id));
            })?;
        }
        Commands::Updates { available } => {
            let mut response = client.updates().await?;
            if available {
                response.updates.retain(|u| u.has_update);
            }
            emit(cli.json, &response, |r| {
                for u in &r.updates {
                    let marker = if u.has_update { "*" } else { " " };
                    println!("{marker} {:<24} {:<12} {}", u.container_name, u.host_id, u.image);
                }
                println!("{} update(s) available", r.available);
            })?;
        }
        Commands::Check { host, id } => {
            let record = client.check_update(&host, &id).await?;
            emit(cli.json, &record, |r| {
                if r.has_update {
                    println!("{}: newer image available for {}", r.container_name, r.image);
                } else {
                    println!("{}: up to date", r.container_name);
                }
            })?;
        }
        Commands::Logs { host, id, tail } => {
            let logs = client.logs(&host, &id, tail).await?;
            emit(cli.json, &logs, |l| {
                for line in &l.lines {
                    println!("{line}");
                }
            })?;
        }
        Commands::Watch => {
            let mut ws = WsClient::connect(client.events_url()?).await?;
            while let Some(event) = ws.recv().await {
                if cli.json {
                    println!("{}", serde_json::to_string(&event)?);
                    continue;
                }
                match event {
                    WsEvent::Containers(c) => {
                        let running = c.iter().filter(|c| c.state.is_running()).count();
                        println!("containers: {running}/{} running", c.len());
                    }
                    WsEvent::Stats(s) => println!("stats: {} samples", s.len()),
                    WsEvent::Hosts(h) => {
                        let online = h.iter().filter(|h| h.online).count();
                        println!("hosts: {online}/{} online", h.len());
                    }
                    WsEvent::Log(line) => println!("{line}"),
                }
            }
        }
    }

    Ok(())
}

/// Print `value` as JSON or through `table`
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, table: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        table(value);
    }
    Ok(())
}

fn print_containers(containers: &[ContainerSnapshot]) {
    println!(
        "{:<14} {:<24} {:<12} {:<10} {}",
        "ID", "NAME", "HOST", "STATE", "IMAGE"
    );
    for c in containers {
        println!(
            "{:<14} {:<24} {:<12} {:<10} {}",
            c.id, c.name, c.host_id, c.state, c.image
        );
    }
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_action() {
        let cli = Cli::try_parse_from(["fleetdeck", "action", "nas", "abc123", "restart"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Action { ref host, ref action, .. } if host == "nas" && action == "restart"
        ));
        assert_eq!(cli.url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
