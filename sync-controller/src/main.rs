//! roomlink-controller binary entry point.
//!
//! Usage:
//! ```bash
//! roomlink-controller --config controller.toml
//! roomlink-controller satellite add kitchen --secret s3cret --address 192.168.1.40
//! roomlink-controller satellite list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_controller::config::Config;
use sync_controller::http::{build_router, health};
use sync_controller::link::HttpLink;
use sync_controller::service::SyncService;
use sync_controller::storage::{SatelliteRecord, SatelliteStore, SqliteStorage};
use tracing_subscriber::EnvFilter;

/// Satellite sync controller for roomlink.
#[derive(Parser, Debug)]
#[command(name = "roomlink-controller")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(long, short, global = true, default_value = "controller.toml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `sync_controller=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller until Ctrl-C (default)
    Serve,

    /// Administer the persisted satellite table
    Satellite {
        #[command(subcommand)]
        action: SatelliteAction,
    },
}

#[derive(Subcommand, Debug)]
enum SatelliteAction {
    /// Register a satellite
    Add {
        /// Unique satellite name
        name: String,

        /// Shared secret the node authenticates with
        #[arg(long, short)]
        secret: String,

        /// Known address (`host` or `host:port`)
        #[arg(long, short)]
        address: Option<String>,
    },

    /// Forget a satellite
    Remove {
        /// Satellite name
        name: String,
    },

    /// List registered satellites
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Satellite { action } => administer(&config, action).await,
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

async fn open_storage(config: &Config) -> Result<SqliteStorage> {
    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.database.display()
            )
        })?;
    Ok(storage)
}

async fn serve(config: Config) -> Result<()> {
    health::init_start_time();
    tracing::info!("Starting roomlink-controller v{}", env!("CARGO_PKG_VERSION"));

    let storage = open_storage(&config).await?;
    let link = HttpLink::new(&config.satellites).context("Failed to build HTTP client")?;
    let bind_address = config.server.bind_address.clone();

    let service = SyncService::load(config, storage, Arc::new(link))
        .await
        .context("Failed to load satellites")?;
    service.start();

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!("Listening on {}", bind_address);

    axum::serve(listener, build_router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    service.shutdown().await;
    tracing::info!("roomlink-controller shut down");
    Ok(())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn administer(config: &Config, action: SatelliteAction) -> Result<()> {
    let storage = open_storage(config).await?;

    match action {
        SatelliteAction::Add {
            name,
            secret,
            address,
        } => {
            if secret.is_empty() {
                anyhow::bail!("Secret must not be empty");
            }
            let record = SatelliteRecord::new(name.as_str(), secret, address);
            if !storage.insert_satellite(&record).await? {
                anyhow::bail!("Satellite {name} already exists");
            }
            println!("Added satellite {name}");
        }
        SatelliteAction::Remove { name } => {
            if !storage.remove_satellite(&name).await? {
                anyhow::bail!("No satellite named {name}");
            }
            println!("Removed satellite {name}");
        }
        SatelliteAction::List => {
            let satellites = storage.load_satellites().await?;
            if satellites.is_empty() {
                println!("No satellites registered");
            }
            for satellite in satellites {
                let last_contact = if satellite.last_contact.is_never() {
                    "never".to_string()
                } else {
                    satellite.last_contact.to_string()
                };
                println!(
                    "{:<20} {:<24} last contact: {}",
                    satellite.name,
                    satellite.address.as_deref().unwrap_or("-"),
                    last_contact
                );
            }
        }
    }

    Ok(())
}
