//! Loopwall Control Plane - Main entry point
//!
//! Central controller for unattended video displays: playlist store,
//! timeline materializer, display state machine, and the player
//! synchronization gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loopwall_cp::api;
use loopwall_cp::state::SharedState;

/// Command-line arguments for loopwall-cp
#[derive(Parser, Debug)]
#[command(name = "loopwall-cp")]
#[command(about = "Control plane for loopwall video displays")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "LOOPWALL_PORT")]
    port: u16,

    /// SQLite database path (falls back to LOOPWALL_DB, then config file)
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loopwall_cp=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let db_path = loopwall_common::config::resolve_db_path(
        args.database.as_deref().and_then(|p| p.to_str()),
        "LOOPWALL_DB",
    )
    .context("Failed to resolve database path")?;

    info!("Starting loopwall control plane on port {}", args.port);
    info!("Database: {}", db_path.display());

    let db_pool = loopwall_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let state = Arc::new(SharedState::new());

    api::server::run(args.port, state, db_pool)
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
