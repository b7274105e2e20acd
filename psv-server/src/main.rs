//! psv-server - Perceptual survey runner
//!
//! Loads the survey definition, scans the stimulus directory, opens the
//! response log and serves the survey page plus its JSON API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use psv_common::config::{resolve_config_location, CONFIG_ENV_VAR};
use psv_common::{open_store, CatalogCache, SurveyConfig, SurveyController};
use psv_server::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for psv-server
#[derive(Parser, Debug)]
#[command(name = "psv-server")]
#[command(about = "Perceptual image-quality survey server")]
#[command(version)]
struct Args {
    /// Survey definition (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the survey definition)
    #[arg(short, long, env = "PSV_PORT")]
    port: Option<u16>,

    /// Stimulus directory (overrides the survey definition)
    #[arg(short, long, env = "PSV_IMAGE_DIR")]
    image_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "psv_server=info,psv_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting Perceptual Survey server (psv-server) v{}",
        env!("CARGO_PKG_VERSION")
    );

    // CLI/env path, then the per-user config directory, then defaults.
    // Clap already folded PSV_CONFIG into args.config.
    let location = resolve_config_location(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config = SurveyConfig::load(location.as_ref()).context("Failed to load survey")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(image_dir) = args.image_dir {
        config.catalog.image_dir = image_dir;
    }
    config.validate().context("Invalid survey definition")?;

    let catalogs = CatalogCache::new();
    let catalog = catalogs
        .load(&config.catalog)
        .context("Failed to load stimulus catalog")?;
    if catalog.is_empty() {
        warn!(
            "No items found in {}; every participant completes immediately",
            config.catalog.image_dir.display()
        );
    }

    let store = open_store(&config.store, config.judgment.judgment_kind())
        .await
        .context("Failed to open response log")?;
    info!(
        "Response log: {} ({:?})",
        config.store.path.display(),
        config.store.backend
    );

    let controller = SurveyController::from_config(&config, catalog, store);
    let state = AppState::new(&config, controller);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("psv-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
