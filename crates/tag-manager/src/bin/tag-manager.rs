//! Tag manager service binary.
//!
//! Standalone HTTP service for browsing and editing `ClickUp` tags.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tag_manager::{server, ClickUpClient, Config, TagService};

/// Tag manager - `ClickUp` tag catalogue service.
#[derive(Parser)]
#[command(name = "tag-manager")]
#[command(about = "Browse, rename, recolor and delete ClickUp tags across a workspace")]
struct Cli {
    /// Port to listen on (or set `TAG_MANAGER_PORT`).
    #[arg(long, env = "TAG_MANAGER_PORT")]
    port: Option<u16>,

    /// `ClickUp` API base URL (or set `CLICKUP_API_URL`).
    #[arg(long, env = "CLICKUP_API_URL")]
    api_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "TAG_MANAGER_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("tag_manager=info".parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting tag manager...");

    let mut config = Config::default();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    let client =
        ClickUpClient::with_url(&config.api_url).context("Failed to create ClickUp client")?;
    info!(api_url = %config.api_url, "ClickUp client configured");

    let shutdown = CancellationToken::new();
    let state = server::AppState {
        service: Arc::new(TagService::new(client, config.retry)),
        shutdown: shutdown.clone(),
    };
    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(port = config.port, "Tag manager listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested, cancelling in-flight operations");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}
