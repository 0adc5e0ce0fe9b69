mod activity;
mod api;
mod automations;
mod backfill;
mod cli;
mod config;
mod model;
mod reports;
mod server;
mod sync;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("board_sync=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::parse_args(&args)? {
        Command::Help => {
            cli::print_help();
            Ok(())
        }
        Command::Serve { port } => serve(port).await,
        Command::Backfill {
            automation,
            execute,
            cursor,
        } => {
            let config = config::load_config()?;
            cli::handle_backfill(&config, &automation, execute, cursor.as_deref()).await
        }
        Command::Report => {
            let config = config::load_config()?;
            cli::handle_report(&config).await
        }
    }
}

async fn serve(port: Option<u16>) -> Result<()> {
    let config = config::load_config()?;
    let state = server::AppState::from_config(&config)?;
    let names = state.automation_names().join(", ");
    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.server.port)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, automations = %names, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
