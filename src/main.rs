mod config;
mod error;
mod extractor;
mod ladder;
mod models;
mod routes;
mod sanitize;
mod sweeper;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;
use extractor::YtDlp;
use routes::AppState;
use sweeper::Sweeper;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "media_fetch=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(message) = run().await {
        error!("Server error: {message}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .map_err(|error| {
            format!(
                "Could not create temp directory {:?}: {error}",
                config.temp_dir
            )
        })?;

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(
        config.temp_dir.clone(),
        config.retention,
        config.sweep_interval,
    )
    .spawn(shutdown.child_token());

    let extractor = Arc::new(YtDlp::new(config.yt_dlp_bin.clone(), config.request_timeout));
    let state = AppState::new(&config, extractor);
    let cors = routes::build_cors_layer(&config.allowed_origins)?;
    let app = routes::router(state, cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| format!("Could not bind {}: {error}", config.bind_addr))?;

    info!(
        "Serving on http://{} (temp dir {:?}, up to {} concurrent downloads)",
        config.bind_addr, config.temp_dir, config.max_concurrent_downloads
    );

    tokio::spawn(watch_for_ctrl_c(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .map_err(|error| format!("HTTP server error: {error}"))?;

    shutdown.cancel();
    if let Err(error) = sweeper.await {
        warn!("Sweeper task ended abnormally: {error}");
    }

    Ok(())
}

async fn watch_for_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown requested");
            shutdown.cancel();
        }
        Err(error) => warn!("Could not listen for Ctrl-C: {error}"),
    }
}
