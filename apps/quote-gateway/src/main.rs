//! Quote Gateway Binary
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-gateway -- --port 8765
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `QUOTE_FEED_APP_KEY`, `QUOTE_FEED_APP_SECRET`, `QUOTE_FEED_ACCESS_TOKEN`
//!
//! ## Optional
//! - `QUOTE_FEED_URL`: Feed bridge URL (default: `ws://127.0.0.1:9100/feed`)
//! - `SERVER_HOST` / `SERVER_PORT`: Bind address (default: 0.0.0.0:8765)
//! - `CORS_ALLOW_ORIGINS`: Comma separated origins (default: `*`)
//! - `PUBLIC_BASE_URL`: Reported by `/health`
//! - `WATCHLIST_PATH`: Watchlist JSON file
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: `quote_gateway=info`)

use std::time::Duration;

use quote_gateway::infrastructure::telemetry;
use quote_gateway::{Gateway, GatewayConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for in-flight work after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting quote gateway");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
    }

    let mut config = GatewayConfig::from_env()?;
    config.apply_args(std::env::args().skip(1))?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let gateway = Gateway::new(config, shutdown_token.clone());

    let server = tokio::spawn(gateway.run());

    tokio::select! {
        () = await_shutdown() => {
            shutdown_token.cancel();
            tracing::info!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Graceful shutdown started"
            );
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Gateway stopped on its own");
        }
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            tracing::error!(error = %e, "HTTP server failed");
            return Err(e.into());
        }
        Ok(Err(e)) => tracing::error!(error = %e, "Server task panicked"),
        Err(_) => tracing::warn!("Shutdown timed out"),
    }

    tracing::info!("Quote gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        bind = %config.server.bind_addr(),
        feed_url = %config.feed.url,
        watchlist = %config.watchlist_path.display(),
        dispatch_capacity = config.dispatch.dispatch_capacity,
        client_queue_capacity = config.dispatch.client_queue_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        cors_allow_origins = ?config.server.cors_allow_origins,
        command_timeout_ms = config.feed.command_timeout.as_millis(),
        ping_interval_secs = config.feed.ping_interval.as_secs(),
        "Feed and server settings"
    );
}

/// Load `.env` from the current directory or the nearest ancestor holding one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(env_path) = cwd
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(".env"))
        .find(|path| path.exists())
    {
        let _ = dotenvy::from_path(&env_path);
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
