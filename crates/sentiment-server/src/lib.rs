//! HTTP API serving tweet sentiment predictions.
//!
//! The listener comes up first so `/health` can report progress while the
//! model is provisioned and loaded on the blocking pool.

pub mod cli;
pub mod error;
pub mod routes;
pub mod schemas;
pub mod startup;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Context as _;
use axum::http::HeaderValue;
use env_logger::Env;
use log::LevelFilter;
use sentiment_runtime::Lifecycle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::cli::{ServerArgs, TelemetryArgs};
use crate::state::AppState;
use crate::telemetry::{TelemetryClient, TraceForwarder};

/// Browsers send credentials, so origins and headers are echoed rather than wildcarded.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            if origin == "*" {
                anyhow::bail!("Wildcard CORS origin cannot be combined with credentials");
            }
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin {origin}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Install the global logger and build the telemetry client.
///
/// With telemetry configured, the service's records are also forwarded to
/// Application Insights up to `--appinsights-log-level`. Must run inside the
/// Tokio runtime.
pub fn init_logging(args: &TelemetryArgs) -> anyhow::Result<Option<TelemetryClient>> {
    let console = env_logger::Builder::from_env(Env::default().default_filter_or("info")).build();
    let telemetry = TelemetryClient::from_args(args)?;

    match &telemetry {
        Some(client) if args.log_level != LevelFilter::Off => {
            TraceForwarder::install(console, client.clone(), args.log_level)?;
        }
        _ => {
            log::set_max_level(console.filter());
            log::set_boxed_logger(Box::new(console))?;
        }
    }

    match &telemetry {
        Some(_) => log::info!("Application Insights telemetry enabled."),
        None => {
            log::warn!("No Application Insights instrumentation key, telemetry will not be sent.")
        }
    }
    Ok(telemetry)
}

pub async fn serve(args: ServerArgs, telemetry: Option<TelemetryClient>) -> anyhow::Result<()> {
    let cors = cors_layer(&args.cors_origins)?;
    let lifecycle = Arc::new(Lifecycle::new());
    let state = AppState::new(lifecycle.clone(), telemetry);

    let addr = args.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Listening on http://{addr}");

    let loading = tokio::task::spawn_blocking({
        let lifecycle = lifecycle.clone();
        move || startup::start(&lifecycle, &args)
    });

    let app = routes::router(state).layer(cors);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Server stopped, waiting for model startup to settle...");
    if let Err(e) = loading.await {
        log::error!("Model startup task failed: {e}");
    }
    tokio::task::spawn_blocking(move || lifecycle.shutdown())
        .await
        .context("Failed to release the model")?;
    log::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received.");
}
