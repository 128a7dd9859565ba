//! mg-daemon entry point.
//!
//! Thin: sets up tracing, loads and validates the layered config, builds the
//! shared state, wires middleware, and starts the HTTP server. Route handlers
//! live in `routes.rs`; shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mg_config::{load_layered_yaml, report_unused_keys, GuardConfig, UnusedKeyPolicy};
use mg_daemon::{routes, state};
use mg_execution::DryRunActionRepository;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let (config, config_hash) = load_config()?;
    let passphrase = std::env::var("MG_PASSPHRASE").ok();
    if passphrase.as_deref().map_or(true, str::is_empty) {
        warn!("MG_PASSPHRASE not set; every authenticated operation will be refused");
    }

    // No platform backend is linked into the daemon; actions are logged only.
    let repository = Arc::new(DryRunActionRepository::new());
    let shared = Arc::new(
        state::DaemonState::build(config, repository, passphrase, config_hash)
            .await
            .context("failed to build daemon state")?,
    );

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_state_relay(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("mg-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    shared.autoarm.stop().await;
    info!("mg-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `MG_CONFIG` is a comma-separated list of YAML layers, base first. Unset
/// means built-in defaults.
fn load_config() -> anyhow::Result<(mg_config::ValidatedConfig, Option<String>)> {
    let Ok(raw) = std::env::var("MG_CONFIG") else {
        info!("MG_CONFIG not set; using built-in defaults");
        let validated = GuardConfig::default()
            .validate()
            .context("built-in defaults rejected")?;
        return Ok((validated, None));
    };

    let paths: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for leaf in &report.unused_leaf_pointers {
        warn!(leaf = %leaf, "unused config key");
    }

    let validated = loaded
        .guard_config()?
        .validate()
        .context("configuration rejected")?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "configuration loaded");
    Ok((validated, Some(loaded.config_hash)))
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("MG_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
