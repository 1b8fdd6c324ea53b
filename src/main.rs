// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::env;

use bearer_auth::{
    api::router,
    config::{AuthSettings, ServerSettings, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    state::AppState,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    init_tracing();

    let server = ServerSettings::from_env().unwrap_or_else(|err| fatal(err));
    let settings = AuthSettings::from_env().unwrap_or_else(|err| fatal(err));
    let auth = settings.build().unwrap_or_else(|err| fatal(err));
    let addr = server.bind_addr().unwrap_or_else(|err| fatal(err));

    info!(
        key_source = ?settings.key_source,
        algorithms = ?settings.algorithms,
        issuers = ?settings.issuer,
        "Authentication configured"
    );

    let app = router(AppState::new(auth));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Bearer auth server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

fn fatal(err: impl std::fmt::Display) -> ! {
    error!(error = %err, "Invalid configuration");
    std::process::exit(1);
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
