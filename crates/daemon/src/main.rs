//! Fast-path supervisor daemon
//!
//! Owns the shared image and the supervisor side of the
//! process-lifecycle IPC protocol; exposes both over REST+WebSocket.
//!
//! WebSocket: /events
//! REST API: /api/v1/*

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fastpathd::config::DaemonConfig;
use fastpathd::{api, supervisor::FastpathSupervisor, tracing_layer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load()?;
    let supervisor = FastpathSupervisor::new(&config);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(tracing_layer::WebSocketLayer::new(supervisor.clone()))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fastpathd=debug")))
        .init();

    info!("starting fast-path supervisor daemon");
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("accel prefix: {}, image prefix: {}", config.accel_prefix, config.image_prefix);

    supervisor.spawn_service_loop();

    let app = api::create_router(supervisor);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on http://{}", config.bind);
    info!("websocket events: ws://{}/events", config.bind);
    info!("swagger ui: http://{}/swagger-ui", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
