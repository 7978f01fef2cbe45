use log::*;
use service::config::Config;
use service::{logging, AppState};
use sse::{init_global, Hub};
use std::net::SocketAddr;
use std::sync::Arc;
use web::define_routes;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let config = Config::new();
    logging::init(&config);

    // The hub drives its own heartbeat loop; the same instance backs both
    // the HTTP surface and the in-process notifier helpers.
    let hub = Hub::start(config.hub_config());
    init_global(hub.clone());

    let app_state = AppState::new(config.clone(), &hub);
    let app = define_routes(app_state);

    let host = config.interface.as_deref().unwrap_or("127.0.0.1");
    let addr = format!("{host}:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Pulse event hub listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub))
    .await?;

    Ok(())
}

async fn shutdown_signal(hub: Arc<Hub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received; closing all connections");
    hub.shutdown();
}
