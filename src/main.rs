mod config;
mod frame;
mod games;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::ServerConfig::from_env();
    let (hub, _hub_task) = services::hub::spawn_hub(config.hub);

    let listen_addr = config.listen_addr();
    let state = state::AppState::new(hub, config);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .expect("failed to bind");

    tracing::info!(%listen_addr, "tictac-hub listening");
    axum::serve(listener, app).await.expect("server failed");
}
