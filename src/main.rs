use powerboard_connector::commerce::http::CommercetoolsClient;
use powerboard_connector::config::AppConfig;
use powerboard_connector::gateways::powerboard::PowerboardGateway;
use powerboard_connector::{router, AppState};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    tracing::info!(config = ?cfg, "configuration loaded");

    let http_client = reqwest::Client::new();
    let commerce = Arc::new(CommercetoolsClient::new(http_client.clone(), &cfg));
    let gateway = Arc::new(PowerboardGateway::new(http_client, cfg.gateway_timeout));

    let state = AppState::new(commerce, gateway, &cfg)?;
    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
