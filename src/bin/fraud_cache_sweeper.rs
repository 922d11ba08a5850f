use anyhow::Result;
use powerboard_connector::commerce::http::CommercetoolsClient;
use powerboard_connector::config::AppConfig;
use powerboard_connector::repo::fraud_cache::FraudCache;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    let interval = std::env::var("FRAUD_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(600);

    let commerce = Arc::new(CommercetoolsClient::new(reqwest::Client::new(), &cfg));
    let cache = FraudCache::new(commerce, cfg.fraud_cache_ttl);

    loop {
        match cache.sweep(chrono::Utc::now()).await {
            Ok(0) => tracing::debug!("no expired fraud cache entries"),
            Ok(removed) => tracing::info!(removed, "fraud cache swept"),
            Err(e) => tracing::error!(error = %e, "fraud cache sweep failed"),
        }

        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
    }
}
