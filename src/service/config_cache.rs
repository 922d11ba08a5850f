use crate::domain::merchant_config::MerchantConfig;
use crate::error::ConfigError;
use crate::repo::merchant_config_repo::MerchantConfigRepo;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct ConfigCache {
    pub repo: MerchantConfigRepo,
    inner: Arc<RwLock<Option<(std::time::Instant, MerchantConfig)>>>,
    ttl: std::time::Duration,
}

impl ConfigCache {
    pub fn new(repo: MerchantConfigRepo, ttl: std::time::Duration) -> Self {
        Self {
            repo,
            inner: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub async fn merchant_config(&self) -> Result<MerchantConfig, ConfigError> {
        {
            let read = self.inner.read().await;
            if let Some((loaded_at, config)) = &*read {
                if loaded_at.elapsed() <= self.ttl {
                    return Ok(config.clone());
                }
            }
        }

        let config = self.repo.load().await?;
        let mut write = self.inner.write().await;
        *write = Some((std::time::Instant::now(), config.clone()));
        Ok(config)
    }
}
