use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::config::MetadataConfig;
use crate::error::MetadataError;
use crate::model::TypeRegistry;

use super::MetadataSource;

/// Fetches and parses metadata once, retrying transient failures.
///
/// The parsed registry is cached for the lifetime of the loader; failed
/// loads are not cached.
pub struct MetadataLoader {
    source: Box<dyn MetadataSource>,
    config: MetadataConfig,
    registry: OnceCell<Arc<TypeRegistry>>,
}

impl std::fmt::Debug for MetadataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataLoader")
            .field("config", &self.config)
            .field("loaded", &self.registry.initialized())
            .finish_non_exhaustive()
    }
}

impl MetadataLoader {
    pub fn new(source: impl MetadataSource + 'static, config: MetadataConfig) -> Self {
        Self {
            source: Box::new(source),
            config,
            registry: OnceCell::new(),
        }
    }

    /// Returns the cached registry, loading it on first use.
    pub async fn load(&self) -> Result<Arc<TypeRegistry>, MetadataError> {
        self.registry
            .get_or_try_init(|| self.fetch_with_retry())
            .await
            .cloned()
    }

    async fn fetch_with_retry(&self) -> Result<Arc<TypeRegistry>, MetadataError> {
        let policy = self.config.retry_policy();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match self.source.fetch().await {
                Ok(document) => TypeRegistry::from_json_str(&document),
                Err(err) => Err(err),
            };
            match result {
                Ok(registry) => {
                    info!(types = registry.len(), attempt, "metadata loaded");
                    return Ok(Arc::new(registry));
                }
                Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                    let delay = policy.delay(attempt);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    warn!(
                        attempt,
                        remaining = policy.max_retries - attempt,
                        delay_ms,
                        error = %err,
                        "metadata fetch failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    error!(attempt, error = %err, "metadata fetch retries exhausted");
                    return Err(MetadataError::Exhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    error!(error = %err, "metadata could not be loaded");
                    return Err(err);
                }
            }
        }
    }
}
