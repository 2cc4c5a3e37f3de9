//! Publisher and metadata loader settings.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration document.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::graph::SplitConfig;
use crate::limits::{BACKOFF_MAX_MS, DEFAULT_METADATA_RETRIES, DEFAULT_SEND_RETRIES};

/// Capped exponential backoff: attempt `n` waits `base * 2^(n-1)`,
/// never more than `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_SEND_RETRIES,
            base_delay_ms: 500,
            max_delay_ms: BACKOFF_MAX_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Message body encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

/// Settings of a [`Publisher`](crate::publish::Publisher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Sender id recorded in the delivery chain; also the message key.
    pub client_id: String,
    /// Default destination topic.
    pub topic: String,
    pub compression: Compression,
    pub retry: RetryPolicy,
    pub split: SplitConfig,
    /// Whether extraction drops null attributes.
    pub strip_nulls: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            client_id: "resource-graph".to_string(),
            topic: "resources".to_string(),
            compression: Compression::None,
            retry: RetryPolicy::default(),
            split: SplitConfig::default(),
            strip_nulls: true,
        }
    }
}

impl PublisherConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Settings of a [`MetadataLoader`](crate::metadata::MetadataLoader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub retry_count: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_METADATA_RETRIES,
            base_delay_ms: 2_000,
            max_delay_ms: BACKOFF_MAX_MS,
        }
    }
}

impl MetadataConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_count,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = PublisherConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PublisherConfig::default());
        assert_eq!(config.split.max_chunk_mb, 40.0);
        assert_eq!(config.split.primary_budget_mb, 20.0);
        assert!(config.strip_nulls);
    }

    #[test]
    fn test_partial_document() {
        let config = PublisherConfig::from_json_str(
            r#"{"clientId": "ignored", "client_id": "importer", "compression": "zstd",
                "retry": {"max_retries": 2}, "split": {"max_chunk_mb": 8}}"#,
        )
        .unwrap();
        assert_eq!(config.client_id, "importer");
        assert_eq!(config.compression, Compression::Zstd);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.split.max_chunk_mb, 8.0);
        assert_eq!(config.split.primary_budget_mb, 20.0);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(10), Duration::from_millis(1_000));
        assert_eq!(policy.delay(200), Duration::from_millis(1_000));
    }
}
