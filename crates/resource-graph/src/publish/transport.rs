//! Message transport seam and the retrying wrapper around it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::RetryPolicy;
use crate::error::TransportError;

/// Broker acknowledgement of a produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceStatus {
    Persisted,
    PossiblyPersisted,
    NotPersisted,
}

impl PersistenceStatus {
    /// Short status text reported in load statuses.
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceStatus::Persisted => "OK",
            PersistenceStatus::PossiblyPersisted | PersistenceStatus::NotPersisted => "FAIL",
        }
    }
}

/// Result of a send the transport completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: PersistenceStatus,
    pub offset: Option<i64>,
}

impl DeliveryReport {
    pub fn persisted(offset: i64) -> Self {
        Self {
            status: PersistenceStatus::Persisted,
            offset: Some(offset),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.status == PersistenceStatus::Persisted
    }
}

/// A keyed, header-bearing message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Sends messages to the ingestion broker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReport, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReport, TransportError> {
        (**self).send(message).await
    }
}

/// Retries transient failures of the wrapped transport with capped
/// exponential backoff. Fatal errors and completed sends are returned as is.
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> fmt::Debug for RetryingTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReport, TransportError> {
        let max_retries = self.policy.max_retries;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(attempt, topic = %message.topic, "sending message");
            match self.inner.send(message).await {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() && attempt <= max_retries => {
                    let delay = self.policy.delay(attempt);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    warn!(attempt, max_retries, delay_ms, error = %err, "send failed, will retry");
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    error!(attempt, max_retries, error = %err, "send retries exhausted");
                    return Err(TransportError::Exhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    error!(error = %err, "non-retryable send failure");
                    return Err(err);
                }
            }
        }
    }
}
