//! Error types for extraction, normalisation, metadata loading and delivery.

use thiserror::Error;

/// Structural error while building or normalising an object graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("{side} record of type {type_name:?} has no parsable id")]
    MissingIdentity {
        side: &'static str,
        type_name: Option<String>,
    },

    #[error("record has no type: {record}")]
    MissingType { record: String },

    #[error("record of type {type_name} has no id: {record}")]
    MissingId { type_name: String, record: String },

    #[error("type {type_name} is not present in metadata")]
    UnknownType { type_name: String },

    #[error("could not resolve id [{key} - {value}] on type {type_name}")]
    IdResolution {
        key: String,
        value: String,
        type_name: String,
    },
}

/// Error while fetching or parsing type metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata fetch failed: {message}")]
    Fetch { message: String, retryable: bool },

    #[error("metadata document is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("metadata fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl MetadataError {
    /// Returns `true` if another fetch attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetadataError::Fetch { retryable: true, .. })
    }
}

/// Error reported by a message transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transient send failure: {0}")]
    Transient(String),

    #[error("send failed: {0}")]
    Fatal(String),

    #[error("send failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl TransportError {
    /// Returns `true` if the send may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Error that aborts a publish call before a delivery status exists.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("message body serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("message body compression failed: {0}")]
    Compress(#[from] std::io::Error),

    #[error("chunk upload task failed: {0}")]
    Task(String),
}
