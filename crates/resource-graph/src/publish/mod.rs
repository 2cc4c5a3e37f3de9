//! Publication of typed collections to the ingestion topic.
//!
//! - [`preprocess`]: records to wire shape
//! - [`message`]: message body, chain entries and statuses
//! - [`transport`]: the send seam and its retry wrapper
//! - [`publisher`]: validation, encoding and delivery

pub mod message;
pub mod preprocess;
pub mod publisher;
pub mod transport;

pub use message::{
    ConnectionModel, CopyModelAction, DeleteAction, LoadStatus, LoadWithSplitStatus, MessageBody,
    MessageChainEntry, ModelAction, ModelActionFields, DEFAULT_OPERATION,
};
pub use preprocess::{ReceiveModel, UploadPreprocessor, WireRecord};
pub use publisher::{LoadRequest, Publisher, SharedResolver, MODEL_ID_MISSING, NO_OBJECTS};
pub use transport::{
    DeliveryReport, OutboundMessage, PersistenceStatus, RetryingTransport, Transport,
};
