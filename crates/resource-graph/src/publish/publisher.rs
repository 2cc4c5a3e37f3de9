//! Validated, retried publication of typed collections and graphs.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{Compression, PublisherConfig};
use crate::error::PublishError;
use crate::graph::{
    Extractor, LinkResolver, ObjectGraph, SchemaCache, SizeSplitter, TypeInfoResolver,
    TypedCollection,
};
use crate::limits::BODY_COMPRESSION_LEVEL;
use crate::model::{format_id, new_id, payload_id, Id, TypeRegistry};
use crate::validate::Validator;

use super::message::{
    ConnectionModel, DeleteAction, LoadStatus, LoadWithSplitStatus, MessageBody,
    MessageChainEntry, ModelAction, DEFAULT_OPERATION,
};
use super::preprocess::UploadPreprocessor;
use super::transport::{OutboundMessage, RetryingTransport, Transport};

/// Status message of a call without a target model.
pub const MODEL_ID_MISSING: &str = "modelId is null";

/// Status message of a call with an empty graph.
pub const NO_OBJECTS: &str = "no objects in message";

/// Resolver shared with chunk upload tasks.
pub type SharedResolver = Arc<dyn LinkResolver + Send + Sync>;

/// Per-call parameters of an upload.
#[derive(Clone)]
pub struct LoadRequest {
    pub trace_id: Id,
    pub model_id: Option<Id>,
    /// Operation recorded in the delivery chain.
    pub operation: String,
    /// Hops the message already went through.
    pub chain: Vec<MessageChainEntry>,
    /// Connections sent in addition to those derived from the graph.
    pub connections: Vec<ConnectionModel>,
    pub model_action: Option<ModelAction>,
    pub delete_actions: Vec<DeleteAction>,
    /// Overrides the configured topic.
    pub topic: Option<String>,
    /// Overrides the metadata resolver for graph uploads.
    pub resolver: Option<SharedResolver>,
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("trace_id", &self.trace_id)
            .field("model_id", &self.model_id)
            .field("operation", &self.operation)
            .field("chain", &self.chain)
            .field("connections", &self.connections.len())
            .field("model_action", &self.model_action)
            .field("delete_actions", &self.delete_actions)
            .field("topic", &self.topic)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl LoadRequest {
    pub fn new(trace_id: Id, model_id: Option<Id>) -> Self {
        Self {
            trace_id,
            model_id,
            operation: DEFAULT_OPERATION.to_string(),
            chain: Vec::new(),
            connections: Vec::new(),
            model_action: None,
            delete_actions: Vec::new(),
            topic: None,
            resolver: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_chain(mut self, chain: Vec<MessageChainEntry>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_connections(mut self, connections: Vec<ConnectionModel>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_model_action(mut self, action: ModelAction) -> Self {
        self.model_action = Some(action);
        self
    }

    pub fn with_delete_actions(mut self, actions: Vec<DeleteAction>) -> Self {
        self.delete_actions = actions;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Validates, preprocesses and sends records to the ingestion topic.
///
/// Cloning is cheap; clones share the transport and every cache.
#[derive(Clone)]
pub struct Publisher {
    config: Arc<PublisherConfig>,
    extractor: Extractor,
    resolver: TypeInfoResolver,
    splitter: SizeSplitter,
    validator: Validator,
    preprocessor: UploadPreprocessor,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Wraps `transport` in a [`RetryingTransport`] using the configured
    /// retry policy.
    pub fn new<T>(config: PublisherConfig, registry: Arc<TypeRegistry>, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let transport: Arc<dyn Transport> = Arc::new(RetryingTransport::new(transport, config.retry));
        Self {
            extractor: Extractor::default().strip_nulls(config.strip_nulls),
            resolver: TypeInfoResolver::new(Arc::clone(&registry)),
            splitter: SizeSplitter::new(Arc::clone(&registry), config.split),
            validator: Validator::new(Arc::clone(&registry)),
            preprocessor: UploadPreprocessor::new(registry),
            config: Arc::new(config),
            transport,
        }
    }

    /// Uses `cache` for entity descriptors during extraction.
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.extractor = Extractor::new(cache).strip_nulls(self.config.strip_nulls);
        self
    }

    /// Replaces the default metadata resolver.
    pub fn with_resolver(mut self, resolver: TypeInfoResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Extracts `value` and uploads it with [`load_with_split`](Self::load_with_split).
    pub async fn publish<T>(
        &self,
        value: &T,
        request: &LoadRequest,
    ) -> Result<LoadWithSplitStatus, PublishError>
    where
        T: Serialize + ?Sized + 'static,
    {
        let graph = self.extractor.extract(value)?;
        self.load_with_split(&graph, request).await
    }

    /// Splits `graph` by size and uploads every chunk concurrently.
    ///
    /// The combined status is loaded only if every chunk loaded.
    pub async fn load_with_split(
        &self,
        graph: &ObjectGraph,
        request: &LoadRequest,
    ) -> Result<LoadWithSplitStatus, PublishError> {
        let chunks = self.splitter.split(graph);
        let count = chunks.len();
        info!(trace_id = %request.trace_id, chunks = count, "uploading split graph");

        let mut tasks = JoinSet::new();
        for (index, chunk) in chunks.enumerate() {
            let publisher = self.clone();
            let request = request.clone();
            tasks.spawn(async move { (index, publisher.load_graph(&chunk, &request).await) });
        }

        let mut statuses = Vec::with_capacity(count);
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| PublishError::Task(e.to_string()))?;
            statuses.push((index, result?));
        }
        statuses.sort_by_key(|(index, _)| *index);

        let status =
            LoadWithSplitStatus::from_statuses(statuses.into_iter().map(|(_, s)| s).collect());
        info!(
            trace_id = %request.trace_id,
            loaded = status.is_loaded,
            have_errors = status.have_errors,
            "split upload finished"
        );
        Ok(status)
    }

    /// Normalises `graph`, prunes undeclared attributes and uploads it with
    /// the graph's many-to-many links as connections.
    pub async fn load_graph(
        &self,
        graph: &ObjectGraph,
        request: &LoadRequest,
    ) -> Result<LoadStatus, PublishError> {
        if graph.is_empty() {
            return Ok(LoadStatus::empty(NO_OBJECTS));
        }

        let linked = match &request.resolver {
            Some(resolver) => graph.to_typed_collection(resolver.as_ref())?,
            None => graph.to_typed_collection(&self.resolver)?,
        };
        let mut collection = linked.collection;
        self.preprocessor.prune_unregistered(&mut collection);

        let mut connections = ConnectionModel::from_relations(&linked.relations);
        connections.extend(request.connections.iter().cloned());

        info!(trace_id = %request.trace_id, records = collection.len(), "validating graph upload");
        let request = LoadRequest {
            connections,
            ..request.clone()
        };
        self.load_all(collection, &request).await
    }

    /// Validates `collection` and sends it as one message.
    ///
    /// Diagnostics and a missing model id yield a failed status without
    /// sending. Transport failures yield a failed status carrying the
    /// message id; structural record errors are returned as errors.
    pub async fn load_all(
        &self,
        collection: TypedCollection,
        request: &LoadRequest,
    ) -> Result<LoadStatus, PublishError> {
        let diagnostics = self.validator.validate(&collection);
        if !diagnostics.is_empty() {
            let error = diagnostics.join(", ");
            info!(trace_id = %request.trace_id, %error, "upload rejected by validation");
            return Ok(LoadStatus::rejected(error));
        }

        let data = self.preprocessor.create_receive_models(collection)?;

        let Some(model_id) = request.model_id else {
            info!(trace_id = %request.trace_id, error = MODEL_ID_MISSING, "upload rejected");
            return Ok(LoadStatus::rejected(MODEL_ID_MISSING));
        };

        let message_id = new_id();
        let body = MessageBody {
            message_id,
            model_id,
            model_action: request.model_action.clone(),
            data,
            connections: (!request.connections.is_empty()).then(|| request.connections.clone()),
            delete: request.delete_actions.clone(),
        };
        let message = self.encode(message_id, &body, request)?;

        match self.transport.send(&message).await {
            Ok(report) => {
                let persisted = report.is_persisted();
                info!(
                    %message_id,
                    trace_id = %request.trace_id,
                    offset = ?report.offset,
                    status = report.status.as_str(),
                    "message delivered"
                );
                Ok(LoadStatus {
                    message_id,
                    is_loaded: persisted,
                    have_errors: !persisted,
                    message: Some(report.status.as_str().to_string()),
                })
            }
            Err(err) => {
                error!(%message_id, trace_id = %request.trace_id, error = %err, "delivery failed");
                Ok(LoadStatus {
                    message_id,
                    is_loaded: false,
                    have_errors: true,
                    message: Some(err.to_string()),
                })
            }
        }
    }

    fn encode(
        &self,
        message_id: Id,
        body: &MessageBody,
        request: &LoadRequest,
    ) -> Result<OutboundMessage, PublishError> {
        let payload = serde_json::to_vec(body)?;

        let mut chain = request.chain.clone();
        chain.push(MessageChainEntry::new(
            request.trace_id,
            self.config.client_id.as_str(),
            request.operation.as_str(),
        ));

        let mut headers = vec![
            ("messageId".to_string(), format_id(&message_id)),
            ("traceId".to_string(), format_id(&request.trace_id)),
            (
                "payloadId".to_string(),
                format_id(&payload_id(&request.trace_id, &payload)),
            ),
            ("chain".to_string(), serde_json::to_string(&chain)?),
        ];
        let payload = match self.config.compression {
            Compression::None => payload,
            Compression::Zstd => {
                headers.push(("content-encoding".to_string(), "zstd".to_string()));
                zstd::encode_all(payload.as_slice(), BODY_COMPRESSION_LEVEL)?
            }
        };

        Ok(OutboundMessage {
            topic: request
                .topic
                .clone()
                .unwrap_or_else(|| self.config.topic.clone()),
            key: self.config.client_id.clone(),
            headers,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::graph::{LinkContext, Multiplicity, Relation, TypeInfo};
    use crate::model::{
        new_id, Direction, Metadata, ObjectType, Property, PropertySchema, Record, Relationship,
        SchemaKind,
    };
    use crate::publish::transport::{DeliveryReport, PersistenceStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutboundMessage>>,
        status: Option<PersistenceStatus>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReport, TransportError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(DeliveryReport {
                status: self.status.unwrap_or(PersistenceStatus::Persisted),
                offset: Some(1),
            })
        }
    }

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Object"),
                ObjectType::new("Well")
                    .with_property(Property::new("Depth", PropertySchema::of(SchemaKind::Number)))
                    .with_relationship(
                        Relationship::new("Bore", "Bores")
                            .reverse("Well")
                            .cardinality(Some(1), None),
                    )
                    .with_relationship(Relationship::new("Pad", "Pads").cardinality(None, None)),
                ObjectType::new("Bore"),
                ObjectType::new("Pad"),
            ],
        }))
    }

    fn publisher(transport: Arc<Recording>, config: PublisherConfig) -> Publisher {
        Publisher::new(config, registry(), transport)
    }

    fn payload_json(message: &OutboundMessage) -> serde_json::Value {
        serde_json::from_slice(&message.payload).unwrap()
    }

    #[tokio::test]
    async fn test_missing_model_id_is_rejected_without_sending() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let collection = TypedCollection::from_records(vec![Record::new("Well", new_id())]);

        let status = publisher
            .load_all(collection, &LoadRequest::new(new_id(), None))
            .await
            .unwrap();
        assert!(!status.is_loaded);
        assert!(status.have_errors);
        assert_eq!(status.message.as_deref(), Some("modelId is null"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_is_rejected_without_sending() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let collection = TypedCollection::from_records(vec![
            Record::new("Well", new_id()).with("Depth", "deep").with("Extra", 1),
        ]);

        let status = publisher
            .load_all(collection, &LoadRequest::new(new_id(), Some(new_id())))
            .await
            .unwrap();
        assert!(!status.is_loaded);
        assert!(status.message.unwrap().contains("Type Well no contains property Extra"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_body_and_headers() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let trace = new_id();
        let model = new_id();
        let well = new_id();
        let collection =
            TypedCollection::from_records(vec![Record::new("Well", well).with("Depth", 3.5)]);
        let request = LoadRequest::new(trace, Some(model))
            .with_topic("override")
            .with_operation("import")
            .with_chain(vec![MessageChainEntry::new(trace, "upstream", "add")]);

        let status = publisher.load_all(collection, &request).await.unwrap();
        assert!(status.is_loaded);
        assert!(!status.have_errors);
        assert_eq!(status.message.as_deref(), Some("OK"));

        let sent = transport.sent.lock().unwrap();
        let message = &sent[0];
        assert_eq!(message.topic, "override");
        assert_eq!(message.key, publisher.config().client_id);
        assert_eq!(message.header("messageId"), Some(format_id(&status.message_id).as_str()));
        assert_eq!(message.header("traceId"), Some(format_id(&trace).as_str()));
        assert!(message.header("payloadId").is_some());
        assert!(message.header("content-encoding").is_none());

        let chain: Vec<MessageChainEntry> =
            serde_json::from_str(message.header("chain").unwrap()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].operation, "import");
        assert_eq!(chain[1].sender_id, publisher.config().client_id);

        let body = payload_json(message);
        assert_eq!(body["modelId"], model.to_string());
        assert_eq!(body["messageId"], status.message_id.to_string());
        assert_eq!(body["data"][0]["type"], "Well");
        assert_eq!(body["data"][0]["data"]["globalId"], well.to_string());
        assert_eq!(body["data"][0]["data"]["Well"]["Depth"], 3.5);
        assert!(body["connections"].is_null());
        assert_eq!(body["delete"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_zstd_compression() {
        let transport = Arc::new(Recording::default());
        let config = PublisherConfig {
            compression: Compression::Zstd,
            ..PublisherConfig::default()
        };
        let publisher = publisher(Arc::clone(&transport), config);
        let collection = TypedCollection::from_records(vec![Record::new("Well", new_id())]);
        publisher
            .load_all(collection, &LoadRequest::new(new_id(), Some(new_id())))
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].header("content-encoding"), Some("zstd"));
        let body = zstd::decode_all(sent[0].payload.as_slice()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"][0]["type"], "Well");
    }

    #[tokio::test]
    async fn test_not_persisted_is_a_failed_delivery() {
        let transport = Arc::new(Recording {
            status: Some(PersistenceStatus::PossiblyPersisted),
            ..Recording::default()
        });
        let publisher = publisher(transport, PublisherConfig::default());
        let collection = TypedCollection::from_records(vec![Record::new("Well", new_id())]);
        let status = publisher
            .load_all(collection, &LoadRequest::new(new_id(), Some(new_id())))
            .await
            .unwrap();
        assert!(!status.is_loaded);
        assert!(!status.message_id.is_nil());
        assert_eq!(status.message.as_deref(), Some("FAIL"));
    }

    #[tokio::test]
    async fn test_load_graph_inlines_references_and_sends_connections() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let mut graph = ObjectGraph::new();
        let well_id = new_id();
        let pad_id = new_id();
        let well = graph
            .add_record(Record::new("Well", well_id).with("rowId", 2).with("Scratch", "x"))
            .unwrap();
        let bore = graph.add_record(Record::new("Bore", new_id())).unwrap();
        let pad = graph.add_record(Record::new("Pad", pad_id)).unwrap();
        graph.add_edge(well, bore, "Bores").unwrap();
        graph.add_edge(well, pad, "Pads").unwrap();

        let extra = ConnectionModel::new("Well", "Other", vec![Relation::new(well_id, pad_id)]);
        let request = LoadRequest::new(new_id(), Some(new_id())).with_connections(vec![extra]);
        let status = publisher.load_graph(&graph, &request).await.unwrap();
        assert!(status.is_loaded, "{status:?}");

        let body = payload_json(&transport.sent.lock().unwrap()[0]);
        let bore = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["type"] == "Bore")
            .unwrap();
        assert_eq!(bore["data"]["Bore"]["WellId"], well_id.to_string());
        let well = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["type"] == "Well")
            .unwrap();
        assert!(well["data"].get("Well").is_none());

        let connections = body["connections"].as_array().unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0]["sourceType"], "Well");
        assert_eq!(connections[0]["navigationName"], "Pads");
        assert_eq!(connections[0]["connections"][0]["from"], well_id.to_string());
        assert_eq!(connections[1]["navigationName"], "Other");
    }

    #[tokio::test]
    async fn test_load_graph_with_custom_resolver() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let mut graph = ObjectGraph::new();
        let well = graph.add_record(Record::new("Well", new_id())).unwrap();
        let pad = graph.add_record(Record::new("Pad", new_id())).unwrap();
        graph.add_edge(well, pad, "Pads").unwrap();

        fn pad_owns_well(link: &LinkContext<'_>) -> TypeInfo {
            TypeInfo::new(
                (Multiplicity::Many, Multiplicity::One),
                Direction::Forward,
                (link.source_type.to_string(), link.target_type.to_string()),
            )
        }
        let request = LoadRequest::new(new_id(), Some(new_id()))
            .with_resolver(Arc::new(pad_owns_well));
        let status = publisher.load_graph(&graph, &request).await.unwrap();
        assert!(status.is_loaded, "{status:?}");

        let body = payload_json(&transport.sent.lock().unwrap()[0]);
        assert!(body["connections"].is_null());
    }

    #[tokio::test]
    async fn test_empty_graph_is_not_sent() {
        let transport = Arc::new(Recording::default());
        let publisher = publisher(Arc::clone(&transport), PublisherConfig::default());
        let status = publisher
            .load_graph(&ObjectGraph::new(), &LoadRequest::new(new_id(), Some(new_id())))
            .await
            .unwrap();
        assert!(status.is_loaded);
        assert!(status.message_id.is_nil());
        assert_eq!(status.message.as_deref(), Some(NO_OBJECTS));
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
