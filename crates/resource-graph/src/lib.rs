//! Resource graph: extraction, normalisation and publication of typed
//! resource records.
//!
//! This crate turns arbitrary nested values into flat, typed records linked
//! by foreign keys, checks them against external type metadata and
//! publishes them to an ingestion topic in size-bounded chunks.
//!
//! # Overview
//!
//! A pipeline run goes through these stages:
//! - **Extraction**: any `Serialize` value becomes an [`ObjectGraph`] of
//!   records merged by id, with one edge per embedded object
//! - **Splitting**: oversized graphs are cut into a primary chunk plus
//!   overflow chunks of process records
//! - **Normalisation**: edges become inlined [`Reference`]s or
//!   many-to-many [`Relation`]s, as decided by a [`LinkResolver`]
//! - **Validation**: every attribute is checked against the metadata
//! - **Publication**: records are reshaped into wire records and sent
//!   through a retrying [`Transport`]
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use resource_graph::{
//!     Extractor, Metadata, ObjectType, Relationship, TypeInfoResolver, TypeRegistry, Value,
//! };
//! use serde_json::json;
//!
//! let registry = Arc::new(TypeRegistry::new(Metadata {
//!     types: vec![
//!         ObjectType::new("Well").with_relationship(
//!             Relationship::new("Bore", "Bores")
//!                 .reverse("Well")
//!                 .cardinality(Some(1), None),
//!         ),
//!         ObjectType::new("Bore"),
//!     ],
//! }));
//!
//! let well = json!({
//!     "type": "Well",
//!     "id": "3f2504e0-4f89-41d3-9a0c-0305e82c3301",
//!     "Bores": [{"type": "Bore", "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7"}]
//! });
//! let graph = Extractor::default().extract(&well)?;
//! assert_eq!(graph.len(), 2);
//!
//! let linked = graph.to_typed_collection(&TypeInfoResolver::new(registry))?;
//! let bore = &linked.collection.get("Bore").unwrap()[0];
//! assert!(matches!(bore.get("WellId"), Some(Value::Reference(_))));
//! # Ok::<(), resource_graph::GraphError>(())
//! ```
//!
//! # Modules
//!
//! - [`model`]: ids, values, records and type metadata
//! - [`graph`]: object graph, extractor, resolver, typed collections, splitter
//! - [`validate`]: schema diagnostics
//! - [`publish`]: wire preprocessing, message body, transport, publisher
//! - [`metadata`]: metadata loading with retry and caching
//! - [`config`]: publisher and loader settings
//! - [`error`]: error types
//! - [`limits`]: reserved names and default limits

pub mod config;
pub mod error;
pub mod graph;
pub mod limits;
pub mod metadata;
pub mod model;
pub mod publish;
pub mod util;
pub mod validate;

// Re-export commonly used types at crate root
pub use config::{Compression, MetadataConfig, PublisherConfig, RetryPolicy};
pub use error::{GraphError, MetadataError, PublishError, TransportError};
pub use graph::{
    Describe, Edge, EntityDescriptor, Extractor, LinkContext, LinkResolver, LinkedCollection,
    Multiplicity, ObjectGraph, Relation, RelationSet, SchemaCache, SizeSplitter, SplitConfig,
    TypeInfo, TypeInfoResolver, TypedCollection,
};
pub use metadata::{FileMetadataSource, MetadataLoader, MetadataSource, StaticMetadataSource};
pub use model::{
    Attributes, Direction, Id, Metadata, ObjectType, Property, PropertySchema, Record, Reference,
    Relationship, SchemaKind, TypeRegistry, Value,
};
pub use model::id::{derived_uuid, format_id, new_id, parse_id, payload_id, NIL_ID};
pub use publish::{
    ConnectionModel, DeleteAction, LoadRequest, LoadStatus, LoadWithSplitStatus,
    MessageChainEntry, ModelAction, Publisher, Transport,
};
pub use validate::Validator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
