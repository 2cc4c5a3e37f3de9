//! Object graph construction and normalisation.
//!
//! - [`extract`]: values to graphs
//! - [`object_graph`]: the arena-backed graph
//! - [`resolve`]: metadata-driven relationship resolution
//! - [`typed`]: graphs to typed collections with inlined foreign keys
//! - [`split`]: size-bounded partitioning

pub mod extract;
pub mod object_graph;
pub mod resolve;
pub mod split;
pub mod typed;

pub use extract::{rust_type_name, Describe, EntityDescriptor, Extractor, SchemaCache};
pub use object_graph::{Edge, ObjectGraph, PathFinder, RecordIx};
pub use resolve::{
    LinkContext, LinkResolver, Multiplicity, TieBreak, TieBreakInput, TypeInfo, TypeInfoResolver,
};
pub use split::{estimate_bucket, estimate_record, estimate_size, SizeSplitter, SplitChunks, SplitConfig};
pub use typed::{LinkedCollection, Relation, RelationSet, TypedCollection};
