//! Data model types.
//!
//! - Identifiers (UUIDs)
//! - Values (scalars, sequences, nested maps, references)
//! - Records (flat attribute bags carrying `type` and `id`)
//! - Type metadata (object types, properties, relationships)

pub mod id;
pub mod metadata;
pub mod record;
pub mod value;

pub use id::{derived_uuid, format_id, new_id, parse_id, payload_id, Id, NIL_ID};
pub use metadata::{
    Direction, Metadata, ObjectType, Property, PropertySchema, Relationship, RelationshipRef,
    SchemaKind, TypeRegistry,
};
pub use record::{is_identity_key, Record};
pub use value::{Attributes, Reference, Value};
