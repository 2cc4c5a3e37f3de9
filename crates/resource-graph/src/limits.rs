//! Reserved names and numeric limits shared across the pipeline.

/// Marker base type of time-bounded activities.
pub const PROCESS_TYPE: &str = "Process";

/// Generic root type whose properties every type inherits.
pub const OBJECT_TYPE: &str = "Object";

/// Attribute holding a record's type name.
pub const TYPE_FIELD: &str = "type";

/// Attribute holding a record's identity.
pub const ID_FIELD: &str = "id";

/// Per-record identity matching flag.
pub const NEEDS_MATCH_FIELD: &str = "needsMatch";

/// Legacy spelling of [`NEEDS_MATCH_FIELD`].
pub const NEEDS_MATCH_LEGACY_FIELD: &str = "NeedsMatch";

/// Reserved navigation name of the process -> influenced object link.
pub const INFLUENCED_OBJECT: &str = "InfluencedObject";

/// Attribute naming the type of the object a process influences.
pub const INFLUENCED_OBJECT_TYPE_FIELD: &str = "InfluencedObjectType";

/// Foreign key of the process -> influenced object link.
pub const INFLUENCED_OBJECT_ID_FIELD: &str = "InfluencedObjectId";

/// Discriminator shared by all process records.
pub const PROCESS_TYPE_FIELD: &str = "ProcessType";

/// Geometry attribute, never schema-checked.
pub const GEOMETRY_FIELD: &str = "Geometry";

/// Bucket reserved for relation records.
pub const RELATIONS_BUCKET: &str = "object_relations";

/// Bucket produced by serialised key/value pairs; never uploaded.
pub const KEY_VALUE_PAIR_BUCKET: &str = "KeyValuePair";

/// Spreadsheet row marker attached by importers.
pub const ROW_ID_FIELD: &str = "rowId";

/// Short display name, kept even when the schema does not declare it.
pub const NAME_SHORT_RU_FIELD: &str = "NameShortRu";

/// Property type name whose sequences are validated in full.
pub const NAMED_TIME_SERIES_TYPE: &str = "NamedTimeSeries";

/// Default upper bound for a single overflow chunk, in MB.
pub const DEFAULT_MAX_CHUNK_MB: f64 = 40.0;

/// Default size the primary chunk is trimmed below, in MB.
pub const DEFAULT_PRIMARY_BUDGET_MB: f64 = 20.0;

/// Overhead factor added to the estimated size of a sequence.
pub const SEQUENCE_OVERHEAD: f64 = 0.1;

/// Number of sequence elements sampled during validation.
pub const VALIDATION_SAMPLE_LEN: usize = 2;

/// Default number of metadata fetch retries.
pub const DEFAULT_METADATA_RETRIES: u32 = 7;

/// Default number of send retries.
pub const DEFAULT_SEND_RETRIES: u32 = 5;

/// Cap for any single backoff delay, in milliseconds.
pub const BACKOFF_MAX_MS: u64 = 60_000;

/// Zstd level used when compressing message bodies.
pub const BODY_COMPRESSION_LEVEL: i32 = 3;
