//! Schema validation of typed collections.
//!
//! Validation never fails: every problem is reported as a plain-text
//! diagnostic and the caller decides whether to proceed. Diagnostics are
//! collected exhaustively and deduplicated, in discovery order.

pub mod schema;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{info, warn};

use crate::graph::TypedCollection;
use crate::limits::{
    GEOMETRY_FIELD, ID_FIELD, INFLUENCED_OBJECT_ID_FIELD, NAMED_TIME_SERIES_TYPE,
    NEEDS_MATCH_FIELD, PROCESS_TYPE, PROCESS_TYPE_FIELD, RELATIONS_BUCKET, TYPE_FIELD,
    VALIDATION_SAMPLE_LEN,
};
use crate::model::{PropertySchema, Record, SchemaKind, TypeRegistry, Value};

pub use schema::{SchemaViolation, ViolationKind};

/// A property a record of some type may carry.
#[derive(Debug, Clone, PartialEq)]
struct AllowedProperty {
    type_name: String,
    schema: PropertySchema,
}

impl AllowedProperty {
    fn synthetic(schema: PropertySchema) -> Self {
        Self {
            type_name: String::new(),
            schema,
        }
    }
}

#[derive(Debug, Default)]
struct Diagnostics {
    seen: FxHashSet<String>,
    out: Vec<String>,
}

impl Diagnostics {
    fn push(&mut self, message: String) {
        if self.seen.insert(message.clone()) {
            self.out.push(message);
        }
    }
}

/// Validates typed collections against type metadata.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<TypeRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Returns every diagnostic for `collection`; empty means valid.
    pub fn validate(&self, collection: &TypedCollection) -> Vec<String> {
        let mut diagnostics = Diagnostics::default();
        for (bucket, records) in collection.buckets() {
            self.validate_bucket(bucket, records.iter().collect(), true, &mut diagnostics);
        }
        if !diagnostics.out.is_empty() {
            warn!(
                diagnostics = diagnostics.out.len(),
                "typed collection failed validation"
            );
        }
        diagnostics.out
    }

    fn validate_bucket(
        &self,
        bucket: &str,
        records: Vec<&Record>,
        regroup: bool,
        diagnostics: &mut Diagnostics,
    ) {
        if bucket == RELATIONS_BUCKET {
            return;
        }
        if !self.registry.contains(bucket) {
            diagnostics.push(format!("Type {bucket} no contains in Metadata types"));
            return;
        }
        info!(bucket, records = records.len(), "validating bucket");

        if regroup && (bucket == PROCESS_TYPE || self.registry.is_process(bucket)) {
            for (process_type, group) in group_by_process_type(bucket, records) {
                self.validate_bucket(&process_type, group, false, diagnostics);
            }
            return;
        }

        let allowed = self.allowed_properties(bucket);
        for record in records {
            for (key, value) in record.iter() {
                if key == GEOMETRY_FIELD {
                    continue;
                }
                let Some(property) = allowed.get(&key.to_lowercase()) else {
                    diagnostics.push(format!("Type {bucket} no contains property {key}"));
                    continue;
                };
                let sample = sample(value, property);
                for violation in property.schema.validate(&sample) {
                    diagnostics.push(format!(
                        "Type {bucket}, property {key} --error: {violation}, schema: type: {}, format: {}",
                        violation.schema_type(),
                        violation.schema_format(),
                    ));
                }
            }
        }
    }

    /// Declared properties of the type, its subtypes, its base chain and
    /// `Object`, plus `{navigation}Id` keys and the reserved attributes,
    /// keyed case-insensitively.
    fn allowed_properties(&self, type_name: &str) -> FxHashMap<String, AllowedProperty> {
        let mut allowed: FxHashMap<String, AllowedProperty> = FxHashMap::default();
        for property in self.registry.properties_with_hierarchy(type_name) {
            allowed
                .entry(property.name.to_lowercase())
                .or_insert_with(|| AllowedProperty {
                    type_name: property.type_name.clone(),
                    schema: property.schema.clone(),
                });
        }
        for rel in self.registry.relationships_with_hierarchy(type_name) {
            let key = format!("{}Id", rel.relationship.navigation_name).to_lowercase();
            allowed
                .entry(key)
                .or_insert_with(|| AllowedProperty::synthetic(PropertySchema::uuid()));
        }

        let reserved = [
            (INFLUENCED_OBJECT_ID_FIELD, PropertySchema::uuid()),
            (ID_FIELD, PropertySchema::uuid()),
            (TYPE_FIELD, PropertySchema::of(SchemaKind::String)),
            (NEEDS_MATCH_FIELD, PropertySchema::of(SchemaKind::Boolean)),
        ];
        for (name, schema) in reserved {
            allowed
                .entry(name.to_lowercase())
                .or_insert_with(|| AllowedProperty::synthetic(schema));
        }
        allowed
    }
}

/// Splits process records by their discriminator, keeping first-seen
/// order. Records without one stay under `bucket`.
fn group_by_process_type<'a>(bucket: &str, records: Vec<&'a Record>) -> Vec<(String, Vec<&'a Record>)> {
    let mut groups: Vec<(String, Vec<&'a Record>)> = Vec::new();
    for record in records {
        let key = record
            .get(PROCESS_TYPE_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(bucket);
        match groups.iter_mut().find(|(name, _)| name == key) {
            Some((_, group)) => group.push(record),
            None => groups.push((key.to_string(), vec![record])),
        }
    }
    groups
}

/// The JSON checked for a value: sequences are sampled unless the
/// property is a named time series.
fn sample(value: &Value, property: &AllowedProperty) -> serde_json::Value {
    match value {
        Value::Sequence(items) if property.type_name != NAMED_TIME_SERIES_TYPE => {
            serde_json::Value::Array(
                items
                    .iter()
                    .take(VALIDATION_SAMPLE_LEN)
                    .map(Value::to_json)
                    .collect(),
            )
        }
        other => other.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, Metadata, ObjectType, Property, Relationship};

    fn registry() -> Arc<TypeRegistry> {
        let number = || PropertySchema::of(SchemaKind::Number);
        let series = || PropertySchema::array_of(PropertySchema::of(SchemaKind::Number));
        Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Object")
                    .with_property(Property::new("Comment", PropertySchema::of(SchemaKind::String))),
                ObjectType::new("Foo"),
                ObjectType::new("Process")
                    .with_property(Property::new("ProcessType", PropertySchema::of(SchemaKind::String))),
                ObjectType::new("Drilling")
                    .with_base("Process")
                    .with_property(Property::new("Rate", number()))
                    .with_property(Property::new("Samples", series()))
                    .with_property(
                        Property::new("Curve", series()).with_type_name(NAMED_TIME_SERIES_TYPE),
                    ),
                ObjectType::new("Well")
                    .with_subtype("ProducingWell")
                    .with_property(Property::new("Depth", number()))
                    .with_relationship(
                        Relationship::new("Bore", "Bores")
                            .reverse("Well")
                            .cardinality(Some(1), None),
                    ),
                ObjectType::new("ProducingWell")
                    .with_property(Property::new("Rate", number())),
                ObjectType::new("Bore"),
            ],
        }))
    }

    fn validate(records: Vec<Record>) -> Vec<String> {
        Validator::new(registry()).validate(&TypedCollection::from_records(records))
    }

    #[test]
    fn test_unknown_property() {
        let diagnostics = validate(vec![Record::new("Foo", new_id()).with("extraField", 1)]);
        assert_eq!(diagnostics, vec!["Type Foo no contains property extraField".to_string()]);
    }

    #[test]
    fn test_unknown_type() {
        let diagnostics = validate(vec![Record::new("Nope", new_id())]);
        assert_eq!(diagnostics, vec!["Type Nope no contains in Metadata types".to_string()]);
    }

    #[test]
    fn test_valid_record_with_hierarchy_and_reserved_fields() {
        let diagnostics = validate(vec![
            Record::new("Well", new_id())
                .with("Depth", 1200.5)
                .with("Rate", 3)
                .with("Comment", "ok")
                .with("needsMatch", false)
                .with("NEEDSMATCH", Value::Null)
                .with("Geometry", Value::Map(Default::default())),
            Record::new("Bore", new_id()).with("WellId", new_id()),
        ]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_schema_violation_format() {
        let diagnostics = validate(vec![Record::new("Well", new_id()).with("Depth", "deep")]);
        assert_eq!(
            diagnostics,
            vec!["Type Well, property Depth --error: NumberExpected: #, schema: type: number, format: "
                .to_string()]
        );
    }

    #[test]
    fn test_process_records_validate_against_process_type() {
        let diagnostics = validate(vec![
            Record::new("Process", new_id()).with("ProcessType", "Drilling").with("Rate", 5),
            Record::new("Process", new_id()).with("ProcessType", "Drilling").with("Rate", 7),
        ]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");

        let diagnostics = validate(vec![Record::new("Process", new_id())
            .with("ProcessType", "Drilling")
            .with("Depth", 5)]);
        assert_eq!(diagnostics, vec!["Type Drilling no contains property Depth".to_string()]);
    }

    #[test]
    fn test_sequences_are_sampled() {
        let values = |bad_at: usize| {
            Value::Sequence(
                (0..4)
                    .map(|i| if i == bad_at { Value::from("x") } else { Value::Int(i as i64) })
                    .collect(),
            )
        };
        let diagnostics = validate(vec![Record::new("Drilling", new_id())
            .with("ProcessType", "Drilling")
            .with("Samples", values(3))]);
        assert!(diagnostics.is_empty());

        let diagnostics = validate(vec![Record::new("Drilling", new_id())
            .with("ProcessType", "Drilling")
            .with("Curve", values(3))]);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("NumberExpected: #/3"));
    }

    #[test]
    fn test_duplicates_suppressed_and_relations_skipped() {
        let mut collection = TypedCollection::from_records(vec![
            Record::new("Foo", new_id()).with("extra", 1),
            Record::new("Foo", new_id()).with("extra", 2),
        ]);
        collection.push(RELATIONS_BUCKET, Record::new(RELATIONS_BUCKET, new_id()));
        let diagnostics = Validator::new(registry()).validate(&collection);
        assert_eq!(diagnostics.len(), 1);
    }
}
