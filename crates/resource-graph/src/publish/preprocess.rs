//! Reshapes normalised records into the ingestion wire shape.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

use crate::error::GraphError;
use crate::graph::TypedCollection;
use crate::limits::{
    GEOMETRY_FIELD, ID_FIELD, KEY_VALUE_PAIR_BUCKET, NAME_SHORT_RU_FIELD, NEEDS_MATCH_FIELD,
    NEEDS_MATCH_LEGACY_FIELD, PROCESS_TYPE, PROCESS_TYPE_FIELD, RELATIONS_BUCKET, ROW_ID_FIELD,
    TYPE_FIELD,
};
use crate::model::{Attributes, Record, TypeRegistry, Value};

lazy_static! {
    /// Attributes lifted from the type bucket onto the envelope.
    static ref ENVELOPE_KEY: Regex =
        Regex::new(r"^Name(?:Full|Short)(?:Ru|En)$|Geometry$").expect("envelope pattern is valid");
}

/// Envelope key carrying the record id.
const GLOBAL_ID_FIELD: &str = "globalId";

/// One record in wire shape: `globalId`, lifted names, then one nested
/// attribute map per type bucket.
pub type WireRecord = Attributes;

/// A preprocessed record as it appears in the message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveModel {
    #[serde(rename = "type")]
    pub type_name: String,
    pub data: WireRecord,
    pub is_reference: bool,
    pub needs_match: Option<bool>,
    pub row_id: i64,
}

/// Converts records into [`WireRecord`]s using type metadata.
#[derive(Debug, Clone)]
pub struct UploadPreprocessor {
    registry: Arc<TypeRegistry>,
}

impl UploadPreprocessor {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Moves `id` into the envelope, drops the type and match flags,
    /// extracts each included subtype's own members into a bucket named
    /// after the subtype and nests what is left under the record's type.
    pub fn process(&self, record: Record) -> Result<WireRecord, GraphError> {
        let type_name = record
            .type_name()
            .map(str::to_string)
            .ok_or_else(|| GraphError::MissingType {
                record: record.to_json().to_string(),
            })?;
        let id = match record.id_value() {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(GraphError::MissingId {
                    type_name,
                    record: record.to_json().to_string(),
                })
            }
        };
        let object_type = self
            .registry
            .get(&type_name)
            .ok_or_else(|| GraphError::UnknownType {
                type_name: type_name.clone(),
            })?;

        let mut rest = record.into_attributes();
        for key in [TYPE_FIELD, ID_FIELD, NEEDS_MATCH_FIELD, NEEDS_MATCH_LEGACY_FIELD] {
            rest.remove(key);
        }

        let mut buckets: Vec<(String, Attributes)> = Vec::new();
        for subtype in &object_type.includes_subtypes {
            let members = self.registry.own_member_names(subtype);
            let keys: Vec<String> = rest
                .iter()
                .filter(|(key, value)| members.contains(key.as_str()) && belongs_to(value, subtype))
                .map(|(key, _)| key.clone())
                .collect();
            let bucket: Attributes = keys
                .into_iter()
                .filter_map(|key| rest.remove_entry(&key))
                .collect();
            if !bucket.is_empty() {
                buckets.push((subtype.clone(), bucket));
            }
        }

        let mut wire = WireRecord::new();
        wire.insert(GLOBAL_ID_FIELD.to_string(), id);
        let lifted: Vec<String> = rest
            .keys()
            .filter(|key| ENVELOPE_KEY.is_match(key))
            .cloned()
            .collect();
        for key in lifted {
            if let Some(value) = rest.remove(&key) {
                wire.insert(key, value);
            }
        }
        if !rest.is_empty() {
            wire.insert(type_name, Value::Map(rest));
        }
        for (subtype, bucket) in buckets {
            wire.insert(subtype, Value::Map(bucket));
        }
        Ok(wire)
    }

    /// Preprocesses every record of `collection` into a [`ReceiveModel`].
    pub fn create_receive_models(
        &self,
        collection: TypedCollection,
    ) -> Result<Vec<ReceiveModel>, GraphError> {
        let mut models = Vec::with_capacity(collection.len());
        for (bucket, records) in collection {
            for mut record in records {
                let row_id = parse_row_id(record.remove(ROW_ID_FIELD));
                let needs_match = record
                    .get(NEEDS_MATCH_FIELD)
                    .or_else(|| record.get(NEEDS_MATCH_LEGACY_FIELD))
                    .and_then(Value::as_bool);
                models.push(ReceiveModel {
                    type_name: bucket.clone(),
                    data: self.process(record)?,
                    is_reference: false,
                    needs_match,
                    row_id: row_id - 1,
                });
            }
        }
        Ok(models)
    }

    /// Removes attributes the metadata does not declare for their bucket.
    ///
    /// `id`, `type`, the match flags, `NameShortRu` and `Geometry` are
    /// always kept and `rowId` is always removed. Process buckets are
    /// pruned per `ProcessType` group; unknown buckets and relation
    /// records are left alone. Key/value pair buckets are dropped.
    pub fn prune_unregistered(&self, collection: &mut TypedCollection) {
        if collection.remove_bucket(KEY_VALUE_PAIR_BUCKET).is_some() {
            debug!("dropped key/value pair bucket");
        }
        for (bucket, records) in collection.buckets_mut() {
            if bucket == RELATIONS_BUCKET || !self.registry.contains(bucket) {
                continue;
            }
            if bucket == PROCESS_TYPE || self.registry.is_process(bucket) {
                for record in records.iter_mut() {
                    let group = record
                        .get(PROCESS_TYPE_FIELD)
                        .and_then(Value::as_str)
                        .filter(|name| self.registry.contains(name))
                        .unwrap_or(bucket.as_str())
                        .to_string();
                    let allowed = self.registered_names(&group);
                    prune_record(record, &allowed);
                }
                continue;
            }
            let allowed = self.registered_names(bucket);
            for record in records.iter_mut() {
                prune_record(record, &allowed);
            }
        }
    }

    /// Lowercased property and `{navigation}Id` names of the type
    /// hierarchy plus `Object`.
    fn registered_names(&self, type_name: &str) -> FxHashSet<String> {
        let mut names: FxHashSet<String> = self
            .registry
            .properties_with_hierarchy(type_name)
            .into_iter()
            .map(|p| p.name.to_lowercase())
            .collect();
        names.extend(
            self.registry
                .relationships_with_hierarchy(type_name)
                .into_iter()
                .map(|r| format!("{}Id", r.relationship.navigation_name).to_lowercase()),
        );
        names
    }
}

fn prune_record(record: &mut Record, allowed: &FxHashSet<String>) {
    record.retain(|key, _| {
        if key == ROW_ID_FIELD {
            return false;
        }
        key.eq_ignore_ascii_case(ID_FIELD)
            || matches!(
                key,
                TYPE_FIELD
                    | NEEDS_MATCH_FIELD
                    | NEEDS_MATCH_LEGACY_FIELD
                    | NAME_SHORT_RU_FIELD
                    | GEOMETRY_FIELD
            )
            || allowed.contains(&key.to_lowercase())
    });
}

/// References tagged for another subtype stay in the flat remainder.
fn belongs_to(value: &Value, subtype: &str) -> bool {
    match value {
        Value::Reference(reference) => reference.sub_type.as_deref() == Some(subtype),
        _ => true,
    }
}

/// Spreadsheet row of a record, 0 when absent or unparsable.
fn parse_row_id(value: Option<Value>) -> i64 {
    match value {
        Some(Value::Int(row)) => row,
        Some(Value::Float(row)) if row.fract() == 0.0 => row as i64,
        Some(Value::Text(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        new_id, Metadata, ObjectType, Property, PropertySchema, Reference, Relationship, SchemaKind,
    };

    fn registry() -> Arc<TypeRegistry> {
        let text = || PropertySchema::of(SchemaKind::String);
        Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Object").with_property(Property::new("Comment", text())),
                ObjectType::new("Well")
                    .with_subtype("Drillable")
                    .with_property(Property::new("Depth", PropertySchema::of(SchemaKind::Number)))
                    .with_relationship(Relationship::new("Field", "Field").cardinality(None, Some(1))),
                ObjectType::new("Drillable")
                    .with_property(Property::new("Rig", text()))
                    .with_relationship(Relationship::new("Pad", "Pad").cardinality(None, Some(1))),
                ObjectType::new("Field"),
                ObjectType::new("Pad"),
                ObjectType::new("Process").with_property(Property::new("ProcessType", text())),
                ObjectType::new("Drilling")
                    .with_base("Process")
                    .with_property(Property::new("Rate", PropertySchema::of(SchemaKind::Number))),
            ],
        }))
    }

    #[test]
    fn test_envelope_and_type_bucket() {
        let id = new_id();
        let record = Record::new("Well", id)
            .with("Depth", 10)
            .with("NameShortRu", "W-1")
            .with("NameFullEn", "Well one")
            .with("Geometry", "POINT(0 0)")
            .with("needsMatch", true);
        let wire = UploadPreprocessor::new(registry()).process(record).unwrap();

        assert_eq!(wire.get("globalId"), Some(&Value::Id(id)));
        assert_eq!(wire.get("NameShortRu"), Some(&Value::from("W-1")));
        assert_eq!(wire.get("NameFullEn"), Some(&Value::from("Well one")));
        assert!(wire.contains_key("Geometry"));
        let Some(Value::Map(bucket)) = wire.get("Well") else {
            panic!("missing type bucket: {wire:?}");
        };
        assert_eq!(bucket.get("Depth"), Some(&Value::Int(10)));
        assert!(!bucket.contains_key("type"));
        assert!(!bucket.contains_key("needsMatch"));
    }

    #[test]
    fn test_subtype_bucket_respects_reference_tags() {
        let pad = new_id();
        let record = Record::new("Well", new_id())
            .with("Rig", "R-7")
            .with("PadId", Reference::new(pad, "Well"));
        let wire = UploadPreprocessor::new(registry()).process(record).unwrap();

        let Some(Value::Map(drillable)) = wire.get("Drillable") else {
            panic!("missing subtype bucket: {wire:?}");
        };
        assert_eq!(drillable.get("Rig"), Some(&Value::from("R-7")));
        assert!(!drillable.contains_key("PadId"));
        let Some(Value::Map(well)) = wire.get("Well") else {
            panic!("missing type bucket: {wire:?}");
        };
        assert!(well.contains_key("PadId"));

        let record = Record::new("Well", new_id()).with("PadId", Reference::new(pad, "Drillable"));
        let wire = UploadPreprocessor::new(registry()).process(record).unwrap();
        assert!(!wire.contains_key("Well"));
        assert!(wire.contains_key("Drillable"));
    }

    #[test]
    fn test_structural_errors() {
        let preprocessor = UploadPreprocessor::new(registry());
        let mut untyped = Record::new("Well", new_id());
        untyped.remove("type");
        assert!(matches!(
            preprocessor.process(untyped),
            Err(GraphError::MissingType { .. })
        ));
        assert!(matches!(
            preprocessor.process(Record::new("Well", Value::Null)),
            Err(GraphError::MissingId { .. })
        ));
        assert!(matches!(
            preprocessor.process(Record::new("Nope", new_id())),
            Err(GraphError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_receive_models() {
        let collection = TypedCollection::from_records(vec![
            Record::new("Well", new_id()).with("NeedsMatch", "false").with("rowId", 5),
            Record::new("Field", new_id()),
        ]);
        let mut models = UploadPreprocessor::new(registry())
            .create_receive_models(collection)
            .unwrap();
        models.sort_by(|a, b| a.type_name.cmp(&b.type_name));

        assert_eq!(models[0].type_name, "Field");
        assert_eq!(models[0].needs_match, None);
        assert_eq!(models[0].row_id, -1);
        assert_eq!(models[1].needs_match, Some(false));
        assert_eq!(models[1].row_id, 4);
        assert!(!models[1].data.contains_key("Well"));

        let json = serde_json::to_value(&models[1]).unwrap();
        assert_eq!(json["type"], "Well");
        assert_eq!(json["isReference"], false);
        assert_eq!(json["rowId"], 4);
    }

    #[test]
    fn test_prune_unregistered() {
        let mut collection = TypedCollection::from_records(vec![
            Record::new("Well", new_id())
                .with("Depth", 1)
                .with("Rig", "R")
                .with("fieldid", new_id())
                .with("comment", "kept")
                .with("NameShortRu", "W")
                .with("rowId", 3)
                .with("Scratch", "dropped"),
            Record::new("Process", new_id())
                .with("ProcessType", "Drilling")
                .with("Rate", 2)
                .with("Depth", 5),
            Record::new("Unknown", new_id()).with("Scratch", 1),
            Record::new("KeyValuePair", new_id()),
        ]);
        UploadPreprocessor::new(registry()).prune_unregistered(&mut collection);

        let well = &collection.get("Well").unwrap()[0];
        for key in ["Depth", "Rig", "fieldid", "comment", "NameShortRu", "id", "type"] {
            assert!(well.contains_key(key), "{key} was pruned");
        }
        assert!(!well.contains_key("rowId"));
        assert!(!well.contains_key("Scratch"));

        let process = &collection.get("Process").unwrap()[0];
        assert!(process.contains_key("Rate"));
        assert!(!process.contains_key("Depth"));

        assert!(collection.get("Unknown").unwrap()[0].contains_key("Scratch"));
        assert!(collection.get("KeyValuePair").is_none());
    }
}
