//! Flat attribute records.

use serde::{Serialize, Serializer};

use crate::limits::{ID_FIELD, TYPE_FIELD};
use crate::model::id::Id;
use crate::model::value::{Attributes, Value};

/// One flattened entity instance: a type name, an id and attributes.
///
/// `type` and `id` are ordinary attributes so that records round-trip
/// through JSON unchanged; accessors read them by their reserved names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    attrs: Attributes,
}

impl Record {
    /// Creates a record carrying only `type` and `id`.
    pub fn new(type_name: impl Into<String>, id: impl Into<Value>) -> Self {
        let mut attrs = Attributes::new();
        attrs.insert(TYPE_FIELD.to_string(), Value::Text(type_name.into()));
        attrs.insert(ID_FIELD.to_string(), id.into());
        Self { attrs }
    }

    pub fn from_attributes(attrs: Attributes) -> Self {
        Self { attrs }
    }

    /// Builds a record from a JSON object. Non-object documents yield None.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from(json) {
            Value::Map(attrs) => Some(Self { attrs }),
            _ => None,
        }
    }

    /// Chained insert used by tests and builders.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.attrs.get(TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn id_value(&self) -> Option<&Value> {
        self.attrs.get(ID_FIELD).filter(|v| !v.is_blank())
    }

    /// The record id, if it parses as a UUID.
    pub fn id(&self) -> Option<Id> {
        self.id_value().and_then(Value::as_id)
    }

    /// Normalised identity used for deduplication.
    pub fn identity_key(&self) -> Option<String> {
        self.id_value().and_then(Value::identity_key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Looks an attribute up ignoring ASCII case.
    pub fn get_ignore_case(&self, key: &str) -> Option<(&str, &Value)> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attrs.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attrs.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attrs.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attrs.keys()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Keeps only the attributes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.attrs.retain(|k, v| keep(k, v));
    }

    /// Replaces every sequence-valued attribute with null.
    pub fn null_sequences(&mut self) {
        for value in self.attrs.values_mut() {
            if value.is_sequence() {
                *value = Value::Null;
            }
        }
    }

    pub fn has_sequence(&self) -> bool {
        self.attrs.values().any(Value::is_sequence)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn into_attributes(self) -> Attributes {
        self.attrs
    }

    /// Merges a newer instance of the same entity into this one.
    ///
    /// Per key: a non-null newer value wins, except for identity keys
    /// (`id` and anything ending in `Id`) which keep the existing value
    /// when both sides are non-null. Nulls never overwrite data.
    pub fn merge_from(&mut self, newer: Record) {
        for (key, value) in newer.attrs {
            match self.attrs.get_mut(&key) {
                None => {
                    self.attrs.insert(key, value);
                }
                Some(existing) => {
                    if value.is_null() {
                        continue;
                    }
                    if !existing.is_null() && is_identity_key(&key) {
                        continue;
                    }
                    *existing = value;
                }
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Returns true for `id`/`Id` and foreign-key style `...Id` names.
pub fn is_identity_key(key: &str) -> bool {
    key.eq_ignore_ascii_case(ID_FIELD) || key.ends_with("Id")
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attrs.serialize(serializer)
    }
}

impl From<Attributes> for Record {
    fn from(attrs: Attributes) -> Self {
        Self { attrs }
    }
}
