//! Attribute values carried by records.
//!
//! Values are a tagged variant over scalars, nested attribute maps,
//! sequences and foreign-key references.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::model::id::{format_id, parse_id, Id};

/// Attribute name to value mapping.
pub type Attributes = BTreeMap<String, Value>;

/// A foreign-key link to another record.
///
/// `sub_type` names the subtype whose relationship produced the link, so
/// the wire preprocessor can file the key under the right subtype bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Target record id.
    pub id: Id,
    /// Subtype tag, or None for untagged links.
    pub sub_type: Option<String>,
}

impl Reference {
    /// Creates a reference tagged with the producing subtype.
    pub fn new(id: Id, sub_type: impl Into<String>) -> Self {
        Self {
            id,
            sub_type: Some(sub_type.into()),
        }
    }

    /// Creates an untagged reference.
    pub fn untagged(id: Id) -> Self {
        Self { id, sub_type: None }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_id(&self.id))
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_id(&self.id))
    }
}

/// A record attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Id(Id),
    /// Ordered sequence (collections, time series).
    Sequence(Vec<Value>),
    /// Nested attribute bag that is not an entity of its own.
    Map(Attributes),
    /// Foreign-key link.
    Reference(Reference),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    /// Returns true for null values and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Reads a boolean, accepting `"true"`/`"false"` text as well.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Interprets this value as an identifier.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Value::Id(id) => Some(*id),
            Value::Reference(r) => Some(r.id),
            Value::Text(s) => parse_id(s),
            _ => None,
        }
    }

    /// Returns the key used to deduplicate records by identity.
    ///
    /// UUID-shaped values normalise to hyphenated lowercase so that the
    /// same id spelled differently still merges.
    pub fn identity_key(&self) -> Option<String> {
        match self {
            Value::Id(id) => Some(format_id(id)),
            Value::Reference(r) => Some(format_id(&r.id)),
            Value::Text(s) => match parse_id(s) {
                Some(id) => Some(format_id(&id)),
                None if !s.trim().is_empty() => Some(s.trim().to_string()),
                None => None,
            },
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Converts to a JSON document (references become their id string).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Id(id) => serde_json::Value::String(format_id(id)),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(attrs) => serde_json::Value::Object(
                attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Reference(r) => serde_json::Value::String(format_id(&r.id)),
        }
    }

    /// Canonical JSON text of this value.
    pub fn canonical_text(&self) -> String {
        self.to_json().to_string()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Id(id) => serializer.serialize_str(&format_id(id)),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(attrs) => {
                let mut map = serializer.serialize_map(Some(attrs.len()))?;
                for (k, v) in attrs {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Reference(r) => r.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    // u64 beyond i64 range and real numbers
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Id(id)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
