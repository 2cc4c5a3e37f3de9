//! Value checks against [`PropertySchema`].

use std::fmt;

use crate::model::{parse_id, PropertySchema, SchemaKind};
use crate::util::datetime::{parse_date, parse_date_time, parse_time};

/// What a value failed to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    StringExpected,
    NumberExpected,
    IntegerExpected,
    BooleanExpected,
    ArrayExpected,
    ObjectExpected,
    NullExpected,
    NotInEnumeration,
    DateExpected,
    TimeExpected,
    DateTimeExpected,
    GuidExpected,
}

/// One schema violation, with the schema that rejected the value.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub kind: ViolationKind,
    /// JSON pointer below the checked value, empty for the value itself.
    pub path: String,
    pub schema_kind: Option<SchemaKind>,
    pub schema_format: Option<String>,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: #{}", self.kind, self.path)
    }
}

impl SchemaViolation {
    /// Declared type of the rejecting schema, or an empty string.
    pub fn schema_type(&self) -> &str {
        self.schema_kind.map(SchemaKind::as_str).unwrap_or_default()
    }

    /// Declared format of the rejecting schema, or an empty string.
    pub fn schema_format(&self) -> &str {
        self.schema_format.as_deref().unwrap_or_default()
    }
}

impl PropertySchema {
    /// Collects every violation of `value` against this schema.
    pub fn validate(&self, value: &serde_json::Value) -> Vec<SchemaViolation> {
        let mut out = Vec::new();
        check(self, value, String::new(), &mut out);
        out
    }
}

fn check(
    schema: &PropertySchema,
    value: &serde_json::Value,
    path: String,
    out: &mut Vec<SchemaViolation>,
) {
    let mut violation = |kind: ViolationKind, path: &str| {
        out.push(SchemaViolation {
            kind,
            path: path.to_string(),
            schema_kind: schema.kind,
            schema_format: schema.format.clone(),
        })
    };

    let Some(kind) = schema.kind else {
        return;
    };
    if value.is_null() {
        if !schema.nullable && kind != SchemaKind::Null {
            violation(expected(kind), &path);
        }
        return;
    }
    if let Some(allowed) = &schema.allowed {
        if !allowed.contains(value) {
            violation(ViolationKind::NotInEnumeration, &path);
        }
    }

    match kind {
        SchemaKind::String => match value.as_str() {
            None => violation(ViolationKind::StringExpected, &path),
            Some(text) => {
                if let Some(kind) = schema.format.as_deref().and_then(|f| check_format(f, text)) {
                    violation(kind, &path);
                }
            }
        },
        SchemaKind::Number if !value.is_number() => violation(ViolationKind::NumberExpected, &path),
        SchemaKind::Integer if !is_integer(value) => {
            violation(ViolationKind::IntegerExpected, &path)
        }
        SchemaKind::Boolean if !value.is_boolean() => {
            violation(ViolationKind::BooleanExpected, &path)
        }
        SchemaKind::Object if !value.is_object() => violation(ViolationKind::ObjectExpected, &path),
        SchemaKind::Null => violation(ViolationKind::NullExpected, &path),
        SchemaKind::Array => match value.as_array() {
            None => violation(ViolationKind::ArrayExpected, &path),
            Some(items) => {
                if let Some(item_schema) = &schema.items {
                    for (i, item) in items.iter().enumerate() {
                        check(item_schema, item, format!("{path}/{i}"), out);
                    }
                }
            }
        },
        _ => {}
    }
}

fn expected(kind: SchemaKind) -> ViolationKind {
    match kind {
        SchemaKind::String => ViolationKind::StringExpected,
        SchemaKind::Number => ViolationKind::NumberExpected,
        SchemaKind::Integer => ViolationKind::IntegerExpected,
        SchemaKind::Boolean => ViolationKind::BooleanExpected,
        SchemaKind::Array => ViolationKind::ArrayExpected,
        SchemaKind::Object => ViolationKind::ObjectExpected,
        SchemaKind::Null => ViolationKind::NullExpected,
    }
}

fn is_integer(value: &serde_json::Value) -> bool {
    value.is_i64()
        || value.is_u64()
        || value
            .as_f64()
            .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

fn check_format(format: &str, text: &str) -> Option<ViolationKind> {
    match format {
        "date" if parse_date(text).is_err() => Some(ViolationKind::DateExpected),
        "time" if parse_time(text).is_err() => Some(ViolationKind::TimeExpected),
        "date-time" if parse_date_time(text).is_err() => Some(ViolationKind::DateTimeExpected),
        "uuid" | "guid" if parse_id(text).is_none() => Some(ViolationKind::GuidExpected),
        _ => None,
    }
}
