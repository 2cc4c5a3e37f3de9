//! Type metadata: the external schema of object types.
//!
//! Metadata is supplied as a JSON document and indexed once into a
//! [`TypeRegistry`], which is read-only afterwards and shared between the
//! resolver, the validator and the wire preprocessor.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::limits::{OBJECT_TYPE, PROCESS_TYPE};

/// The full metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub types: Vec<ObjectType>,
}

/// One object type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Names of the subtypes whose data this type carries.
    #[serde(default)]
    pub includes_subtypes: Vec<String>,
    #[serde(default)]
    pub base_type: Option<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.includes_subtypes.push(subtype.into());
        self
    }
}

/// A declared property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    /// Domain type name of the property (`Double`, `NamedTimeSeries`, ...).
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub schema: PropertySchema,
}

impl Property {
    pub fn new(name: impl Into<String>, schema: PropertySchema) -> Self {
        Self {
            name: name.into(),
            type_name: String::new(),
            schema,
        }
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

/// JSON kinds understood by [`PropertySchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Integer => "integer",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
            SchemaKind::Null => "null",
        }
    }
}

/// The JSON-schema subset used to describe property values.
///
/// A schema with no `type` accepts any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(default, rename = "type")]
    pub kind: Option<SchemaKind>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub items: Option<Box<PropertySchema>>,
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<serde_json::Value>>,
}

fn default_nullable() -> bool {
    true
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self {
            kind: None,
            format: None,
            nullable: true,
            items: None,
            allowed: None,
        }
    }
}

impl PropertySchema {
    pub fn of(kind: SchemaKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn formatted(kind: SchemaKind, format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::of(kind)
        }
    }

    pub fn array_of(items: PropertySchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaKind::Array)
        }
    }

    /// Schema of a foreign-key attribute.
    pub fn uuid() -> Self {
        Self::formatted(SchemaKind::String, "uuid")
    }
}

/// Direction of a relationship relative to the type declaring it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    Undirected,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
            Direction::Undirected => Direction::Undirected,
        }
    }
}

/// A relationship end as seen from the type declaring it.
///
/// `source_max` and `target_max` are the maximum cardinalities of the
/// two ends of the underlying association, always in its forward
/// orientation; `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub target: String,
    pub navigation_name: String,
    #[serde(default)]
    pub reverse_navigation_name: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub source_max: Option<u32>,
    #[serde(default)]
    pub target_max: Option<u32>,
}

impl Relationship {
    pub fn new(target: impl Into<String>, navigation_name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            navigation_name: navigation_name.into(),
            ..Default::default()
        }
    }

    pub fn reverse(mut self, name: impl Into<String>) -> Self {
        self.reverse_navigation_name = Some(name.into());
        self
    }

    pub fn cardinality(mut self, source_max: Option<u32>, target_max: Option<u32>) -> Self {
        self.source_max = source_max;
        self.target_max = target_max;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// A relationship together with the type that declares it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationshipRef<'a> {
    pub declared_on: &'a str,
    pub relationship: &'a Relationship,
}

/// Indexed, read-only view over [`Metadata`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: FxHashMap<String, ObjectType>,
    order: Vec<String>,
}

impl TypeRegistry {
    /// Indexes the metadata.
    ///
    /// Every forward relationship that names its reverse navigation is
    /// mirrored onto the target type as a backward end, unless the target
    /// already declares a relationship with that navigation name.
    pub fn new(metadata: Metadata) -> Self {
        let mut types: FxHashMap<String, ObjectType> = FxHashMap::default();
        let mut order = Vec::with_capacity(metadata.types.len());
        for ty in metadata.types {
            if !types.contains_key(&ty.name) {
                order.push(ty.name.clone());
            }
            types.insert(ty.name.clone(), ty);
        }

        let mut mirrors: Vec<(String, Relationship)> = Vec::new();
        for name in &order {
            let Some(ty) = types.get(name) else { continue };
            for rel in &ty.relationships {
                if rel.direction != Direction::Forward {
                    continue;
                }
                let Some(reverse) = &rel.reverse_navigation_name else {
                    continue;
                };
                mirrors.push((
                    rel.target.clone(),
                    Relationship {
                        target: ty.name.clone(),
                        navigation_name: reverse.clone(),
                        reverse_navigation_name: Some(rel.navigation_name.clone()),
                        direction: Direction::Backward,
                        source_max: rel.source_max,
                        target_max: rel.target_max,
                    },
                ));
            }
        }
        for (owner, mirror) in mirrors {
            if let Some(target) = types.get_mut(&owner) {
                let declared = target
                    .relationships
                    .iter()
                    .any(|r| r.navigation_name == mirror.navigation_name);
                if !declared {
                    target.relationships.push(mirror);
                }
            }
        }

        Self { types, order }
    }

    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        let metadata: Metadata = serde_json::from_str(json)?;
        Ok(Self::new(metadata))
    }

    pub fn get(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Types in document order.
    pub fn types(&self) -> impl Iterator<Item = &ObjectType> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    /// Returns true if `ancestor` appears strictly above `name` in its
    /// base-type chain.
    pub fn descends_from(&self, name: &str, ancestor: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut current = self.get(name).and_then(|t| t.base_type.as_deref());
        while let Some(base) = current {
            if base == ancestor {
                return true;
            }
            if !seen.insert(base) {
                return false;
            }
            current = self.get(base).and_then(|t| t.base_type.as_deref());
        }
        false
    }

    /// Returns true for types whose records are activities keyed by a
    /// process-type discriminator.
    pub fn is_process(&self, name: &str) -> bool {
        self.descends_from(name, PROCESS_TYPE)
    }

    /// Names a relationship target may match for `name`: the type itself,
    /// its subtype tree and its base chain (with their own closures).
    pub fn type_name_closure(&self, name: &str) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !names.insert(current.clone()) {
                continue;
            }
            if let Some(ty) = self.get(&current) {
                stack.extend(ty.includes_subtypes.iter().cloned());
                stack.extend(ty.base_type.iter().cloned());
            }
        }
        names
    }

    /// The type, then its subtypes (recursively), then its base chain.
    pub fn hierarchy(&self, name: &str) -> Vec<&ObjectType> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_hierarchy(name, &mut seen, &mut out);
        out
    }

    fn collect_hierarchy<'a>(
        &'a self,
        name: &str,
        seen: &mut FxHashSet<String>,
        out: &mut Vec<&'a ObjectType>,
    ) {
        let Some(ty) = self.get(name) else { return };
        if !seen.insert(ty.name.clone()) {
            return;
        }
        out.push(ty);
        for subtype in &ty.includes_subtypes {
            self.collect_hierarchy(subtype, seen, out);
        }
        if let Some(base) = &ty.base_type {
            self.collect_hierarchy(base, seen, out);
        }
    }

    /// [`hierarchy`](Self::hierarchy) plus the generic `Object` type.
    pub fn hierarchy_with_object(&self, name: &str) -> Vec<&ObjectType> {
        let mut out = self.hierarchy(name);
        if let Some(object) = self.get(OBJECT_TYPE) {
            if !out.iter().any(|t| t.name == object.name) {
                out.push(object);
            }
        }
        out
    }

    pub fn properties_with_hierarchy(&self, name: &str) -> Vec<&Property> {
        self.hierarchy_with_object(name)
            .into_iter()
            .flat_map(|t| t.properties.iter())
            .collect()
    }

    pub fn relationships_with_hierarchy(&self, name: &str) -> Vec<RelationshipRef<'_>> {
        self.hierarchy_with_object(name)
            .into_iter()
            .flat_map(|t| {
                t.relationships.iter().map(move |relationship| RelationshipRef {
                    declared_on: t.name.as_str(),
                    relationship,
                })
            })
            .collect()
    }

    /// Own property names plus `{navigation}Id` keys of a single type,
    /// walking its base chain.
    pub fn own_member_names(&self, name: &str) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        let mut seen = FxHashSet::default();
        let mut current = self.get(name);
        while let Some(ty) = current {
            if !seen.insert(ty.name.as_str()) {
                break;
            }
            names.extend(ty.properties.iter().map(|p| p.name.clone()));
            names.extend(
                ty.relationships
                    .iter()
                    .map(|r| format!("{}Id", r.navigation_name)),
            );
            current = ty.base_type.as_deref().and_then(|b| self.get(b));
        }
        names
    }
}

impl From<Metadata> for TypeRegistry {
    fn from(metadata: Metadata) -> Self {
        Self::new(metadata)
    }
}
