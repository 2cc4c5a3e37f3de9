//! Graph extraction from arbitrary serialisable values.
//!
//! Any `Serialize` value is first rendered to a JSON document. Objects
//! become records; properties that hold embedded entities (objects with an
//! id, or properties a descriptor marks as such) are extracted as records
//! of their own and linked to their parent by an edge labelled with the
//! property name. Everything else is copied as an attribute value.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Map;

use crate::error::GraphError;
use crate::graph::object_graph::{ObjectGraph, RecordIx};
use crate::limits::{ID_FIELD, OBJECT_TYPE, TYPE_FIELD};
use crate::model::{new_id, parse_id, Record, Value};

/// Extraction hints for one Rust type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Type name written to the `type` attribute when the value has none.
    pub type_name: String,
    /// Properties always extracted as embedded entities.
    pub embedded: Vec<String>,
    /// Properties always copied as plain values.
    pub excluded: Vec<String>,
    /// Property name to the descriptor name of its value type.
    pub nested: Vec<(String, String)>,
    /// Values of this type are entities even without an id.
    pub entity: bool,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn embedded(mut self, property: impl Into<String>) -> Self {
        self.embedded.push(property.into());
        self
    }

    pub fn excluded(mut self, property: impl Into<String>) -> Self {
        self.excluded.push(property.into());
        self
    }

    pub fn nested(mut self, property: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.nested.push((property.into(), type_name.into()));
        self
    }

    pub fn entity(mut self) -> Self {
        self.entity = true;
        self
    }

    fn is_embedded(&self, property: &str) -> bool {
        self.embedded.iter().any(|p| p == property)
    }

    fn is_excluded(&self, property: &str) -> bool {
        self.excluded.iter().any(|p| p == property)
    }

    fn nested_type(&self, property: &str) -> Option<&str> {
        self.nested
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, t)| t.as_str())
    }
}

/// Types that describe how they are extracted.
pub trait Describe: 'static {
    fn descriptor() -> EntityDescriptor;
}

/// Process-wide descriptor registry and classification memo.
///
/// Safe for concurrent population; entries are never invalidated.
#[derive(Debug, Default)]
pub struct SchemaCache {
    by_type: DashMap<TypeId, Arc<EntityDescriptor>>,
    by_name: DashMap<String, Arc<EntityDescriptor>>,
    by_rust_name: DashMap<String, Arc<EntityDescriptor>>,
    embedded: DashMap<(String, String), bool>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`'s descriptor, returning the cached one if present.
    pub fn register<T: Describe>(&self) -> Arc<EntityDescriptor> {
        if let Some(found) = self.by_type.get(&TypeId::of::<T>()) {
            return Arc::clone(found.value());
        }
        let descriptor = Arc::new(T::descriptor());
        self.by_type.insert(TypeId::of::<T>(), Arc::clone(&descriptor));
        self.by_name
            .insert(descriptor.type_name.clone(), Arc::clone(&descriptor));
        if let Some(rust_name) = rust_type_name::<T>() {
            self.by_rust_name.insert(rust_name, Arc::clone(&descriptor));
        }
        descriptor
    }

    /// Registers a descriptor under its type name only.
    pub fn register_descriptor(&self, descriptor: EntityDescriptor) -> Arc<EntityDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.by_name
            .insert(descriptor.type_name.clone(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn by_name(&self, type_name: &str) -> Option<Arc<EntityDescriptor>> {
        self.by_name.get(type_name).map(|d| Arc::clone(d.value()))
    }

    /// Descriptor for `T`, or for the element type of a `T` collection.
    pub fn lookup<T: ?Sized + 'static>(&self) -> Option<Arc<EntityDescriptor>> {
        if let Some(found) = self.by_type.get(&TypeId::of::<T>()) {
            return Some(Arc::clone(found.value()));
        }
        let rust_name = rust_type_name::<T>()?;
        self.by_rust_name
            .get(&rust_name)
            .map(|d| Arc::clone(d.value()))
    }

    /// Decides whether `value`, held by `property`, is an embedded entity.
    fn is_embedded(
        &self,
        owner: Option<&EntityDescriptor>,
        property: &str,
        value: &serde_json::Value,
    ) -> bool {
        let Some(owner) = owner else {
            return holds_entities(value, false);
        };
        if owner.is_excluded(property) {
            return false;
        }
        let key = (owner.type_name.clone(), property.to_string());
        if let Some(known) = self.embedded.get(&key) {
            return *known && holds_objects(value);
        }

        let forced = owner.is_embedded(property)
            || owner
                .nested_type(property)
                .and_then(|t| self.by_name(t))
                .is_some_and(|d| d.entity);
        let embedded = holds_entities(value, forced);
        if is_conclusive(value) {
            self.embedded.insert(key, embedded);
        }
        embedded
    }
}

/// True if `value` is an object, or a non-empty array of objects.
fn holds_objects(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(_) => true,
        serde_json::Value::Array(items) => {
            let mut objects = items.iter().filter(|v| !v.is_null()).peekable();
            objects.peek().is_some() && objects.all(serde_json::Value::is_object)
        }
        _ => false,
    }
}

fn holds_entities(value: &serde_json::Value, forced: bool) -> bool {
    if !holds_objects(value) {
        return false;
    }
    if forced {
        return true;
    }
    match value {
        serde_json::Value::Object(map) => has_id(map),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_object)
            .all(has_id),
        _ => false,
    }
}

fn is_conclusive(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Array(items) => items.iter().any(|v| !v.is_null()),
        _ => true,
    }
}

fn has_id(map: &Map<String, serde_json::Value>) -> bool {
    find_key(map, ID_FIELD).is_some()
}

fn find_key<'a>(
    map: &'a Map<String, serde_json::Value>,
    name: &str,
) -> Option<(&'a String, &'a serde_json::Value)> {
    map.iter()
        .find(|(k, _)| k.as_str() == name)
        .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)))
}

const CONTAINERS: &[&str] = &["Vec", "VecDeque", "Option", "Box", "Arc", "Rc"];
const UNTYPED: &[&str] = &[
    "Value", "Map", "HashMap", "BTreeMap", "String", "str", "bool", "i32", "i64", "u32", "u64",
    "f32", "f64",
];

/// Short Rust name of `T`, unwrapping common containers.
///
/// `alloc::vec::Vec<app::Well>` yields `Well`; untyped documents and
/// primitives yield None.
pub fn rust_type_name<T: ?Sized>() -> Option<String> {
    let mut name = std::any::type_name::<T>().trim();
    loop {
        name = name.trim_start_matches('&').trim();
        if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            name = inner.split(';').next().unwrap_or(inner).trim();
            continue;
        }
        let (head, generics) = match name.find('<') {
            Some(open) if name.ends_with('>') => {
                (&name[..open], Some(&name[open + 1..name.len() - 1]))
            }
            _ => (name, None),
        };
        let last = head.rsplit("::").next().unwrap_or(head);
        if CONTAINERS.contains(&last) {
            name = generics?;
            continue;
        }
        if last.is_empty() || UNTYPED.contains(&last) || last.starts_with('(') {
            return None;
        }
        return Some(last.to_string());
    }
}

/// Converts values into object graphs.
#[derive(Debug, Clone)]
pub struct Extractor {
    cache: Arc<SchemaCache>,
    strip_nulls: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Arc::new(SchemaCache::new()))
    }
}

impl Extractor {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self {
            cache,
            strip_nulls: true,
        }
    }

    /// Keep (false) or drop (true, the default) null and blank attributes.
    pub fn strip_nulls(mut self, strip: bool) -> Self {
        self.strip_nulls = strip;
        self
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Extracts `value` into a fresh graph.
    pub fn extract<T: Serialize + ?Sized + 'static>(
        &self,
        value: &T,
    ) -> Result<ObjectGraph, GraphError> {
        let mut graph = ObjectGraph::new();
        self.extract_into(value, &mut graph)?;
        Ok(graph)
    }

    /// Extracts `value` into an existing graph, merging records by id,
    /// then turns `...Id` attributes that name a record of the graph into
    /// edges.
    pub fn extract_into<T: Serialize + ?Sized + 'static>(
        &self,
        value: &T,
        graph: &mut ObjectGraph,
    ) -> Result<(), GraphError> {
        let json = serde_json::to_value(value).map_err(|e| GraphError::InvalidInput {
            reason: e.to_string(),
        })?;
        let descriptor = self.cache.lookup::<T>();
        let default_type = descriptor
            .as_ref()
            .map(|d| d.type_name.clone())
            .or_else(rust_type_name::<T>);

        match &json {
            serde_json::Value::Null => {
                return Err(GraphError::InvalidInput {
                    reason: "value is null".to_string(),
                })
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {}
            other => {
                return Err(GraphError::InvalidInput {
                    reason: format!("expected an object or a sequence of objects, got {other}"),
                })
            }
        }

        self.walk(&json, descriptor.as_deref(), default_type.as_deref(), None, graph)?;
        link_id_attributes(graph)
    }

    fn walk(
        &self,
        json: &serde_json::Value,
        descriptor: Option<&EntityDescriptor>,
        default_type: Option<&str>,
        parent: Option<(RecordIx, &str)>,
        graph: &mut ObjectGraph,
    ) -> Result<(), GraphError> {
        match json {
            serde_json::Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    self.walk(item, descriptor, default_type, parent, graph)?;
                }
                Ok(())
            }
            serde_json::Value::Object(map) => {
                self.walk_object(map, descriptor, default_type, parent, graph)
            }
            other => Err(GraphError::InvalidInput {
                reason: format!("sequence element is not an object: {other}"),
            }),
        }
    }

    fn walk_object(
        &self,
        map: &Map<String, serde_json::Value>,
        descriptor: Option<&EntityDescriptor>,
        default_type: Option<&str>,
        parent: Option<(RecordIx, &str)>,
        graph: &mut ObjectGraph,
    ) -> Result<(), GraphError> {
        let type_key = find_key(map, TYPE_FIELD);
        let id_key = find_key(map, ID_FIELD);

        let type_name = type_key
            .and_then(|(_, v)| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| default_type.map(str::to_string))
            .unwrap_or_else(|| OBJECT_TYPE.to_string());
        let id = id_key
            .map(|(_, v)| record_id(v))
            .filter(|v| !v.is_blank())
            .unwrap_or_else(|| Value::Id(new_id()));

        let mut record = Record::new(type_name, id);
        let mut children = Vec::new();
        for (key, value) in map {
            if type_key.is_some_and(|(k, _)| k == key) || id_key.is_some_and(|(k, _)| k == key) {
                continue;
            }
            let blank = value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty());
            if self.strip_nulls && blank {
                continue;
            }
            if self.cache.is_embedded(descriptor, key, value) {
                children.push((key.as_str(), value));
            } else {
                record.insert(key.clone(), Value::from(value.clone()));
            }
        }

        let ix = graph.add_record(record)?;
        if let Some((parent_ix, property)) = parent {
            graph.add_edge(parent_ix, ix, property)?;
        }

        for (key, value) in children {
            let hint = descriptor.and_then(|d| d.nested_type(key));
            let nested = hint.and_then(|t| self.cache.by_name(t));
            self.walk(value, nested.as_deref(), Some(hint.unwrap_or(key)), Some((ix, key)), graph)?;
        }
        Ok(())
    }
}

fn record_id(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => match parse_id(s) {
            Some(id) => Value::Id(id),
            None => Value::Text(s.clone()),
        },
        other => Value::from(other.clone()),
    }
}

/// Replaces `...Id` attributes that name another record of the graph by
/// an edge to that record, labelled with the record's type.
fn link_id_attributes(graph: &mut ObjectGraph) -> Result<(), GraphError> {
    let mut links = Vec::new();
    for (ix, record) in graph.records() {
        for (key, value) in record.iter() {
            if key.eq_ignore_ascii_case(ID_FIELD) || !key.ends_with("Id") || value.is_blank() {
                continue;
            }
            let id = match value {
                Value::Text(s) => parse_id(s).ok_or_else(|| GraphError::IdResolution {
                    key: key.clone(),
                    value: s.clone(),
                    type_name: record.type_name().unwrap_or_default().to_string(),
                })?,
                Value::Id(id) => *id,
                Value::Reference(r) => r.id,
                _ => continue,
            };
            if let Some(target) = graph.find(&Value::Id(id)).filter(|&t| t != ix) {
                links.push((ix, key.clone(), target));
            }
        }
    }

    for (ix, key, target) in links {
        if let Some(record) = graph.record_mut(ix) {
            record.remove(&key);
        }
        let label = graph
            .record(target)
            .and_then(Record::type_name)
            .unwrap_or_default()
            .to_string();
        graph.add_edge(ix, target, label)?;
    }
    Ok(())
}
