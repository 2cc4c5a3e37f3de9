//! Arena-backed object graph.
//!
//! Records live in an append-only arena addressed by [`RecordIx`]. Edges
//! refer to arena slots, never to records directly, and a record added
//! with an id that is already present is merged into the existing slot.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::GraphError;
use crate::limits::{INFLUENCED_OBJECT, INFLUENCED_OBJECT_TYPE_FIELD};
use crate::model::{Record, Value};

/// Stable index of a record slot.
pub type RecordIx = usize;

/// A labelled link between two records.
///
/// Storage is undirected; the resolver decides which way the link points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: RecordIx,
    pub target: RecordIx,
    pub source_type: String,
    pub target_type: String,
    pub property_name: String,
}

impl Edge {
    /// The endpoint opposite to `ix`.
    pub fn other(&self, ix: RecordIx) -> RecordIx {
        if self.source == ix {
            self.target
        } else {
            self.source
        }
    }
}

/// Records, edges and a per-type grouping of records.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    records: Vec<Option<Record>>,
    types: Vec<String>,
    id_index: FxHashMap<String, RecordIx>,
    edges: Vec<Edge>,
    edge_keys: FxHashSet<(RecordIx, RecordIx, String)>,
    adjacency: Vec<Vec<usize>>,
    typed_groups: BTreeMap<String, Vec<RecordIx>>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, or merges it into the record with the same id.
    ///
    /// Returns the slot holding the record afterwards.
    pub fn add_record(&mut self, record: Record) -> Result<RecordIx, GraphError> {
        let type_name = record
            .type_name()
            .ok_or_else(|| GraphError::MissingType {
                record: record.to_json().to_string(),
            })?
            .to_string();

        if let Some(key) = record.identity_key() {
            if let Some(&ix) = self.id_index.get(&key) {
                if let Some(existing) = self.records[ix].as_mut() {
                    existing.merge_from(record);
                    let merged_type = existing
                        .type_name()
                        .unwrap_or(type_name.as_str())
                        .to_string();
                    if merged_type != self.types[ix] {
                        self.regroup(ix, merged_type);
                    }
                    return Ok(ix);
                }
            }
            self.id_index.insert(key, self.records.len());
        }

        let ix = self.records.len();
        self.records.push(Some(record));
        self.types.push(type_name.clone());
        self.adjacency.push(Vec::new());
        self.typed_groups.entry(type_name).or_default().push(ix);
        Ok(ix)
    }

    fn regroup(&mut self, ix: RecordIx, type_name: String) {
        let old = std::mem::replace(&mut self.types[ix], type_name.clone());
        if let Some(group) = self.typed_groups.get_mut(&old) {
            group.retain(|&i| i != ix);
            if group.is_empty() {
                self.typed_groups.remove(&old);
            }
        }
        self.typed_groups.entry(type_name).or_default().push(ix);
    }

    /// Removes a record from the arena and its type group.
    ///
    /// Edges touching the record are left in place and skipped by
    /// [`edges`](Self::edges) and [`adjacent_edges`](Self::adjacent_edges).
    pub fn remove_record(&mut self, ix: RecordIx) -> Option<Record> {
        let record = self.records.get_mut(ix)?.take()?;
        if let Some(group) = self.typed_groups.get_mut(&self.types[ix]) {
            group.retain(|&i| i != ix);
            if group.is_empty() {
                self.typed_groups.remove(&self.types[ix]);
            }
        }
        if let Some(key) = record.identity_key() {
            if self.id_index.get(&key) == Some(&ix) {
                self.id_index.remove(&key);
            }
        }
        Some(record)
    }

    /// Links two records.
    ///
    /// When either endpoint names the target's type as its influenced
    /// object type, the label is forced to the reserved influenced-object
    /// name.
    pub fn add_edge(
        &mut self,
        source: RecordIx,
        target: RecordIx,
        property_name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let (Some(source_record), Some(target_record)) = (self.record(source), self.record(target))
        else {
            return Err(GraphError::InvalidInput {
                reason: format!("edge endpoint {source} -> {target} is not in the graph"),
            });
        };
        let source_type = self.types[source].clone();
        let target_type = self.types[target].clone();

        let names_target = |record: &Record| {
            record
                .get(INFLUENCED_OBJECT_TYPE_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|t| t == target_type)
        };
        let property_name = if names_target(target_record) || names_target(source_record) {
            INFLUENCED_OBJECT.to_string()
        } else {
            property_name.into()
        };

        self.push_edge(Edge {
            source,
            target,
            source_type,
            target_type,
            property_name,
        });
        Ok(())
    }

    fn push_edge(&mut self, edge: Edge) {
        let key = (edge.source, edge.target, edge.property_name.clone());
        if !self.edge_keys.insert(key) {
            return;
        }
        let edge_ix = self.edges.len();
        self.adjacency[edge.source].push(edge_ix);
        if edge.target != edge.source {
            self.adjacency[edge.target].push(edge_ix);
        }
        self.edges.push(edge);
    }

    pub fn record(&self, ix: RecordIx) -> Option<&Record> {
        self.records.get(ix).and_then(Option::as_ref)
    }

    pub fn record_mut(&mut self, ix: RecordIx) -> Option<&mut Record> {
        self.records.get_mut(ix).and_then(Option::as_mut)
    }

    /// Finds the slot of the record with the given id value.
    pub fn find(&self, id: &Value) -> Option<RecordIx> {
        let key = id.identity_key()?;
        self.id_index
            .get(&key)
            .copied()
            .filter(|&ix| self.record(ix).is_some())
    }

    /// Live records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = (RecordIx, &Record)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(ix, r)| r.as_ref().map(|r| (ix, r)))
    }

    /// Edges whose endpoints are both live.
    pub fn edges(&self) -> impl Iterator<Item = (usize, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| self.record(e.source).is_some() && self.record(e.target).is_some())
    }

    pub fn edge(&self, edge_ix: usize) -> Option<&Edge> {
        self.edges.get(edge_ix)
    }

    /// Live edges touching `ix`, in insertion order.
    pub fn adjacent_edges(&self, ix: RecordIx) -> impl Iterator<Item = (usize, &Edge)> {
        self.adjacency
            .get(ix)
            .into_iter()
            .flatten()
            .map(|&e| (e, &self.edges[e]))
            .filter(|(_, e)| self.record(e.source).is_some() && self.record(e.target).is_some())
    }

    /// Record slots grouped by type name.
    pub fn typed_groups(&self) -> &BTreeMap<String, Vec<RecordIx>> {
        &self.typed_groups
    }

    pub fn group(&self, type_name: &str) -> &[RecordIx] {
        self.typed_groups
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Deep copy: cloned records, edges re-linked against the clones.
    pub fn copy(&self) -> ObjectGraph {
        let mut target = ObjectGraph::new();
        fill_graph(self, &mut target);
        target
    }

    /// Adds `other`'s records and edges onto this graph, merging by id.
    pub fn merge(&mut self, other: &ObjectGraph) -> &mut Self {
        fill_graph(other, self);
        self
    }

    /// Starts a navigation at `ix`.
    pub fn navigate(&self, ix: RecordIx) -> PathFinder<'_> {
        PathFinder {
            graph: self,
            current: self.record(ix).map(|_| ix),
        }
    }
}

fn fill_graph(source: &ObjectGraph, target: &mut ObjectGraph) {
    let mut pairs: FxHashMap<RecordIx, RecordIx> = FxHashMap::default();
    for (ix, record) in source.records() {
        // records of a live graph always carry a type
        if let Ok(new_ix) = target.add_record(record.clone()) {
            pairs.insert(ix, new_ix);
        }
    }
    for (_, edge) in source.edges() {
        let (Some(&s), Some(&t)) = (pairs.get(&edge.source), pairs.get(&edge.target)) else {
            continue;
        };
        target.push_edge(Edge {
            source: s,
            target: t,
            source_type: edge.source_type.clone(),
            target_type: edge.target_type.clone(),
            property_name: edge.property_name.clone(),
        });
    }
}

/// Step-wise walk over adjacent edges.
#[derive(Debug, Clone, Copy)]
pub struct PathFinder<'a> {
    graph: &'a ObjectGraph,
    current: Option<RecordIx>,
}

impl<'a> PathFinder<'a> {
    /// Follows the first adjacent edge labelled `name` or whose source
    /// type is `name`. Once a step fails every later step stays empty.
    pub fn step(self, name: &str) -> PathFinder<'a> {
        let Some(ix) = self.current else { return self };
        let next = self
            .graph
            .adjacent_edges(ix)
            .find(|(_, e)| e.property_name == name || e.source_type == name)
            .map(|(_, e)| e.other(ix));
        PathFinder {
            graph: self.graph,
            current: next,
        }
    }

    pub fn ix(&self) -> Option<RecordIx> {
        self.current
    }

    pub fn get(&self) -> Option<&'a Record> {
        self.current.and_then(|ix| self.graph.record(ix))
    }
}
