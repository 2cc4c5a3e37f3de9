//! Normalisation of a graph into typed buckets with inlined foreign keys.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::graph::object_graph::{Edge, ObjectGraph, RecordIx};
use crate::graph::resolve::{LinkContext, LinkResolver, Multiplicity as M, TypeInfo};
use crate::limits::{INFLUENCED_OBJECT, INFLUENCED_OBJECT_TYPE_FIELD};
use crate::model::{Direction, Id, Record, Reference, Value};

/// One instance of a many-to-many association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub from: Id,
    pub to: Id,
}

impl Relation {
    pub fn new(from: Id, to: Id) -> Self {
        Self { from, to }
    }
}

/// Many-to-many links keyed by `(from name, to name)`.
pub type RelationSet = BTreeMap<(String, String), BTreeSet<Relation>>;

/// Records bucketed by type name, each bucket in graph order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedCollection(BTreeMap<String, Vec<Record>>);

impl TypedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets records by their `type` attribute; untyped records are skipped.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut collection = Self::new();
        for record in records {
            if let Some(type_name) = record.type_name().map(str::to_string) {
                collection.push(type_name, record);
            }
        }
        collection
    }

    pub fn push(&mut self, type_name: impl Into<String>, record: Record) {
        self.0.entry(type_name.into()).or_default().push(record);
    }

    pub fn get(&self, type_name: &str) -> Option<&Vec<Record>> {
        self.0.get(type_name)
    }

    pub fn get_mut(&mut self, type_name: &str) -> Option<&mut Vec<Record>> {
        self.0.get_mut(type_name)
    }

    pub fn insert_bucket(&mut self, type_name: impl Into<String>, records: Vec<Record>) {
        self.0.insert(type_name.into(), records);
    }

    pub fn remove_bucket(&mut self, type_name: &str) -> Option<Vec<Record>> {
        self.0.remove(type_name)
    }

    /// Appends every bucket of `other` to the matching bucket of `self`.
    pub fn extend(&mut self, other: TypedCollection) {
        for (type_name, records) in other.0 {
            self.0.entry(type_name).or_default().extend(records);
        }
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&String, &Vec<Record>)> {
        self.0.iter()
    }

    pub fn buckets_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vec<Record>)> {
        self.0.iter_mut()
    }

    /// Every record with its bucket name.
    pub fn records(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.0
            .iter()
            .flat_map(|(name, records)| records.iter().map(move |r| (name.as_str(), r)))
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<Record>> {
        self.0
    }
}

impl IntoIterator for TypedCollection {
    type Item = (String, Vec<Record>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Output of [`ObjectGraph::to_typed_collection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedCollection {
    pub relations: RelationSet,
    pub collection: TypedCollection,
}

impl ObjectGraph {
    /// Normalises the graph: each edge becomes either an inlined
    /// [`Reference`] attribute on one endpoint or a [`Relation`] entry,
    /// as decided by `resolver`. Edges the resolver cannot place are
    /// dropped. The graph itself is left untouched.
    pub fn to_typed_collection<R>(&self, resolver: &R) -> Result<LinkedCollection, GraphError>
    where
        R: LinkResolver + ?Sized,
    {
        let order: Vec<RecordIx> = self.records().map(|(ix, _)| ix).collect();
        let mut staged: FxHashMap<RecordIx, Record> = self
            .records()
            .map(|(ix, record)| (ix, record.clone()))
            .collect();
        let mut relations = RelationSet::new();
        let mut visited = FxHashSet::default();

        for &ix in &order {
            for (edge_ix, edge) in self.adjacent_edges(ix) {
                if !visited.insert(edge_ix) {
                    continue;
                }
                link(edge, &mut staged, &mut relations, resolver)?;
            }
        }

        let mut collection = TypedCollection::new();
        for ix in order {
            if let Some(record) = staged.remove(&ix) {
                let type_name = record.type_name().unwrap_or_default().to_string();
                collection.push(type_name, record);
            }
        }
        Ok(LinkedCollection {
            relations,
            collection,
        })
    }
}

fn link<R>(
    edge: &Edge,
    staged: &mut FxHashMap<RecordIx, Record>,
    relations: &mut RelationSet,
    resolver: &R,
) -> Result<(), GraphError>
where
    R: LinkResolver + ?Sized,
{
    let (Some(source), Some(target)) = (staged.get(&edge.source), staged.get(&edge.target)) else {
        return Ok(());
    };
    let source_id = source.id().ok_or_else(|| GraphError::MissingIdentity {
        side: "source",
        type_name: source.type_name().map(str::to_string),
    })?;
    let target_id = target.id().ok_or_else(|| GraphError::MissingIdentity {
        side: "target",
        type_name: target.type_name().map(str::to_string),
    })?;

    let influences_target = |record: &Record| {
        record
            .get(INFLUENCED_OBJECT_TYPE_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|t| t == edge.target_type)
    };
    let info = if influences_target(source) || influences_target(target) {
        TypeInfo::new(
            (M::One, M::One),
            Direction::Backward,
            (edge.source_type.as_str(), INFLUENCED_OBJECT),
        )
    } else {
        resolver.resolve(&LinkContext {
            source_type: &edge.source_type,
            target_type: &edge.target_type,
            source,
            target,
            property_name: &edge.property_name,
        })
    };
    let (from, to) = (&info.names.0, &info.names.1);

    match (info.quantity, info.direction) {
        ((M::Many, M::Many), Direction::Backward) => {
            relations
                .entry((to.clone(), from.clone()))
                .or_default()
                .insert(Relation::new(target_id, source_id));
        }
        ((M::Many, M::Many), _) => {
            relations
                .entry((from.clone(), to.clone()))
                .or_default()
                .insert(Relation::new(source_id, target_id));
        }
        ((M::Many, M::One), Direction::Forward | Direction::Undirected)
        | ((M::One, M::Many), Direction::Backward)
        | ((M::One, M::One), _) => {
            if let Some(source) = staged.get_mut(&edge.source) {
                source.insert(format!("{to}Id"), Reference::new(target_id, from.as_str()));
            }
        }
        ((M::One, M::Many), Direction::Forward | Direction::Undirected)
        | ((M::Many, M::One), Direction::Backward) => {
            if let Some(target) = staged.get_mut(&edge.target) {
                target.insert(format!("{from}Id"), Reference::new(source_id, to.as_str()));
            }
        }
        _ => {
            debug!(
                source_type = %edge.source_type,
                target_type = %edge.target_type,
                property = %edge.property_name,
                "no relationship between types, edge dropped"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resolve::TypeInfoResolver;
    use crate::model::{new_id, Metadata, ObjectType, Relationship, TypeRegistry};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Well")
                    .with_relationship(
                        Relationship::new("Bore", "Bores")
                            .reverse("Well")
                            .cardinality(Some(1), None),
                    )
                    .with_relationship(
                        Relationship::new("Tag", "Tags")
                            .reverse("Wells")
                            .cardinality(None, None),
                    ),
                ObjectType::new("Bore"),
                ObjectType::new("Tag"),
            ],
        }))
    }

    fn well_with_bore() -> (ObjectGraph, Id, Id) {
        let (w, b) = (new_id(), new_id());
        let mut graph = ObjectGraph::new();
        let wi = graph.add_record(Record::new("Well", w)).unwrap();
        let bi = graph.add_record(Record::new("Bore", b)).unwrap();
        graph.add_edge(wi, bi, "Bores").unwrap();
        (graph, w, b)
    }

    #[test]
    fn test_one_to_many_inlines_on_target() {
        let (graph, w, _) = well_with_bore();
        let resolver = TypeInfoResolver::new(registry());
        let linked = graph.to_typed_collection(&resolver).unwrap();

        let bore = &linked.collection.get("Bore").unwrap()[0];
        assert_eq!(
            bore.get("WellId"),
            Some(&Value::Reference(Reference::new(w, "Bores")))
        );
        assert!(linked.relations.is_empty());
        assert!(linked.collection.get("Well").unwrap()[0].get("BoresId").is_none());
    }

    #[test]
    fn test_backward_edge_inlines_on_source() {
        let (w, b) = (new_id(), new_id());
        let mut graph = ObjectGraph::new();
        let bi = graph.add_record(Record::new("Bore", b)).unwrap();
        let wi = graph.add_record(Record::new("Well", w)).unwrap();
        graph.add_edge(bi, wi, "Well").unwrap();

        let linked = graph.to_typed_collection(&TypeInfoResolver::new(registry())).unwrap();
        let bore = &linked.collection.get("Bore").unwrap()[0];
        assert_eq!(bore.get("WellId").and_then(Value::as_id), Some(w));
    }

    #[test]
    fn test_many_to_many_becomes_relation() {
        let (w, t) = (new_id(), new_id());
        let mut graph = ObjectGraph::new();
        let wi = graph.add_record(Record::new("Well", w)).unwrap();
        let ti = graph.add_record(Record::new("Tag", t)).unwrap();
        graph.add_edge(wi, ti, "Tags").unwrap();
        graph.add_edge(ti, wi, "Wells").unwrap();

        let linked = graph.to_typed_collection(&TypeInfoResolver::new(registry())).unwrap();
        let key = ("Well".to_string(), "Tags".to_string());
        assert_eq!(linked.relations.len(), 1);
        assert_eq!(
            linked.relations[&key].iter().copied().collect::<Vec<_>>(),
            vec![Relation::new(w, t)]
        );
        assert_eq!(linked.collection.len(), 2);
        assert_eq!(linked.collection.get("Well").unwrap()[0].len(), 2);
    }

    #[test]
    fn test_unresolved_edge_is_dropped() {
        let (graph, _, _) = well_with_bore();
        let unresolved = |link: &LinkContext<'_>| TypeInfo::unresolved(link.source_type, link.target_type);
        let linked = graph.to_typed_collection(&unresolved).unwrap();
        assert!(linked.relations.is_empty());
        assert!(linked.collection.records().all(|(_, r)| r.len() == 2));
    }

    #[test]
    fn test_influenced_object_override() {
        let (p, w) = (new_id(), new_id());
        let mut graph = ObjectGraph::new();
        let pi = graph
            .add_record(Record::new("Drilling", p).with(INFLUENCED_OBJECT_TYPE_FIELD, "Well"))
            .unwrap();
        let wi = graph.add_record(Record::new("Well", w)).unwrap();
        graph.add_edge(pi, wi, "Well").unwrap();

        let linked = graph.to_typed_collection(&TypeInfoResolver::new(registry())).unwrap();
        let drilling = &linked.collection.get("Drilling").unwrap()[0];
        assert_eq!(
            drilling.get("InfluencedObjectId"),
            Some(&Value::Reference(Reference::new(w, "Drilling")))
        );
    }

    #[test]
    fn test_missing_identity() {
        let mut graph = ObjectGraph::new();
        let wi = graph.add_record(Record::new("Well", "not-a-uuid")).unwrap();
        let bi = graph.add_record(Record::new("Bore", new_id())).unwrap();
        graph.add_edge(wi, bi, "Bores").unwrap();
        let err = graph
            .to_typed_collection(&TypeInfoResolver::new(registry()))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingIdentity {
                side: "source",
                type_name: Some("Well".into())
            }
        );
    }

    #[test]
    fn test_collection_helpers() {
        let mut left = TypedCollection::from_records(vec![Record::new("A", new_id())]);
        let right = TypedCollection::from_records(vec![
            Record::new("A", new_id()),
            Record::new("B", new_id()),
        ]);
        left.extend(right);
        assert_eq!(left.get("A").unwrap().len(), 2);
        assert_eq!(left.len(), 3);
        assert!(left.remove_bucket("B").is_some());
        assert_eq!(left.records().count(), 2);
    }

    fn multiplicity() -> impl Strategy<Value = M> {
        prop_oneof![Just(M::One), Just(M::Many), Just(M::None)]
    }

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::Forward),
            Just(Direction::Backward),
            Just(Direction::Undirected)
        ]
    }

    proptest! {
        #[test]
        fn test_edge_has_at_most_one_effect(a in multiplicity(), b in multiplicity(), d in direction()) {
            let (graph, _, _) = well_with_bore();
            let fixed = move |_: &LinkContext<'_>| TypeInfo::new((a, b), d, ("From", "To"));
            let linked = graph.to_typed_collection(&fixed).unwrap();

            let relation_count: usize = linked.relations.values().map(BTreeSet::len).sum();
            let fk_count = linked
                .collection
                .records()
                .filter(|(_, r)| r.get("ToId").is_some() || r.get("FromId").is_some())
                .count();
            prop_assert!(relation_count + fk_count <= 1);
            if a != M::None && b != M::None {
                prop_assert_eq!(relation_count + fk_count, 1);
            }
        }
    }
}
