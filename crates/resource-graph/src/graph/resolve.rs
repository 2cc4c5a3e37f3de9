//! Relationship resolution between record types.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::limits::INFLUENCED_OBJECT;
use crate::model::{Direction, ObjectType, Record, RelationshipRef, TypeRegistry};

/// Cardinality of one end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    One,
    Many,
    /// No relationship is known.
    None,
}

impl Multiplicity {
    fn from_max(max: Option<u32>) -> Self {
        match max {
            Some(1) => Multiplicity::One,
            _ => Multiplicity::Many,
        }
    }
}

/// How two record types are linked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// Multiplicities of the association ends, in declared orientation.
    pub quantity: (Multiplicity, Multiplicity),
    pub direction: Direction,
    /// `(from, to)` names used to build foreign-key attribute names.
    ///
    /// Forward ends name `(declaring type, navigation)`, backward ends
    /// `(reverse navigation, target type)`, so both ends of one
    /// association produce the same keys.
    pub names: (String, String),
}

impl TypeInfo {
    pub fn new(
        quantity: (Multiplicity, Multiplicity),
        direction: Direction,
        names: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Self {
            quantity,
            direction,
            names: (names.0.into(), names.1.into()),
        }
    }

    /// The `(None, None, Undirected)` answer for unrelated types.
    pub fn unresolved(source: &str, target: &str) -> Self {
        Self::new(
            (Multiplicity::None, Multiplicity::None),
            Direction::Undirected,
            (source, target),
        )
    }

    pub fn is_unresolved(&self) -> bool {
        self.quantity.0 == Multiplicity::None || self.quantity.1 == Multiplicity::None
    }
}

/// Everything a link resolver may look at for one edge.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub source_type: &'a str,
    pub target_type: &'a str,
    pub source: &'a Record,
    pub target: &'a Record,
    pub property_name: &'a str,
}

/// Decides how an edge is normalised.
pub trait LinkResolver {
    fn resolve(&self, link: &LinkContext<'_>) -> TypeInfo;
}

impl<F> LinkResolver for F
where
    F: Fn(&LinkContext<'_>) -> TypeInfo,
{
    fn resolve(&self, link: &LinkContext<'_>) -> TypeInfo {
        self(link)
    }
}

/// Inputs of a tie-break between several matching relationships.
#[derive(Debug, Clone, Copy)]
pub struct TieBreakInput<'a> {
    pub source: &'a ObjectType,
    pub target: &'a ObjectType,
    pub candidates: &'a [RelationshipRef<'a>],
}

/// Picks the index of the relationship to use among the candidates.
pub type TieBreak = Arc<dyn Fn(&TieBreakInput<'_>) -> usize + Send + Sync>;

/// Metadata-driven [`LinkResolver`], memoized per ordered type pair.
#[derive(Clone)]
pub struct TypeInfoResolver {
    registry: Arc<TypeRegistry>,
    cache: Arc<DashMap<(String, String), TypeInfo>>,
    tie_break: Option<TieBreak>,
}

impl fmt::Debug for TypeInfoResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfoResolver")
            .field("types", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("tie_break", &self.tie_break.is_some())
            .finish()
    }
}

impl TypeInfoResolver {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            cache: Arc::new(DashMap::new()),
            tie_break: None,
        }
    }

    /// Installs a tie-break used when more than one relationship matches.
    /// Without one the first match wins.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = Some(tie_break);
        self.cache.clear();
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn get_info(&self, source: &str, target: &str) -> TypeInfo {
        let key = (source.to_string(), target.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return hit.value().clone();
        }
        let info = self.compute(source, target);
        self.cache.insert(key, info.clone());
        info
    }

    fn compute(&self, source: &str, target: &str) -> TypeInfo {
        let (Some(source_type), Some(target_type)) =
            (self.registry.get(source), self.registry.get(target))
        else {
            return TypeInfo::unresolved(source, target);
        };

        let target_names = self.registry.type_name_closure(target);
        let mut candidates: Vec<RelationshipRef<'_>> = Vec::new();
        for candidate in self.registry.relationships_with_hierarchy(source) {
            let matches = target_names.contains(&candidate.relationship.target);
            if matches && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        if !candidates.is_empty() {
            let mut pick = 0;
            if candidates.len() > 1 {
                if let Some(tie_break) = &self.tie_break {
                    let input = TieBreakInput {
                        source: source_type,
                        target: target_type,
                        candidates: &candidates,
                    };
                    pick = tie_break(&input).min(candidates.len() - 1);
                }
            }
            let chosen = candidates[pick];
            let relationship = chosen.relationship;
            let quantity = (
                Multiplicity::from_max(relationship.source_max),
                Multiplicity::from_max(relationship.target_max),
            );
            let names = match relationship.direction {
                Direction::Backward => (
                    relationship
                        .reverse_navigation_name
                        .as_deref()
                        .unwrap_or(relationship.navigation_name.as_str()),
                    relationship.target.as_str(),
                ),
                _ => (chosen.declared_on, relationship.navigation_name.as_str()),
            };
            return TypeInfo::new(quantity, relationship.direction, names);
        }

        if self.registry.is_process(source) {
            return TypeInfo::new(
                (Multiplicity::One, Multiplicity::One),
                Direction::Undirected,
                (source, INFLUENCED_OBJECT),
            );
        }

        TypeInfo::unresolved(source, target)
    }
}

impl LinkResolver for TypeInfoResolver {
    fn resolve(&self, link: &LinkContext<'_>) -> TypeInfo {
        self.get_info(link.source_type, link.target_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, Relationship};

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Object"),
                ObjectType::new("Process"),
                ObjectType::new("Drilling").with_base("Process"),
                ObjectType::new("Field").with_relationship(
                    Relationship::new("Well", "Wells")
                        .reverse("Field")
                        .cardinality(Some(1), None),
                ),
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
                    )
                    .with_relationship(
                        Relationship::new("Passport", "Passport")
                            .reverse("Well")
                            .cardinality(Some(1), Some(1)),
                    ),
                ObjectType::new("Bore"),
                ObjectType::new("HorizontalBore").with_base("Bore"),
                ObjectType::new("Tag"),
                ObjectType::new("Passport"),
            ],
        }))
    }

    #[test]
    fn test_one_to_many_forward() {
        let resolver = TypeInfoResolver::new(registry());
        let info = resolver.get_info("Well", "Bore");
        assert_eq!(info.quantity, (Multiplicity::One, Multiplicity::Many));
        assert_eq!(info.direction, Direction::Forward);
        assert_eq!(info.names, ("Well".to_string(), "Bores".to_string()));
    }

    #[test]
    fn test_reverse_lookup_flips_direction() {
        let resolver = TypeInfoResolver::new(registry());
        for (a, b) in [("Well", "Bore"), ("Field", "Well"), ("Well", "Tag"), ("Well", "Passport")] {
            let forward = resolver.get_info(a, b);
            let backward = resolver.get_info(b, a);
            assert_eq!(forward.quantity, backward.quantity, "{a} <-> {b}");
            assert_eq!(forward.direction.reversed(), backward.direction, "{a} <-> {b}");
        }
        let back = resolver.get_info("Bore", "Well");
        assert_eq!(back.names, ("Bores".to_string(), "Well".to_string()));
    }

    #[test]
    fn test_target_subtype_matches_base_relationship() {
        let resolver = TypeInfoResolver::new(registry());
        let info = resolver.get_info("Well", "HorizontalBore");
        assert_eq!(info.names.1, "Bores");
    }

    #[test]
    fn test_unknown_types_are_unresolved() {
        let resolver = TypeInfoResolver::new(registry());
        assert!(resolver.get_info("Well", "Nope").is_unresolved());
        assert!(resolver.get_info("Nope", "Well").is_unresolved());
        assert!(resolver.get_info("Bore", "Tag").is_unresolved());
    }

    #[test]
    fn test_process_falls_back_to_influenced_object() {
        let resolver = TypeInfoResolver::new(registry());
        let info = resolver.get_info("Drilling", "Well");
        assert_eq!(info.quantity, (Multiplicity::One, Multiplicity::One));
        assert_eq!(info.direction, Direction::Undirected);
        assert_eq!(info.names, ("Drilling".to_string(), INFLUENCED_OBJECT.to_string()));
    }

    #[test]
    fn test_tie_break_receives_candidates() {
        let registry = Arc::new(TypeRegistry::new(Metadata {
            types: vec![
                ObjectType::new("Well")
                    .with_relationship(
                        Relationship::new("Bore", "MainBore").cardinality(Some(1), Some(1)),
                    )
                    .with_relationship(
                        Relationship::new("Bore", "Sidetracks").cardinality(Some(1), None),
                    ),
                ObjectType::new("Bore"),
            ],
        }));
        let first = TypeInfoResolver::new(Arc::clone(&registry));
        assert_eq!(first.get_info("Well", "Bore").names.1, "MainBore");

        fn pick_last(input: &TieBreakInput<'_>) -> usize {
            assert_eq!(input.source.name, "Well");
            assert_eq!(input.target.name, "Bore");
            input.candidates.len() - 1
        }
        let last = TypeInfoResolver::new(registry).with_tie_break(Arc::new(pick_last));
        assert_eq!(last.get_info("Well", "Bore").names.1, "Sidetracks");
    }

    #[test]
    fn test_results_are_memoized() {
        let resolver = TypeInfoResolver::new(registry());
        resolver.get_info("Well", "Bore");
        resolver.get_info("Well", "Bore");
        assert_eq!(resolver.cache.len(), 1);
    }
}
