//! Collaborator traits: adjacency lookup and schema resolution.
//!
//! The query core never owns storage. Backends implement [`AdjacencyLookup`]
//! to serve candidate relations and [`SchemaResolver`] to map label and key
//! names to [`TypeId`]s.

use ahash::AHashMap;
use std::collections::BTreeSet;

use crate::error::BackendError;
use crate::relation::{Direction, Relation, RelationCategory};
use crate::{RelationId, TypeId, VertexId};

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    EdgeLabel,
    PropertyKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaElement {
    pub id: TypeId,
    pub kind: SchemaKind,
}

pub trait SchemaResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SchemaElement>;

    /// Reverse lookup, used for display only.
    fn name_of(&self, _id: TypeId) -> Option<String> {
        None
    }
}

// ============================================================================
// Adjacency
// ============================================================================

/// Pre-filter hint passed to the backend. Backends may ignore it; the
/// executor re-validates every returned candidate.
#[derive(Debug, Clone, Copy)]
pub struct LookupRequest<'a> {
    pub direction: Direction,
    /// Empty means every type.
    pub types: &'a BTreeSet<TypeId>,
    pub category: RelationCategory,
}

impl LookupRequest<'_> {
    /// Whether `relation` satisfies the hint.
    pub fn admits(&self, relation: &Relation) -> bool {
        self.direction.admits(relation.direction)
            && (self.types.is_empty() || self.types.contains(&relation.type_id))
            && self.category.admits(relation)
    }
}

/// Identifier-only view of one incident edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Adjacency {
    pub relation: RelationId,
    pub type_id: TypeId,
    pub direction: Direction,
    pub other: VertexId,
}

impl Adjacency {
    pub fn from_relation(relation: &Relation) -> Option<Self> {
        Some(Adjacency {
            relation: relation.id,
            type_id: relation.type_id,
            direction: relation.direction,
            other: relation.other_vertex()?,
        })
    }
}

/// Source of candidate relations for an anchor vertex.
///
/// Calls may block; they are the only blocking operation in an execution.
pub trait AdjacencyLookup: Send + Sync {
    fn fetch(&self, vertex: VertexId, request: &LookupRequest<'_>)
        -> Result<Vec<Relation>, BackendError>;

    /// Identifier-only adjacency. The default derives it from [`fetch`];
    /// backends with a cheaper edge index should override.
    ///
    /// [`fetch`]: AdjacencyLookup::fetch
    fn fetch_adjacent(
        &self,
        vertex: VertexId,
        request: &LookupRequest<'_>,
    ) -> Result<Vec<Adjacency>, BackendError> {
        let request = LookupRequest {
            category: RelationCategory::Edge,
            ..*request
        };
        Ok(self
            .fetch(vertex, &request)?
            .iter()
            .filter_map(Adjacency::from_relation)
            .collect())
    }

    /// Whether [`fetch_batch`](AdjacencyLookup::fetch_batch) is a genuine
    /// bulk operation.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Candidates for several anchors in one round-trip. Anchors absent from
    /// the returned map are treated as unavailable.
    fn fetch_batch(
        &self,
        vertices: &[VertexId],
        request: &LookupRequest<'_>,
    ) -> Result<AHashMap<VertexId, Vec<Relation>>, BackendError> {
        vertices
            .iter()
            .map(|&v| self.fetch(v, request).map(|relations| (v, relations)))
            .collect()
    }

    /// Identifier-only adjacency for several anchors in one round-trip. Same
    /// contract as [`fetch_batch`](AdjacencyLookup::fetch_batch).
    fn fetch_adjacent_batch(
        &self,
        vertices: &[VertexId],
        request: &LookupRequest<'_>,
    ) -> Result<AHashMap<VertexId, Vec<Adjacency>>, BackendError> {
        vertices
            .iter()
            .map(|&v| self.fetch_adjacent(v, request).map(|adjacent| (v, adjacent)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Relation>);

    impl AdjacencyLookup for Fixed {
        fn fetch(
            &self,
            _vertex: VertexId,
            request: &LookupRequest<'_>,
        ) -> Result<Vec<Relation>, BackendError> {
            Ok(self.0.iter().filter(|r| request.admits(r)).cloned().collect())
        }
    }

    #[test]
    fn default_adjacent_keeps_only_edges() {
        let knows = TypeId::new(1);
        let name = TypeId::new(2);
        let lookup = Fixed(vec![
            Relation::edge(RelationId::new(1), knows, Direction::Out, VertexId::new(9)),
            Relation::property(RelationId::new(2), name, "x"),
        ]);
        let types = BTreeSet::new();
        let request = LookupRequest {
            direction: Direction::Both,
            types: &types,
            category: RelationCategory::Relation,
        };
        let adjacent = lookup.fetch_adjacent(VertexId::new(0), &request).unwrap();
        assert_eq!(adjacent.len(), 1);
        assert_eq!(adjacent[0].other, VertexId::new(9));
        assert!(!lookup.supports_batch());
    }

    #[test]
    fn default_batch_fetches_every_vertex() {
        let lookup = Fixed(vec![]);
        let types = BTreeSet::new();
        let request = LookupRequest {
            direction: Direction::Out,
            types: &types,
            category: RelationCategory::Edge,
        };
        let anchors = [VertexId::new(1), VertexId::new(2)];
        let map = lookup.fetch_batch(&anchors, &request).unwrap();
        assert_eq!(map.len(), 2);
        let ids = lookup.fetch_adjacent_batch(&anchors, &request).unwrap();
        assert_eq!(ids.len(), 2);
    }
}
