//! In-memory reference backend.
//!
//! [`InMemoryGraph`] implements both [`AdjacencyLookup`] and
//! [`SchemaResolver`]. Each vertex owns a list of incident relations in
//! insertion order; an edge is stored once per endpoint under a shared
//! relation id. Vertices can be marked unavailable to simulate a failed
//! storage partition, and every lookup round-trip is counted.

use ahash::AHashMap;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

use crate::error::BackendError;
use crate::lookup::{
    Adjacency, AdjacencyLookup, LookupRequest, SchemaElement, SchemaKind, SchemaResolver,
};
use crate::relation::{Direction, Relation};
use crate::{RelationId, TypeId, Value, VertexId};

// ============================================================================
// Schema
// ============================================================================

/// Name <-> id table for labels and keys.
#[derive(Debug, Default)]
struct SchemaTable {
    by_name: DashMap<String, SchemaElement>,
    by_id: DashMap<TypeId, String>,
    next_id: AtomicU32,
}

impl SchemaTable {
    /// A name keeps the kind it was first defined with.
    fn define(&self, name: &str, kind: SchemaKind) -> SchemaElement {
        match self.by_name.entry(name.to_string()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let id = TypeId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
                self.by_id.insert(id, name.to_string());
                *slot.insert(SchemaElement { id, kind })
            }
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryGraph {
    schema: SchemaTable,
    adjacency: RwLock<AHashMap<VertexId, Vec<Relation>>>,
    next_relation: AtomicU64,
    unavailable: DashSet<VertexId>,
    fetches: AtomicUsize,
    batch: AtomicBool,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise (or stop advertising) bulk lookup.
    pub fn set_batch_support(&self, enabled: bool) {
        self.batch.store(enabled, Ordering::SeqCst);
    }

    pub fn define_label(&self, name: &str) -> TypeId {
        self.schema.define(name, SchemaKind::EdgeLabel).id
    }

    pub fn define_key(&self, name: &str) -> TypeId {
        self.schema.define(name, SchemaKind::PropertyKey).id
    }

    /// Every schema element, ordered by id.
    pub fn schema(&self) -> Vec<(String, SchemaElement)> {
        let mut elements: Vec<_> = self
            .schema
            .by_name
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        elements.sort_by_key(|(_, element)| element.id);
        elements
    }

    pub fn add_edge(&self, from: VertexId, label: TypeId, to: VertexId) -> RelationId {
        self.add_edge_with(from, label, to, [])
    }

    /// Directed edge `from -> to`, visible as OUT on `from` and IN on `to`.
    pub fn add_edge_with<I>(&self, from: VertexId, label: TypeId, to: VertexId, attributes: I) -> RelationId
    where
        I: IntoIterator<Item = (TypeId, Value)>,
    {
        self.insert_edge(from, label, to, attributes, Direction::Out)
    }

    /// Undirected edge, visible from both endpoints under any direction.
    pub fn add_undirected_edge(&self, a: VertexId, label: TypeId, b: VertexId) -> RelationId {
        self.add_undirected_edge_with(a, label, b, [])
    }

    pub fn add_undirected_edge_with<I>(&self, a: VertexId, label: TypeId, b: VertexId, attributes: I) -> RelationId
    where
        I: IntoIterator<Item = (TypeId, Value)>,
    {
        self.insert_edge(a, label, b, attributes, Direction::Both)
    }

    pub fn add_property(&self, vertex: VertexId, key: TypeId, value: impl Into<Value>) -> RelationId {
        self.add_property_with(vertex, key, value, [])
    }

    /// Property with meta-attributes.
    pub fn add_property_with<I>(
        &self,
        vertex: VertexId,
        key: TypeId,
        value: impl Into<Value>,
        attributes: I,
    ) -> RelationId
    where
        I: IntoIterator<Item = (TypeId, Value)>,
    {
        let id = self.next_relation_id();
        let mut relation = Relation::property(id, key, value);
        relation.attributes.extend(attributes);
        self.adjacency.write().entry(vertex).or_default().push(relation);
        id
    }

    /// Simulate an unreachable partition for `vertex`.
    pub fn fail_on(&self, vertex: VertexId) {
        self.unavailable.insert(vertex);
    }

    pub fn recover(&self, vertex: VertexId) {
        self.unavailable.remove(&vertex);
    }

    /// Lookup round-trips served so far. A bulk lookup counts once.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn reset_fetch_count(&self) {
        self.fetches.store(0, Ordering::SeqCst);
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.read().len()
    }

    fn next_relation_id(&self) -> RelationId {
        RelationId::new(self.next_relation.fetch_add(1, Ordering::SeqCst))
    }

    fn insert_edge<I>(
        &self,
        from: VertexId,
        label: TypeId,
        to: VertexId,
        attributes: I,
        direction: Direction,
    ) -> RelationId
    where
        I: IntoIterator<Item = (TypeId, Value)>,
    {
        let id = self.next_relation_id();
        let attributes: BTreeMap<TypeId, Value> = attributes.into_iter().collect();

        let mut outgoing = Relation::edge(id, label, direction, to);
        outgoing.attributes = attributes.clone();
        let mut incoming = Relation::edge(id, label, direction.reverse(), from);
        incoming.attributes = attributes;

        let mut adjacency = self.adjacency.write();
        adjacency.entry(from).or_default().push(outgoing);
        adjacency.entry(to).or_default().push(incoming);
        id
    }

    fn check_available(&self, vertex: VertexId) -> Result<(), BackendError> {
        if self.unavailable.contains(&vertex) {
            return Err(BackendError::new(format!(
                "partition holding {vertex} is unavailable"
            )));
        }
        Ok(())
    }

    fn candidates(&self, vertex: VertexId, request: &LookupRequest<'_>) -> Vec<Relation> {
        self.adjacency
            .read()
            .get(&vertex)
            .map(|relations| {
                relations
                    .iter()
                    .filter(|r| request.admits(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Edge identifiers only; the category hint does not apply.
    fn adjacent_of(&self, vertex: VertexId, request: &LookupRequest<'_>) -> Vec<Adjacency> {
        self.adjacency
            .read()
            .get(&vertex)
            .into_iter()
            .flatten()
            .filter(|r| {
                request.direction.admits(r.direction)
                    && (request.types.is_empty() || request.types.contains(&r.type_id))
            })
            .filter_map(Adjacency::from_relation)
            .collect()
    }
}

impl SchemaResolver for InMemoryGraph {
    fn resolve(&self, name: &str) -> Option<SchemaElement> {
        self.schema.by_name.get(name).map(|element| *element)
    }

    fn name_of(&self, id: TypeId) -> Option<String> {
        self.schema.by_id.get(&id).map(|name| name.clone())
    }
}

impl AdjacencyLookup for InMemoryGraph {
    fn fetch(
        &self,
        vertex: VertexId,
        request: &LookupRequest<'_>,
    ) -> Result<Vec<Relation>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available(vertex)?;
        Ok(self.candidates(vertex, request))
    }

    fn fetch_adjacent(
        &self,
        vertex: VertexId,
        request: &LookupRequest<'_>,
    ) -> Result<Vec<Adjacency>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available(vertex)?;
        Ok(self.adjacent_of(vertex, request))
    }

    fn supports_batch(&self) -> bool {
        self.batch.load(Ordering::SeqCst)
    }

    /// Unavailable vertices are left out of the response.
    fn fetch_batch(
        &self,
        vertices: &[VertexId],
        request: &LookupRequest<'_>,
    ) -> Result<AHashMap<VertexId, Vec<Relation>>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vertices
            .iter()
            .filter(|v| !self.unavailable.contains(*v))
            .map(|&v| (v, self.candidates(v, request)))
            .collect())
    }

    fn fetch_adjacent_batch(
        &self,
        vertices: &[VertexId],
        request: &LookupRequest<'_>,
    ) -> Result<AHashMap<VertexId, Vec<Adjacency>>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vertices
            .iter()
            .filter(|v| !self.unavailable.contains(*v))
            .map(|&v| (v, self.adjacent_of(v, request)))
            .collect())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to parse graph fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("`{name}` is used both as an edge label and as a property key")]
    KindConflict { name: String },
}

/// JSON description of a graph.
///
/// ```json
/// {
///   "labels": ["knows"],
///   "keys": ["name", "weight"],
///   "edges": [{"from": 1, "to": 2, "label": "knows", "attributes": {"weight": 0.5}}],
///   "properties": [{"vertex": 1, "key": "name", "value": "Ada"}]
/// }
/// ```
///
/// Labels and keys used without being declared are defined on first use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFixture {
    pub labels: Vec<String>,
    pub keys: Vec<String>,
    pub edges: Vec<EdgeFixture>,
    pub properties: Vec<PropertyFixture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFixture {
    pub from: u64,
    pub to: u64,
    pub label: String,
    #[serde(default)]
    pub undirected: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFixture {
    pub vertex: u64,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl GraphFixture {
    pub fn from_json_str(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl InMemoryGraph {
    pub fn from_fixture(fixture: &GraphFixture) -> Result<Self, FixtureError> {
        let graph = InMemoryGraph::new();
        for label in &fixture.labels {
            graph.define_checked(label, SchemaKind::EdgeLabel)?;
        }
        for key in &fixture.keys {
            graph.define_checked(key, SchemaKind::PropertyKey)?;
        }

        for edge in &fixture.edges {
            let label = graph.define_checked(&edge.label, SchemaKind::EdgeLabel)?;
            let (from, to) = (VertexId::new(edge.from), VertexId::new(edge.to));
            let attributes = graph.attributes(&edge.attributes)?;
            if edge.undirected {
                graph.add_undirected_edge_with(from, label, to, attributes);
            } else {
                graph.add_edge_with(from, label, to, attributes);
            }
        }

        for property in &fixture.properties {
            let key = graph.define_checked(&property.key, SchemaKind::PropertyKey)?;
            let attributes = graph.attributes(&property.attributes)?;
            graph.add_property_with(
                VertexId::new(property.vertex),
                key,
                property.value.clone(),
                attributes,
            );
        }

        tracing::debug!(
            vertices = graph.vertex_count(),
            edges = fixture.edges.len(),
            properties = fixture.properties.len(),
            "loaded graph fixture"
        );
        Ok(graph)
    }

    fn define_checked(&self, name: &str, kind: SchemaKind) -> Result<TypeId, FixtureError> {
        let element = self.schema.define(name, kind);
        if element.kind != kind {
            return Err(FixtureError::KindConflict {
                name: name.to_string(),
            });
        }
        Ok(element.id)
    }

    fn attributes(
        &self,
        named: &BTreeMap<String, Value>,
    ) -> Result<Vec<(TypeId, Value)>, FixtureError> {
        named
            .iter()
            .map(|(name, value)| {
                self.define_checked(name, SchemaKind::PropertyKey)
                    .map(|key| (key, value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationCategory;
    use std::collections::BTreeSet;

    fn request(types: &BTreeSet<TypeId>, direction: Direction) -> LookupRequest<'_> {
        LookupRequest {
            direction,
            types,
            category: RelationCategory::Relation,
        }
    }

    #[test]
    fn edges_are_visible_from_both_endpoints() {
        let graph = InMemoryGraph::new();
        let knows = graph.define_label("knows");
        let (a, b) = (VertexId::new(1), VertexId::new(2));
        let id = graph.add_edge(a, knows, b);

        let all = BTreeSet::new();
        let from_b = graph.fetch(b, &request(&all, Direction::In)).unwrap();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].id, id);
        assert_eq!(from_b[0].other_vertex(), Some(a));
        assert!(graph.fetch(b, &request(&all, Direction::Out)).unwrap().is_empty());
    }

    #[test]
    fn undirected_edges_pass_every_direction() {
        let graph = InMemoryGraph::new();
        let near = graph.define_label("near");
        let (a, b) = (VertexId::new(1), VertexId::new(2));
        graph.add_undirected_edge(a, near, b);
        let all = BTreeSet::new();
        for direction in [Direction::Out, Direction::In, Direction::Both] {
            assert_eq!(graph.fetch(a, &request(&all, direction)).unwrap().len(), 1);
            assert_eq!(graph.fetch(b, &request(&all, direction)).unwrap().len(), 1);
        }
    }

    #[test]
    fn unavailable_vertices_fail_and_are_counted() {
        let graph = InMemoryGraph::new();
        let v = VertexId::new(3);
        graph.fail_on(v);
        let all = BTreeSet::new();
        assert!(graph.fetch(v, &request(&all, Direction::Both)).is_err());
        graph.recover(v);
        assert!(graph.fetch(v, &request(&all, Direction::Both)).is_ok());
        assert_eq!(graph.fetch_count(), 2);

        graph.fail_on(v);
        let batch = graph
            .fetch_batch(&[v, VertexId::new(4)], &request(&all, Direction::Both))
            .unwrap();
        assert!(!batch.contains_key(&v));
        assert_eq!(graph.fetch_count(), 3);
    }

    #[test]
    fn schema_names_keep_their_first_kind() {
        let graph = InMemoryGraph::new();
        let knows = graph.define_label("knows");
        assert_eq!(graph.define_key("knows"), knows);
        assert_eq!(graph.resolve("knows").map(|e| e.kind), Some(SchemaKind::EdgeLabel));
        assert_eq!(graph.name_of(knows).as_deref(), Some("knows"));
        assert!(graph.resolve("missing").is_none());
    }

    #[test]
    fn fixture_loads_edges_properties_and_attributes() {
        let fixture = GraphFixture::from_json_str(
            r#"{
                "labels": ["knows"],
                "edges": [
                    {"from": 1, "to": 2, "label": "knows", "attributes": {"weight": 0.5}},
                    {"from": 2, "to": 3, "label": "near", "undirected": true, "attributes": {"weight": 2}}
                ],
                "properties": [{"vertex": 1, "key": "name", "value": "Ada", "attributes": {"since": 1843}}]
            }"#,
        )
        .unwrap();
        let graph = InMemoryGraph::from_fixture(&fixture).unwrap();
        let weight = graph.resolve("weight").unwrap().id;
        let since = graph.resolve("since").unwrap().id;

        let all = BTreeSet::new();
        let one = graph.fetch(VertexId::new(1), &request(&all, Direction::Both)).unwrap();
        assert_eq!(one.len(), 2);
        assert_eq!(one[0].attribute(weight), Some(&Value::Float(0.5)));
        assert_eq!(one[1].attribute(since), Some(&Value::Int(1843)));

        let three = graph.fetch(VertexId::new(3), &request(&all, Direction::Out)).unwrap();
        assert_eq!(three[0].attribute(weight), Some(&Value::Int(2)));
    }

    #[test]
    fn fixture_rejects_kind_conflicts() {
        let fixture = GraphFixture::from_json_str(
            r#"{"labels": ["name"], "properties": [{"vertex": 1, "key": "name", "value": "x"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            InMemoryGraph::from_fixture(&fixture),
            Err(FixtureError::KindConflict { .. })
        ));
    }
}
