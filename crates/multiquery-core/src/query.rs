//! The fluent multi-vertex query handle.

use ahash::AHashSet;
use std::sync::Arc;

use crate::error::QueryError;
use crate::executor::{BatchExecutor, CancelToken};
use crate::materialize::ResultMaterializer;
use crate::predicate::Predicate;
use crate::relation::{Direction, Edge, Property, Relation, RelationCategory};
use crate::result::{AnchorResultMap, VertexList};
use crate::spec::{Order, QueryBuilder, QuerySpec, SchemaRef};
use crate::{TypeId, Value, VertexId};

/// A query shape plus the anchors it runs against.
///
/// Anchors and restrictions may be changed freely until the first execution.
/// That execution freezes both; every later execution reuses the frozen
/// snapshot and every later mutation fails with [`QueryError::FrozenSpec`].
pub struct MultiVertexQuery<'a> {
    executor: &'a BatchExecutor,
    builder: QueryBuilder,
    anchors: Vec<VertexId>,
    seen: AHashSet<VertexId>,
    cancel: CancelToken,
}

impl<'a> MultiVertexQuery<'a> {
    pub(crate) fn new(executor: &'a BatchExecutor) -> Self {
        Self {
            executor,
            builder: executor.spec_builder(),
            anchors: Vec::new(),
            seen: AHashSet::new(),
            cancel: CancelToken::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Anchors
    // ------------------------------------------------------------------------

    pub fn add_vertex(&mut self, vertex: VertexId) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        if self.seen.insert(vertex) {
            self.anchors.push(vertex);
        }
        Ok(self)
    }

    pub fn add_all_vertices<I>(&mut self, vertices: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = VertexId>,
    {
        self.ensure_open()?;
        for vertex in vertices {
            if self.seen.insert(vertex) {
                self.anchors.push(vertex);
            }
        }
        Ok(self)
    }

    pub fn anchors(&self) -> &[VertexId] {
        &self.anchors
    }

    /// Share an external cancellation token with this query.
    pub fn with_cancel(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn spec(&self) -> &QuerySpec {
        self.builder.spec()
    }

    pub fn is_frozen(&self) -> bool {
        self.builder.is_frozen()
    }

    // ------------------------------------------------------------------------
    // Restrictions
    // ------------------------------------------------------------------------

    pub fn direction(&mut self, direction: Direction) -> Result<&mut Self, QueryError> {
        self.builder.direction(direction)?;
        Ok(self)
    }

    pub fn types<I>(&mut self, ids: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = TypeId>,
    {
        self.builder.types(ids)?;
        Ok(self)
    }

    pub fn labels<I, S>(&mut self, names: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.builder.labels(names)?;
        Ok(self)
    }

    pub fn keys<I, S>(&mut self, names: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.builder.keys(names)?;
        Ok(self)
    }

    pub fn has(
        &mut self,
        key: impl Into<SchemaRef>,
        predicate: Predicate,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.builder.has(key, predicate, value)?;
        Ok(self)
    }

    pub fn has_value(
        &mut self,
        key: impl Into<SchemaRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.builder.has_value(key, value)?;
        Ok(self)
    }

    pub fn has_not_value(
        &mut self,
        key: impl Into<SchemaRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.builder.has_not_value(key, value)?;
        Ok(self)
    }

    pub fn has_key(&mut self, key: impl Into<SchemaRef>) -> Result<&mut Self, QueryError> {
        self.builder.has_key(key)?;
        Ok(self)
    }

    pub fn has_not_key(&mut self, key: impl Into<SchemaRef>) -> Result<&mut Self, QueryError> {
        self.builder.has_not_key(key)?;
        Ok(self)
    }

    pub fn interval(
        &mut self,
        key: impl Into<SchemaRef>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.builder.interval(key, start, end)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: usize) -> Result<&mut Self, QueryError> {
        self.builder.limit(limit)?;
        Ok(self)
    }

    pub fn order_by(
        &mut self,
        key: impl Into<SchemaRef>,
        order: Order,
    ) -> Result<&mut Self, QueryError> {
        self.builder.order_by(key, order)?;
        Ok(self)
    }

    pub fn adjacent(&mut self, vertex: VertexId) -> Result<&mut Self, QueryError> {
        self.builder.adjacent(vertex)?;
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    pub fn edges(&mut self) -> Result<AnchorResultMap<Vec<Edge>>, QueryError> {
        let raw = self.run(RelationCategory::Edge)?;
        Ok(ResultMaterializer::edges(&raw))
    }

    pub fn properties(&mut self) -> Result<AnchorResultMap<Vec<Property>>, QueryError> {
        let raw = self.run(RelationCategory::Property)?;
        Ok(ResultMaterializer::properties(&raw))
    }

    pub fn relations(&mut self) -> Result<AnchorResultMap<Vec<Relation>>, QueryError> {
        self.run(RelationCategory::Relation)
    }

    /// Distinct neighbors of each anchor.
    pub fn vertices(&mut self) -> Result<AnchorResultMap<Vec<VertexId>>, QueryError> {
        let raw = self.run(RelationCategory::Edge)?;
        Ok(ResultMaterializer::vertices(&raw))
    }

    /// Neighbor identifiers, one per matching edge, in backend order.
    pub fn vertex_ids(&mut self) -> Result<AnchorResultMap<VertexList>, QueryError> {
        let spec = self.freeze()?;
        self.executor.execute_ids(&self.anchors, &spec, &self.cancel)
    }

    fn run(&mut self, category: RelationCategory) -> Result<AnchorResultMap<Vec<Relation>>, QueryError> {
        let spec = self.freeze()?;
        self.executor
            .execute_with_cancel(&self.anchors, &spec, category, &self.cancel)
    }

    /// An execution without anchors fails and leaves the query open.
    fn freeze(&mut self) -> Result<Arc<QuerySpec>, QueryError> {
        if self.anchors.is_empty() {
            return Err(QueryError::EmptyAnchorSet);
        }
        Ok(self.builder.freeze())
    }

    fn ensure_open(&self) -> Result<(), QueryError> {
        if self.builder.is_frozen() {
            return Err(QueryError::FrozenSpec);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::memory::InMemoryGraph;

    #[test]
    fn first_execution_freezes_anchors_and_spec() {
        let graph = Arc::new(InMemoryGraph::new());
        let knows = graph.define_label("knows");
        let (a, b) = (VertexId::new(1), VertexId::new(2));
        graph.add_edge(a, knows, b);
        let executor = BatchExecutor::from_graph(graph, ExecutorConfig::default());

        let mut query = executor.query();
        query.add_vertex(a).unwrap().labels(["knows"]).unwrap();
        let first = query.vertices().unwrap();
        assert_eq!(first.ready(a), Some(&vec![b]));

        assert!(matches!(query.add_vertex(b), Err(QueryError::FrozenSpec)));
        assert!(matches!(query.limit(1), Err(QueryError::FrozenSpec)));
        let again = query.vertices().unwrap();
        assert_eq!(again.ready(a), first.ready(a));
    }

    #[test]
    fn empty_query_stays_open() {
        let graph = Arc::new(InMemoryGraph::new());
        let executor = BatchExecutor::from_graph(graph, ExecutorConfig::default());
        let mut query = executor.query();
        assert!(matches!(query.edges(), Err(QueryError::EmptyAnchorSet)));
        assert!(!query.is_frozen());
        query.add_vertex(VertexId::new(1)).unwrap();
        assert!(query.edges().is_ok());
    }
}
