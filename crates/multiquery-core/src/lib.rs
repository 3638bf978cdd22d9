//! Multiquery: batched adjacency queries over many anchor vertices
//!
//! A single query shape (direction, type restriction, conjunctive clauses,
//! ordering, per-anchor limit) is executed against a whole set of anchor
//! vertices in one call. Each anchor gets its own independently filtered,
//! ordered and limited result slot.
//!
//! ## Module Organization
//!
//! - `predicate` / `text`: comparison and whole-token text predicates
//! - `spec`: the mutable builder and the frozen [`QuerySpec`] snapshot
//! - `executor`: per-anchor fan-out against an [`AdjacencyLookup`]
//! - `materialize`: edges / properties / relations / vertices / id views
//! - `query`: the fluent [`MultiVertexQuery`] handle tying it together
//! - `memory`: an in-memory reference backend for tests and tooling
//!
//! ## Example
//!
//! ```ignore
//! let graph = Arc::new(InMemoryGraph::new());
//! let knows = graph.define_label("knows");
//! let executor = BatchExecutor::from_graph(graph.clone(), ExecutorConfig::default());
//!
//! let mut query = executor.query();
//! query.add_all_vertices([alice, bob])?;
//! query.direction(Direction::Out)?.labels(["knows"])?.limit(2)?;
//! let neighbors = query.vertices()?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod lookup;
pub mod materialize;
pub mod memory;
pub mod predicate;
pub mod query;
pub mod relation;
pub mod result;
pub mod spec;
pub mod text;
pub mod value;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use config::{ExecutorConfig, RegexCase};
pub use error::{BackendError, QueryError};
pub use executor::{BatchExecutor, CancelToken};
pub use lookup::{Adjacency, AdjacencyLookup, LookupRequest, SchemaElement, SchemaKind, SchemaResolver};
pub use materialize::ResultMaterializer;
pub use memory::{EdgeFixture, FixtureError, GraphFixture, InMemoryGraph, PropertyFixture};
pub use predicate::{Condition, Predicate, PredicateEngine};
pub use query::MultiVertexQuery;
pub use relation::{Direction, Edge, Property, Relation, RelationCategory, RelationKind};
pub use result::{AnchorOutcome, AnchorResultMap, VertexList};
pub use spec::{Clause, Order, OrderClause, QueryBuilder, QuerySpec, SchemaRef};
pub use value::{Value, ValueKind};

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque vertex identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VertexId(u64);

impl VertexId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Stable relation identity; the deterministic tie-break for ordered results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RelationId(u64);

impl RelationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Schema identifier for an edge label or property key (4 bytes, like an
/// interned string id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
