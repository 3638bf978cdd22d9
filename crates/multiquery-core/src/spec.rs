//! Query specification: the mutable builder and the frozen snapshot.
//!
//! A [`QueryBuilder`] accumulates restrictions and clauses. The first
//! execution calls [`QueryBuilder::freeze`], which snapshots the draft into
//! an `Arc<QuerySpec>` shared read-only by every anchor task; every setter
//! fails with [`QueryError::FrozenSpec`] from then on.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::QueryError;
use crate::lookup::{Adjacency, LookupRequest, SchemaKind, SchemaResolver};
use crate::predicate::{Condition, Predicate, PredicateEngine};
use crate::relation::{Direction, Relation, RelationCategory};
use crate::{TypeId, Value, VertexId};

// ============================================================================
// Clauses
// ============================================================================

/// A key given either as a resolved identifier or as a schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaRef {
    Id(TypeId),
    Name(String),
}

impl From<TypeId> for SchemaRef {
    fn from(id: TypeId) -> Self {
        SchemaRef::Id(id)
    }
}

impl From<&str> for SchemaRef {
    fn from(name: &str) -> Self {
        SchemaRef::Name(name.to_string())
    }
}

impl From<String> for SchemaRef {
    fn from(name: String) -> Self {
        SchemaRef::Name(name)
    }
}

impl From<&String> for SchemaRef {
    fn from(name: &String) -> Self {
        SchemaRef::Name(name.clone())
    }
}

/// One conjunct of a query.
#[derive(Debug, Clone)]
pub enum Clause {
    Compare { key: TypeId, condition: Condition },
    Present { key: TypeId },
    Absent { key: TypeId },
    /// Half-open: `start <= value < end`.
    Interval { key: TypeId, start: Value, end: Value },
}

impl Clause {
    pub fn key(&self) -> TypeId {
        match self {
            Clause::Compare { key, .. }
            | Clause::Present { key }
            | Clause::Absent { key }
            | Clause::Interval { key, .. } => *key,
        }
    }

    pub fn matches(&self, relation: &Relation) -> Result<bool, QueryError> {
        let stored = relation.attribute(self.key());
        match self {
            Clause::Compare { condition, .. } => match stored {
                Some(value) => condition.test(value),
                None => Ok(condition.test_missing()),
            },
            Clause::Present { .. } => Ok(stored.is_some()),
            Clause::Absent { .. } => Ok(stored.is_none()),
            Clause::Interval { start, end, .. } => match stored {
                None | Some(Value::Null) => Ok(false),
                Some(value) => {
                    let lower = compare(value, start)?;
                    let upper = compare(value, end)?;
                    Ok(lower != Ordering::Less && upper == Ordering::Less)
                }
            },
        }
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, QueryError> {
    left.natural_cmp(right).ok_or(QueryError::NotComparable {
        left: left.kind(),
        right: right.kind(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        })
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            other => Err(format!("unknown order `{other}` (expected asc or desc)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderClause {
    pub key: TypeId,
    pub order: Order,
}

impl OrderClause {
    /// Compare two relations by this clause.
    ///
    /// Relations without the key (or with `Null`) sort after every relation
    /// that has it, in both directions. Ties are left to the caller.
    pub fn compare(&self, a: &Relation, b: &Relation) -> Result<Ordering, QueryError> {
        match (keyed(a, self.key), keyed(b, self.key)) {
            (Some(x), Some(y)) => {
                let ord = compare(x, y)?;
                Ok(match self.order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                })
            }
            (Some(_), None) => Ok(Ordering::Less),
            (None, Some(_)) => Ok(Ordering::Greater),
            (None, None) => Ok(Ordering::Equal),
        }
    }
}

fn keyed(relation: &Relation, key: TypeId) -> Option<&Value> {
    relation.attribute(key).filter(|v| !v.is_null())
}

// ============================================================================
// QuerySpec
// ============================================================================

/// Immutable description of a traversal filter.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    direction: Direction,
    types: BTreeSet<TypeId>,
    clauses: Vec<Clause>,
    order: Option<OrderClause>,
    limit: Option<usize>,
    adjacent: Option<VertexId>,
}

impl QuerySpec {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn types(&self) -> &BTreeSet<TypeId> {
        &self.types
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn order(&self) -> Option<OrderClause> {
        self.order
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn adjacent(&self) -> Option<VertexId> {
        self.adjacent
    }

    pub fn lookup_request(&self, category: RelationCategory) -> LookupRequest<'_> {
        LookupRequest {
            direction: self.direction,
            types: &self.types,
            category,
        }
    }

    /// Direction, type, category and adjacency restrictions.
    pub fn admits(&self, relation: &Relation, category: RelationCategory) -> bool {
        self.lookup_request(category).admits(relation)
            && self
                .adjacent
                .map_or(true, |v| relation.other_vertex() == Some(v))
    }

    pub fn admits_adjacency(&self, adjacency: &Adjacency) -> bool {
        self.direction.admits(adjacency.direction)
            && (self.types.is_empty() || self.types.contains(&adjacency.type_id))
            && self.adjacent.map_or(true, |v| adjacency.other == v)
    }

    /// Conjunction of every clause.
    pub fn matches(&self, relation: &Relation) -> Result<bool, QueryError> {
        for clause in &self.clauses {
            if !clause.matches(relation)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether evaluation needs attribute payloads, i.e. identifier-only
    /// adjacency is not enough.
    pub fn requires_payload(&self) -> bool {
        !self.clauses.is_empty() || self.order.is_some()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for [`QuerySpec`].
pub struct QueryBuilder {
    resolver: Arc<dyn SchemaResolver>,
    engine: PredicateEngine,
    draft: QuerySpec,
    frozen: Option<Arc<QuerySpec>>,
}

impl QueryBuilder {
    pub fn new(resolver: Arc<dyn SchemaResolver>, engine: PredicateEngine) -> Self {
        Self {
            resolver,
            engine,
            draft: QuerySpec::default(),
            frozen: None,
        }
    }

    /// The spec as configured so far.
    pub fn spec(&self) -> &QuerySpec {
        &self.draft
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Snapshot the draft. Idempotent: later calls return the same snapshot.
    pub fn freeze(&mut self) -> Arc<QuerySpec> {
        self.frozen
            .get_or_insert_with(|| Arc::new(self.draft.clone()))
            .clone()
    }

    pub fn direction(&mut self, direction: Direction) -> Result<&mut Self, QueryError> {
        self.draft_mut()?.direction = direction;
        Ok(self)
    }

    pub fn types<I>(&mut self, ids: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = TypeId>,
    {
        self.draft_mut()?.types.extend(ids);
        Ok(self)
    }

    /// Restrict to edge labels, by name.
    pub fn labels<I, S>(&mut self, names: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.named_types(names, SchemaKind::EdgeLabel)
    }

    /// Restrict to property keys, by name.
    pub fn keys<I, S>(&mut self, names: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.named_types(names, SchemaKind::PropertyKey)
    }

    pub fn has(
        &mut self,
        key: impl Into<SchemaRef>,
        predicate: Predicate,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        let key = self.resolve_key(key.into())?;
        let condition = self.engine.compile(predicate, value.into())?;
        self.draft.clauses.push(Clause::Compare { key, condition });
        Ok(self)
    }

    pub fn has_value(
        &mut self,
        key: impl Into<SchemaRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.has(key, Predicate::Equal, value)
    }

    pub fn has_not_value(
        &mut self,
        key: impl Into<SchemaRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.has(key, Predicate::NotEqual, value)
    }

    pub fn has_key(&mut self, key: impl Into<SchemaRef>) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        let key = self.resolve_key(key.into())?;
        self.draft.clauses.push(Clause::Present { key });
        Ok(self)
    }

    pub fn has_not_key(&mut self, key: impl Into<SchemaRef>) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        let key = self.resolve_key(key.into())?;
        self.draft.clauses.push(Clause::Absent { key });
        Ok(self)
    }

    /// Half-open `[start, end)` on `key`.
    pub fn interval(
        &mut self,
        key: impl Into<SchemaRef>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        let key = self.resolve_key(key.into())?;
        let (start, end) = (start.into(), end.into());
        if compare(&start, &end)? == Ordering::Greater {
            return Err(QueryError::InvalidInterval {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        self.draft.clauses.push(Clause::Interval { key, start, end });
        Ok(self)
    }

    pub fn limit(&mut self, limit: usize) -> Result<&mut Self, QueryError> {
        self.draft_mut()?.limit = Some(limit);
        Ok(self)
    }

    pub fn order_by(
        &mut self,
        key: impl Into<SchemaRef>,
        order: Order,
    ) -> Result<&mut Self, QueryError> {
        self.ensure_open()?;
        let key = self.resolve_key(key.into())?;
        self.draft.order = Some(OrderClause { key, order });
        Ok(self)
    }

    /// Only edges whose other endpoint is `vertex`.
    pub fn adjacent(&mut self, vertex: VertexId) -> Result<&mut Self, QueryError> {
        self.draft_mut()?.adjacent = Some(vertex);
        Ok(self)
    }

    fn ensure_open(&self) -> Result<(), QueryError> {
        if self.frozen.is_some() {
            return Err(QueryError::FrozenSpec);
        }
        Ok(())
    }

    fn draft_mut(&mut self) -> Result<&mut QuerySpec, QueryError> {
        self.ensure_open()?;
        Ok(&mut self.draft)
    }

    fn resolve_key(&self, key: SchemaRef) -> Result<TypeId, QueryError> {
        match key {
            SchemaRef::Id(id) => Ok(id),
            SchemaRef::Name(name) => self
                .resolver
                .resolve(&name)
                .map(|element| element.id)
                .ok_or_else(|| QueryError::unknown_schema(name, "not defined")),
        }
    }

    fn named_types<I, S>(&mut self, names: I, kind: SchemaKind) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let mut resolved = Vec::new();
        for name in names {
            let name = name.as_ref();
            let element = self
                .resolver
                .resolve(name)
                .ok_or_else(|| QueryError::unknown_schema(name, "not defined"))?;
            if element.kind != kind {
                let reason = match kind {
                    SchemaKind::EdgeLabel => "not an edge label",
                    SchemaKind::PropertyKey => "not a property key",
                };
                return Err(QueryError::unknown_schema(name, reason));
            }
            resolved.push(element.id);
        }
        self.draft.types.extend(resolved);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::SchemaElement;
    use crate::RelationId;

    struct Schema;

    impl SchemaResolver for Schema {
        fn resolve(&self, name: &str) -> Option<SchemaElement> {
            let (id, kind) = match name {
                "knows" => (1, SchemaKind::EdgeLabel),
                "name" => (2, SchemaKind::PropertyKey),
                "weight" => (3, SchemaKind::PropertyKey),
                _ => return None,
            };
            Some(SchemaElement {
                id: TypeId::new(id),
                kind,
            })
        }
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(Arc::new(Schema), PredicateEngine::default())
    }

    const WEIGHT: TypeId = TypeId::new(3);

    fn weighted(id: u64, weight: impl Into<Value>) -> Relation {
        Relation::edge(RelationId::new(id), TypeId::new(1), Direction::Out, VertexId::new(id))
            .with_attribute(WEIGHT, weight)
    }

    #[test]
    fn setters_fail_once_frozen() {
        let mut b = builder();
        b.limit(3).unwrap().direction(Direction::Out).unwrap();
        let spec = b.freeze();
        assert_eq!(spec.limit(), Some(3));

        assert!(matches!(b.limit(1), Err(QueryError::FrozenSpec)));
        assert!(matches!(b.labels(["knows"]), Err(QueryError::FrozenSpec)));
        assert!(matches!(b.has_key("zzz"), Err(QueryError::FrozenSpec)));
        assert!(Arc::ptr_eq(&spec, &b.freeze()));
    }

    #[test]
    fn last_write_wins_for_scalars() {
        let mut b = builder();
        b.limit(5).unwrap().limit(2).unwrap();
        b.direction(Direction::In).unwrap().direction(Direction::Out).unwrap();
        b.order_by("name", Order::Asc).unwrap().order_by("weight", Order::Desc).unwrap();
        let spec = b.spec();
        assert_eq!(spec.limit(), Some(2));
        assert_eq!(spec.direction(), Direction::Out);
        assert_eq!(spec.order(), Some(OrderClause { key: WEIGHT, order: Order::Desc }));
    }

    #[test]
    fn label_and_key_restrictions_union() {
        let mut b = builder();
        b.labels(["knows"]).unwrap().keys(["name"]).unwrap().types([TypeId::new(9)]).unwrap();
        let ids: Vec<u32> = b.spec().types().iter().map(|t| t.raw()).collect();
        assert_eq!(ids, vec![1, 2, 9]);
    }

    #[test]
    fn schema_names_must_resolve_with_the_right_kind() {
        let mut b = builder();
        assert!(matches!(
            b.labels(["name"]),
            Err(QueryError::UnknownSchemaElement { .. })
        ));
        assert!(matches!(
            b.keys(["nope"]),
            Err(QueryError::UnknownSchemaElement { .. })
        ));
        assert!(matches!(
            b.has_value("nope", 1),
            Err(QueryError::UnknownSchemaElement { .. })
        ));
        assert!(b.spec().types().is_empty());
    }

    #[test]
    fn interval_bounds_are_validated() {
        let mut b = builder();
        assert!(matches!(
            b.interval("weight", 5, 1),
            Err(QueryError::InvalidInterval { .. })
        ));
        assert!(matches!(
            b.interval("weight", 1, "x"),
            Err(QueryError::NotComparable { .. })
        ));
        b.interval("weight", 1, 1).unwrap();
    }

    #[test]
    fn interval_is_half_open() {
        let mut b = builder();
        b.interval(WEIGHT, 1, 3).unwrap();
        let spec = b.freeze();
        assert!(!spec.matches(&weighted(1, 0)).unwrap());
        assert!(spec.matches(&weighted(2, 1)).unwrap());
        assert!(spec.matches(&weighted(3, 2.5)).unwrap());
        assert!(!spec.matches(&weighted(4, 3)).unwrap());
        assert!(matches!(
            spec.matches(&weighted(5, "heavy")),
            Err(QueryError::NotComparable { .. })
        ));
    }

    #[test]
    fn missing_keys_follow_absence_rules() {
        let bare = Relation::edge(RelationId::new(1), TypeId::new(1), Direction::Out, VertexId::new(2));
        let check = |configure: &dyn Fn(&mut QueryBuilder)| {
            let mut b = builder();
            configure(&mut b);
            b.freeze().matches(&bare).unwrap()
        };
        assert!(!check(&|b: &mut QueryBuilder| {
            b.has_value("weight", 1).unwrap();
        }));
        assert!(check(&|b: &mut QueryBuilder| {
            b.has_not_value("weight", 1).unwrap();
        }));
        assert!(!check(&|b: &mut QueryBuilder| {
            b.has_key("weight").unwrap();
        }));
        assert!(check(&|b: &mut QueryBuilder| {
            b.has_not_key("weight").unwrap();
        }));
        assert!(!check(&|b: &mut QueryBuilder| {
            b.interval("weight", 0, 10).unwrap();
        }));
    }

    #[test]
    fn order_puts_missing_keys_last() {
        let asc = OrderClause { key: WEIGHT, order: Order::Asc };
        let desc = OrderClause { key: WEIGHT, order: Order::Desc };
        let light = weighted(1, 1);
        let heavy = weighted(2, 5.5);
        let none = Relation::edge(RelationId::new(3), TypeId::new(1), Direction::Out, VertexId::new(3));

        assert_eq!(asc.compare(&light, &heavy).unwrap(), Ordering::Less);
        assert_eq!(desc.compare(&light, &heavy).unwrap(), Ordering::Greater);
        assert_eq!(asc.compare(&none, &light).unwrap(), Ordering::Greater);
        assert_eq!(desc.compare(&none, &light).unwrap(), Ordering::Greater);
        assert!(asc.compare(&light, &weighted(4, "x")).is_err());
    }

    #[test]
    fn order_treats_null_as_missing_and_reads_property_values() {
        let desc = OrderClause { key: WEIGHT, order: Order::Desc };
        let null = weighted(1, Value::Null);
        let prop = Relation::property(RelationId::new(2), WEIGHT, 7);
        let light = weighted(3, 1);

        assert_eq!(desc.compare(&null, &light).unwrap(), Ordering::Greater);
        assert_eq!(desc.compare(&prop, &light).unwrap(), Ordering::Less);
        assert_eq!(desc.compare(&null, &null).unwrap(), Ordering::Equal);
    }

    #[test]
    fn adjacency_restriction_excludes_properties() {
        let mut b = builder();
        b.adjacent(VertexId::new(2)).unwrap();
        let spec = b.freeze();
        let to_two = Relation::edge(RelationId::new(1), TypeId::new(1), Direction::Out, VertexId::new(2));
        let to_three = Relation::edge(RelationId::new(2), TypeId::new(1), Direction::Out, VertexId::new(3));
        let prop = Relation::property(RelationId::new(3), TypeId::new(2), "x");
        assert!(spec.admits(&to_two, RelationCategory::Relation));
        assert!(!spec.admits(&to_three, RelationCategory::Relation));
        assert!(!spec.admits(&prop, RelationCategory::Relation));
        assert!(!spec.requires_payload());
    }
}
