//! Batched execution of one query shape over many anchor vertices.
//!
//! Each anchor is evaluated independently: lookup, re-validation, clause
//! filtering, ordering and limit all happen per anchor, and every task hands
//! back its own `(anchor, outcome)` pair. The pairs are merged into an
//! [`AnchorResultMap`] in a single collecting step, so the fan-out itself
//! takes no locks.
//!
//! Small anchor sets run on the calling thread. At or above
//! [`ExecutorConfig::parallel_threshold`] anchors are spread over the rayon
//! pool; the results are identical either way.

use ahash::{AHashMap, AHashSet};
use dashmap::DashSet;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::ExecutorConfig;
use crate::error::{BackendError, QueryError};
use crate::lookup::{Adjacency, AdjacencyLookup, SchemaResolver};
use crate::materialize::ResultMaterializer;
use crate::predicate::PredicateEngine;
use crate::query::MultiVertexQuery;
use crate::relation::{Relation, RelationCategory};
use crate::result::{AnchorOutcome, AnchorResultMap, VertexList};
use crate::spec::{OrderClause, QueryBuilder, QuerySpec};
use crate::VertexId;

type Fetched = Result<Vec<Relation>, BackendError>;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag with anchor granularity.
///
/// Cloning shares the underlying state. Checked before the lookup, after the
/// lookup and before an anchor's outcome is recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    all: AtomicBool,
    anchors: DashSet<VertexId>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every anchor still in flight.
    pub fn cancel_all(&self) {
        self.inner.all.store(true, AtomicOrdering::SeqCst);
    }

    pub fn cancel(&self, anchor: VertexId) {
        self.inner.anchors.insert(anchor);
    }

    pub fn is_cancelled(&self, anchor: VertexId) -> bool {
        self.inner.all.load(AtomicOrdering::SeqCst) || self.inner.anchors.contains(&anchor)
    }
}

// ============================================================================
// Executor
// ============================================================================

pub struct BatchExecutor {
    lookup: Arc<dyn AdjacencyLookup>,
    resolver: Arc<dyn SchemaResolver>,
    config: ExecutorConfig,
    engine: PredicateEngine,
}

impl BatchExecutor {
    pub fn new(
        lookup: Arc<dyn AdjacencyLookup>,
        resolver: Arc<dyn SchemaResolver>,
        config: ExecutorConfig,
    ) -> Self {
        let engine = PredicateEngine::new(config.regex_case);
        Self {
            lookup,
            resolver,
            config,
            engine,
        }
    }

    /// Executor over a backend that is both lookup and schema.
    pub fn from_graph<G>(graph: Arc<G>, config: ExecutorConfig) -> Self
    where
        G: AdjacencyLookup + SchemaResolver + 'static,
    {
        Self::new(graph.clone(), graph, config)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn engine(&self) -> PredicateEngine {
        self.engine
    }

    pub fn resolver(&self) -> &Arc<dyn SchemaResolver> {
        &self.resolver
    }

    /// A fresh builder bound to this executor's schema and predicate policy.
    pub fn spec_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.resolver.clone(), self.engine)
    }

    /// A multi-vertex query handle.
    pub fn query(&self) -> MultiVertexQuery<'_> {
        MultiVertexQuery::new(self)
    }

    pub fn execute(
        &self,
        anchors: &[VertexId],
        spec: &Arc<QuerySpec>,
        category: RelationCategory,
    ) -> Result<AnchorResultMap<Vec<Relation>>, QueryError> {
        self.execute_with_cancel(anchors, spec, category, &CancelToken::new())
    }

    /// Evaluate `spec` for every anchor.
    ///
    /// Fails up front with `EmptyAnchorSet`; every later failure lands in the
    /// affected anchor's slot.
    pub fn execute_with_cancel(
        &self,
        anchors: &[VertexId],
        spec: &Arc<QuerySpec>,
        category: RelationCategory,
        cancel: &CancelToken,
    ) -> Result<AnchorResultMap<Vec<Relation>>, QueryError> {
        let anchors = distinct_anchors(anchors)?;
        let parallel = self.is_parallel(anchors.len());
        debug!(
            anchors = anchors.len(),
            category = ?category,
            parallel,
            "executing multi-vertex query"
        );

        let request = spec.lookup_request(category);
        let work: Vec<(VertexId, Option<Fetched>)> =
            if self.bulk_lookup() {
                prefetch(&anchors, cancel, |live| self.lookup.fetch_batch(live, &request))
            } else {
                anchors.into_iter().map(|anchor| (anchor, None)).collect()
            };

        let results = self.fan_out(work, parallel, |anchor, prefetched| {
            self.evaluate_anchor(anchor, prefetched, spec, category, cancel)
        });
        debug!(
            anchors = results.len(),
            failed = results.failed().count(),
            cancelled = results.cancelled().count(),
            "multi-vertex query finished"
        );
        Ok(results)
    }

    /// Identifier-only execution over edges.
    ///
    /// Uses the backend's identifier adjacency when the spec needs no
    /// attribute payload; otherwise evaluates full edges and reshapes them.
    pub fn execute_ids(
        &self,
        anchors: &[VertexId],
        spec: &Arc<QuerySpec>,
        cancel: &CancelToken,
    ) -> Result<AnchorResultMap<VertexList>, QueryError> {
        if spec.requires_payload() || !self.config.id_fast_path {
            let edges = self.execute_with_cancel(anchors, spec, RelationCategory::Edge, cancel)?;
            return Ok(ResultMaterializer::vertex_ids(&edges));
        }

        let anchors = distinct_anchors(anchors)?;
        let parallel = self.is_parallel(anchors.len());
        debug!(anchors = anchors.len(), parallel, "executing identifier-only query");

        let request = spec.lookup_request(RelationCategory::Edge);
        let work: Vec<(VertexId, Option<Result<Vec<Adjacency>, BackendError>>)> =
            if self.bulk_lookup() {
                prefetch(&anchors, cancel, |live| {
                    self.lookup.fetch_adjacent_batch(live, &request)
                })
            } else {
                anchors.into_iter().map(|anchor| (anchor, None)).collect()
            };
        Ok(self.fan_out(work, parallel, |anchor, prefetched| {
            if cancel.is_cancelled(anchor) {
                return AnchorOutcome::Cancelled;
            }
            let fetched =
                prefetched.unwrap_or_else(|| self.lookup.fetch_adjacent(anchor, &request));
            let adjacent = match fetched {
                Ok(adjacent) => adjacent,
                Err(source) => return unavailable(anchor, source),
            };
            if cancel.is_cancelled(anchor) {
                return AnchorOutcome::Cancelled;
            }
            let fetched = adjacent.len();
            let mut ids: Vec<VertexId> = adjacent
                .iter()
                .filter(|a| spec.admits_adjacency(a))
                .map(|a| a.other)
                .collect();
            if let Some(limit) = spec.limit() {
                ids.truncate(limit);
            }
            if cancel.is_cancelled(anchor) {
                return AnchorOutcome::Cancelled;
            }
            trace!(anchor = %anchor, fetched, retained = ids.len(), "anchor evaluated");
            AnchorOutcome::Ready(VertexList::from_ids(ids))
        }))
    }

    fn bulk_lookup(&self) -> bool {
        self.config.batch_lookup && self.lookup.supports_batch()
    }

    fn is_parallel(&self, anchors: usize) -> bool {
        anchors > 1 && anchors >= self.config.parallel_threshold
    }

    fn fan_out<W, T, F>(
        &self,
        work: Vec<(VertexId, W)>,
        parallel: bool,
        evaluate: F,
    ) -> AnchorResultMap<T>
    where
        W: Send,
        T: Send,
        F: Fn(VertexId, W) -> AnchorOutcome<T> + Sync,
    {
        if parallel {
            work.into_par_iter()
                .map(|(anchor, item)| (anchor, evaluate(anchor, item)))
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        } else {
            work.into_iter()
                .map(|(anchor, item)| (anchor, evaluate(anchor, item)))
                .collect()
        }
    }

    fn evaluate_anchor(
        &self,
        anchor: VertexId,
        prefetched: Option<Fetched>,
        spec: &QuerySpec,
        category: RelationCategory,
        cancel: &CancelToken,
    ) -> AnchorOutcome<Vec<Relation>> {
        if cancel.is_cancelled(anchor) {
            return AnchorOutcome::Cancelled;
        }
        let fetched = prefetched
            .unwrap_or_else(|| self.lookup.fetch(anchor, &spec.lookup_request(category)));
        let candidates = match fetched {
            Ok(candidates) => candidates,
            Err(source) => return unavailable(anchor, source),
        };
        if cancel.is_cancelled(anchor) {
            return AnchorOutcome::Cancelled;
        }

        let fetched = candidates.len();
        let mut retained = Vec::new();
        for relation in candidates {
            if !spec.admits(&relation, category) {
                continue;
            }
            match spec.matches(&relation) {
                Ok(true) => retained.push(relation),
                Ok(false) => {}
                Err(err) => return AnchorOutcome::Failed(err),
            }
        }

        if let Some(order) = spec.order() {
            if let Err(err) = sort_relations(&mut retained, order) {
                return AnchorOutcome::Failed(err);
            }
        }
        if let Some(limit) = spec.limit() {
            retained.truncate(limit);
        }

        if cancel.is_cancelled(anchor) {
            return AnchorOutcome::Cancelled;
        }
        trace!(anchor = %anchor, fetched, retained = retained.len(), "anchor evaluated");
        AnchorOutcome::Ready(retained)
    }
}

/// One bulk round-trip for every live anchor. Cancelled anchors get no
/// prefetched entry.
fn prefetch<T, F>(
    anchors: &[VertexId],
    cancel: &CancelToken,
    bulk: F,
) -> Vec<(VertexId, Option<Result<T, BackendError>>)>
where
    F: FnOnce(&[VertexId]) -> Result<AHashMap<VertexId, T>, BackendError>,
{
    let live: Vec<VertexId> = anchors
        .iter()
        .copied()
        .filter(|anchor| !cancel.is_cancelled(*anchor))
        .collect();
    if live.is_empty() {
        return anchors.iter().map(|&anchor| (anchor, None)).collect();
    }

    match bulk(&live) {
        Ok(mut fetched) => anchors
            .iter()
            .map(|&anchor| {
                let slot = fetched.remove(&anchor).ok_or_else(|| {
                    BackendError::new(format!("batch lookup returned no entry for {anchor}"))
                });
                (anchor, Some(slot))
            })
            .collect(),
        Err(err) => {
            warn!(anchors = live.len(), error = %err, "batch adjacency lookup failed");
            anchors
                .iter()
                .map(|&anchor| (anchor, Some(Err(err.clone()))))
                .collect()
        }
    }
}

fn unavailable<T>(anchor: VertexId, source: BackendError) -> AnchorOutcome<T> {
    warn!(anchor = %anchor, error = %source, "adjacency lookup failed");
    AnchorOutcome::Failed(QueryError::BackendUnavailable { anchor, source })
}

/// Duplicates collapse, first occurrence wins.
fn distinct_anchors(anchors: &[VertexId]) -> Result<Vec<VertexId>, QueryError> {
    if anchors.is_empty() {
        return Err(QueryError::EmptyAnchorSet);
    }
    let mut seen = AHashSet::with_capacity(anchors.len());
    Ok(anchors
        .iter()
        .copied()
        .filter(|anchor| seen.insert(*anchor))
        .collect())
}

/// Stable sort by the order clause, ties broken by relation id.
fn sort_relations(relations: &mut [Relation], order: OrderClause) -> Result<(), QueryError> {
    let mut first = None;
    for value in relations
        .iter()
        .filter_map(|r| r.attribute(order.key))
        .filter(|v| !v.is_null())
    {
        let reference = *first.get_or_insert(value);
        if reference.natural_cmp(value).is_none() {
            return Err(QueryError::NotComparable {
                left: reference.kind(),
                right: value.kind(),
            });
        }
    }

    relations.sort_by(|a, b| {
        order
            .compare(a, b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(())
}
