//! Per-anchor result containers and the sortable identifier list.

use ahash::AHashMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::QueryError;
use crate::VertexId;

// ============================================================================
// AnchorOutcome
// ============================================================================

/// Outcome of one anchor's evaluation. `Ready(empty)` means "no matches",
/// which is distinct from both failure and cancellation.
#[derive(Debug, Clone)]
pub enum AnchorOutcome<T> {
    Ready(T),
    Failed(QueryError),
    Cancelled,
}

impl<T> AnchorOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, AnchorOutcome::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AnchorOutcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnchorOutcome::Cancelled)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            AnchorOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            AnchorOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> AnchorOutcome<&T> {
        match self {
            AnchorOutcome::Ready(value) => AnchorOutcome::Ready(value),
            AnchorOutcome::Failed(err) => AnchorOutcome::Failed(err.clone()),
            AnchorOutcome::Cancelled => AnchorOutcome::Cancelled,
        }
    }

    /// Transform the ready payload; failure and cancellation pass through.
    pub fn map<U, F>(self, f: F) -> AnchorOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            AnchorOutcome::Ready(value) => AnchorOutcome::Ready(f(value)),
            AnchorOutcome::Failed(err) => AnchorOutcome::Failed(err),
            AnchorOutcome::Cancelled => AnchorOutcome::Cancelled,
        }
    }

    /// Strict view: failures surface as errors and cancellation becomes
    /// `QueryError::Cancelled`.
    pub fn into_result(self, anchor: VertexId) -> Result<T, QueryError> {
        match self {
            AnchorOutcome::Ready(value) => Ok(value),
            AnchorOutcome::Failed(err) => Err(err),
            AnchorOutcome::Cancelled => Err(QueryError::Cancelled { anchor }),
        }
    }
}

impl<T: Serialize> Serialize for AnchorOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            AnchorOutcome::Ready(value) => map.serialize_entry("ready", value)?,
            AnchorOutcome::Failed(err) => map.serialize_entry("failed", &err.to_string())?,
            AnchorOutcome::Cancelled => map.serialize_entry("cancelled", &true)?,
        }
        map.end()
    }
}

// ============================================================================
// AnchorResultMap
// ============================================================================

/// One outcome per anchor. Holds no reference to the spec or executor.
#[derive(Debug, Clone)]
pub struct AnchorResultMap<T> {
    slots: AHashMap<VertexId, AnchorOutcome<T>>,
}

impl<T> Default for AnchorResultMap<T> {
    fn default() -> Self {
        Self {
            slots: AHashMap::new(),
        }
    }
}

impl<T> AnchorResultMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, anchor: VertexId, outcome: AnchorOutcome<T>) {
        self.slots.insert(anchor, outcome);
    }

    pub fn get(&self, anchor: VertexId) -> Option<&AnchorOutcome<T>> {
        self.slots.get(&anchor)
    }

    /// The ready payload for `anchor`, if it completed.
    pub fn ready(&self, anchor: VertexId) -> Option<&T> {
        self.get(anchor).and_then(AnchorOutcome::ready)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, anchor: VertexId) -> bool {
        self.slots.contains_key(&anchor)
    }

    pub fn anchors(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &AnchorOutcome<T>)> + '_ {
        self.slots.iter().map(|(k, v)| (*k, v))
    }

    /// Anchors whose evaluation failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (VertexId, &QueryError)> + '_ {
        self.slots
            .iter()
            .filter_map(|(k, v)| v.error().map(|err| (*k, err)))
    }

    pub fn cancelled(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots
            .iter()
            .filter(|(_, v)| v.is_cancelled())
            .map(|(k, _)| *k)
    }

    /// Transform every ready payload.
    pub fn map<U, F>(self, mut f: F) -> AnchorResultMap<U>
    where
        F: FnMut(VertexId, T) -> U,
    {
        self.slots
            .into_iter()
            .map(|(anchor, outcome)| (anchor, outcome.map(|value| f(anchor, value))))
            .collect()
    }

    /// All-or-nothing view: the first failed or cancelled anchor, in anchor
    /// order, becomes the error.
    pub fn into_ready(self) -> Result<AHashMap<VertexId, T>, QueryError> {
        let mut entries: Vec<_> = self.slots.into_iter().collect();
        entries.sort_unstable_by_key(|(anchor, _)| *anchor);
        entries
            .into_iter()
            .map(|(anchor, outcome)| outcome.into_result(anchor).map(|value| (anchor, value)))
            .collect()
    }
}

impl<T> FromIterator<(VertexId, AnchorOutcome<T>)> for AnchorResultMap<T> {
    fn from_iter<I: IntoIterator<Item = (VertexId, AnchorOutcome<T>)>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for AnchorResultMap<T> {
    type Item = (VertexId, AnchorOutcome<T>);
    type IntoIter = std::collections::hash_map::IntoIter<VertexId, AnchorOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// Serialized as a JSON object keyed by anchor, in ascending anchor order.
impl<T: Serialize> Serialize for AnchorResultMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<_> = self.slots.iter().collect();
        entries.sort_unstable_by_key(|(anchor, _)| **anchor);
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (anchor, outcome) in entries {
            map.serialize_entry(&anchor.to_string(), outcome)?;
        }
        map.end()
    }
}

// ============================================================================
// VertexList
// ============================================================================

/// Identifier-only result: one entry per matching edge, in backend order
/// until [`VertexList::sort`] is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexList {
    ids: Vec<VertexId>,
    sorted: bool,
}

impl VertexList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: Vec<VertexId>) -> Self {
        Self { ids, sorted: false }
    }

    /// Sort ascending in place. Idempotent; a sorted list stays sorted.
    pub fn sort(&mut self) {
        if !self.sorted {
            self.ids.sort_unstable();
            self.sorted = true;
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<VertexId> {
        self.ids.get(index).copied()
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        if self.sorted {
            self.ids.binary_search(&vertex).is_ok()
        } else {
            self.ids.contains(&vertex)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.ids.iter().copied()
    }

    pub fn as_slice(&self) -> &[VertexId] {
        &self.ids
    }

    pub fn push(&mut self, vertex: VertexId) {
        self.ids.push(vertex);
        self.sorted = false;
    }

    /// Append another list. The result is unsorted unless it is empty.
    pub fn add_all(&mut self, other: &VertexList) {
        if other.is_empty() {
            return;
        }
        self.ids.extend_from_slice(&other.ids);
        self.sorted = false;
    }

    pub fn into_inner(self) -> Vec<VertexId> {
        self.ids
    }
}

impl Serialize for VertexList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.ids)
    }
}

impl FromIterator<VertexId> for VertexList {
    fn from_iter<I: IntoIterator<Item = VertexId>>(iter: I) -> Self {
        Self::from_ids(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a VertexList {
    type Item = VertexId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, VertexId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}
