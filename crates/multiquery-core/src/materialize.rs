//! Result views over a raw per-anchor relation map.
//!
//! Reshaping only: nothing here contacts the backend or re-evaluates a
//! clause. Failed and cancelled slots pass through unchanged.

use ahash::AHashSet;

use crate::relation::{Edge, Property, Relation};
use crate::result::{AnchorResultMap, VertexList};
use crate::VertexId;

pub struct ResultMaterializer;

impl ResultMaterializer {
    pub fn edges(raw: &AnchorResultMap<Vec<Relation>>) -> AnchorResultMap<Vec<Edge>> {
        reshape(raw, |relations| {
            relations
                .iter()
                .filter_map(|r| Edge::try_from(r).ok())
                .collect()
        })
    }

    pub fn properties(raw: &AnchorResultMap<Vec<Relation>>) -> AnchorResultMap<Vec<Property>> {
        reshape(raw, |relations| {
            relations
                .iter()
                .filter_map(|r| Property::try_from(r).ok())
                .collect()
        })
    }

    pub fn relations(raw: &AnchorResultMap<Vec<Relation>>) -> AnchorResultMap<Vec<Relation>> {
        reshape(raw, <[Relation]>::to_vec)
    }

    /// Distinct neighbor vertices per anchor, in first-seen order.
    pub fn vertices(raw: &AnchorResultMap<Vec<Relation>>) -> AnchorResultMap<Vec<VertexId>> {
        reshape(raw, |relations| {
            let mut seen = AHashSet::new();
            relations
                .iter()
                .filter_map(Relation::other_vertex)
                .filter(|v| seen.insert(*v))
                .collect()
        })
    }

    /// One identifier per matching edge, in result order.
    pub fn vertex_ids(raw: &AnchorResultMap<Vec<Relation>>) -> AnchorResultMap<VertexList> {
        reshape(raw, |relations| {
            relations.iter().filter_map(Relation::other_vertex).collect()
        })
    }
}

fn reshape<T, F>(raw: &AnchorResultMap<Vec<Relation>>, view: F) -> AnchorResultMap<T>
where
    F: Fn(&[Relation]) -> T,
{
    raw.iter()
        .map(|(anchor, outcome)| (anchor, outcome.as_ref().map(|relations| view(relations))))
        .collect()
}
