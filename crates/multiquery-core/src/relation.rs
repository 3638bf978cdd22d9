//! Relations incident to a vertex: edges and properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{RelationId, TypeId, Value, VertexId};

/// Direction of a relation relative to its owning vertex.
///
/// As a query restriction, `Both` means "no restriction". On a relation,
/// `Both` marks an undirected incidence, which is visible under every
/// restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
    #[default]
    Both,
}

impl Direction {
    /// Whether a relation with orientation `relation` passes this restriction.
    pub fn admits(self, relation: Direction) -> bool {
        self == Direction::Both || relation == Direction::Both || self == relation
    }

    pub fn reverse(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Both => "both",
        })
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "out" => Ok(Direction::Out),
            "in" => Ok(Direction::In),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction `{other}` (expected out, in or both)")),
        }
    }
}

/// What a relation connects its owning vertex to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    Edge { other: VertexId },
    Property { value: Value },
}

/// A relation as seen from one anchor vertex.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub id: RelationId,
    /// Edge label or property key.
    pub type_id: TypeId,
    pub direction: Direction,
    #[serde(flatten)]
    pub kind: RelationKind,
    pub attributes: BTreeMap<TypeId, Value>,
}

impl Relation {
    pub fn edge(id: RelationId, label: TypeId, direction: Direction, other: VertexId) -> Self {
        Self {
            id,
            type_id: label,
            direction,
            kind: RelationKind::Edge { other },
            attributes: BTreeMap::new(),
        }
    }

    pub fn property(id: RelationId, key: TypeId, value: impl Into<Value>) -> Self {
        Self {
            id,
            type_id: key,
            direction: Direction::Out,
            kind: RelationKind::Property {
                value: value.into(),
            },
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: TypeId, value: impl Into<Value>) -> Self {
        self.attributes.insert(key, value.into());
        self
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, RelationKind::Edge { .. })
    }

    pub fn is_property(&self) -> bool {
        matches!(self.kind, RelationKind::Property { .. })
    }

    /// The vertex at the other end of an edge.
    pub fn other_vertex(&self) -> Option<VertexId> {
        match self.kind {
            RelationKind::Edge { other } => Some(other),
            RelationKind::Property { .. } => None,
        }
    }

    /// The value carried by a property.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            RelationKind::Property { value } => Some(value),
            RelationKind::Edge { .. } => None,
        }
    }

    /// Resolve a clause or order key against this relation.
    ///
    /// A property's own key resolves to the property value; every other key
    /// is looked up in the attributes.
    pub fn attribute(&self, key: TypeId) -> Option<&Value> {
        match &self.kind {
            RelationKind::Property { value } if self.type_id == key => Some(value),
            _ => self.attributes.get(&key),
        }
    }
}

/// Which kind of relations an execution collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationCategory {
    Edge,
    Property,
    Relation,
}

impl RelationCategory {
    pub fn admits(self, relation: &Relation) -> bool {
        match self {
            RelationCategory::Edge => relation.is_edge(),
            RelationCategory::Property => relation.is_property(),
            RelationCategory::Relation => true,
        }
    }
}

/// Hydrated edge view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: RelationId,
    pub label: TypeId,
    pub direction: Direction,
    pub other: VertexId,
    pub attributes: BTreeMap<TypeId, Value>,
}

impl TryFrom<&Relation> for Edge {
    type Error = ();

    fn try_from(relation: &Relation) -> Result<Self, Self::Error> {
        let other = relation.other_vertex().ok_or(())?;
        Ok(Edge {
            id: relation.id,
            label: relation.type_id,
            direction: relation.direction,
            other,
            attributes: relation.attributes.clone(),
        })
    }
}

/// Hydrated property view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: RelationId,
    pub key: TypeId,
    pub value: Value,
    pub attributes: BTreeMap<TypeId, Value>,
}

impl TryFrom<&Relation> for Property {
    type Error = ();

    fn try_from(relation: &Relation) -> Result<Self, Self::Error> {
        let value = relation.value().ok_or(())?.clone();
        Ok(Property {
            id: relation.id,
            key: relation.type_id,
            value,
            attributes: relation.attributes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_restriction_admits_everything() {
        for d in [Direction::Out, Direction::In, Direction::Both] {
            assert!(Direction::Both.admits(d));
        }
    }

    #[test]
    fn undirected_relations_pass_any_restriction() {
        assert!(Direction::Out.admits(Direction::Both));
        assert!(Direction::In.admits(Direction::Both));
        assert!(!Direction::Out.admits(Direction::In));
    }

    #[test]
    fn property_key_resolves_to_its_value() {
        let name = TypeId::new(1);
        let since = TypeId::new(2);
        let p = Relation::property(RelationId::new(9), name, "Ada").with_attribute(since, 1843);
        assert_eq!(p.attribute(name), Some(&Value::from("Ada")));
        assert_eq!(p.attribute(since), Some(&Value::Int(1843)));

        let e = Relation::edge(RelationId::new(1), name, Direction::Out, VertexId::new(2));
        assert_eq!(e.attribute(name), None);
    }

    #[test]
    fn hydrated_views_reject_the_wrong_kind() {
        let e = Relation::edge(RelationId::new(1), TypeId::new(0), Direction::In, VertexId::new(5));
        assert!(Property::try_from(&e).is_err());
        assert_eq!(Edge::try_from(&e).unwrap().other, VertexId::new(5));
    }
}
