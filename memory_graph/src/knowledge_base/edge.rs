//! Graph edges - implicit mention edges and explicit relations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NodeId;

/// Unique identifier for edges.
///
/// Implicit edges derive their id from their endpoints, so regenerating them
/// yields the same id. Explicit edges get a random id once and keep it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Deterministic id of the implicit edge between a memory and an entity.
    pub fn implicit(source: &NodeId, target: &NodeId) -> Self {
        Self(format!("{source}->{target}"))
    }

    /// A fresh id for an explicit edge.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Types of edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// A memory mentions an entity.
    Contains,
    /// A user- or system-asserted relation, e.g. "friend_of".
    Relation(String),
}

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Derived from a memory's mention lists; regenerated on every change.
    Implicit,
    /// Persisted independently and passed through verbatim.
    Explicit,
}

/// An edge of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// Positive weight, 1.0 unless asserted otherwise.
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub provenance: Provenance,
}

impl GraphEdge {
    /// The implicit `contains` edge from a memory node to an entity node.
    pub fn contains(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::implicit(&source, &target),
            source,
            target,
            kind: EdgeKind::Contains,
            weight: 1.0,
            label: None,
            provenance: Provenance::Implicit,
        }
    }

    pub fn is_implicit(&self) -> bool {
        self.provenance == Provenance::Implicit
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// The endpoint opposite `node`, if the edge touches it.
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// A request to assert an explicit relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: String,
    pub weight: f32,
    pub label: Option<String>,
}

impl NewEdge {
    pub fn new(source: NodeId, target: NodeId, relation: impl Into<String>) -> Self {
        Self {
            source,
            target,
            relation: relation.into(),
            weight: 1.0,
            label: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
