//! Explicit edge store - relations persisted independently of the memory log.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{EdgeId, EdgeKind, EntityNormalizer, GraphEdge, NewEdge, NodeId, Provenance};
use crate::error::GraphError;

/// In-memory store of explicit edges, keyed by (source, target).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExplicitEdgeStore {
    edges: Vec<GraphEdge>,
}

impl ExplicitEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load stored edges. Every edge is marked explicit.
    ///
    /// Entity endpoints are re-keyed through `normalizer`. Edges that then
    /// loop onto one node, or repeat an earlier (source, target) pair, are
    /// dropped.
    pub fn from_edges(
        edges: impl IntoIterator<Item = GraphEdge>,
        normalizer: &EntityNormalizer,
    ) -> Self {
        let mut store = Self::new();
        for mut edge in edges {
            edge.provenance = Provenance::Explicit;
            if let Some(source) = normalizer.canonical(&edge.source) {
                edge.source = source;
            }
            if let Some(target) = normalizer.canonical(&edge.target) {
                edge.target = target;
            }

            if edge.source == edge.target {
                warn!(edge_id = %edge.id, node = %edge.source, "dropping stored explicit self-loop");
                continue;
            }
            if store.find(&edge.source, &edge.target).is_some() {
                warn!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "dropping duplicate stored explicit edge");
                continue;
            }
            store.edges.push(edge);
        }
        store
    }

    /// Assert a relation. An existing edge between the same (source, target)
    /// is updated in place and keeps its id.
    pub fn create(&mut self, request: NewEdge) -> Result<GraphEdge, GraphError> {
        if !request.weight.is_finite() || request.weight <= 0.0 {
            return Err(GraphError::InvalidWeight(request.weight));
        }
        if request.source == request.target {
            return Err(GraphError::SelfLoop(request.source));
        }

        let kind = EdgeKind::Relation(request.relation);
        if let Some(existing) = self
            .edges
            .iter_mut()
            .find(|e| e.source == request.source && e.target == request.target)
        {
            existing.kind = kind;
            existing.weight = request.weight;
            existing.label = request.label;
            return Ok(existing.clone());
        }

        let edge = GraphEdge {
            id: EdgeId::random(),
            source: request.source,
            target: request.target,
            kind,
            weight: request.weight,
            label: request.label,
            provenance: Provenance::Explicit,
        };
        self.edges.push(edge.clone());
        Ok(edge)
    }

    pub fn list(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn get(&self, id: &EdgeId) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    pub fn find(&self, source: &NodeId, target: &NodeId) -> Option<&GraphEdge> {
        self.edges
            .iter()
            .find(|e| &e.source == source && &e.target == target)
    }

    pub fn remove(&mut self, id: &EdgeId) -> Option<GraphEdge> {
        let index = self.edges.iter().position(|e| &e.id == id)?;
        Some(self.edges.remove(index))
    }

    /// Remove every edge touching a node.
    pub fn remove_touching(&mut self, node: &NodeId) -> Vec<GraphEdge> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.touches(node));
        self.edges = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
