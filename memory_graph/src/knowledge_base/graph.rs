//! Knowledge Graph - the canonical graph derived from the memory log.

use memory_log::Memory;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use super::{EdgeId, GraphEdge, GraphNode, GraphOptions, NodeId, NodeKind};

/// A problem found by [`KnowledgeGraph::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inconsistency {
    /// An entity node with no incident edges.
    OrphanEntity(NodeId),
    /// An edge with an endpoint that is not in the graph.
    DanglingEdge(EdgeId),
    /// An implicit edge whose memory no longer mentions the target.
    StaleImplicitEdge(EdgeId),
    /// A memory in the log without a node, or a memory node without a log entry.
    UnsyncedMemory(NodeId),
}

/// The canonical knowledge graph.
///
/// Memory nodes, deduplicated entity nodes, implicit `contains` edges and
/// explicit edges. Nodes and edges keep insertion order for display; lookups
/// go through the id maps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeGraph {
    options: GraphOptions,

    /// All nodes stored by ID.
    nodes: HashMap<NodeId, GraphNode>,
    node_order: Vec<NodeId>,

    /// All edges stored by ID.
    edges: HashMap<EdgeId, GraphEdge>,
    edge_order: Vec<EdgeId>,

    /// Index: node -> incident edges (either direction).
    incident: HashMap<NodeId, HashSet<EdgeId>>,
}

impl KnowledgeGraph {
    /// Create a new empty graph with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Derive the full graph from the memory log and the explicit edges.
    ///
    /// Never fails: blank mentions are skipped, and explicit edges whose
    /// memory endpoint is gone are dropped with a warning. Entity endpoints of
    /// explicit edges are materialized even if no memory mentions them.
    pub fn build(memories: &[Memory], explicit: &[GraphEdge], options: GraphOptions) -> Self {
        let mut graph = Self::with_options(options);

        for memory in memories {
            graph.insert_memory(memory);
        }
        for edge in explicit {
            graph.attach_explicit(edge.clone());
        }

        info!(
            memories = memories.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "knowledge graph built"
        );
        graph
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Add a memory node plus its entity nodes and implicit edges.
    ///
    /// An existing node for the same memory gets its payload and label
    /// replaced. Returns the ids of nodes and edges that were new.
    pub(crate) fn insert_memory(&mut self, memory: &Memory) -> (Vec<NodeId>, Vec<EdgeId>) {
        let mut added_nodes = Vec::new();
        let mut added_edges = Vec::new();

        let node = GraphNode::for_memory(memory, self.options.label_max_chars);
        let memory_node = node.id.clone();
        if self.insert_node(node) {
            added_nodes.push(memory_node.clone());
        }

        for (kind, mention) in memory.mentions() {
            let Some(entity_id) = self.options.normalizer.node_id(kind, mention) else {
                continue;
            };
            if !self.nodes.contains_key(&entity_id) {
                self.insert_node(GraphNode::for_entity(entity_id.clone(), kind, mention));
                added_nodes.push(entity_id.clone());
            }

            // Repeated mentions of one entity collapse into a single edge.
            let edge = GraphEdge::contains(memory_node.clone(), entity_id);
            if !self.edges.contains_key(&edge.id) {
                added_edges.push(edge.id.clone());
                self.insert_edge(edge);
            }
        }

        (added_nodes, added_edges)
    }

    /// Add an explicit edge, materializing missing entity endpoints.
    ///
    /// Entity endpoints are re-keyed through the normalizer first. Returns
    /// `false` (and leaves the graph untouched) when an endpoint is a memory
    /// that is not in the graph or is not a recognizable node id, or when
    /// both endpoints collapse onto the same node.
    pub(crate) fn attach_explicit(&mut self, mut edge: GraphEdge) -> bool {
        let resolve = |endpoint: &NodeId| {
            self.options.normalizer.canonical(endpoint).filter(|id| {
                self.nodes.contains_key(id) || id.kind().is_some_and(|kind| kind.is_entity())
            })
        };
        let (Some(source), Some(target)) = (resolve(&edge.source), resolve(&edge.target)) else {
            warn!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "skipping explicit edge with dangling endpoint");
            return false;
        };
        if source == target {
            warn!(edge_id = %edge.id, node = %source, "skipping explicit edge that loops onto one node");
            return false;
        }

        for (id, raw) in [(&source, &edge.source), (&target, &edge.target)] {
            if self.nodes.contains_key(id) {
                continue;
            }
            if let Some(kind) = id.kind().and_then(|kind| kind.entity_kind()) {
                self.insert_node(GraphNode::for_entity(id.clone(), kind, raw.value().trim()));
            }
        }

        edge.source = source;
        edge.target = target;
        self.insert_edge(edge);
        true
    }

    /// Insert a node. Returns `true` if it was new; an existing node is replaced in place.
    pub(crate) fn insert_node(&mut self, node: GraphNode) -> bool {
        let id = node.id.clone();
        let fresh = self.nodes.insert(id.clone(), node).is_none();
        if fresh {
            self.node_order.push(id);
        }
        fresh
    }

    /// Remove a node together with every edge touching it.
    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<(GraphNode, Vec<GraphEdge>)> {
        let node = self.nodes.remove(id)?;
        self.node_order.retain(|n| n != id);

        let touching: Vec<EdgeId> = self
            .incident
            .get(id)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default();
        let removed = touching
            .iter()
            .filter_map(|edge_id| self.remove_edge(edge_id))
            .collect();
        self.incident.remove(id);

        Some((node, removed))
    }

    pub(crate) fn insert_edge(&mut self, edge: GraphEdge) {
        let id = edge.id.clone();
        if let Some(previous) = self.edges.remove(&id) {
            self.unindex_edge(&previous);
        } else {
            self.edge_order.push(id.clone());
        }

        self.incident
            .entry(edge.source.clone())
            .or_default()
            .insert(id.clone());
        self.incident
            .entry(edge.target.clone())
            .or_default()
            .insert(id.clone());
        self.edges.insert(id, edge);
    }

    pub(crate) fn remove_edge(&mut self, id: &EdgeId) -> Option<GraphEdge> {
        let edge = self.edges.remove(id)?;
        self.edge_order.retain(|e| e != id);
        self.unindex_edge(&edge);
        Some(edge)
    }

    fn unindex_edge(&mut self, edge: &GraphEdge) {
        for endpoint in [&edge.source, &edge.target] {
            if let Some(edges) = self.incident.get_mut(endpoint) {
                edges.remove(&edge.id);
                if edges.is_empty() {
                    self.incident.remove(endpoint);
                }
            }
        }
    }

    /// Get node by ID.
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Get edge by ID.
    pub fn edge(&self, id: &EdgeId) -> Option<&GraphEdge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in display order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// All edges in display order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edge_order.iter().filter_map(|id| self.edges.get(id))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes().filter(move |node| node.kind == kind)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Number of edges touching a node.
    pub fn degree(&self, id: &NodeId) -> usize {
        self.incident.get(id).map_or(0, HashSet::len)
    }

    /// Edges touching a node, in display order.
    pub fn connections(&self, id: &NodeId) -> Vec<&GraphEdge> {
        let Some(incident) = self.incident.get(id) else {
            return Vec::new();
        };
        self.edges().filter(|edge| incident.contains(&edge.id)).collect()
    }

    /// Nodes adjacent to a node through any edge, either direction.
    pub fn neighbors(&self, id: &NodeId) -> Vec<&GraphNode> {
        let adjacent: HashSet<&NodeId> = self
            .connections(id)
            .into_iter()
            .filter_map(|edge| edge.other_end(id))
            .collect();
        self.nodes().filter(|node| adjacent.contains(&node.id)).collect()
    }

    /// Nodes whose label or memory content matches the query.
    pub fn search_nodes(&self, query: &str) -> Vec<&GraphNode> {
        self.nodes().filter(|node| node.matches_query(query)).collect()
    }

    /// Audit the graph against itself and the memory log it should mirror.
    pub fn check_consistency(&self, memories: &[Memory]) -> Vec<Inconsistency> {
        let mut problems = Vec::new();

        for node in self.nodes() {
            if node.is_entity() && self.degree(&node.id) == 0 {
                problems.push(Inconsistency::OrphanEntity(node.id.clone()));
            }
        }

        for edge in self.edges() {
            if !self.contains_node(&edge.source) || !self.contains_node(&edge.target) {
                problems.push(Inconsistency::DanglingEdge(edge.id.clone()));
                continue;
            }
            if edge.is_implicit() && !self.still_mentioned(edge) {
                problems.push(Inconsistency::StaleImplicitEdge(edge.id.clone()));
            }
        }

        let logged: HashSet<NodeId> = memories.iter().map(|m| NodeId::memory(m.id)).collect();
        for id in &logged {
            if !self.contains_node(id) {
                problems.push(Inconsistency::UnsyncedMemory(id.clone()));
            }
        }
        for node in self.nodes_of_kind(NodeKind::Memory) {
            if !logged.contains(&node.id) {
                problems.push(Inconsistency::UnsyncedMemory(node.id.clone()));
            }
        }

        problems
    }

    fn still_mentioned(&self, edge: &GraphEdge) -> bool {
        let Some(memory) = self.node(&edge.source).and_then(GraphNode::memory) else {
            return false;
        };
        memory
            .mentions()
            .filter_map(|(kind, mention)| self.options.normalizer.node_id(kind, mention))
            .any(|id| id == edge.target)
    }
}
