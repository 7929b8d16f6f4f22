//! Incremental synchronization of the graph with single-memory changes.
//!
//! Applying a sequence of changes here must leave the graph with exactly the
//! node and edge sets a full [`KnowledgeGraph::build`] over the resulting log
//! would produce. Unknown ids are no-ops.

use memory_log::{Memory, MemoryChange, MemoryId};
use std::collections::HashSet;
use tracing::debug;

use super::{EdgeId, GraphEdge, KnowledgeGraph, NodeId};

/// What a synchronization step changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDelta {
    pub nodes_added: Vec<NodeId>,
    pub nodes_removed: Vec<NodeId>,
    pub edges_added: Vec<EdgeId>,
    pub edges_removed: Vec<EdgeId>,
}

impl SyncDelta {
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.edges_added.is_empty()
            && self.edges_removed.is_empty()
    }

    fn merge(&mut self, other: SyncDelta) {
        self.nodes_added.extend(other.nodes_added);
        self.nodes_removed.extend(other.nodes_removed);
        self.edges_added.extend(other.edges_added);
        self.edges_removed.extend(other.edges_removed);
    }
}

impl KnowledgeGraph {
    /// Apply one memory-log change.
    pub fn apply_change(&mut self, change: &MemoryChange) -> SyncDelta {
        match change {
            MemoryChange::Created(memory) => self.on_memory_created(memory),
            MemoryChange::Updated { before, after } => self.on_memory_updated(before, after),
            MemoryChange::Deleted(memory) => self.on_memory_deleted(memory.id),
        }
    }

    /// Add a memory node and its implicit edges, reusing existing entity nodes.
    ///
    /// A memory that is already in the graph is re-synchronized instead.
    pub fn on_memory_created(&mut self, memory: &Memory) -> SyncDelta {
        let memory_node = NodeId::memory(memory.id);
        if self.contains_node(&memory_node) {
            debug!(memory_id = %memory.id, "memory already in graph, re-synchronizing");
            return self.resync_memory(memory);
        }

        let (nodes_added, edges_added) = self.insert_memory(memory);
        debug!(
            memory_id = %memory.id,
            nodes = nodes_added.len(),
            edges = edges_added.len(),
            "memory added to graph"
        );
        SyncDelta {
            nodes_added,
            edges_added,
            ..SyncDelta::default()
        }
    }

    /// Regenerate a memory's implicit edges after an edit.
    pub fn on_memory_updated(&mut self, old: &Memory, new: &Memory) -> SyncDelta {
        if old.id != new.id {
            let mut delta = self.on_memory_deleted(old.id);
            delta.merge(self.on_memory_created(new));
            return delta;
        }
        if !self.contains_node(&NodeId::memory(old.id)) {
            debug!(memory_id = %old.id, "update for memory not in graph ignored");
            return SyncDelta::default();
        }
        self.resync_memory(new)
    }

    /// Remove a memory node, every edge touching it, and the orphans it leaves.
    pub fn on_memory_deleted(&mut self, id: MemoryId) -> SyncDelta {
        let memory_node = NodeId::memory(id);
        let Some((_, removed_edges)) = self.remove_node(&memory_node) else {
            debug!(memory_id = %id, "delete for memory not in graph ignored");
            return SyncDelta::default();
        };

        let candidates = endpoints_other_than(&removed_edges, &memory_node);
        let nodes_removed = std::iter::once(memory_node)
            .chain(self.sweep_orphans(candidates))
            .collect();

        SyncDelta {
            nodes_removed,
            edges_removed: removed_edges.into_iter().map(|edge| edge.id).collect(),
            ..SyncDelta::default()
        }
    }

    /// Add an explicit edge to the canonical graph.
    pub fn on_edge_attached(&mut self, edge: &GraphEdge) -> SyncDelta {
        let missing: Vec<NodeId> = [&edge.source, &edge.target]
            .into_iter()
            .filter_map(|id| self.options().normalizer.canonical(id))
            .filter(|id| !self.contains_node(id))
            .collect();
        if !self.attach_explicit(edge.clone()) {
            return SyncDelta::default();
        }

        SyncDelta {
            nodes_added: missing,
            edges_added: vec![edge.id.clone()],
            ..SyncDelta::default()
        }
    }

    /// Remove an explicit edge and any entity endpoint it leaves orphaned.
    pub fn on_edge_detached(&mut self, id: &EdgeId) -> SyncDelta {
        let Some(edge) = self.remove_edge(id) else {
            return SyncDelta::default();
        };
        let nodes_removed = self.sweep_orphans(vec![edge.source.clone(), edge.target.clone()]);
        SyncDelta {
            nodes_removed,
            edges_removed: vec![edge.id],
            ..SyncDelta::default()
        }
    }

    /// Strip all implicit edges of a memory, re-derive them, then sweep.
    fn resync_memory(&mut self, memory: &Memory) -> SyncDelta {
        let memory_node = NodeId::memory(memory.id);

        let stale: Vec<EdgeId> = self
            .connections(&memory_node)
            .into_iter()
            .filter(|edge| edge.is_implicit() && edge.source == memory_node)
            .map(|edge| edge.id.clone())
            .collect();
        let removed: Vec<GraphEdge> = stale.iter().filter_map(|id| self.remove_edge(id)).collect();

        let (nodes_added, edges_added) = self.insert_memory(memory);
        let nodes_removed = self.sweep_orphans(endpoints_other_than(&removed, &memory_node));

        debug!(
            memory_id = %memory.id,
            edges_removed = removed.len(),
            edges_added = edges_added.len(),
            orphans = nodes_removed.len(),
            "memory re-synchronized"
        );
        SyncDelta {
            nodes_added,
            nodes_removed,
            edges_added,
            edges_removed: removed.into_iter().map(|edge| edge.id).collect(),
        }
    }

    /// Remove entity nodes among `candidates` that have no incident edges left.
    pub(crate) fn sweep_orphans(&mut self, candidates: Vec<NodeId>) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut removed = Vec::new();

        for id in candidates {
            if !seen.insert(id.clone()) {
                continue;
            }
            let orphaned = self
                .node(&id)
                .is_some_and(|node| node.is_entity() && self.degree(&id) == 0);
            if orphaned {
                self.remove_node(&id);
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), "orphan entity nodes swept");
        }
        removed
    }
}

fn endpoints_other_than(edges: &[GraphEdge], node: &NodeId) -> Vec<NodeId> {
    edges
        .iter()
        .filter_map(|edge| edge.other_end(node))
        .cloned()
        .collect()
}
