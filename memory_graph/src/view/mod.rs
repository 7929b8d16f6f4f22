//! Graph views - filtered, ephemeral projections of the canonical graph.
//!
//! Filtering works as follows:
//! 1. **Node type**: keep only nodes of the selected kind (unless `all`)
//! 2. **Time**: drop memory nodes created before the cutoff; entity nodes stay
//! 3. **Edges**: keep only edges whose endpoints both survived
//!
//! Entity nodes whose edges were all pruned remain as isolated nodes; the
//! view never garbage-collects.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::error::GraphError;
use crate::knowledge_base::{GraphEdge, GraphNode, KnowledgeGraph, NodeId, NodeKind};

/// Which node kind a view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeTypeFilter {
    #[default]
    All,
    Memory,
    Person,
    Place,
    Event,
}

impl NodeTypeFilter {
    pub fn admits(&self, kind: NodeKind) -> bool {
        match self {
            NodeTypeFilter::All => true,
            NodeTypeFilter::Memory => kind == NodeKind::Memory,
            NodeTypeFilter::Person => kind == NodeKind::Person,
            NodeTypeFilter::Place => kind == NodeKind::Place,
            NodeTypeFilter::Event => kind == NodeKind::Event,
        }
    }
}

impl FromStr for NodeTypeFilter {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NodeTypeFilter::All),
            "memory" => Ok(NodeTypeFilter::Memory),
            "person" => Ok(NodeTypeFilter::Person),
            "place" => Ok(NodeTypeFilter::Place),
            "event" => Ok(NodeTypeFilter::Event),
            _ => Err(GraphError::UnknownFilter {
                kind: "node type",
                value: s.to_string(),
            }),
        }
    }
}

/// How far back a view reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    #[default]
    All,
    Week,
    Month,
    Year,
}

impl TimeFilter {
    /// Length of the trailing window, `None` for `all`.
    pub fn window(&self) -> Option<Duration> {
        match self {
            TimeFilter::All => None,
            TimeFilter::Week => Some(Duration::days(7)),
            TimeFilter::Month => Some(Duration::days(30)),
            TimeFilter::Year => Some(Duration::days(365)),
        }
    }

    /// Memories created at or before this instant are filtered out.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window().map(|window| now - window)
    }
}

impl FromStr for TimeFilter {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimeFilter::All),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            _ => Err(GraphError::UnknownFilter {
                kind: "time",
                value: s.to_string(),
            }),
        }
    }
}

/// The active filter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ViewFilters {
    pub node_type: NodeTypeFilter,
    pub time: TimeFilter,
}

impl ViewFilters {
    pub fn new(node_type: NodeTypeFilter, time: TimeFilter) -> Self {
        Self { node_type, time }
    }
}

/// A filtered copy of the canonical graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub filters: ViewFilters,
    pub evaluated_at: DateTime<Utc>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphView {
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|node| &node.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Project the canonical graph through a filter pair, evaluated at `now`.
pub fn apply_filters(graph: &KnowledgeGraph, filters: &ViewFilters, now: DateTime<Utc>) -> GraphView {
    let cutoff = filters.time.cutoff(now);

    let nodes: Vec<GraphNode> = graph
        .nodes()
        .filter(|node| filters.node_type.admits(node.kind))
        .filter(|node| match (cutoff, node.created_at()) {
            (Some(cutoff), Some(created_at)) => created_at > cutoff,
            _ => true,
        })
        .cloned()
        .collect();

    let kept: HashSet<&NodeId> = nodes.iter().map(|node| &node.id).collect();
    let edges = graph
        .edges()
        .filter(|edge| kept.contains(&edge.source) && kept.contains(&edge.target))
        .cloned()
        .collect();

    GraphView {
        filters: *filters,
        evaluated_at: now,
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::GraphOptions;
    use chrono::TimeZone;
    use memory_log::{Memory, MemoryDraft, MemoryId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn memory(draft: MemoryDraft, age_days: i64) -> Memory {
        Memory::from_draft(MemoryId::new(), draft, now() - Duration::days(age_days))
    }

    fn sample_graph() -> (KnowledgeGraph, Memory, Memory, Memory) {
        let old = memory(
            MemoryDraft::new("Hike with Sarah")
                .with_person("Sarah")
                .with_place("mountains"),
            40,
        );
        let recent = memory(
            MemoryDraft::new("Coffee with Sarah")
                .with_person("Sarah")
                .with_event("coffee"),
            1,
        );
        let mid = memory(MemoryDraft::new("Trip").with_place("Lisbon"), 10);
        let graph = KnowledgeGraph::build(
            &[old.clone(), recent.clone(), mid.clone()],
            &[],
            GraphOptions::default(),
        );
        (graph, old, recent, mid)
    }

    fn ids(view: &GraphView) -> HashSet<NodeId> {
        view.nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_all_all_is_identity() {
        let (graph, ..) = sample_graph();
        let view = apply_filters(&graph, &ViewFilters::default(), now());
        assert_eq!(view.node_count(), graph.node_count());
        assert_eq!(view.edge_count(), graph.edge_count());
    }

    #[test]
    fn test_month_drops_old_memory_keeps_entities() {
        let (graph, old, recent, _) = sample_graph();
        let view = apply_filters(
            &graph,
            &ViewFilters::new(NodeTypeFilter::All, TimeFilter::Month),
            now(),
        );

        assert!(!view.contains_node(&NodeId::memory(old.id)));
        assert!(view.contains_node(&NodeId::memory(recent.id)));
        assert!(view.contains_node(&NodeId::from_raw("person:sarah")));
        // Only mentioned by the old memory, kept as an isolated node.
        let mountains = NodeId::from_raw("place:mountains");
        assert!(view.contains_node(&mountains));
        assert!(view.edges.iter().all(|e| !e.touches(&mountains)));
        assert!(view
            .edges
            .iter()
            .all(|e| e.source != NodeId::memory(old.id)));
    }

    #[test]
    fn test_node_type_filter_drops_cross_kind_edges() {
        let (graph, ..) = sample_graph();
        let view = apply_filters(
            &graph,
            &ViewFilters::new(NodeTypeFilter::Person, TimeFilter::All),
            now(),
        );

        assert_eq!(view.node_count(), 1);
        assert!(view.edges.is_empty());
    }

    #[test]
    fn test_filters_compose_by_intersection() {
        let (graph, ..) = sample_graph();
        for node_type in [NodeTypeFilter::Memory, NodeTypeFilter::Person, NodeTypeFilter::Place] {
            for time in [TimeFilter::Week, TimeFilter::Month, TimeFilter::Year] {
                let both = ids(&apply_filters(&graph, &ViewFilters::new(node_type, time), now()));
                let by_type = ids(&apply_filters(
                    &graph,
                    &ViewFilters::new(node_type, TimeFilter::All),
                    now(),
                ));
                let by_time = ids(&apply_filters(
                    &graph,
                    &ViewFilters::new(NodeTypeFilter::All, time),
                    now(),
                ));
                let expected: HashSet<_> = by_type.intersection(&by_time).cloned().collect();
                assert_eq!(both, expected, "{node_type:?}/{time:?}");
            }
        }
    }

    #[test]
    fn test_week_filter_on_memories() {
        let (graph, _, recent, _) = sample_graph();
        let view = apply_filters(
            &graph,
            &ViewFilters::new(NodeTypeFilter::Memory, TimeFilter::Week),
            now(),
        );
        assert_eq!(ids(&view), HashSet::from([NodeId::memory(recent.id)]));
    }

    #[test]
    fn test_view_does_not_mutate_graph() {
        let (graph, ..) = sample_graph();
        let before = graph.node_count();
        let _ = apply_filters(
            &graph,
            &ViewFilters::new(NodeTypeFilter::Event, TimeFilter::Week),
            now(),
        );
        assert_eq!(graph.node_count(), before);
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!("Week".parse::<TimeFilter>().unwrap(), TimeFilter::Week);
        assert_eq!("person".parse::<NodeTypeFilter>().unwrap(), NodeTypeFilter::Person);
        assert!(matches!(
            "decade".parse::<TimeFilter>(),
            Err(GraphError::UnknownFilter { kind: "time", .. })
        ));
    }
}
