//! Analytics - aggregate statistics over the memory log and the graph.
//!
//! Snapshots are always recomputed from scratch; nothing here is patched
//! incrementally.

mod insights;
mod trends;

pub use insights::*;
pub use trends::*;

use chrono::{DateTime, Duration, Utc};
use memory_log::{AnalyticsSettings, EntityKind, Memory, Sentiment};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::knowledge_base::{EntityNormalizer, KnowledgeGraph, NodeId, NodeKind};

/// One row of a frequency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    /// Lookup key; differs from `value` when the table folds spellings.
    pub key: String,
    /// First-seen spelling.
    pub value: String,
    pub count: usize,
}

/// Key -> occurrence count, remembering first-seen order and spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FrequencyEntry>", into = "Vec<FrequencyEntry>")]
pub struct FrequencyTable {
    entries: Vec<FrequencyEntry>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: &str) {
        self.record_as(value, value);
    }

    /// Count `value` under `key`. The first spelling seen for a key is kept.
    pub fn record_as(&mut self, key: &str, value: &str) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push(FrequencyEntry {
                    key: key.to_string(),
                    value: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    pub fn count(&self, key: &str) -> usize {
        self.index.get(key).map_or(0, |&i| self.entries[i].count)
    }

    /// Entries in first-seen order.
    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` most frequent values; ties keep first-seen order.
    pub fn top(&self, k: usize) -> Vec<&FrequencyEntry> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.truncate(k);
        sorted
    }

    pub fn most_frequent(&self) -> Option<&FrequencyEntry> {
        self.top(1).into_iter().next()
    }
}

impl From<Vec<FrequencyEntry>> for FrequencyTable {
    fn from(entries: Vec<FrequencyEntry>) -> Self {
        let mut table = FrequencyTable::new();
        for entry in entries {
            match table.index.get(&entry.key) {
                Some(&i) => table.entries[i].count += entry.count,
                None => {
                    table.index.insert(entry.key.clone(), table.entries.len());
                    table.entries.push(entry);
                }
            }
        }
        table
    }
}

impl From<FrequencyTable> for Vec<FrequencyEntry> {
    fn from(table: FrequencyTable) -> Self {
        table.entries
    }
}

/// Histogram over recognized sentiments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentBreakdown {
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// Share of positive memories, `None` when nothing was recorded.
    pub fn positive_ratio(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.positive as f64 / total as f64),
        }
    }
}

/// Statistics over the memory log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub this_year: usize,
    pub average_per_day: f64,
    pub average_per_week: f64,
    pub sentiment: SentimentBreakdown,
    pub tags: FrequencyTable,
    pub people: FrequencyTable,
    pub places: FrequencyTable,
    pub events: FrequencyTable,
}

impl MemoryStats {
    fn mentions_mut(&mut self, kind: EntityKind) -> &mut FrequencyTable {
        match kind {
            EntityKind::Person => &mut self.people,
            EntityKind::Place => &mut self.places,
            EntityKind::Event => &mut self.events,
        }
    }
}

/// Single pass over the log. Windows are trailing 7/30/365 days from `now`.
///
/// People, places and events are keyed through `normalizer`, so spellings
/// the graph merges into one node are counted together.
pub fn compute_stats(
    memories: &[Memory],
    normalizer: &EntityNormalizer,
    now: DateTime<Utc>,
) -> MemoryStats {
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);
    let year_ago = now - Duration::days(365);

    let mut stats = MemoryStats {
        total: memories.len(),
        ..MemoryStats::default()
    };
    let mut oldest: Option<DateTime<Utc>> = None;

    for memory in memories {
        let created_at = memory.created_at;
        oldest = Some(oldest.map_or(created_at, |o| o.min(created_at)));

        if created_at > week_ago {
            stats.this_week += 1;
        }
        if created_at > month_ago {
            stats.this_month += 1;
        }
        if created_at > year_ago {
            stats.this_year += 1;
        }

        if let Some(sentiment) = memory.sentiment {
            stats.sentiment.record(sentiment);
        }

        for tag in &memory.tags {
            stats.tags.record(tag);
        }
        for (kind, mention) in memory.mentions() {
            if let Some(key) = normalizer.key(mention) {
                stats.mentions_mut(kind).record_as(&key, mention.trim());
            }
        }
    }

    let days = oldest.map_or(1.0, |oldest| {
        let millis = (now - oldest).num_milliseconds() as f64;
        (millis / 86_400_000.0).ceil().max(1.0)
    });
    stats.average_per_day = stats.total as f64 / days;
    stats.average_per_week = stats.average_per_day * 7.0;

    stats
}

/// Undirected density `2|E| / (|V|(|V|-1))`, 0 for fewer than two nodes.
pub fn graph_density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    let possible = node_count as f64 * (node_count as f64 - 1.0);
    2.0 * edge_count as f64 / possible
}

/// Per-kind node counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeKindCounts {
    pub memory: usize,
    pub person: usize,
    pub place: usize,
    pub event: usize,
}

impl NodeKindCounts {
    pub fn get(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Memory => self.memory,
            NodeKind::Person => self.person,
            NodeKind::Place => self.place,
            NodeKind::Event => self.event,
        }
    }

    fn bump(&mut self, kind: NodeKind) {
        match kind {
            NodeKind::Memory => self.memory += 1,
            NodeKind::Person => self.person += 1,
            NodeKind::Place => self.place += 1,
            NodeKind::Event => self.event += 1,
        }
    }
}

/// A node ranked by degree centrality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub degree: usize,
}

/// Statistics over the canonical graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_kinds: NodeKindCounts,
    /// Density over distinct connected node pairs, always within [0, 1].
    pub density: f64,
    pub central_nodes: Vec<CentralNode>,
}

impl GraphStats {
    pub fn from_graph(graph: &KnowledgeGraph, top_k: usize) -> Self {
        let mut node_kinds = NodeKindCounts::default();
        for node in graph.nodes() {
            node_kinds.bump(node.kind);
        }

        // Parallel edges and both directions of a pair count once.
        let pairs: HashSet<(&NodeId, &NodeId)> = graph
            .edges()
            .filter(|edge| edge.source != edge.target)
            .map(|edge| {
                if edge.source <= edge.target {
                    (&edge.source, &edge.target)
                } else {
                    (&edge.target, &edge.source)
                }
            })
            .collect();

        let mut central_nodes: Vec<CentralNode> = graph
            .nodes()
            .map(|node| CentralNode {
                id: node.id.clone(),
                kind: node.kind,
                label: node.label.clone(),
                degree: graph.degree(&node.id),
            })
            .filter(|node| node.degree > 0)
            .collect();
        central_nodes.sort_by(|a, b| b.degree.cmp(&a.degree));
        central_nodes.truncate(top_k);

        Self {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            node_kinds,
            density: graph_density(graph.node_count(), pairs.len()),
            central_nodes,
        }
    }
}

/// Everything the analytics screen shows, computed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub computed_at: DateTime<Utc>,
    pub memory: MemoryStats,
    pub graph: Option<GraphStats>,
}

impl AnalyticsSnapshot {
    /// Entity tables use the graph's normalizer, or the default one when no
    /// graph is given.
    pub fn compute(
        memories: &[Memory],
        graph: Option<&KnowledgeGraph>,
        settings: &AnalyticsSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let normalizer = graph.map(|graph| graph.options().normalizer).unwrap_or_default();
        Self {
            computed_at: now,
            memory: compute_stats(memories, &normalizer, now),
            graph: graph.map(|graph| GraphStats::from_graph(graph, settings.top_k)),
        }
    }
}

/// Serializable bundle of a snapshot and its insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsExport {
    pub generated_at: DateTime<Utc>,
    pub snapshot: AnalyticsSnapshot,
    pub insights: Vec<Insight>,
}

impl AnalyticsExport {
    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::{EdgeId, EdgeKind, GraphEdge, GraphOptions, Provenance};
    use chrono::TimeZone;
    use memory_log::{MemoryDraft, MemoryId};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn memory(draft: MemoryDraft, age_days: i64) -> Memory {
        Memory::from_draft(MemoryId::new(), draft, now() - Duration::days(age_days))
    }

    #[test]
    fn test_frequency_table_ties_keep_first_seen() {
        let mut table = FrequencyTable::new();
        for value in ["tom", "sarah", "ana", "sarah", "tom", "ana"] {
            table.record(value);
        }
        table.record("zoe");

        let top: Vec<_> = table.top(3).into_iter().map(|e| e.value.as_str()).collect();
        assert_eq!(top, vec!["tom", "sarah", "ana"]);
        assert_eq!(table.most_frequent().unwrap().value, "tom");
        assert_eq!(table.count("zoe"), 1);
        assert_eq!(table.count("nobody"), 0);
    }

    #[test]
    fn test_frequency_table_serde_round_trip_keeps_index() {
        let mut table = FrequencyTable::new();
        table.record("beach");
        table.record("beach");

        let json = serde_json::to_string(&table).unwrap();
        let mut restored: FrequencyTable = serde_json::from_str(&json).unwrap();
        restored.record("beach");
        assert_eq!(restored.count("beach"), 3);
    }

    #[test]
    fn test_compute_stats() {
        let mut unknown = memory(MemoryDraft::new("Odd"), 100);
        unknown.sentiment = None;

        let memories = vec![
            memory(
                MemoryDraft::new("Beach")
                    .with_person("Sarah")
                    .with_tag("beach")
                    .with_sentiment(Sentiment::Positive),
                1,
            ),
            memory(
                MemoryDraft::new("Work")
                    .with_person("Tom")
                    .with_person("sarah")
                    .with_sentiment(Sentiment::Negative),
                20,
            ),
            unknown,
        ];

        let stats = compute_stats(&memories, &EntityNormalizer::default(), now());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.this_week, 1);
        assert_eq!(stats.this_month, 2);
        assert_eq!(stats.this_year, 3);
        assert_eq!(stats.sentiment.total(), 2);
        assert_eq!(stats.sentiment.positive, 1);
        assert_eq!(stats.people.count("sarah"), 2);
        assert_eq!(stats.people.most_frequent().unwrap().value, "Sarah");
        assert_eq!(stats.tags.count("beach"), 1);
        assert!((stats.average_per_day - 0.03).abs() < 1e-9);
        assert!((stats.average_per_week - 0.21).abs() < 1e-9);
    }

    #[test]
    fn test_mention_tables_follow_normalizer() {
        let memories = vec![
            memory(MemoryDraft::new("A").with_person("sarah").with_place("Paris"), 1),
            memory(MemoryDraft::new("B").with_person("Sarah "), 2),
            memory(MemoryDraft::new("C").with_person("Tom"), 3),
        ];

        let folded = compute_stats(&memories, &EntityNormalizer::default(), now());
        assert_eq!(folded.people.len(), 2);
        assert_eq!(folded.people.count("sarah"), 2);
        assert_eq!(folded.people.entries()[0].value, "sarah");
        assert_eq!(folded.places.count("paris"), 1);

        let exact = compute_stats(&memories, &EntityNormalizer::new(false), now());
        assert_eq!(exact.people.len(), 3);
        assert_eq!(exact.people.count("Sarah"), 1);
    }

    #[test]
    fn test_compute_stats_empty() {
        let stats = compute_stats(&[], &EntityNormalizer::default(), now());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_per_day, 0.0);
        assert_eq!(stats.sentiment.positive_ratio(), None);
    }

    #[test]
    fn test_density() {
        assert_eq!(graph_density(0, 0), 0.0);
        assert_eq!(graph_density(1, 0), 0.0);
        assert_eq!(graph_density(2, 1), 1.0);
        assert!((graph_density(3, 2) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_graph_stats() {
        let memories = vec![
            memory(MemoryDraft::new("Beach").with_person("Sarah").with_place("beach"), 1),
            memory(MemoryDraft::new("Movie").with_person("Sarah"), 2),
        ];
        let graph = KnowledgeGraph::build(&memories, &[], GraphOptions::default());
        let stats = GraphStats::from_graph(&graph, 2);

        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.node_kinds.get(NodeKind::Memory), 2);
        assert_eq!(stats.node_kinds.person, 1);
        assert!((stats.density - 0.5).abs() < 1e-9);
        assert_eq!(stats.central_nodes.len(), 2);
        assert!(stats.central_nodes.iter().all(|n| n.degree == 2));
        assert!(stats
            .central_nodes
            .iter()
            .any(|n| n.id == NodeId::from_raw("person:sarah")));
    }

    #[test]
    fn test_parallel_edges_do_not_exceed_density_bound() {
        let m = memory(MemoryDraft::new("Beach").with_person("Sarah"), 1);
        let memory_node = NodeId::memory(m.id);
        let sarah = NodeId::from_raw("person:sarah");
        let reverse = GraphEdge {
            id: EdgeId::random(),
            source: sarah,
            target: memory_node,
            kind: EdgeKind::Relation("wrote".into()),
            weight: 1.0,
            label: None,
            provenance: Provenance::Explicit,
        };
        let graph = KnowledgeGraph::build(&[m], &[reverse], GraphOptions::default());

        let stats = GraphStats::from_graph(&graph, 5);
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.density, 1.0);
    }

    #[test]
    fn test_snapshot_export_json() {
        let memories = vec![memory(MemoryDraft::new("Beach").with_person("Sarah"), 1)];
        let graph = KnowledgeGraph::build(&memories, &[], GraphOptions::default());
        let settings = AnalyticsSettings::default();
        let snapshot = AnalyticsSnapshot::compute(&memories, Some(&graph), &settings, now());

        let export = AnalyticsExport {
            generated_at: now(),
            insights: generate_insights(&snapshot, &settings),
            snapshot,
        };
        let json = export.to_json_pretty().unwrap();
        assert!(json.contains("\"central_nodes\""));
        assert!(json.contains("backup_reminder"));
    }

    proptest! {
        #[test]
        fn prop_density_within_bounds(
            mentions in prop::collection::vec(
                prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..4),
                0..8,
            )
        ) {
            let memories: Vec<Memory> = mentions
                .into_iter()
                .map(|people| {
                    let mut draft = MemoryDraft::new("note");
                    draft.people = people.into_iter().map(str::to_string).collect();
                    memory(draft, 0)
                })
                .collect();
            let graph = KnowledgeGraph::build(&memories, &[], GraphOptions::default());
            let stats = GraphStats::from_graph(&graph, 3);

            if stats.total_nodes < 2 {
                prop_assert_eq!(stats.density, 0.0);
            } else {
                prop_assert!((0.0..=1.0).contains(&stats.density));
            }
        }
    }
}
