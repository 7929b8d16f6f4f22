//! Memory graph service - the one context object that owns every piece of state.
//!
//! The memory log is the source of truth. Every successful log mutation is
//! forwarded to the graph synchronizer exactly once. Readers take cheap
//! [`Arc`] snapshots of the canonical graph; writers copy on write, so a
//! snapshot handed out earlier never changes underneath its holder.

use chrono::{DateTime, Utc};
use memory_log::{
    ExtractionResult, IngestDecision, Memory, MemoryChange, MemoryDraft, MemoryId, MemoryLog,
    MemoryPatch, Settings,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::{
    memory_trend, sentiment_trend, AnalyticsExport, AnalyticsSnapshot, DailyCount, Insight,
    InsightBoard, TrendPeriod, WeeklySentiment,
};
use crate::error::GraphError;
use crate::knowledge_base::{
    EdgeId, ExplicitEdgeStore, GraphEdge, GraphNode, GraphOptions, Inconsistency, KnowledgeGraph,
    NewEdge, NodeId, SyncDelta,
};
use crate::view::{apply_filters, GraphView, ViewFilters};

/// What happened to an extractor result.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Nothing memorable.
    Skipped,
    /// Extracted but held back for confirmation; nothing was saved.
    NeedsReview(MemoryDraft),
    Saved(Memory),
}

#[derive(Debug, Clone)]
pub struct MemoryGraphService {
    settings: Settings,
    log: MemoryLog,
    explicit: ExplicitEdgeStore,
    graph: Arc<KnowledgeGraph>,
    filters: ViewFilters,
    insights: InsightBoard,
}

impl MemoryGraphService {
    pub fn new(settings: Settings) -> Self {
        let options = GraphOptions::from(&settings.graph);
        Self {
            settings,
            log: MemoryLog::new(),
            explicit: ExplicitEdgeStore::new(),
            graph: Arc::new(KnowledgeGraph::with_options(options)),
            filters: ViewFilters::default(),
            insights: InsightBoard::new(),
        }
    }

    /// Start from previously stored memories and explicit edges.
    pub fn from_records(
        settings: Settings,
        memories: impl IntoIterator<Item = Memory>,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Self {
        let mut service = Self::new(settings);
        let normalizer = service.graph.options().normalizer;
        service.log = MemoryLog::from_memories(memories);
        service.explicit = ExplicitEdgeStore::from_edges(edges, &normalizer);
        service.rebuild();
        service
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    pub fn explicit_edges(&self) -> &ExplicitEdgeStore {
        &self.explicit
    }

    /// Snapshot of the canonical graph.
    pub fn graph(&self) -> Arc<KnowledgeGraph> {
        Arc::clone(&self.graph)
    }

    // === Ingestion ===

    /// Admit an extractor result according to the ingest settings.
    pub fn ingest(&mut self, result: ExtractionResult, now: DateTime<Utc>) -> IngestOutcome {
        match result.decide(&self.settings.ingest) {
            IngestDecision::Skip => {
                debug!("extraction not memorable, skipped");
                IngestOutcome::Skipped
            }
            IngestDecision::Review(draft) => IngestOutcome::NeedsReview(draft),
            IngestDecision::Save(draft) => IngestOutcome::Saved(self.create_memory(draft, now)),
        }
    }

    /// Parse a raw extractor reply, then [`ingest`](Self::ingest) it.
    pub fn ingest_reply(&mut self, reply: &str, now: DateTime<Utc>) -> Result<IngestOutcome, GraphError> {
        let result = ExtractionResult::from_reply(reply, self.settings.ingest.default_confidence)?;
        Ok(self.ingest(result, now))
    }

    // === Memory CRUD ===

    pub fn create_memory(&mut self, draft: MemoryDraft, now: DateTime<Utc>) -> Memory {
        let change = self.log.create(draft, now);
        self.sync(&change);
        match change {
            MemoryChange::Created(memory) => memory,
            MemoryChange::Updated { after, .. } => after,
            MemoryChange::Deleted(memory) => memory,
        }
    }

    /// Returns the updated memory, or `None` if the id is unknown.
    pub fn update_memory(
        &mut self,
        id: MemoryId,
        patch: MemoryPatch,
        now: DateTime<Utc>,
    ) -> Option<Memory> {
        let change = self.log.update(id, patch, now)?;
        self.sync(&change);
        self.log.get(id).cloned()
    }

    /// Delete a memory and the explicit edges that touch it.
    pub fn delete_memory(&mut self, id: MemoryId) -> bool {
        let Some(change) = self.log.delete(id) else {
            return false;
        };
        self.drop_explicit_edges_of(id);
        self.sync(&change);
        true
    }

    /// Delete every memory whose content matches `query`. Returns how many went.
    pub fn forget(&mut self, query: &str) -> usize {
        let changes = self.log.forget(query);
        for change in &changes {
            self.drop_explicit_edges_of(change.memory_id());
            self.sync(change);
        }
        info!(query, count = changes.len(), "forgot memories");
        changes.len()
    }

    fn drop_explicit_edges_of(&mut self, id: MemoryId) {
        let removed = self.explicit.remove_touching(&NodeId::memory(id));
        if !removed.is_empty() {
            debug!(memory_id = %id, count = removed.len(), "dropped explicit edges of deleted memory");
        }
    }

    fn sync(&mut self, change: &MemoryChange) {
        let delta = Arc::make_mut(&mut self.graph).apply_change(change);
        log_delta(change.memory_id(), &delta);
    }

    // === Explicit edges ===

    /// Assert a relation between two nodes already in the graph.
    ///
    /// Entity endpoints may be given in any spelling the normalizer folds
    /// onto an existing node.
    pub fn add_edge(&mut self, mut request: NewEdge) -> Result<GraphEdge, GraphError> {
        let normalizer = self.graph.options().normalizer;
        for endpoint in [&mut request.source, &mut request.target] {
            match normalizer.canonical(endpoint) {
                Some(id) if self.graph.contains_node(&id) => *endpoint = id,
                _ => return Err(GraphError::UnknownNode(endpoint.clone())),
            }
        }

        let edge = self.explicit.create(request)?;
        Arc::make_mut(&mut self.graph).on_edge_attached(&edge);
        debug!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "explicit edge attached");
        Ok(edge)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> bool {
        if self.explicit.remove(id).is_none() {
            debug!(edge_id = %id, "remove of unknown explicit edge ignored");
            return false;
        }
        let delta = Arc::make_mut(&mut self.graph).on_edge_detached(id);
        debug!(edge_id = %id, orphans = delta.nodes_removed.len(), "explicit edge detached");
        true
    }

    // === Graph ===

    /// Rebuild the canonical graph from scratch and swap it in.
    pub fn rebuild(&mut self) {
        let options = GraphOptions::from(&self.settings.graph);
        self.graph = Arc::new(KnowledgeGraph::build(
            self.log.memories(),
            self.explicit.list(),
            options,
        ));
    }

    /// Check the graph against the log; rebuild if anything is off.
    pub fn repair(&mut self) -> Vec<Inconsistency> {
        let problems = self.graph.check_consistency(self.log.memories());
        if !problems.is_empty() {
            warn!(count = problems.len(), "graph inconsistent with memory log, rebuilding");
            self.rebuild();
        }
        problems
    }

    pub fn neighbors(&self, id: &NodeId) -> Vec<&GraphNode> {
        self.graph.neighbors(id)
    }

    pub fn set_filters(&mut self, filters: ViewFilters) {
        self.filters = filters;
    }

    pub fn filters(&self) -> ViewFilters {
        self.filters
    }

    /// The canonical graph seen through the active filters.
    pub fn view(&self, now: DateTime<Utc>) -> GraphView {
        apply_filters(&self.graph, &self.filters, now)
    }

    // === Analytics ===

    pub fn snapshot(&self, now: DateTime<Utc>) -> AnalyticsSnapshot {
        AnalyticsSnapshot::compute(
            self.log.memories(),
            Some(self.graph.as_ref()),
            &self.settings.analytics,
            now,
        )
    }

    pub fn memory_trend(&self, period: TrendPeriod, now: DateTime<Utc>) -> Vec<DailyCount> {
        memory_trend(self.log.memories(), period, now)
    }

    pub fn sentiment_trend(&self, period: TrendPeriod, now: DateTime<Utc>) -> Vec<WeeklySentiment> {
        sentiment_trend(self.log.memories(), period, now)
    }

    /// Regenerate insights from a fresh snapshot. Clears earlier dismissals.
    pub fn refresh_insights(&mut self, now: DateTime<Utc>) -> &[Insight] {
        let snapshot = self.snapshot(now);
        self.insights.refresh(&snapshot, &self.settings.analytics);
        self.insights.insights()
    }

    pub fn dismiss_insight(&mut self, id: &str) -> bool {
        self.insights.dismiss(id)
    }

    pub fn insights(&self) -> &[Insight] {
        self.insights.insights()
    }

    /// Bundle a fresh snapshot with the insights currently on display.
    pub fn export(&self, now: DateTime<Utc>) -> AnalyticsExport {
        AnalyticsExport {
            generated_at: now,
            snapshot: self.snapshot(now),
            insights: self.insights.insights().to_vec(),
        }
    }
}

fn log_delta(memory_id: MemoryId, delta: &SyncDelta) {
    debug!(
        memory_id = %memory_id,
        nodes_added = delta.nodes_added.len(),
        nodes_removed = delta.nodes_removed.len(),
        edges_added = delta.edges_added.len(),
        edges_removed = delta.edges_removed.len(),
        "graph synchronized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{BACKUP_REMINDER, NO_ACTIVITY};
    use crate::knowledge_base::{EdgeKind, NodeKind, Provenance};
    use crate::view::{NodeTypeFilter, TimeFilter};
    use chrono::{Duration, TimeZone};
    use memory_log::Sentiment;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn service() -> MemoryGraphService {
        MemoryGraphService::new(Settings::default())
    }

    fn signature(graph: &KnowledgeGraph) -> (Vec<String>, Vec<String>) {
        let mut nodes: Vec<String> = graph.nodes().map(|n| n.id.to_string()).collect();
        let mut edges: Vec<String> = graph.edges().map(|e| e.id.as_str().to_string()).collect();
        nodes.sort();
        edges.sort();
        (nodes, edges)
    }

    fn assert_matches_rebuild(service: &MemoryGraphService) {
        let rebuilt = KnowledgeGraph::build(
            service.log().memories(),
            service.explicit_edges().list(),
            GraphOptions::default(),
        );
        assert_eq!(signature(&service.graph()), signature(&rebuilt));
    }

    #[test]
    fn test_create_memory_updates_graph() {
        let mut service = service();
        let memory = service.create_memory(
            MemoryDraft::new("Beach with Sarah").with_person("Sarah").with_place("beach"),
            now(),
        );

        let graph = service.graph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.degree(&NodeId::memory(memory.id)), 2);
        assert_matches_rebuild(&service);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let mut service = service();
        service.create_memory(MemoryDraft::new("One").with_person("Sarah"), now());
        let before = service.graph();

        service.create_memory(MemoryDraft::new("Two").with_person("Tom"), now());

        assert_eq!(before.node_count(), 2);
        assert_eq!(service.graph().node_count(), 4);
    }

    #[test]
    fn test_update_and_delete_keep_graph_in_sync() {
        let mut service = service();
        let a = service.create_memory(MemoryDraft::new("A").with_person("Sarah"), now());
        let b = service.create_memory(MemoryDraft::new("B").with_person("Sarah"), now());

        let updated = service
            .update_memory(a.id, MemoryPatch::new().people(["Tom"]), now())
            .unwrap();
        assert_eq!(updated.people, vec!["Tom".to_string()]);
        assert_matches_rebuild(&service);

        assert!(service.delete_memory(b.id));
        assert!(!service.graph().contains_node(&NodeId::from_raw("person:sarah")));
        assert_matches_rebuild(&service);

        assert!(!service.delete_memory(b.id));
        assert!(service.update_memory(b.id, MemoryPatch::new(), now()).is_none());
    }

    #[test]
    fn test_ingest_decisions() {
        let mut service = service();

        let skipped = service
            .ingest_reply(r#"{"shouldSave": false, "response": "ok"}"#, now())
            .unwrap();
        assert_eq!(skipped, IngestOutcome::Skipped);

        let reply = r#"Sure! {"shouldSave": true, "response": "Saved",
            "memoryData": {"content": "Lunch with Ana", "people": ["Ana"],
            "sentiment": "positive", "confidence": 0.4}}"#;
        assert!(matches!(
            service.ingest_reply(reply, now()).unwrap(),
            IngestOutcome::NeedsReview(_)
        ));
        assert!(service.log().is_empty());

        let reply = reply.replace("0.4", "0.9");
        let IngestOutcome::Saved(memory) = service.ingest_reply(&reply, now()).unwrap() else {
            panic!("expected the memory to be saved");
        };
        assert_eq!(memory.sentiment, Some(Sentiment::Positive));
        assert!(service.graph().contains_node(&NodeId::from_raw("person:ana")));
    }

    #[test]
    fn test_ingest_reply_without_json() {
        let mut service = service();
        let err = service.ingest_reply("no json here", now()).unwrap_err();
        assert!(matches!(err, GraphError::Log(_)));
    }

    #[test]
    fn test_explicit_edges() {
        let mut service = service();
        let a = service.create_memory(MemoryDraft::new("A").with_person("Sarah"), now());
        let b = service.create_memory(MemoryDraft::new("B").with_place("Paris"), now());

        let unknown = service.add_edge(NewEdge::new(
            NodeId::memory(a.id),
            NodeId::from_raw("person:ghost"),
            "knows",
        ));
        assert!(matches!(unknown, Err(GraphError::UnknownNode(_))));

        let edge = service
            .add_edge(NewEdge::new(
                NodeId::from_raw("person:sarah"),
                NodeId::from_raw("place:paris"),
                "visited",
            ))
            .unwrap();
        assert_eq!(service.graph().edge_count(), 3);
        assert_matches_rebuild(&service);

        // Deleting B leaves Paris held only by the explicit edge.
        assert!(service.delete_memory(b.id));
        assert!(service.graph().contains_node(&NodeId::from_raw("place:paris")));
        assert_matches_rebuild(&service);

        assert!(service.remove_edge(&edge.id));
        assert!(!service.remove_edge(&edge.id));
        assert!(!service.graph().contains_node(&NodeId::from_raw("place:paris")));
        assert_matches_rebuild(&service);
    }

    #[test]
    fn test_add_edge_folds_entity_spelling() {
        let mut service = service();
        let a = service.create_memory(MemoryDraft::new("A").with_person("Sarah"), now());

        let edge = service
            .add_edge(NewEdge::new(NodeId::memory(a.id), NodeId::from_raw("person: SARAH"), "about"))
            .unwrap();
        assert_eq!(edge.target, NodeId::from_raw("person:sarah"));
        assert_eq!(service.graph().nodes_of_kind(NodeKind::Person).count(), 1);
        assert_matches_rebuild(&service);
    }

    #[test]
    fn test_from_records_folds_stored_edge_endpoints() {
        let memory = Memory::from_draft(MemoryId::new(), MemoryDraft::new("A").with_person("Sarah"), now());
        let stored = GraphEdge {
            id: EdgeId::random(),
            source: NodeId::memory(memory.id),
            target: NodeId::from_raw("person:Sarah"),
            kind: EdgeKind::Relation("about".into()),
            weight: 1.0,
            label: None,
            provenance: Provenance::Explicit,
        };
        let mut service = MemoryGraphService::from_records(Settings::default(), vec![memory], vec![stored]);

        assert_eq!(service.graph().nodes_of_kind(NodeKind::Person).count(), 1);
        assert_eq!(service.explicit_edges().list()[0].target, NodeId::from_raw("person:sarah"));
        assert!(service.repair().is_empty());
    }

    #[test]
    fn test_delete_drops_explicit_edges_touching_memory() {
        let mut service = service();
        let a = service.create_memory(MemoryDraft::new("A").with_person("Sarah"), now());
        let b = service.create_memory(MemoryDraft::new("B").with_person("Tom"), now());
        service
            .add_edge(NewEdge::new(NodeId::memory(a.id), NodeId::memory(b.id), "follows"))
            .unwrap();

        assert!(service.delete_memory(b.id));
        assert!(service.explicit_edges().is_empty());
        assert_matches_rebuild(&service);
    }

    #[test]
    fn test_forget() {
        let mut service = service();
        service.create_memory(MemoryDraft::new("Gym session").with_person("Tom"), now());
        service.create_memory(MemoryDraft::new("Gym again").with_person("Tom"), now());
        service.create_memory(MemoryDraft::new("Beach").with_person("Sarah"), now());

        assert_eq!(service.forget("gym"), 2);
        assert_eq!(service.log().len(), 1);
        assert!(!service.graph().contains_node(&NodeId::from_raw("person:tom")));
        assert_matches_rebuild(&service);
    }

    #[test]
    fn test_view_uses_active_filters() {
        let mut service = service();
        service.create_memory(MemoryDraft::new("Old").with_person("Sarah"), now() - Duration::days(40));
        service.create_memory(MemoryDraft::new("New").with_person("Tom"), now() - Duration::days(1));

        service.set_filters(ViewFilters::new(NodeTypeFilter::Memory, TimeFilter::Month));
        let view = service.view(now());
        assert_eq!(view.node_count(), 1);
        assert_eq!(view.edge_count(), 0);
        assert_eq!(service.graph().node_count(), 4);
    }

    #[test]
    fn test_repair_rebuilds_when_rebuilt_from_records() {
        let memory = Memory::from_draft(MemoryId::new(), MemoryDraft::new("A").with_person("Sarah"), now());
        let mut service = MemoryGraphService::from_records(Settings::default(), vec![memory], vec![]);
        assert!(service.repair().is_empty());
        assert_eq!(service.graph().node_count(), 2);
    }

    #[test]
    fn test_insights_and_export() {
        let mut service = service();
        let insights = service.refresh_insights(now());
        assert_eq!(insights.len(), 2);

        assert!(service.dismiss_insight(BACKUP_REMINDER));
        assert_eq!(service.insights().len(), 1);
        assert_eq!(service.insights()[0].id, NO_ACTIVITY);

        let json = service.export(now()).to_json_pretty().unwrap();
        assert!(json.contains(NO_ACTIVITY));
        assert!(!json.contains(BACKUP_REMINDER));
    }

    #[test]
    fn test_trends() {
        let mut service = service();
        service.create_memory(MemoryDraft::new("Today").with_sentiment(Sentiment::Positive), now());

        let trend = service.memory_trend(TrendPeriod::Week, now());
        assert_eq!(trend.last().map(|d| d.count), Some(1));

        let sentiment = service.sentiment_trend(TrendPeriod::Week, now());
        assert_eq!(sentiment.len(), 1);
        assert_eq!(sentiment[0].positive, 100.0);
    }
}
