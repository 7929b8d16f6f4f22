//! Graph nodes and the entity normalizer that keys them.

use chrono::{DateTime, Utc};
use memory_log::{EntityKind, GraphSettings, Memory, MemoryId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Memory,
    Person,
    Place,
    Event,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Memory,
        NodeKind::Person,
        NodeKind::Place,
        NodeKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Memory => "memory",
            NodeKind::Person => "person",
            NodeKind::Place => "place",
            NodeKind::Event => "event",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        NodeKind::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    /// The entity kind, or `None` for memory nodes.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            NodeKind::Memory => None,
            NodeKind::Person => Some(EntityKind::Person),
            NodeKind::Place => Some(EntityKind::Place),
            NodeKind::Event => Some(EntityKind::Event),
        }
    }

    pub fn is_entity(&self) -> bool {
        self.entity_kind().is_some()
    }
}

impl From<EntityKind> for NodeKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Person => NodeKind::Person,
            EntityKind::Place => NodeKind::Place,
            EntityKind::Event => NodeKind::Event,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node identifier of the form `kind:value`, e.g. `person:sarah` or `memory:<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// The node id of a memory.
    pub fn memory(id: MemoryId) -> Self {
        Self(format!("memory:{}", id.0))
    }

    /// Wrap an id received from outside (e.g. an explicit-edge store).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    fn entity(kind: EntityKind, key: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Node kind encoded in the prefix, if it is a known one.
    pub fn kind(&self) -> Option<NodeKind> {
        self.0.split_once(':').and_then(|(kind, _)| NodeKind::parse(kind))
    }

    /// Everything after the first `:`.
    pub fn value(&self) -> &str {
        self.0.split_once(':').map(|(_, value)| value).unwrap_or("")
    }

    /// The memory id, if this is a memory node.
    pub fn memory_id(&self) -> Option<MemoryId> {
        match self.kind() {
            Some(NodeKind::Memory) => Uuid::parse_str(self.value()).ok().map(MemoryId::from_uuid),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns raw mention strings into canonical entity node ids.
///
/// Values are trimmed and, unless disabled, lower-cased so trivially
/// different spellings ("Sarah", " sarah") land on the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNormalizer {
    pub case_fold: bool,
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self { case_fold: true }
    }
}

impl EntityNormalizer {
    pub fn new(case_fold: bool) -> Self {
        Self { case_fold }
    }

    /// Canonical key for a mention. Blank mentions have no key.
    pub fn key(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if self.case_fold {
            Some(trimmed.to_lowercase())
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Canonical node id for a mention of the given kind.
    pub fn node_id(&self, kind: EntityKind, raw: &str) -> Option<NodeId> {
        self.key(raw).map(|key| NodeId::entity(kind, &key))
    }

    /// Canonical form of an id received from outside the graph.
    ///
    /// Entity ids are re-keyed, memory ids pass through. Ids with an unknown
    /// prefix or a blank entity value have no canonical form.
    pub fn canonical(&self, id: &NodeId) -> Option<NodeId> {
        match id.kind()? {
            NodeKind::Memory => Some(id.clone()),
            kind => kind
                .entity_kind()
                .and_then(|entity| self.node_id(entity, id.value())),
        }
    }
}

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodePayload {
    /// The originating memory.
    Memory(Memory),
    /// The canonical entity value.
    Entity { kind: EntityKind, value: String },
}

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Display string.
    pub label: String,
    pub payload: NodePayload,
}

impl GraphNode {
    pub fn for_memory(memory: &Memory, label_max_chars: usize) -> Self {
        Self {
            id: NodeId::memory(memory.id),
            kind: NodeKind::Memory,
            label: memory_label(&memory.content, label_max_chars),
            payload: NodePayload::Memory(memory.clone()),
        }
    }

    /// An entity node. `display` is the mention as first seen.
    pub fn for_entity(id: NodeId, kind: EntityKind, display: &str) -> Self {
        Self {
            kind: kind.into(),
            label: display.trim().to_string(),
            payload: NodePayload::Entity {
                kind,
                value: id.value().to_string(),
            },
            id,
        }
    }

    pub fn memory(&self) -> Option<&Memory> {
        match &self.payload {
            NodePayload::Memory(memory) => Some(memory),
            NodePayload::Entity { .. } => None,
        }
    }

    /// Creation time of a memory node; entity nodes are timeless.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.memory().map(|memory| memory.created_at)
    }

    pub fn is_entity(&self) -> bool {
        self.kind.is_entity()
    }

    /// Case-insensitive match on the label or, for memories, the full content.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.label.to_lowercase().contains(&needle)
            || self.memory().is_some_and(|m| m.content.to_lowercase().contains(&needle))
    }
}

/// Bounded-length prefix of a memory's content, cut on a char boundary.
pub fn memory_label(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut label: String = content.chars().take(max_chars).collect();
    label.push_str("...");
    label
}

/// Graph construction options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphOptions {
    pub label_max_chars: usize,
    pub normalizer: EntityNormalizer,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::from(&GraphSettings::default())
    }
}

impl From<&GraphSettings> for GraphOptions {
    fn from(settings: &GraphSettings) -> Self {
        Self {
            label_max_chars: settings.label_max_chars,
            normalizer: EntityNormalizer::new(settings.case_fold_entities),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_log::MemoryDraft;

    #[test]
    fn test_normalizer_case_folds_and_trims() {
        let normalizer = EntityNormalizer::default();
        let a = normalizer.node_id(EntityKind::Person, "Sarah").unwrap();
        let b = normalizer.node_id(EntityKind::Person, "  sarah ").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "person:sarah");
        assert!(normalizer.node_id(EntityKind::Person, "   ").is_none());
    }

    #[test]
    fn test_normalizer_without_case_folding() {
        let normalizer = EntityNormalizer::new(false);
        let a = normalizer.node_id(EntityKind::Place, "Beach").unwrap();
        let b = normalizer.node_id(EntityKind::Place, "beach").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "place:Beach");
    }

    #[test]
    fn test_same_value_different_kind() {
        let normalizer = EntityNormalizer::default();
        let person = normalizer.node_id(EntityKind::Person, "Paris").unwrap();
        let place = normalizer.node_id(EntityKind::Place, "Paris").unwrap();
        assert_ne!(person, place);
    }

    #[test]
    fn test_node_id_parts() {
        let id = MemoryId::new();
        let node = NodeId::memory(id);

        assert_eq!(node.kind(), Some(NodeKind::Memory));
        assert_eq!(node.memory_id(), Some(id));

        let entity = NodeId::from_raw("event:team dinner: part 2");
        assert_eq!(entity.kind(), Some(NodeKind::Event));
        assert_eq!(entity.value(), "team dinner: part 2");
        assert_eq!(entity.memory_id(), None);

        assert_eq!(NodeId::from_raw("bogus").kind(), None);
    }

    #[test]
    fn test_memory_label() {
        assert_eq!(memory_label("short", 50), "short");
        assert_eq!(memory_label("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_memory_node() {
        let memory = Memory::from_draft(
            MemoryId::new(),
            MemoryDraft::new("Went to the beach with Sarah and had a sunset picnic"),
            Utc::now(),
        );
        let node = GraphNode::for_memory(&memory, 10);

        assert_eq!(node.kind, NodeKind::Memory);
        assert_eq!(node.label, "Went to th...");
        assert_eq!(node.created_at(), Some(memory.created_at));
        assert!(node.matches_query("PICNIC"));
        assert!(!node.is_entity());
    }
}
