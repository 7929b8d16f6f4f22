//! Memory log - the authoritative, ordered collection of memories.
//!
//! Every mutation returns the [`MemoryChange`] it caused so the owner can
//! forward it to derived state. `None` means the id was unknown and nothing
//! happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::memory::{Memory, MemoryDraft, MemoryId, MemoryPatch};

/// A single mutation of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryChange {
    Created(Memory),
    Updated { before: Memory, after: Memory },
    Deleted(Memory),
}

impl MemoryChange {
    /// The id of the memory the change is about.
    pub fn memory_id(&self) -> MemoryId {
        match self {
            MemoryChange::Created(memory) | MemoryChange::Deleted(memory) => memory.id,
            MemoryChange::Updated { after, .. } => after.id,
        }
    }
}

/// Criteria for listing memories. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Inclusive lower bound on creation time.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time.
    pub until: Option<DateTime<Utc>>,
    /// Every tag listed must be present.
    pub tags: Vec<String>,
    pub person: Option<String>,
    /// Case-insensitive content search.
    pub query: Option<String>,
}

impl MemoryFilter {
    pub fn matches(&self, memory: &Memory) -> bool {
        if self.since.is_some_and(|since| memory.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| memory.created_at > until) {
            return false;
        }
        if !self.tags.iter().all(|tag| memory.has_tag(tag)) {
            return false;
        }
        if let Some(person) = &self.person {
            if !memory.mentions_person(person) {
                return false;
            }
        }
        match &self.query {
            Some(query) if !query.trim().is_empty() => memory.matches_query(query),
            _ => true,
        }
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub items: Vec<&'a Memory>,
    /// 1-based page number.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// The complete memory log, kept in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryLog {
    memories: Vec<Memory>,
}

impl MemoryLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a log from stored records. Later duplicates of an id are dropped.
    pub fn from_memories(memories: impl IntoIterator<Item = Memory>) -> Self {
        let mut seen = HashSet::new();
        let memories = memories
            .into_iter()
            .filter(|memory| {
                let fresh = seen.insert(memory.id);
                if !fresh {
                    warn!(memory_id = %memory.id, "dropping duplicate memory record");
                }
                fresh
            })
            .collect();
        Self { memories }
    }

    /// Save a draft as a new memory.
    pub fn create(&mut self, draft: MemoryDraft, now: DateTime<Utc>) -> MemoryChange {
        let memory = Memory::from_draft(MemoryId::new(), draft, now);
        debug!(memory_id = %memory.id, "memory created");
        self.memories.push(memory.clone());
        MemoryChange::Created(memory)
    }

    /// Insert a memory that already carries an id (e.g. replayed from storage).
    ///
    /// An existing record with the same id is replaced.
    pub fn upsert(&mut self, memory: Memory) -> MemoryChange {
        match self.position(memory.id) {
            Some(index) => {
                let before = std::mem::replace(&mut self.memories[index], memory.clone());
                MemoryChange::Updated {
                    before,
                    after: memory,
                }
            }
            None => {
                self.memories.push(memory.clone());
                MemoryChange::Created(memory)
            }
        }
    }

    /// Apply a partial update.
    pub fn update(
        &mut self,
        id: MemoryId,
        patch: MemoryPatch,
        now: DateTime<Utc>,
    ) -> Option<MemoryChange> {
        let Some(index) = self.position(id) else {
            debug!(memory_id = %id, "update of unknown memory ignored");
            return None;
        };

        let before = self.memories[index].clone();
        patch.apply_to(&mut self.memories[index], now);
        Some(MemoryChange::Updated {
            before,
            after: self.memories[index].clone(),
        })
    }

    /// Remove a memory.
    pub fn delete(&mut self, id: MemoryId) -> Option<MemoryChange> {
        let Some(index) = self.position(id) else {
            debug!(memory_id = %id, "delete of unknown memory ignored");
            return None;
        };
        Some(MemoryChange::Deleted(self.memories.remove(index)))
    }

    /// Delete every memory whose content matches the query.
    ///
    /// A blank query forgets nothing.
    pub fn forget(&mut self, query: &str) -> Vec<MemoryChange> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let (forgotten, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.memories)
            .into_iter()
            .partition(|memory| memory.matches_query(query));
        self.memories = kept;

        debug!(query, count = forgotten.len(), "memories forgotten");
        forgotten.into_iter().map(MemoryChange::Deleted).collect()
    }

    /// Get a memory by ID.
    pub fn get(&self, id: MemoryId) -> Option<&Memory> {
        self.memories.iter().find(|memory| memory.id == id)
    }

    /// All memories in creation order.
    pub fn memories(&self) -> &[Memory] {
        &self.memories
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Memories matching the filter, newest first.
    pub fn list(&self, filter: &MemoryFilter) -> Vec<&Memory> {
        let mut matched: Vec<_> = self.memories.iter().filter(|m| filter.matches(m)).collect();
        // Stable sort keeps log order for equal timestamps.
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    /// One page of `list(filter)`. Pages are 1-based; a zero page size is treated as 1.
    pub fn page(&self, filter: &MemoryFilter, page: usize, page_size: usize) -> Page<'_> {
        let page_size = page_size.max(1);
        let page = page.max(1);
        let matched = self.list(filter);
        let total_items = matched.len();

        Page {
            items: matched
                .into_iter()
                .skip((page - 1) * page_size)
                .take(page_size)
                .collect(),
            page,
            total_pages: total_items.div_ceil(page_size),
            total_items,
        }
    }

    /// Content search, newest first, at most `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Memory> {
        let filter = MemoryFilter {
            query: Some(query.to_string()),
            ..MemoryFilter::default()
        };
        if query.trim().is_empty() {
            return Vec::new();
        }
        self.list(&filter).into_iter().take(limit).collect()
    }

    fn position(&self, id: MemoryId) -> Option<usize> {
        self.memories.iter().position(|memory| memory.id == id)
    }
}
