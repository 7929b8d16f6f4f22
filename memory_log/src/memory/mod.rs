//! Memory records - the user-authored, AI-annotated notes that everything else derives from.

mod ingest;

pub use ingest::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a memory ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall sentiment the extractor assigned to a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Parse a sentiment label. Unknown labels yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of entities a memory can mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Place,
    Event,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Person, EntityKind::Place, EntityKind::Event];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Place => "place",
            EntityKind::Event => "event",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_CONFIDENCE: f32 = 0.5;

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Accepts any sentiment label; unrecognized or missing labels become `None`.
fn lenient_sentiment<'de, D>(deserializer: D) -> Result<Option<Sentiment>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(Sentiment::parse))
}

/// Accepts any list; null or a non-array becomes empty, non-string items are dropped.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(string_list(raw.as_ref()))
}

fn clamped_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(coerce_confidence(raw.as_ref(), DEFAULT_CONFIDENCE))
}

/// A stored memory.
///
/// Records coming back from storage may be incomplete: missing mention or tag
/// lists deserialize as empty, an unknown sentiment as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,

    /// The cleaned-up note text.
    pub content: String,

    #[serde(default, deserialize_with = "lenient_list")]
    pub people: Vec<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub places: Vec<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub events: Vec<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "lenient_sentiment")]
    pub sentiment: Option<Sentiment>,

    /// Extractor confidence (0.0 - 1.0).
    #[serde(default = "default_confidence", deserialize_with = "clamped_confidence")]
    pub confidence: f32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Materialize a draft into a stored memory.
    pub fn from_draft(id: MemoryId, draft: MemoryDraft, now: DateTime<Utc>) -> Self {
        let draft = draft.sanitized();
        Self {
            id,
            content: draft.content,
            people: draft.people,
            places: draft.places,
            events: draft.events,
            tags: draft.tags,
            sentiment: Some(draft.sentiment),
            confidence: draft.confidence,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mention list for one entity kind.
    pub fn mentions_of(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Person => &self.people,
            EntityKind::Place => &self.places,
            EntityKind::Event => &self.events,
        }
    }

    /// All mentions in people, places, events order.
    pub fn mentions(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.mentions_of(kind).iter().map(move |m| (kind, m.as_str())))
    }

    /// Case-insensitive content search.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        !needle.is_empty() && self.content.to_lowercase().contains(&needle)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn mentions_person(&self, person: &str) -> bool {
        self.people.iter().any(|p| p.eq_ignore_ascii_case(person.trim()))
    }
}

/// An unsaved memory, as produced by the extractor or typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub content: String,
    pub people: Vec<String>,
    pub places: Vec<String>,
    pub events: Vec<String>,
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub confidence: f32,
}

impl MemoryDraft {
    /// Create a new draft with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            people: Vec::new(),
            places: Vec::new(),
            events: Vec::new(),
            tags: Vec::new(),
            sentiment: Sentiment::Neutral,
            confidence: 0.8,
        }
    }

    pub fn with_person(mut self, person: impl Into<String>) -> Self {
        self.people.push(person.into());
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.places.push(place.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    /// Set the confidence score (clamped to 0.0 - 1.0).
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence, DEFAULT_CONFIDENCE);
        self
    }

    /// Trim every string, drop empty mentions and clamp the confidence.
    pub fn sanitized(self) -> Self {
        Self {
            content: self.content.trim().to_string(),
            people: clean_list(self.people),
            places: clean_list(self.places),
            events: clean_list(self.events),
            tags: clean_list(self.tags),
            sentiment: self.sentiment,
            confidence: clamp_confidence(self.confidence, DEFAULT_CONFIDENCE),
        }
    }
}

/// A partial update to an existing memory. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub people: Option<Vec<String>>,
    pub places: Option<Vec<String>>,
    pub events: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub sentiment: Option<Sentiment>,
    pub confidence: Option<f32>,
}

impl MemoryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn people(mut self, people: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.people = Some(people.into_iter().map(Into::into).collect());
        self
    }

    pub fn places(mut self, places: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.places = Some(places.into_iter().map(Into::into).collect());
        self
    }

    pub fn events(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Apply this patch, sanitizing every field it touches.
    pub fn apply_to(self, memory: &mut Memory, now: DateTime<Utc>) {
        if let Some(content) = self.content {
            memory.content = content.trim().to_string();
        }
        if let Some(people) = self.people {
            memory.people = clean_list(people);
        }
        if let Some(places) = self.places {
            memory.places = clean_list(places);
        }
        if let Some(events) = self.events {
            memory.events = clean_list(events);
        }
        if let Some(tags) = self.tags {
            memory.tags = clean_list(tags);
        }
        if let Some(sentiment) = self.sentiment {
            memory.sentiment = Some(sentiment);
        }
        if let Some(confidence) = self.confidence {
            memory.confidence = clamp_confidence(confidence, memory.confidence);
        }
        memory.updated_at = now;
    }
}

/// Trim entries and drop empty ones. Duplicates are kept.
pub(crate) fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Anything that is not an array of strings collapses to an empty list.
pub(crate) fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    let Some(serde_json::Value::Array(items)) = value else {
        return Vec::new();
    };

    clean_list(
        items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

pub(crate) fn clamp_confidence(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

/// Coerce an arbitrary JSON value into a confidence in 0.0 - 1.0.
pub(crate) fn coerce_confidence(value: Option<&serde_json::Value>, fallback: f32) -> f32 {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) => clamp_confidence(v as f32, fallback),
        None => clamp_confidence(fallback, DEFAULT_CONFIDENCE),
    }
}
