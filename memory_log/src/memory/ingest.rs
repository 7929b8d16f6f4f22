//! Ingestion boundary - the single place extractor output is sanitized.
//!
//! The extractor is an external language model; its replies are not trusted
//! to be well-formed. Everything it returns passes through here once before
//! a record is admitted to the log.

use serde_json::Value;
use tracing::debug;

use super::{coerce_confidence, string_list, MemoryDraft, Sentiment};
use crate::error::LogError;
use crate::settings::IngestSettings;

/// Sanitized extractor output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Whether the extractor judged the message worth saving.
    pub should_save: bool,

    /// Conversational reply the extractor produced for the user, if any.
    pub response: Option<String>,

    /// The extracted memory, if any.
    pub memory: Option<MemoryDraft>,
}

/// What the caller should do with an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestDecision {
    /// Nothing memorable in the message.
    Skip,
    /// A memory was extracted but must be confirmed before saving.
    Review(MemoryDraft),
    /// Save right away.
    Save(MemoryDraft),
}

impl ExtractionResult {
    /// Parse a raw extractor reply.
    ///
    /// The reply may surround its JSON object with prose; the span from the
    /// first `{` to the last `}` is parsed.
    pub fn from_reply(reply: &str, default_confidence: f32) -> Result<Self, LogError> {
        let start = reply.find('{').ok_or(LogError::MissingJson)?;
        let end = reply.rfind('}').ok_or(LogError::MissingJson)?;
        if end < start {
            return Err(LogError::MissingJson);
        }

        let value: Value = serde_json::from_str(&reply[start..=end])?;
        Ok(Self::from_value(&value, default_confidence))
    }

    /// Build a result from already-parsed JSON, coercing every field.
    pub fn from_value(value: &Value, default_confidence: f32) -> Self {
        let should_save = value
            .get("shouldSave")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let response = value
            .get("response")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let memory = value
            .get("memoryData")
            .filter(|data| data.is_object())
            .map(|data| draft_from_value(data, default_confidence));

        Self {
            should_save,
            response,
            memory,
        }
    }

    /// Decide whether the extraction is saved, held for review, or dropped.
    pub fn decide(self, settings: &IngestSettings) -> IngestDecision {
        let draft = match (self.should_save, self.memory) {
            (true, Some(draft)) if !draft.content.is_empty() => draft,
            _ => return IngestDecision::Skip,
        };

        if !settings.auto_save || draft.confidence < settings.confidence_threshold {
            debug!(
                confidence = draft.confidence,
                threshold = settings.confidence_threshold,
                auto_save = settings.auto_save,
                "extracted memory held for review"
            );
            return IngestDecision::Review(draft);
        }

        IngestDecision::Save(draft)
    }
}

fn draft_from_value(data: &Value, default_confidence: f32) -> MemoryDraft {
    let content = data
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let sentiment = data
        .get("sentiment")
        .and_then(Value::as_str)
        .and_then(Sentiment::parse)
        .unwrap_or(Sentiment::Neutral);

    MemoryDraft {
        content,
        people: string_list(data.get("people")),
        places: string_list(data.get("places")),
        events: string_list(data.get("events")),
        tags: string_list(data.get("tags")),
        sentiment,
        confidence: coerce_confidence(data.get("confidence"), default_confidence),
    }
}
