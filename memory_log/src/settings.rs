//! Settings loaded from TOML. Every field has a default, so partial files work.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LogError;

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub ingest: IngestSettings,
    pub graph: GraphSettings,
    pub analytics: AnalyticsSettings,
}

impl Settings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, LogError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LogError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// How extractor output is admitted into the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Save extracted memories without asking.
    pub auto_save: bool,

    /// Minimum confidence for an extraction to be saved without review.
    pub confidence_threshold: f32,

    /// Confidence assumed when the extractor omits or garbles it.
    pub default_confidence: f32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            auto_save: true,
            confidence_threshold: 0.7,
            default_confidence: 0.5,
        }
    }
}

/// Shape of the derived graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Maximum characters of content used as a memory node label.
    pub label_max_chars: usize,

    /// Case-fold entity values before deduplication.
    pub case_fold_entities: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            label_max_chars: 50,
            case_fold_entities: true,
        }
    }
}

/// Analytics and insight thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Rows kept in top-k tables.
    pub top_k: usize,

    /// This-week count above `ratio * average weekly rate` counts as high activity.
    pub high_activity_ratio: f64,

    /// Positive share above which the sentiment insight is positive.
    pub positive_ratio: f64,

    /// Positive share below which the sentiment insight is a warning.
    pub negative_ratio: f64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            high_activity_ratio: 1.5,
            positive_ratio: 0.7,
            negative_ratio: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_document() {
        let settings = Settings::from_toml_str(
            r#"
            [ingest]
            confidence_threshold = 0.9

            [graph]
            case_fold_entities = false
            "#,
        )
        .unwrap();

        assert!(settings.ingest.auto_save);
        assert!((settings.ingest.confidence_threshold - 0.9).abs() < 1e-6);
        assert!(!settings.graph.case_fold_entities);
        assert_eq!(settings.graph.label_max_chars, 50);
        assert_eq!(settings.analytics.top_k, 5);
    }

    #[test]
    fn test_invalid_document() {
        let err = Settings::from_toml_str("[graph]\nlabel_max_chars = \"long\"").unwrap_err();
        assert!(matches!(err, LogError::SettingsParse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load("/nonexistent/recall/settings.toml").unwrap_err();
        assert!(matches!(err, LogError::SettingsIo { .. }));
        assert!(err.to_string().contains("settings.toml"));
    }
}
