//! Insight generation - short observations derived from an analytics snapshot.
//!
//! Rules are independent; every rule whose condition holds fires. Output is
//! a pure function of the snapshot and the thresholds.

use memory_log::AnalyticsSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AnalyticsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Positive,
    Neutral,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// Stable rule id, e.g. `high_activity`. Dismissal keys on it.
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub action: Option<String>,
}

impl Insight {
    fn new(
        id: &str,
        insight_type: InsightType,
        title: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            insight_type,
            title: title.to_string(),
            description: description.into(),
            action: None,
        }
    }

    fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }
}

pub const HIGH_ACTIVITY: &str = "high_activity";
pub const NO_ACTIVITY: &str = "no_activity";
pub const POSITIVE_SENTIMENT: &str = "positive_sentiment";
pub const LOW_SENTIMENT: &str = "low_sentiment";
pub const TOP_PERSON: &str = "top_person";
pub const BACKUP_REMINDER: &str = "backup_reminder";

/// Turn a snapshot into insights, in rule order.
pub fn generate_insights(snapshot: &AnalyticsSnapshot, settings: &AnalyticsSettings) -> Vec<Insight> {
    let stats = &snapshot.memory;
    let mut insights = Vec::new();

    if stats.this_week as f64 > stats.average_per_week * settings.high_activity_ratio {
        insights.push(
            Insight::new(
                HIGH_ACTIVITY,
                InsightType::Positive,
                "High Memory Activity",
                format!(
                    "You saved {} memories this week, against a usual {} per week.",
                    stats.this_week,
                    stats.average_per_week.round()
                ),
            )
            .with_action("Keep it up"),
        );
    }

    if stats.this_week == 0 {
        insights.push(
            Insight::new(
                NO_ACTIVITY,
                InsightType::Warning,
                "No Memories This Week",
                "Nothing was saved in the last seven days.",
            )
            .with_action("Add a memory"),
        );
    }

    if let Some(ratio) = stats.sentiment.positive_ratio() {
        if ratio > settings.positive_ratio {
            insights.push(Insight::new(
                POSITIVE_SENTIMENT,
                InsightType::Positive,
                "Mostly Positive",
                format!("{}% of your memories are positive.", (ratio * 100.0).round()),
            ));
        } else if ratio < settings.negative_ratio {
            insights.push(
                Insight::new(
                    LOW_SENTIMENT,
                    InsightType::Warning,
                    "Tough Stretch",
                    format!(
                        "Only {}% of your memories are positive.",
                        (ratio * 100.0).round()
                    ),
                )
                .with_action("Reach out to someone you trust"),
            );
        }
    }

    if let Some(top) = stats.people.most_frequent() {
        insights.push(Insight::new(
            TOP_PERSON,
            InsightType::Info,
            "Most Mentioned Person",
            format!("{} appears in {} of your memories.", top.value, top.count),
        ));
    }

    insights.push(
        Insight::new(
            BACKUP_REMINDER,
            InsightType::Info,
            "Back Up Your Memories",
            "Keep a copy of your memories somewhere safe.",
        )
        .with_action("Set up backup"),
    );

    debug!(count = insights.len(), "generated insights");
    insights
}

/// The insights currently on display. Dismissal only affects this list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightBoard {
    insights: Vec<Insight>,
}

impl InsightBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with freshly generated insights.
    pub fn refresh(&mut self, snapshot: &AnalyticsSnapshot, settings: &AnalyticsSettings) {
        self.insights = generate_insights(snapshot, settings);
    }

    /// Remove an insight by id. Returns whether one was removed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.insights.len();
        self.insights.retain(|insight| insight.id != id);
        self.insights.len() != before
    }

    pub fn insights(&self) -> &[Insight] {
        &self.insights
    }
}
