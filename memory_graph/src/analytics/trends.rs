//! Time series over the memory log.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use memory_log::Memory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::SentimentBreakdown;
use crate::error::GraphError;

/// Trailing period a trend covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TrendPeriod {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl TrendPeriod {
    pub fn days(&self) -> i64 {
        match self {
            TrendPeriod::Week => 7,
            TrendPeriod::Month => 30,
            TrendPeriod::Quarter => 90,
        }
    }
}

impl FromStr for TrendPeriod {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(TrendPeriod::Week),
            "30d" => Ok(TrendPeriod::Month),
            "90d" => Ok(TrendPeriod::Quarter),
            _ => Err(GraphError::UnknownFilter {
                kind: "trend period",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Sentiment shares for one Sunday-started week, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklySentiment {
    pub week_start: NaiveDate,
    pub total: usize,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl WeeklySentiment {
    fn from_breakdown(week_start: NaiveDate, breakdown: &SentimentBreakdown) -> Self {
        let total = breakdown.total();
        let percent = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };
        Self {
            week_start,
            total,
            positive: percent(breakdown.positive),
            neutral: percent(breakdown.neutral),
            negative: percent(breakdown.negative),
        }
    }
}

/// Per-day creation counts for the trailing period, oldest first.
///
/// Every day of the period is present, including today. Days are UTC dates.
pub fn memory_trend(memories: &[Memory], period: TrendPeriod, now: DateTime<Utc>) -> Vec<DailyCount> {
    let today = now.date_naive();
    let mut counts: BTreeMap<NaiveDate, usize> = (0..period.days())
        .map(|offset| (today - Duration::days(offset), 0))
        .collect();

    for memory in memories {
        if let Some(count) = counts.get_mut(&memory.created_at.date_naive()) {
            *count += 1;
        }
    }

    counts
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

/// Weekly sentiment percentages for memories inside the trailing period.
///
/// Only weeks containing at least one memory with a sentiment appear.
pub fn sentiment_trend(
    memories: &[Memory],
    period: TrendPeriod,
    now: DateTime<Utc>,
) -> Vec<WeeklySentiment> {
    let start = now - Duration::days(period.days());
    let mut weeks: BTreeMap<NaiveDate, SentimentBreakdown> = BTreeMap::new();

    for memory in memories.iter().filter(|m| m.created_at >= start) {
        let Some(sentiment) = memory.sentiment else {
            continue;
        };
        weeks
            .entry(week_start(memory.created_at.date_naive()))
            .or_default()
            .record(sentiment);
    }

    weeks
        .iter()
        .map(|(start, breakdown)| WeeklySentiment::from_breakdown(*start, breakdown))
        .collect()
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}
