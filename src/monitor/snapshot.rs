//! Immutable display state published once per iteration.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Category, Reading};

use super::tracker::RetainedState;

const HEADER_FORMAT: &str = "%A, %B %d, %Y | %H:%M:%S";
const ALERT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl From<Category> for Severity {
    fn from(category: Category) -> Self {
        match category {
            Category::Normal => Severity::Info,
            Category::Tachypnea => Severity::Warning,
            Category::Bradypnea => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    pub severity: Severity,
    pub category: Category,
    pub timestamp: String,
    pub stored_rate: u32,
}

impl Alert {
    pub fn headline(&self) -> String {
        match self.category {
            Category::Normal => format!("Normal ({})", self.timestamp),
            Category::Tachypnea => format!("ALERT ({}): Tachypnea detected!", self.timestamp),
            Category::Bradypnea => {
                format!("CRITICAL ALERT ({}): Bradypnea detected!", self.timestamp)
            }
        }
    }
}

impl From<RetainedState> for Alert {
    fn from(state: RetainedState) -> Self {
        Self {
            severity: state.category.into(),
            category: state.category,
            timestamp: state.timestamp.format(ALERT_FORMAT).to_string(),
            stored_rate: state.stored_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub count_60s: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    pub timestamp_label: String,
    /// Newest first, as fetched.
    pub table: Vec<Reading>,
    pub live_rate: u32,
    pub total_count: u32,
    pub alert: Option<Alert>,
    /// Oldest first, for charting.
    pub series: Vec<SeriesPoint>,
    /// Records dropped from this batch because they failed to decode.
    pub rejected: usize,
}

impl Snapshot {
    /// `None` for an empty batch; there is nothing to show.
    pub fn assemble(
        table: Vec<Reading>,
        retained: Option<RetainedState>,
        rejected: usize,
    ) -> Option<Self> {
        let newest = table.first()?;

        let series = table
            .iter()
            .rev()
            .map(|r| SeriesPoint {
                timestamp: r.timestamp,
                count_60s: r.count_60s,
                count: r.count,
            })
            .collect();

        Some(Self {
            timestamp_label: newest.timestamp.format(HEADER_FORMAT).to_string(),
            live_rate: newest.count_60s,
            total_count: newest.count,
            alert: retained.map(Alert::from),
            series,
            table,
            rejected,
        })
    }

    pub fn newest(&self) -> Option<&Reading> {
        self.table.first()
    }
}
