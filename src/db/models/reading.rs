//! Respiratory-rate reading data model.
//!
//! One row of the `readings` table: the raw counters reported by the sensor
//! plus the clinical category assigned by the classifier (if any).

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clinical category produced by the classifier.
///
/// Variant order matches the model's output index order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Bradypnea,
    Normal,
    Tachypnea,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Bradypnea, Category::Normal, Category::Tachypnea];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bradypnea => "Bradypnea",
            Category::Normal => "Normal",
            Category::Tachypnea => "Tachypnea",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "Bradypnea" => Ok(Category::Bradypnea),
            "Normal" => Ok(Category::Normal),
            "Tachypnea" => Ok(Category::Tachypnea),
            other => Err(anyhow!("unknown category '{other}'")),
        }
    }
}

/// A single sensor reading as stored in the repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Cumulative breath counter.
    pub count: u32,
    /// Breaths per minute over the trailing 60 seconds.
    pub count_60s: u32,
    /// Rate fed to the classifier. Zero until the sensor has warmed up.
    pub stored_count_60s: u32,
    pub prediction: Option<Category>,
}

/// Fields for a reading that has not been assigned an id yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReading {
    pub timestamp: DateTime<Utc>,
    pub count: u32,
    pub count_60s: u32,
    pub stored_count_60s: u32,
}
