use std::time::Duration;

use thiserror::Error;

/// Failure kinds that can interrupt a single polling iteration.
///
/// None of these are fatal: the loop reports them to the display sink and
/// moves on to the next tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    #[error("reading repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("malformed reading {id:?}: field `{field}` {reason}")]
    MalformedReading {
        id: Option<i64>,
        field: &'static str,
        reason: String,
    },

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("failed to persist classification for reading {id}: {reason}")]
    PersistenceFailure { id: i64, reason: String },

    #[error("iteration timed out after {0:?}")]
    Timeout(Duration),
}

impl MonitorError {
    pub fn repository(err: anyhow::Error) -> Self {
        MonitorError::RepositoryUnavailable(format!("{err:#}"))
    }

    pub fn classifier(err: anyhow::Error) -> Self {
        MonitorError::ClassifierUnavailable(format!("{err:#}"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::RepositoryUnavailable(_) => "RepositoryUnavailable",
            MonitorError::MalformedReading { .. } => "MalformedReading",
            MonitorError::ClassifierUnavailable(_) => "ClassifierUnavailable",
            MonitorError::PersistenceFailure { .. } => "PersistenceFailure",
            MonitorError::Timeout(_) => "Timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_context_chain_is_kept_in_message() {
        let err = anyhow::anyhow!("connection refused").context("fetch_recent failed");
        let mapped = MonitorError::repository(err);
        assert_eq!(mapped.kind(), "RepositoryUnavailable");
        assert_eq!(
            mapped.to_string(),
            "reading repository unavailable: fetch_recent failed: connection refused"
        );
    }

    #[test]
    fn malformed_reading_names_the_field() {
        let err = MonitorError::MalformedReading {
            id: Some(3),
            field: "count_60s",
            reason: "is not numeric (\"abc\")".into(),
        };
        assert!(err.to_string().contains("`count_60s`"));
    }
}
