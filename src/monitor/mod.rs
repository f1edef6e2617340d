//! The polling / classification / state-retention core.

pub mod backfill;
pub mod controller;
pub mod loop_worker;
pub mod snapshot;
pub mod tracker;

use std::future::Future;

use crate::db::{Category, Reading};
use crate::error::MonitorError;

pub use backfill::{BackfillReport, Backfiller};
pub use controller::MonitorController;
pub use loop_worker::{monitor_loop, IterationOutcome, Monitor, MonitorSettings};
pub use snapshot::{Alert, SeriesPoint, Severity, Snapshot};
pub use tracker::{LastValidTracker, RetainedState};

/// Result of one fetch. Records that could not be decoded are kept apart so
/// a single bad row does not drop the batch.
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    /// Newest first.
    pub readings: Vec<Reading>,
    pub rejected: Vec<MonitorError>,
}

/// Where readings come from and where classifications are written back.
pub trait ReadingRepository: Send + Sync {
    /// Up to `limit` readings ordered by timestamp, newest first.
    fn fetch_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<FetchedBatch, MonitorError>> + Send;

    /// Store `label` for reading `id`. Writing a label to an already
    /// labelled reading is a no-op.
    fn update_classification(
        &self,
        id: i64,
        label: Category,
    ) -> impl Future<Output = Result<(), MonitorError>> + Send;
}
