pub mod console;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::MonitorError;
use crate::monitor::Snapshot;

/// Consumer of published monitor state.
pub trait DisplaySink: Send + Sync {
    fn publish(&self, snapshot: &Arc<Snapshot>);

    /// Transient, non-fatal problem in the current iteration.
    fn report_error(&self, err: &MonitorError);
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransientError {
    pub kind: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// What a renderer sees: the last good snapshot plus the latest problem, if
/// one happened since that snapshot.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub last: Option<Arc<Snapshot>>,
    pub transient_error: Option<TransientError>,
    pub published: u64,
}

/// Sink backed by a `watch` channel. Each update swaps the whole state, so a
/// renderer on another task never sees a half-written dashboard.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Arc<watch::Sender<DashboardState>>,
}

impl ChannelSink {
    pub fn new() -> (Self, watch::Receiver<DashboardState>) {
        let (tx, rx) = watch::channel(DashboardState::default());
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.tx.subscribe()
    }
}

impl DisplaySink for ChannelSink {
    fn publish(&self, snapshot: &Arc<Snapshot>) {
        self.tx.send_modify(|state| {
            state.last = Some(Arc::clone(snapshot));
            state.transient_error = None;
            state.published += 1;
        });
    }

    fn report_error(&self, err: &MonitorError) {
        let error = TransientError {
            kind: err.kind(),
            message: err.to_string(),
            at: Utc::now(),
        };
        self.tx.send_modify(|state| state.transient_error = Some(error));
    }
}
