use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::classifier::Classifier;
use crate::display::DisplaySink;
use crate::error::MonitorError;

use super::{
    backfill::{BackfillReport, Backfiller},
    snapshot::Snapshot,
    tracker::{LastValidTracker, RetainedState},
    FetchedBatch, ReadingRepository,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub fetch_limit: usize,
    pub poll_interval: Duration,
    pub iteration_timeout: Duration,
    pub window_secs: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 20,
            poll_interval: Duration::from_secs(1),
            iteration_timeout: Duration::from_secs(10),
            window_secs: 60,
        }
    }
}

#[derive(Debug)]
pub enum IterationOutcome {
    /// The repository returned no readings; nothing was published.
    Empty,
    Published {
        snapshot: Arc<Snapshot>,
        backfill: BackfillReport,
    },
}

/// Everything one polling iteration needs, owned by the loop task.
pub struct Monitor<R, C, S> {
    repo: R,
    classifier: C,
    sink: S,
    settings: MonitorSettings,
    backfiller: Backfiller,
    tracker: LastValidTracker,
}

impl<R, C, S> Monitor<R, C, S>
where
    R: ReadingRepository,
    C: Classifier,
    S: DisplaySink,
{
    pub fn new(repo: R, classifier: C, sink: S, settings: MonitorSettings) -> Self {
        Self {
            backfiller: Backfiller::new(settings.window_secs),
            tracker: LastValidTracker::new(),
            repo,
            classifier,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn retained(&self) -> Option<RetainedState> {
        self.tracker.current()
    }

    pub fn tracker(&self) -> &LastValidTracker {
        &self.tracker
    }

    /// Fetch, backfill, track, publish. Errors are returned rather than
    /// reported so the caller decides how the iteration ends.
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome, MonitorError> {
        let FetchedBatch {
            mut readings,
            rejected,
        } = self.repo.fetch_recent(self.settings.fetch_limit).await?;

        for err in &rejected {
            log_warn!("dropping record: {err}");
        }

        if readings.is_empty() {
            for err in &rejected {
                self.sink.report_error(err);
            }
            return Ok(IterationOutcome::Empty);
        }

        let backfill = self
            .backfiller
            .backfill(&mut readings, &self.repo, &self.classifier)
            .await;

        if let Some(newest) = readings.first() {
            if self.tracker.observe(newest) {
                log_debug!("retained state now {:?}", self.tracker.current());
            }
        }

        let Some(snapshot) = Snapshot::assemble(readings, self.tracker.current(), rejected.len())
        else {
            return Ok(IterationOutcome::Empty);
        };
        let snapshot = Arc::new(snapshot);
        self.sink.publish(&snapshot);

        // Publish first so a failed write-back never hides the fresh label.
        for err in rejected.iter().chain(&backfill.failures) {
            self.sink.report_error(err);
        }

        Ok(IterationOutcome::Published { snapshot, backfill })
    }

    /// One bounded iteration; every failure is reported and swallowed here.
    pub async fn tick(&mut self) {
        let started = Instant::now();
        let timeout = self.settings.iteration_timeout;

        match tokio::time::timeout(timeout, self.run_iteration()).await {
            Ok(Ok(IterationOutcome::Published { snapshot, backfill })) => log_debug!(
                "published {} readings (classified {}, persisted {}) in {}ms",
                snapshot.table.len(),
                backfill.classified,
                backfill.persisted,
                started.elapsed().as_millis()
            ),
            Ok(Ok(IterationOutcome::Empty)) => log_debug!("no readings yet"),
            Ok(Err(err)) => {
                log_error!("monitor iteration failed: {err}");
                self.sink.report_error(&err);
            }
            Err(_) => {
                log_warn!("monitor iteration timeout (> {}ms)", timeout.as_millis());
                self.sink.report_error(&MonitorError::Timeout(timeout));
            }
        }
    }
}

pub async fn monitor_loop<R, C, S>(mut monitor: Monitor<R, C, S>, cancel_token: CancellationToken)
where
    R: ReadingRepository,
    C: Classifier,
    S: DisplaySink,
{
    let mut ticker = tokio::time::interval(monitor.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!(
        "monitor loop started (limit {}, every {}ms)",
        monitor.settings.fetch_limit,
        monitor.settings.poll_interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = monitor.tick() => {}
                    _ = cancel_token.cancelled() => {
                        log_info!("monitor loop cancelled mid-iteration");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("monitor loop shutting down");
                break;
            }
        }
    }
}
