use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::Classifier;
use crate::display::DisplaySink;

use super::loop_worker::{monitor_loop, Monitor};
use super::tracker::RetainedState;
use super::ReadingRepository;

/// Owns the background polling task.
pub struct MonitorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    retained_rx: Option<watch::Receiver<Option<RetainedState>>>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            retained_rx: None,
        }
    }

    pub fn start<R, C, S>(&mut self, monitor: Monitor<R, C, S>) -> Result<()>
    where
        R: ReadingRepository + 'static,
        C: Classifier + 'static,
        S: DisplaySink + 'static,
    {
        if self.handle.is_some() {
            bail!("monitor already running");
        }

        info!(
            "Starting monitor: fetch_limit={}, poll_interval={}ms",
            monitor.settings().fetch_limit,
            monitor.settings().poll_interval.as_millis()
        );

        let cancel_token = CancellationToken::new();
        self.retained_rx = Some(monitor.tracker().subscribe());
        self.handle = Some(tokio::spawn(monitor_loop(monitor, cancel_token.clone())));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Last definitive classification seen by the running (or last) monitor.
    pub fn retained(&self) -> Option<RetainedState> {
        self.retained_rx.as_ref().and_then(|rx| *rx.borrow())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("monitor loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for MonitorController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::Category;
    use crate::monitor::loop_worker::MonitorSettings;
    use crate::monitor::testing::{reading, RecordingSink, ScriptedRepo, TableClassifier};

    fn monitor(
        repo: &Arc<ScriptedRepo>,
    ) -> Monitor<Arc<ScriptedRepo>, TableClassifier, Arc<RecordingSink>> {
        Monitor::new(
            Arc::clone(repo),
            TableClassifier::new(&[(16, Category::Normal)]),
            Arc::new(RecordingSink::default()),
            MonitorSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_lifecycle() {
        let repo = Arc::new(ScriptedRepo::default());
        repo.push_batch(vec![reading(4, 16, None)]);

        let mut controller = MonitorController::new();
        controller.start(monitor(&repo)).unwrap();
        assert!(controller.is_running());
        assert!(controller.start(monitor(&repo)).is_err());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(controller.retained().unwrap().category, Category::Normal);

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
        // Retained state outlives the loop.
        assert_eq!(controller.retained().unwrap().category, Category::Normal);

        controller.start(monitor(&repo)).unwrap();
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_ok() {
        let mut controller = MonitorController::new();
        controller.stop().await.unwrap();
    }
}
