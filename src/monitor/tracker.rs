use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::db::{Category, Reading};

/// The last reading that carried a definitive classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetainedState {
    pub stored_rate: u32,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

/// Holds the last known clinical status so the alert does not drop back to
/// neutral when a poll has no fresh label.
///
/// The tracker owns the only sender; readers get a `watch::Receiver` and see
/// whole values only. Nothing ever clears the state.
pub struct LastValidTracker {
    tx: watch::Sender<Option<RetainedState>>,
}

impl LastValidTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Returns whether the retained state changed.
    pub fn observe(&mut self, reading: &Reading) -> bool {
        let Some(category) = reading.prediction else {
            return false;
        };

        self.tx.send_replace(Some(RetainedState {
            stored_rate: reading.stored_count_60s,
            category,
            timestamp: reading.timestamp,
        }));
        true
    }

    pub fn current(&self) -> Option<RetainedState> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RetainedState>> {
        self.tx.subscribe()
    }
}

impl Default for LastValidTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{reading, ts};

    #[test]
    fn starts_empty() {
        assert_eq!(LastValidTracker::new().current(), None);
    }

    #[test]
    fn definitive_reading_overwrites() {
        let mut tracker = LastValidTracker::new();
        assert!(tracker.observe(&reading(6, 14, Some(Category::Tachypnea))));
        assert_eq!(
            tracker.current(),
            Some(RetainedState {
                stored_rate: 14,
                category: Category::Tachypnea,
                timestamp: ts(6),
            })
        );

        assert!(tracker.observe(&reading(7, 16, Some(Category::Normal))));
        assert_eq!(tracker.current().unwrap().category, Category::Normal);
    }

    #[test]
    fn never_resets_once_definitive() {
        let mut tracker = LastValidTracker::new();
        tracker.observe(&reading(6, 14, Some(Category::Tachypnea)));
        let held = tracker.current();

        for id in 7..20 {
            assert!(!tracker.observe(&reading(id, 0, None)));
            assert_eq!(tracker.current(), held);
        }
    }

    #[test]
    fn subscribers_see_updates() {
        let mut tracker = LastValidTracker::new();
        let rx = tracker.subscribe();
        assert_eq!(*rx.borrow(), None);

        tracker.observe(&reading(2, 8, Some(Category::Bradypnea)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().unwrap().category, Category::Bradypnea);
    }
}
