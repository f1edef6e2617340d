use std::collections::{HashMap, HashSet};

use crate::classifier::Classifier;
use crate::db::{Category, Reading};
use crate::error::MonitorError;

use super::ReadingRepository;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Readings that went through the classifier and came back definitive.
    pub classified: usize,
    /// Classifications written back to the repository in this pass.
    pub persisted: usize,
    /// Readings labelled from an earlier, already persisted classification.
    pub from_cache: usize,
    /// Unlabelled readings for which no category was produced (zero rate).
    pub unclassified: usize,
    pub failures: Vec<MonitorError>,
}

/// Fills in missing classifications and writes them back.
///
/// Remembers which ids it has already persisted so a stale or repeated batch
/// does not trigger a second write. Ids whose write failed are not remembered
/// and get reclassified on the next pass.
pub struct Backfiller {
    window_secs: u32,
    persisted: HashMap<i64, Category>,
}

impl Backfiller {
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs,
            persisted: HashMap::new(),
        }
    }

    pub async fn backfill<R, C>(
        &mut self,
        batch: &mut [Reading],
        repo: &R,
        classifier: &C,
    ) -> BackfillReport
    where
        R: ReadingRepository + ?Sized,
        C: Classifier + ?Sized,
    {
        let mut report = BackfillReport::default();
        let mut this_pass: HashMap<i64, Option<Category>> = HashMap::new();

        for reading in batch.iter_mut() {
            if reading.prediction.is_some() {
                // Upstream has the label now; nothing left to remember.
                self.persisted.remove(&reading.id);
                continue;
            }

            if let Some(result) = this_pass.get(&reading.id) {
                reading.prediction = *result;
                continue;
            }

            if let Some(label) = self.persisted.get(&reading.id) {
                reading.prediction = Some(*label);
                report.from_cache += 1;
                this_pass.insert(reading.id, Some(*label));
                continue;
            }

            let label = match classifier.classify(self.window_secs, reading.stored_count_60s) {
                Ok(Some(label)) => label,
                Ok(None) => {
                    log_debug!(
                        "reading {} has stored rate {}, no classification",
                        reading.id,
                        reading.stored_count_60s
                    );
                    report.unclassified += 1;
                    this_pass.insert(reading.id, None);
                    continue;
                }
                Err(err) => {
                    log_warn!("classification failed for reading {}: {err}", reading.id);
                    report.failures.push(err);
                    this_pass.insert(reading.id, None);
                    continue;
                }
            };

            report.classified += 1;
            reading.prediction = Some(label);
            this_pass.insert(reading.id, Some(label));

            match repo.update_classification(reading.id, label).await {
                Ok(()) => {
                    self.persisted.insert(reading.id, label);
                    report.persisted += 1;
                }
                Err(err) => {
                    log_warn!("{err}; will retry on the next poll");
                    report.failures.push(err);
                }
            }
        }

        let live: HashSet<i64> = batch.iter().map(|r| r.id).collect();
        self.persisted.retain(|id, _| live.contains(id));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{reading, ScriptedRepo, TableClassifier};

    fn classifier() -> TableClassifier {
        TableClassifier::new(&[
            (8, Category::Bradypnea),
            (14, Category::Tachypnea),
            (16, Category::Normal),
        ])
    }

    #[tokio::test]
    async fn zero_rate_gets_no_label_and_no_update() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let mut batch = vec![reading(5, 0, None)];

        let report = backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(batch[0].prediction, None);
        assert_eq!(report.unclassified, 1);
        assert!(repo.updates().is_empty());
    }

    #[tokio::test]
    async fn labelled_readings_are_skipped() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let mut batch = vec![
            reading(3, 16, Some(Category::Normal)),
            reading(2, 8, Some(Category::Bradypnea)),
        ];

        backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(classifier.call_count(), 0);
        assert!(repo.updates().is_empty());
    }

    #[tokio::test]
    async fn classifies_and_persists_missing_labels() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let mut batch = vec![reading(6, 14, None), reading(4, 16, None)];

        let report = backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(batch[0].prediction, Some(Category::Tachypnea));
        assert_eq!(batch[1].prediction, Some(Category::Normal));
        assert_eq!(report.classified, 2);
        assert_eq!(report.persisted, 2);
        assert_eq!(
            repo.updates(),
            vec![(6, Category::Tachypnea), (4, Category::Normal)]
        );
    }

    #[tokio::test]
    async fn repeated_pass_writes_each_id_once() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let original = vec![reading(6, 14, None), reading(5, 0, None), reading(4, 16, None)];

        let mut first = original.clone();
        backfiller.backfill(&mut first, &repo, &classifier).await;
        let mut retried = original.clone();
        let report = backfiller.backfill(&mut retried, &repo, &classifier).await;

        assert_eq!(report.from_cache, 2);
        assert_eq!(first, retried);
        assert_eq!(repo.updates().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_batch_are_classified_once() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let mut batch = vec![reading(6, 14, None), reading(6, 14, None)];

        backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(classifier.call_count(), 1);
        assert_eq!(repo.updates(), vec![(6, Category::Tachypnea)]);
        assert_eq!(batch[1].prediction, Some(Category::Tachypnea));
    }

    #[tokio::test]
    async fn failed_write_keeps_label_and_retries_next_pass() {
        let repo = ScriptedRepo::default();
        repo.fail_updates_for(7);
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);

        let mut batch = vec![reading(7, 16, None), reading(6, 14, None)];
        let report = backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(batch[0].prediction, Some(Category::Normal));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind(), "PersistenceFailure");
        // The rest of the batch is still written.
        assert_eq!(repo.updates(), vec![(6, Category::Tachypnea)]);

        repo.heal_updates();
        let mut again = vec![reading(7, 16, None)];
        let report = backfiller.backfill(&mut again, &repo, &classifier).await;

        assert_eq!(report.classified, 1);
        assert_eq!(again[0].prediction, Some(Category::Normal));
        assert_eq!(
            repo.updates(),
            vec![(6, Category::Tachypnea), (7, Category::Normal)]
        );
    }

    #[tokio::test]
    async fn classifier_failure_does_not_stop_the_batch() {
        let repo = ScriptedRepo::default();
        let classifier = classifier();
        let mut backfiller = Backfiller::new(60);
        let mut batch = vec![reading(9, 99, None), reading(8, 16, None)];

        let report = backfiller.backfill(&mut batch, &repo, &classifier).await;

        assert_eq!(batch[0].prediction, None);
        assert_eq!(batch[1].prediction, Some(Category::Normal));
        assert_eq!(report.failures[0].kind(), "ClassifierUnavailable");
    }
}
