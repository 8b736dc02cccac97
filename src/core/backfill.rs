//! Batch (re)classification of the entity population.
//!
//! A management operation, not part of the live scheduling path. Runs the
//! classifier over unclassified entities in bounded batches, persists each
//! result and ranks every class afterwards. Failures are itemized in the
//! report; a bad entity or batch never aborts the run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackfillConfig;
use crate::core::classifier::{ClassificationResult, Classifier};
use crate::core::error::EngineError;
use crate::core::notify::{deliver, EngineEvent, NotificationSink};
use crate::core::store::EntityStore;
use crate::core::types::{Entity, EntityId, PriorityClass};
use crate::util::clock;

type Classified = (EntityId, Result<Option<ClassificationResult>, EngineError>);

/// Which entities a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillMode {
    /// Only entities never evaluated.
    Unclassified,
    /// Every entity, replacing each classification in place.
    Reclassify,
}

/// One itemized failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// 1-based batch number; 0 for work outside any batch.
    pub batch: usize,
    /// Entity concerned, when the failure is per entity.
    pub entity_id: Option<EntityId>,
    /// What went wrong.
    pub message: String,
}

/// Result of a backfill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// True when no errors were recorded.
    pub success: bool,
    /// Mode of the run.
    pub mode: BackfillMode,
    /// Batches fetched.
    pub batches: usize,
    /// Entities fetched and evaluated.
    pub processed: usize,
    /// Entities assigned a class.
    pub classified: usize,
    /// Entities below the viability floor.
    pub not_viable: usize,
    /// Entities skipped by validation.
    pub skipped: usize,
    /// Classified entities per class.
    pub per_class: BTreeMap<PriorityClass, usize>,
    /// Itemized failures.
    pub errors: Vec<BatchError>,
    /// Whether the safety cap stopped the run.
    pub capped: bool,
    /// Wall time of the run, milliseconds.
    pub elapsed_ms: u128,
}

impl BackfillReport {
    fn new(mode: BackfillMode) -> Self {
        Self {
            success: false,
            mode,
            batches: 0,
            processed: 0,
            classified: 0,
            not_viable: 0,
            skipped: 0,
            per_class: BTreeMap::new(),
            errors: Vec::new(),
            capped: false,
            elapsed_ms: 0,
        }
    }

    fn error(&mut self, batch: usize, entity_id: Option<EntityId>, error: &EngineError) {
        self.errors.push(BatchError { batch, entity_id, message: error.to_string() });
    }
}

/// Clears the in-progress flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Backfill driver. One run at a time per job.
pub struct BackfillJob {
    classifier: Classifier,
    entities: Arc<dyn EntityStore>,
    notifier: Arc<dyn NotificationSink>,
    config: BackfillConfig,
    utc_offset_minutes: i32,
    running: AtomicBool,
}

impl BackfillJob {
    /// Create a job.
    pub fn new(
        classifier: Classifier,
        entities: Arc<dyn EntityStore>,
        notifier: Arc<dyn NotificationSink>,
        config: BackfillConfig,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            classifier,
            entities,
            notifier,
            config,
            utc_offset_minutes,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn workers(&self) -> usize {
        if self.config.workers == 0 {
            num_cpus::get()
        } else {
            self.config.workers
        }
    }

    /// Run a backfill. Fails only with [`EngineError::BackfillInProgress`];
    /// every other failure is itemized in the report.
    pub fn run(&self, mode: BackfillMode, now: DateTime<Utc>) -> Result<BackfillReport, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(?mode, "backfill rejected: another run is in progress");
            return Err(EngineError::BackfillInProgress);
        }
        let _guard = RunGuard(&self.running);
        let started = clock::now_ms();
        let as_of = clock::local_day(now, self.utc_offset_minutes);
        let mut report = BackfillReport::new(mode);
        tracing::info!(?mode, %as_of, "backfill started");

        // Reclassify walks ids in order and overwrites each entity in place,
        // so anything past the safety cap keeps its current class.
        let mut cursor: Option<EntityId> = None;
        loop {
            let budget = self.config.max_entities.saturating_sub(report.processed);
            if budget == 0 {
                report.capped = true;
                tracing::warn!(max = self.config.max_entities, ?cursor, "backfill stopped at safety cap");
                break;
            }
            let batch_no = report.batches + 1;
            let limit = self.config.batch_size.min(budget);
            let fetched = match mode {
                BackfillMode::Unclassified => self.entities.fetch_unclassified(limit),
                BackfillMode::Reclassify => self.entities.fetch_after(cursor, limit),
            };
            let batch = match fetched {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(batch = batch_no, error = %e, "fetch failed, stopping run");
                    report.error(batch_no, None, &e);
                    break;
                }
            };
            report.batches = batch_no;
            report.processed += batch.len();
            cursor = batch.last().map(|e| e.id);
            let written = self.persist(batch_no, self.classify_all(batch, as_of), now, &mut report);
            if written == 0 {
                tracing::error!(batch = batch_no, "no result in batch could be written, stopping run");
                break;
            }
        }

        for class in PriorityClass::ALL {
            if let Err(e) = self.entities.rank_class(class) {
                tracing::warn!(%class, error = %e, "ranking failed");
                report.error(0, None, &e);
            }
        }
        Ok(self.finish(report, started))
    }

    fn finish(&self, mut report: BackfillReport, started: u128) -> BackfillReport {
        report.success = report.errors.is_empty();
        report.elapsed_ms = clock::now_ms().saturating_sub(started);
        tracing::info!(
            success = report.success,
            processed = report.processed,
            classified = report.classified,
            errors = report.errors.len(),
            "backfill finished"
        );
        deliver(
            self.notifier.as_ref(),
            &EngineEvent::BackfillCompleted { processed: report.processed, errors: report.errors.len() },
        );
        report
    }

    /// Write results; returns how many entities were written.
    fn persist(
        &self,
        batch_no: usize,
        results: Vec<Classified>,
        now: DateTime<Utc>,
        report: &mut BackfillReport,
    ) -> usize {
        let mut written = 0;
        for (id, outcome) in results {
            let (result, skipped) = match outcome {
                Ok(result) => (result, false),
                Err(e) => {
                    tracing::warn!(entity_id = id, error = %e, "entity skipped");
                    report.error(batch_no, Some(id), &e);
                    // Recorded as evaluated so the next fetch moves past it.
                    (None, true)
                }
            };
            let top = result.as_ref().map(|r| (r.class, r.expected_value.total));
            if let Err(e) = self.entities.update_classification(id, result, now) {
                tracing::warn!(entity_id = id, error = %e, "classification write failed");
                report.error(batch_no, Some(id), &e);
                continue;
            }
            written += 1;
            match top {
                Some((class, expected_value)) => {
                    report.classified += 1;
                    *report.per_class.entry(class).or_default() += 1;
                    if class.is_top() {
                        deliver(
                            self.notifier.as_ref(),
                            &EngineEvent::TopTierClassified { entity_id: id, expected_value },
                        );
                    }
                }
                None if skipped => report.skipped += 1,
                None => report.not_viable += 1,
            }
        }
        written
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn classify_all(&self, batch: Vec<Entity>, as_of: NaiveDate) -> Vec<Classified> {
        let workers = self.workers().min(batch.len());
        if workers <= 1 {
            return self.classify_sequential(&batch, as_of);
        }
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Entity>(batch.len());
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<Classified>();
        for entity in batch {
            if task_tx.send(entity).is_err() {
                break;
            }
        }
        drop(task_tx);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tasks = task_rx.clone();
                let results = result_tx.clone();
                let classifier = &self.classifier;
                scope.spawn(move || {
                    for entity in tasks.iter() {
                        let outcome = classifier.classify_entity(&entity, as_of);
                        if results.send((entity.id, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);
        let mut results: Vec<Classified> = result_rx.iter().collect();
        results.sort_by_key(|(id, _)| *id);
        results
    }

    #[cfg(target_arch = "wasm32")]
    fn classify_all(&self, batch: Vec<Entity>, as_of: NaiveDate) -> Vec<Classified> {
        self.classify_sequential(&batch, as_of)
    }

    fn classify_sequential(&self, batch: &[Entity], as_of: NaiveDate) -> Vec<Classified> {
        batch
            .iter()
            .map(|e| (e.id, self.classifier.classify_entity(e, as_of)))
            .collect()
    }

    /// Classify one entity on the live path and re-rank the affected classes.
    pub fn classify_one(&self, id: EntityId, now: DateTime<Utc>) -> Result<Option<ClassificationResult>, EngineError> {
        let entity = self.entities.get(id)?.ok_or(EngineError::UnknownEntity(id))?;
        let previous = entity.class();
        let as_of = clock::local_day(now, self.utc_offset_minutes);
        let result = self.classifier.classify_entity(&entity, as_of)?;
        self.entities.update_classification(id, result.clone(), now)?;
        let current = result.as_ref().map(|r| r.class);
        for class in [previous, current].into_iter().flatten() {
            self.entities.rank_class(class)?;
        }
        if let Some(r) = result.as_ref().filter(|r| r.class.is_top()) {
            tracing::info!(entity_id = id, expected_value = %r.expected_value.total, "top-tier entity classified");
            deliver(
                self.notifier.as_ref(),
                &EngineEvent::TopTierClassified { entity_id: id, expected_value: r.expected_value.total },
            );
        }
        Ok(result)
    }
}
