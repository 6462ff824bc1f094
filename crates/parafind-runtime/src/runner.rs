//! Batch runner: drives classification over a corpus.
//!
//! Batches are sequential. Within a batch a fixed pool of workers each run
//! classify → validate → persist → novel-category tracking for one prompt.
//! Stats are flushed after every batch, so an interrupted run loses at
//! most the counters of the batch in flight, never a stored row.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parafind_core::{RawClassification, RecordMeta, ValidationStats, UNKNOWN_CATEGORY};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::classifier::ClassifierClient;
use crate::config::BatchSettings;
use crate::context::RunContext;
use crate::corpus::Corpus;
use crate::store::StoreError;
use crate::usage::LlmUsage;
use crate::RuntimeError;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Resuming,
    ProcessingBatch { start: u64, end: u64 },
    Draining,
    Done,
    Interrupted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Resuming => write!(f, "resuming"),
            Self::ProcessingBatch { start, end } => write!(f, "processing_batch[{}..{})", start, end),
            Self::Draining => write!(f, "draining"),
            Self::Done => write!(f, "done"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Requests a graceful stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the runner between batches and while draining.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx: Arc::new(tx) }, ShutdownSignal { rx })
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if every handle
    /// was dropped without requesting it.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Prompts that reached the classifier (including fallbacks)
    pub processed: u64,

    /// Records stored as parallelizable
    pub parallelizable: u64,

    /// Prompts missing or too short
    pub skipped: u64,

    /// Tasks that outran the task timeout, panicked or hit a store error
    pub failed: u64,

    /// Prompts recorded as not parallelizable because the classifier gave up
    pub fallbacks: u64,

    /// Accepted records per known category
    pub categories: BTreeMap<String, u64>,

    /// Accepted records per novel category
    pub novel_categories: BTreeMap<String, u64>,

    pub final_state: RunState,

    /// Where the next run will start
    pub resume_position: u64,

    pub usage: LlmUsage,

    pub validation: ValidationStats,
}

/// What one worker reports back.
#[derive(Debug)]
struct TaskOutcome {
    parallelizable: bool,
    category: Option<String>,
    is_novel: bool,
    fallback: bool,
}

#[derive(Error, Debug)]
enum TaskError {
    #[error("worker pool closed")]
    PoolClosed,

    #[error("store write panicked: {0}")]
    Panicked(#[from] JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct Tally {
    processed: u64,
    parallelizable: u64,
    skipped: u64,
    failed: u64,
    fallbacks: u64,
    categories: BTreeMap<String, u64>,
    novel_categories: BTreeMap<String, u64>,
}

impl Tally {
    fn record(&mut self, outcome: TaskOutcome) {
        self.processed += 1;
        if outcome.fallback {
            self.fallbacks += 1;
        }
        if !outcome.parallelizable {
            return;
        }
        self.parallelizable += 1;

        let key = outcome.category.unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let counts = if outcome.is_novel {
            &mut self.novel_categories
        } else {
            &mut self.categories
        };
        *counts.entry(key).or_insert(0) += 1;
    }
}

/// Short random identifier for a processed prompt.
pub fn new_query_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Drives a corpus through the classifier and validator.
pub struct BatchRunner {
    corpus: Arc<dyn Corpus>,
    classifier: Arc<ClassifierClient>,
    context: Arc<RunContext>,
    settings: BatchSettings,
    state: RunState,
}

impl BatchRunner {
    pub fn new(
        corpus: Arc<dyn Corpus>,
        classifier: Arc<ClassifierClient>,
        context: Arc<RunContext>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            corpus,
            classifier,
            context,
            settings,
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process the corpus from the resume position to the end, or until
    /// `shutdown` fires.
    ///
    /// A batch that has started is always drained, and the task timeout only
    /// bounds how long a worker may run before it is counted as failed; the
    /// worker itself still finishes and persists. Resumption keys off the
    /// largest stored index, so an abandoned lower index would be skipped.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<RunSummary, RuntimeError> {
        self.transition(RunState::Resuming);

        let total = self.corpus.len();
        let mut position = self.context.resume_position()?;
        let batch_size = self.settings.size.max(1) as u64;
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tally = Tally::default();
        let mut interrupted = false;

        info!(
            prefix = self.context.prefix(),
            start = position,
            total,
            provider = self.classifier.provider_name(),
            "Starting run"
        );

        while position < total {
            if shutdown.is_shutdown() {
                interrupted = true;
                break;
            }

            let end = (position + batch_size).min(total);
            self.transition(RunState::ProcessingBatch { start: position, end });

            let mut tasks = JoinSet::new();
            for (index, record) in self.corpus.batch(position..end)? {
                let Some(prompt) = record.eligible_prompt(self.settings.min_prompt_chars) else {
                    tally.skipped += 1;
                    continue;
                };
                let prompt = prompt.to_string();
                let semaphore = semaphore.clone();
                let classifier = self.classifier.clone();
                let context = self.context.clone();
                let timeout = self.settings.task_timeout;

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (index, Err(TaskError::PoolClosed), false);
                    };
                    let work = process_prompt(classifier, context, index, prompt);
                    tokio::pin!(work);

                    tokio::select! {
                        result = &mut work => return (index, result, false),
                        _ = tokio::time::sleep(timeout) => {
                            warn!(index, ?timeout, "Task exceeded its timeout, letting it finish");
                        }
                    }
                    (index, work.await, true)
                });
            }

            let mut store_error: Option<StoreError> = None;
            let mut draining = false;

            loop {
                let joined = tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = shutdown.cancelled(), if !draining => {
                        draining = true;
                        interrupted = true;
                        self.transition(RunState::Draining);
                        info!(in_flight = tasks.len(), "Shutdown requested, draining batch");
                        continue;
                    }
                };
                let Some(joined) = joined else { break };

                let (index, result, overdue) = match joined {
                    Ok(task) => task,
                    Err(e) => {
                        warn!(error = %e, "Task panicked");
                        tally.failed += 1;
                        continue;
                    }
                };

                let mut failed = overdue;
                match result {
                    Ok(outcome) => {
                        if overdue {
                            info!(index, "Overdue task finished");
                        }
                        tally.record(outcome);
                    }
                    Err(TaskError::Store(e)) => {
                        error!(index, error = %e, "Store failure, stopping after this batch");
                        store_error.get_or_insert(e);
                        failed = true;
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Task failed");
                        failed = true;
                    }
                }
                if failed {
                    tally.failed += 1;
                }
            }

            position = end;

            if let Some(e) = store_error {
                self.transition(RunState::Draining);
                if let Err(flush_err) = self.context.flush() {
                    error!(error = %flush_err, "Final flush failed");
                }
                self.log_progress(position, total, &tally);
                self.transition(RunState::Interrupted);
                return Err(e.into());
            }

            self.context.flush()?;
            self.log_progress(position, total, &tally);

            if interrupted {
                break;
            }

            if position < total && !self.settings.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.delay) => {}
                    _ = shutdown.cancelled() => {
                        info!("Shutdown requested during batch delay");
                    }
                }
            }
        }

        if self.state != RunState::Draining {
            self.transition(RunState::Draining);
        }
        self.context.flush()?;

        let final_state = if interrupted {
            RunState::Interrupted
        } else {
            RunState::Done
        };

        let summary = RunSummary {
            processed: tally.processed,
            parallelizable: tally.parallelizable,
            skipped: tally.skipped,
            failed: tally.failed,
            fallbacks: tally.fallbacks,
            categories: tally.categories,
            novel_categories: tally.novel_categories,
            final_state,
            resume_position: self.context.resume_position()?,
            usage: self.classifier.usage(),
            validation: self.context.stats_snapshot(),
        };

        info!(
            processed = summary.processed,
            parallelizable = summary.parallelizable,
            skipped = summary.skipped,
            failed = summary.failed,
            fallbacks = summary.fallbacks,
            llm_calls = summary.usage.llm_calls,
            cost_usd = summary.usage.estimated_cost,
            "Run finished"
        );
        self.transition(final_state);

        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "Runner state change");
        self.state = next;
    }

    fn log_progress(&self, position: u64, total: u64, tally: &Tally) {
        let stats = self.context.stats_snapshot();
        info!(
            position,
            total,
            processed = tally.processed,
            parallelizable = tally.parallelizable,
            skipped = tally.skipped,
            failed = tally.failed,
            passed_validation = stats.passed_validation,
            failed_validation = stats.failed_validation,
            pass_rate = format!("{:.1}%", stats.pass_rate() * 100.0),
            "Batch complete"
        );
    }
}

/// Classify, validate and persist one prompt.
///
/// A classifier that gives up yields a not-parallelizable fallback record;
/// only store failures propagate. File writes run on the blocking pool.
async fn process_prompt(
    classifier: Arc<ClassifierClient>,
    context: Arc<RunContext>,
    index: u64,
    prompt: String,
) -> Result<TaskOutcome, TaskError> {
    let meta = RecordMeta::new(index, new_query_id(), prompt);

    let (raw, fallback) = match classifier.classify(&meta.prompt, index).await {
        Ok(raw) => (raw, false),
        Err(e) => {
            warn!(index, error = %e, "Classification failed, recording fallback");
            (RawClassification::fallback(&meta.prompt), true)
        }
    };

    let result = context.validate(&raw, meta);
    let result = tokio::task::spawn_blocking(move || {
        context.persist(&result)?;
        context.record_novel(&result)?;
        Ok::<_, StoreError>(result)
    })
    .await??;

    Ok(TaskOutcome {
        parallelizable: result.parallelizable,
        category: result.category,
        is_novel: result.is_novel_category,
        fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_id_shape() {
        let id = new_query_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_query_id(), new_query_id());
    }

    #[test]
    fn test_tally_splits_known_and_novel() {
        let mut tally = Tally::default();
        tally.record(TaskOutcome {
            parallelizable: true,
            category: Some("Translation".into()),
            is_novel: false,
            fallback: false,
        });
        tally.record(TaskOutcome {
            parallelizable: true,
            category: Some("Recipe Scaling".into()),
            is_novel: true,
            fallback: false,
        });
        tally.record(TaskOutcome {
            parallelizable: false,
            category: None,
            is_novel: false,
            fallback: true,
        });

        assert_eq!(tally.processed, 3);
        assert_eq!(tally.parallelizable, 2);
        assert_eq!(tally.fallbacks, 1);
        assert_eq!(tally.categories.get("Translation"), Some(&1));
        assert_eq!(tally.novel_categories.get("Recipe Scaling"), Some(&1));
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (handle, mut signal) = ShutdownSignal::channel();
        assert!(!signal.is_shutdown());

        handle.shutdown();
        signal.cancelled().await;
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::ProcessingBatch { start: 0, end: 100 }.to_string(), "processing_batch[0..100)");
        assert_eq!(RunState::Interrupted.to_string(), "interrupted");
    }
}
