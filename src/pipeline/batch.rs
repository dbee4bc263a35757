//! Bounded batch alignment with a per-item timeout.
//!
//! Each item runs on its own detached thread and at most `workers` items
//! count as in flight. An item's deadline starts when its thread starts.
//! An expired item is reported as a timeout and stops counting against the
//! limit, so the next queued item starts right away; the abandoned thread
//! finishes in the background and its result is dropped. One item failing,
//! panicking or timing out never affects the others.

use super::{AlignmentOutcome, AlignmentPipeline, RejectReason, RunStage};
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One image to align.
#[derive(Clone, Debug)]
pub enum CandidateSource {
    /// Loaded by the worker; load failures become rejections.
    Path(PathBuf),
    /// Already decoded.
    Memory { id: String, image: Arc<RgbImage> },
}

impl CandidateSource {
    /// Identifier reported in the outcome.
    pub fn id(&self) -> String {
        match self {
            CandidateSource::Path(path) => path.display().to_string(),
            CandidateSource::Memory { id, .. } => id.clone(),
        }
    }
}

/// Worker pool sizing and time limits.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Items in flight at once; `0` uses the available parallelism.
    pub workers: usize,
    /// Per-item limit measured from when a worker starts the item.
    pub timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl BatchConfig {
    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            thread::available_parallelism().map_or(1, |n| n.get())
        }
    }
}

/// Outcomes of a batch in input order.
#[derive(Clone, Debug)]
pub struct BatchReport {
    pub outcomes: Vec<AlignmentOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(AlignmentOutcome::is_success)
    }
}

enum Slot {
    Queued,
    Running(Option<Instant>),
    Done(AlignmentOutcome),
}

/// Aligns every item with at most `workers` in flight and returns outcomes
/// in input order.
pub fn align_batch(
    pipeline: Arc<AlignmentPipeline>,
    items: Vec<CandidateSource>,
    cfg: &BatchConfig,
) -> AlignResult<BatchReport> {
    let workers = cfg.worker_count();
    let _span = trace_span!("batch", items = items.len(), workers = workers).entered();

    let ids: Vec<String> = items.iter().map(CandidateSource::id).collect();
    let (tx, rx) = mpsc::channel::<(usize, AlignmentOutcome)>();
    let mut queue = items.into_iter().enumerate();
    let mut slots: Vec<Slot> = ids.iter().map(|_| Slot::Queued).collect();
    let mut remaining = slots.len();
    let mut in_flight = 0usize;

    while remaining > 0 {
        while in_flight < workers {
            let Some((index, item)) = queue.next() else {
                break;
            };
            spawn_item(index, item, &pipeline, &tx)?;
            slots[index] = Slot::Running(cfg.timeout.map(|limit| Instant::now() + limit));
            in_flight += 1;
        }

        let next_deadline = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Running(deadline) => *deadline,
                _ => None,
            })
            .min();
        let received = match next_deadline {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok((index, outcome)) => {
                // Results of items that already timed out are dropped.
                if let Slot::Running(_) = slots[index] {
                    slots[index] = Slot::Done(outcome);
                    in_flight -= 1;
                    remaining -= 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                for (index, slot) in slots.iter_mut().enumerate() {
                    if let Slot::Running(Some(deadline)) = slot {
                        if *deadline <= now {
                            let after = cfg.timeout.unwrap_or_default();
                            trace_event!("item_timeout", index = index);
                            *slot = Slot::Done(AlignmentOutcome::reject(
                                &ids[index],
                                RunStage::Loading,
                                RejectReason::Timeout { after },
                            ));
                            in_flight -= 1;
                            remaining -= 1;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let outcomes: Vec<AlignmentOutcome> = slots
        .into_iter()
        .zip(&ids)
        .map(|(slot, id)| match slot {
            Slot::Done(outcome) => outcome,
            Slot::Queued | Slot::Running(_) => AlignmentOutcome::reject(
                id,
                RunStage::Loading,
                RejectReason::Failed {
                    reason: "worker exited without a result".into(),
                },
            ),
        })
        .collect();
    let report = BatchReport { outcomes };
    trace_event!(
        "batch_done",
        succeeded = report.succeeded(),
        rejected = report.rejected()
    );
    Ok(report)
}

/// Runs one item on its own detached thread.
fn spawn_item(
    index: usize,
    item: CandidateSource,
    pipeline: &Arc<AlignmentPipeline>,
    tx: &Sender<(usize, AlignmentOutcome)>,
) -> AlignResult<()> {
    let pipeline = Arc::clone(pipeline);
    let tx = tx.clone();
    thread::Builder::new()
        .name(format!("roialign-batch-{index}"))
        .spawn(move || {
            let outcome = run_item(&pipeline, &item);
            let _ = tx.send((index, outcome));
        })
        .map(|_| ())
        .map_err(|err| AlignError::WorkerPool(err.to_string()))
}

fn run_item(pipeline: &AlignmentPipeline, item: &CandidateSource) -> AlignmentOutcome {
    let id = item.id();
    let result = panic::catch_unwind(AssertUnwindSafe(|| match item {
        CandidateSource::Path(path) => pipeline.align_path(path),
        CandidateSource::Memory { id, image } => pipeline.align(id, image),
    }));
    let reason = match result {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(err)) => err.to_string(),
        Err(_) => "worker panicked".to_string(),
    };
    AlignmentOutcome::reject(&id, RunStage::Loading, RejectReason::Failed { reason })
}
