use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;

use super::domain::AssessmentId;
use super::orchestrator::{AutomationOrchestrator, ProcessingError, ProcessingOutcome};
use super::repository::{AutomationRepository, NotificationTransport};

/// Exclusive claim a worker holds on one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub worker_id: u64,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    Pending,
    Processing,
    Completed,
    /// Retries exhausted (or the failure was not retryable); the item is
    /// excluded from every future dequeue.
    Failed,
}

/// One unit of background work: process a single completed response.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub assessment_response_id: AssessmentId,
    pub company_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub state: WorkItemState,
    pub lease: Option<Lease>,
    pub next_attempt_at: DateTime<Utc>,
}

/// How a failed attempt was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailDisposition {
    Retrying {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    Exhausted {
        attempts: u32,
    },
}

/// Durable-queue stand-in: a table of work items guarded by one lock so
/// that claiming is an atomic conditional update.
///
/// The lease is the single most important invariant here: an item in
/// `Processing` belongs to exactly one worker until that worker settles
/// it.
#[derive(Default)]
pub struct AssessmentQueue {
    items: Mutex<Vec<WorkItem>>,
}

impl AssessmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a response for processing. Duplicate enqueues of an item
    /// that is still pending, leased, or already settled are ignored.
    pub fn enqueue(
        &self,
        assessment_response_id: AssessmentId,
        company_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        if items
            .iter()
            .any(|item| item.assessment_response_id == assessment_response_id)
        {
            return false;
        }
        items.push(WorkItem {
            assessment_response_id,
            company_id: company_id.into(),
            enqueued_at: now,
            attempts: 0,
            state: WorkItemState::Pending,
            lease: None,
            next_attempt_at: now,
        });
        true
    }

    /// Claim the first due pending item: conditional state flip to
    /// `Processing` plus a lease, all under the queue lock.
    pub fn claim(&self, worker_id: u64, now: DateTime<Utc>) -> Option<WorkItem> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        let item = items
            .iter_mut()
            .filter(|item| item.state == WorkItemState::Pending && item.next_attempt_at <= now)
            .min_by_key(|item| item.next_attempt_at)?;

        item.state = WorkItemState::Processing;
        item.lease = Some(Lease {
            worker_id,
            claimed_at: now,
        });
        Some(item.clone())
    }

    /// Claim one specific item for the synchronous trigger path. Settled
    /// items may be re-claimed (operators re-running or manually retrying
    /// a response); a live lease is never stolen.
    pub fn claim_specific(
        &self,
        assessment_response_id: &AssessmentId,
        worker_id: u64,
        now: DateTime<Utc>,
    ) -> Option<WorkItem> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        let item = items.iter_mut().find(|item| {
            &item.assessment_response_id == assessment_response_id
                && item.state != WorkItemState::Processing
        })?;

        item.state = WorkItemState::Processing;
        item.lease = Some(Lease {
            worker_id,
            claimed_at: now,
        });
        Some(item.clone())
    }

    pub fn complete(&self, assessment_response_id: &AssessmentId) {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        if let Some(item) = items
            .iter_mut()
            .find(|item| &item.assessment_response_id == assessment_response_id)
        {
            item.state = WorkItemState::Completed;
            item.lease = None;
        }
    }

    /// Return a leased item to `Pending` without consuming an attempt,
    /// optionally deferring it (automation disabled / delay not elapsed).
    pub fn release(
        &self,
        assessment_response_id: &AssessmentId,
        next_attempt_at: Option<DateTime<Utc>>,
    ) {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        if let Some(item) = items
            .iter_mut()
            .find(|item| &item.assessment_response_id == assessment_response_id)
        {
            item.state = WorkItemState::Pending;
            item.lease = None;
            if let Some(at) = next_attempt_at {
                item.next_attempt_at = at;
            }
        }
    }

    /// Settle a failed attempt: requeue with exponential backoff while
    /// attempts remain and the failure is worth retrying, otherwise mark
    /// the item permanently failed.
    pub fn fail(
        &self,
        assessment_response_id: &AssessmentId,
        now: DateTime<Utc>,
        max_attempts: u32,
        backoff: std::time::Duration,
        retryable: bool,
    ) -> Option<FailDisposition> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        let item = items
            .iter_mut()
            .find(|item| &item.assessment_response_id == assessment_response_id)?;

        item.attempts += 1;
        item.lease = None;

        if !retryable || item.attempts >= max_attempts {
            item.state = WorkItemState::Failed;
            return Some(FailDisposition::Exhausted {
                attempts: item.attempts,
            });
        }

        let base = Duration::from_std(backoff).unwrap_or_else(|_| Duration::seconds(30));
        let exponent = (item.attempts - 1).min(10);
        let delay = base * (1i32 << exponent);
        item.state = WorkItemState::Pending;
        item.next_attempt_at = now + delay;
        Some(FailDisposition::Retrying {
            attempt: item.attempts,
            next_attempt_at: item.next_attempt_at,
        })
    }

    /// Items waiting for a worker (leased and settled items excluded).
    pub fn queue_length(&self) -> usize {
        let items = self.items.lock().expect("queue mutex poisoned");
        items
            .iter()
            .filter(|item| item.state == WorkItemState::Pending)
            .count()
    }

    pub fn item(&self, assessment_response_id: &AssessmentId) -> Option<WorkItem> {
        let items = self.items.lock().expect("queue mutex poisoned");
        items
            .iter()
            .find(|item| &item.assessment_response_id == assessment_response_id)
            .cloned()
    }
}

/// Snapshot returned by the `status()` control.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatus {
    pub is_processing: bool,
    pub active_jobs: usize,
    pub queue_length: usize,
}

/// Bounded worker pool polling the queue at a fixed interval.
///
/// `stop()` is cooperative: it stops dequeuing and lets in-flight jobs
/// finish. A per-job timeout bounds worst-case latency; the timed-out
/// attempt is settled as a transient failure.
pub struct JobProcessor<R, T> {
    queue: Arc<AssessmentQueue>,
    orchestrator: Arc<AutomationOrchestrator<R, T>>,
    settings: QueueConfig,
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<R, T> JobProcessor<R, T>
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    pub fn new(
        queue: Arc<AssessmentQueue>,
        orchestrator: Arc<AutomationOrchestrator<R, T>>,
        settings: QueueConfig,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(Notify::new()),
            dispatcher: Mutex::new(None),
        }
    }

    /// Start the dispatcher loop. Idempotent: a running processor stays
    /// running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let queue = self.queue.clone();
        let orchestrator = self.orchestrator.clone();
        let settings = self.settings.clone();
        let running = self.running.clone();
        let active = self.active.clone();
        let shutdown = self.shutdown.clone();
        let semaphore = Arc::new(Semaphore::new(settings.workers));

        let handle = tokio::spawn(async move {
            tracing::info!(
                workers = settings.workers,
                poll_ms = settings.poll_interval.as_millis() as u64,
                "assessment processor started"
            );
            let mut worker_sequence: u64 = 0;

            while running.load(Ordering::Acquire) {
                orchestrator.sweep_escalations();

                loop {
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        break;
                    };
                    let now = orchestrator.clock().now();
                    worker_sequence += 1;
                    let Some(item) = queue.claim(worker_sequence, now) else {
                        break;
                    };

                    active.fetch_add(1, Ordering::AcqRel);
                    let queue = queue.clone();
                    let orchestrator = orchestrator.clone();
                    let settings = settings.clone();
                    let active = active.clone();
                    tokio::spawn(async move {
                        run_claimed(&orchestrator, &queue, &settings, item).await;
                        active.fetch_sub(1, Ordering::AcqRel);
                        drop(permit);
                    });
                }

                tokio::select! {
                    _ = tokio::time::sleep(settings.poll_interval) => {}
                    _ = shutdown.notified() => {}
                }
            }

            tracing::info!("assessment processor stopped dequeuing");
        });

        *self.dispatcher.lock().expect("dispatcher mutex poisoned") = Some(handle);
    }

    /// Stop dequeuing and wait for the dispatcher to exit. In-flight jobs
    /// are not aborted.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
        let handle = self
            .dispatcher
            .lock()
            .expect("dispatcher mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::warn!(error = %error, "dispatcher exited abnormally");
            }
        }
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            is_processing: self.running.load(Ordering::Acquire),
            active_jobs: self.active.load(Ordering::Acquire),
            queue_length: self.queue.queue_length(),
        }
    }
}

/// Execute one claimed item and settle it back into the queue.
///
/// Shared by the worker pool and the synchronous trigger path so retry
/// accounting is identical in both.
pub(crate) async fn run_claimed<R, T>(
    orchestrator: &Arc<AutomationOrchestrator<R, T>>,
    queue: &Arc<AssessmentQueue>,
    settings: &QueueConfig,
    item: WorkItem,
) -> ProcessingOutcome
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    let attempt = item.attempts + 1;
    let assessment_id = item.assessment_response_id.clone();

    let task_orchestrator = orchestrator.clone();
    let task_id = assessment_id.clone();
    let processing = tokio::task::spawn_blocking(move || task_orchestrator.process(&task_id, attempt));

    let outcome = match tokio::time::timeout(settings.job_timeout, processing).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            // A panicking stage must not take the pool down.
            orchestrator.record_attempt_abort(
                &assessment_id,
                &item.company_id,
                attempt,
                ProcessingError::Aborted(join_error.to_string()),
            )
        }
        Err(_) => orchestrator.record_attempt_abort(
            &assessment_id,
            &item.company_id,
            attempt,
            ProcessingError::Timeout,
        ),
    };

    match &outcome {
        ProcessingOutcome::Completed(_) => queue.complete(&assessment_id),
        ProcessingOutcome::Disabled => queue.release(&assessment_id, None),
        ProcessingOutcome::Deferred { until } => queue.release(&assessment_id, Some(*until)),
        ProcessingOutcome::Failed { error, .. } => {
            let now = orchestrator.clock().now();
            let disposition = queue.fail(
                &assessment_id,
                now,
                settings.max_attempts,
                settings.retry_backoff,
                error.is_retryable(),
            );
            match disposition {
                Some(FailDisposition::Exhausted { attempts }) => {
                    orchestrator.record_permanent_failure(
                        &assessment_id,
                        &item.company_id,
                        &error.to_string(),
                    );
                    tracing::error!(
                        assessment_id = %assessment_id,
                        attempts,
                        "retries exhausted; item excluded from dequeue"
                    );
                }
                Some(FailDisposition::Retrying {
                    attempt,
                    next_attempt_at,
                }) => {
                    tracing::warn!(
                        assessment_id = %assessment_id,
                        attempt,
                        next_attempt_at = %next_attempt_at,
                        "attempt failed; requeued with backoff"
                    );
                }
                None => {}
            }
        }
    }

    outcome
}
