use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::QueueConfig;

use super::catalog::CategoryCatalog;
use super::clock::{Clock, SystemClock};
use super::domain::{AssessmentId, AssessmentResponse, AutomationConfig};
use super::enrichment::{NoopEnricher, RiskEnricher};
use super::escalation::EscalationPolicy;
use super::notifications::NotificationService;
use super::orchestrator::{AutomationOrchestrator, ProcessingOutcome};
use super::queue::{run_claimed, AssessmentQueue, JobProcessor, QueueStatus};
use super::repository::{AutomationRepository, NotificationTransport, RepositoryError};
use super::stats::{automation_stats, AutomationStats};

/// Reply of the synchronous processing trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    pub analyses_created: usize,
    pub message: String,
}

/// Public facade of the automation pipeline: intake, synchronous trigger,
/// stats, and queue controls.
pub struct AutomationService<R, T> {
    repository: Arc<R>,
    orchestrator: Arc<AutomationOrchestrator<R, T>>,
    queue: Arc<AssessmentQueue>,
    processor: JobProcessor<R, T>,
    settings: QueueConfig,
    clock: Arc<dyn Clock>,
    trigger_sequence: AtomicU64,
}

impl<R, T> AutomationService<R, T>
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    /// Standard wiring: NR-01 catalog, standard escalation ladder, no
    /// enrichment, wall clock.
    pub fn new(repository: Arc<R>, transport: Arc<T>, settings: QueueConfig) -> Self {
        Self::with_components(
            repository,
            transport,
            settings,
            Arc::new(CategoryCatalog::standard()),
            EscalationPolicy::standard(),
            Arc::new(NoopEnricher),
            Arc::new(SystemClock),
        )
    }

    pub fn with_components(
        repository: Arc<R>,
        transport: Arc<T>,
        settings: QueueConfig,
        catalog: Arc<CategoryCatalog>,
        policy: EscalationPolicy,
        enricher: Arc<dyn RiskEnricher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifications = Arc::new(NotificationService::new(transport, policy));
        let orchestrator = Arc::new(AutomationOrchestrator::new(
            repository.clone(),
            catalog,
            notifications,
            enricher,
            clock.clone(),
        ));
        let queue = Arc::new(AssessmentQueue::new());
        let processor = JobProcessor::new(queue.clone(), orchestrator.clone(), settings.clone());

        Self {
            repository,
            orchestrator,
            queue,
            processor,
            settings,
            clock,
            trigger_sequence: AtomicU64::new(1),
        }
    }

    /// Intake for a completed questionnaire response: store and enqueue.
    ///
    /// Submitters never see downstream automation state; only a storage
    /// failure on the intake write itself surfaces as an error. Duplicate
    /// submissions are accepted and deduplicated.
    pub fn submit_assessment(&self, response: AssessmentResponse) -> Result<(), RepositoryError> {
        let id = response.id.clone();
        let company_id = response.company_id.clone();

        match self.repository.insert_response(response) {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                tracing::debug!(assessment_id = %id, "response already stored");
            }
            Err(error) => return Err(error),
        }

        let enqueued = self.queue.enqueue(id.clone(), company_id, self.clock.now());
        tracing::info!(assessment_id = %id, enqueued, "assessment response received");
        Ok(())
    }

    /// Synchronous trigger: enqueue the response and drive one processing
    /// attempt inline, returning what it produced.
    pub async fn trigger_processing(&self, assessment_id: &AssessmentId) -> TriggerOutcome {
        let response = match self.repository.fetch_response(assessment_id) {
            Ok(Some(response)) => response,
            Ok(None) => {
                return TriggerOutcome {
                    success: false,
                    log_id: None,
                    analyses_created: 0,
                    message: "assessment response not found".to_string(),
                };
            }
            Err(error) => {
                return TriggerOutcome {
                    success: false,
                    log_id: None,
                    analyses_created: 0,
                    message: error.to_string(),
                };
            }
        };

        let now = self.clock.now();
        self.queue
            .enqueue(assessment_id.clone(), response.company_id.clone(), now);

        let worker_id = u64::MAX - self.trigger_sequence.fetch_add(1, Ordering::Relaxed);
        let Some(item) = self.queue.claim_specific(assessment_id, worker_id, now) else {
            return TriggerOutcome {
                success: false,
                log_id: None,
                analyses_created: 0,
                message: "assessment response is already being processed".to_string(),
            };
        };

        let outcome = run_claimed(&self.orchestrator, &self.queue, &self.settings, item).await;
        match outcome {
            ProcessingOutcome::Completed(report) => TriggerOutcome {
                success: true,
                log_id: Some(report.log_id),
                analyses_created: report.analyses.len(),
                message: if report.action_planned {
                    "assessment processed; action plan generated".to_string()
                } else {
                    "assessment processed".to_string()
                },
            },
            ProcessingOutcome::Disabled => TriggerOutcome {
                success: false,
                log_id: None,
                analyses_created: 0,
                message: "automation disabled for this company".to_string(),
            },
            ProcessingOutcome::Deferred { until } => TriggerOutcome {
                success: false,
                log_id: None,
                analyses_created: 0,
                message: format!("processing deferred until {until}"),
            },
            ProcessingOutcome::Failed { error, .. } => TriggerOutcome {
                success: false,
                log_id: None,
                analyses_created: 0,
                message: error.to_string(),
            },
        }
    }

    pub fn stats(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AutomationStats, RepositoryError> {
        automation_stats(self.repository.as_ref(), company_id, from, to)
    }

    pub fn start_processing(&self) {
        self.processor.start();
    }

    pub async fn stop_processing(&self) {
        self.processor.stop().await;
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.processor.status()
    }

    pub fn mark_notification_read(&self, notification_id: &str) -> Result<bool, RepositoryError> {
        self.repository.mark_notification_read(notification_id)
    }

    /// Upsert a company's automation config and drop the cached copy so
    /// the next dispatch sees the change.
    pub fn upsert_automation_config(
        &self,
        config: AutomationConfig,
    ) -> Result<(), RepositoryError> {
        let company_id = config.company_id.clone();
        self.repository.upsert_automation_config(config)?;
        self.orchestrator.invalidate_config(&company_id);
        Ok(())
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }
}
