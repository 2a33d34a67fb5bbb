use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::analysis::RiskAnalysisBuilder;
use super::cache::TtlCache;
use super::catalog::CategoryCatalog;
use super::clock::Clock;
use super::domain::{
    ActionPlan, AssessmentId, AssessmentResponse, AutomationConfig, Notification, OrgContext,
    ProcessingLogEntry, ProcessingStage, ProcessingStatus, RiskAnalysis,
};
use super::enrichment::RiskEnricher;
use super::notifications::NotificationService;
use super::plans::ActionPlanGenerator;
use super::repository::{AutomationRepository, NotificationTransport, RepositoryError};
use super::scoring::{ScoringEngine, ScoringError};

static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_log_id() -> String {
    let id = LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("log-{id:06}")
}

const CONFIG_CACHE_TTL_SECONDS: i64 = 30;

/// Why a processing attempt ended the way it did.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("assessment response {0} not found")]
    ResponseNotFound(AssessmentId),
    #[error(transparent)]
    InvalidInput(#[from] ScoringError),
    #[error("all category analyses failed to persist")]
    AnalysisPersistFailed,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("processing attempt timed out")]
    Timeout,
    #[error("processing attempt aborted: {0}")]
    Aborted(String),
}

impl ProcessingError {
    /// Input errors never get better; infrastructure errors might.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::AnalysisPersistFailed
                | ProcessingError::Repository(_)
                | ProcessingError::Timeout
                | ProcessingError::Aborted(_)
        )
    }
}

/// Everything one successful attempt produced.
#[derive(Debug)]
pub struct ProcessingReport {
    pub assessment_response_id: AssessmentId,
    pub log_id: String,
    pub analyses: Vec<RiskAnalysis>,
    pub plans: Vec<ActionPlan>,
    pub notifications: Vec<Notification>,
    pub action_planned: bool,
}

/// Disposition of one processing attempt as seen by the queue.
#[derive(Debug)]
pub enum ProcessingOutcome {
    /// Automation is off (or unconfigured) for the company; the item goes
    /// back untouched, no attempt consumed, no log row written.
    Disabled,
    /// The company's processing delay has not elapsed yet.
    Deferred { until: DateTime<Utc> },
    Completed(ProcessingReport),
    Failed {
        stage: ProcessingStage,
        error: ProcessingError,
    },
}

/// Drives one assessment response through the pipeline stages:
/// scoring, analysis, conditional action planning, notification.
///
/// Every stage error is caught here and converted into a `Failed`
/// outcome; nothing propagates out of a worker as a panic.
pub struct AutomationOrchestrator<R, T> {
    repository: Arc<R>,
    scoring: ScoringEngine,
    builder: RiskAnalysisBuilder,
    generator: ActionPlanGenerator,
    notifications: Arc<NotificationService<T>>,
    enricher: Arc<dyn RiskEnricher>,
    clock: Arc<dyn Clock>,
    config_cache: TtlCache<String, AutomationConfig>,
}

impl<R, T> AutomationOrchestrator<R, T>
where
    R: AutomationRepository,
    T: NotificationTransport,
{
    pub fn new(
        repository: Arc<R>,
        catalog: Arc<CategoryCatalog>,
        notifications: Arc<NotificationService<T>>,
        enricher: Arc<dyn RiskEnricher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            scoring: ScoringEngine::new(catalog.clone()),
            builder: RiskAnalysisBuilder::new(catalog.clone()),
            generator: ActionPlanGenerator::new(catalog),
            notifications,
            enricher,
            clock,
            config_cache: TtlCache::new(Duration::seconds(CONFIG_CACHE_TTL_SECONDS)),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one processing attempt for a claimed queue item.
    pub fn process(&self, assessment_id: &AssessmentId, attempt: u32) -> ProcessingOutcome {
        let now = self.clock.now();

        let response = match self.repository.fetch_response(assessment_id) {
            Ok(Some(response)) => response,
            Ok(None) => {
                return self.fail(
                    assessment_id,
                    "",
                    attempt,
                    ProcessingStage::Scoring,
                    ProcessingError::ResponseNotFound(assessment_id.clone()),
                );
            }
            Err(error) => {
                return self.fail(
                    assessment_id,
                    "",
                    attempt,
                    ProcessingStage::Scoring,
                    ProcessingError::Repository(error),
                );
            }
        };

        let config = match self.config_for(&response.company_id) {
            Ok(Some(config)) if config.auto_process_enabled => config,
            Ok(_) => {
                tracing::debug!(
                    assessment_id = %assessment_id,
                    company_id = %response.company_id,
                    "automation disabled; leaving response pending"
                );
                return ProcessingOutcome::Disabled;
            }
            Err(error) => {
                return self.fail(
                    assessment_id,
                    &response.company_id,
                    attempt,
                    ProcessingStage::Scoring,
                    ProcessingError::Repository(error),
                );
            }
        };

        let ready_at = response.completed_at + config.processing_delay();
        if ready_at > now {
            return ProcessingOutcome::Deferred { until: ready_at };
        }

        tracing::info!(
            assessment_id = %assessment_id,
            company_id = %response.company_id,
            attempt,
            "processing assessment response"
        );

        // Scoring
        if let Err(error) = self.stage_log(&response, attempt, ProcessingStage::Scoring) {
            return self.fail(
                assessment_id,
                &response.company_id,
                attempt,
                ProcessingStage::Scoring,
                ProcessingError::Repository(error),
            );
        }
        let scores = match self.scoring.catalog().resolve_items(&response) {
            Ok(items) => self.scoring.score(&items),
            Err(error) => {
                return self.fail(
                    assessment_id,
                    &response.company_id,
                    attempt,
                    ProcessingStage::Scoring,
                    ProcessingError::InvalidInput(error),
                );
            }
        };

        // Analysis
        if let Err(error) = self.stage_log(&response, attempt, ProcessingStage::Analysis) {
            return self.fail(
                assessment_id,
                &response.company_id,
                attempt,
                ProcessingStage::Analysis,
                ProcessingError::Repository(error),
            );
        }
        let org = OrgContext::from_response(&response);
        let built = self.builder.build(&response, &scores, &org, now);

        // Re-runs and retried attempts reuse rows persisted earlier so a
        // response never accumulates duplicate analyses per category.
        let existing = match self.repository.analyses_for_response(assessment_id) {
            Ok(existing) => existing,
            Err(error) => {
                return self.fail(
                    assessment_id,
                    &response.company_id,
                    attempt,
                    ProcessingStage::Analysis,
                    ProcessingError::Repository(error),
                );
            }
        };
        let mut analyses = Vec::with_capacity(built.len());
        let mut fresh = Vec::new();
        for analysis in built {
            match existing.iter().find(|row| row.category == analysis.category) {
                Some(row) => analyses.push(row.clone()),
                None => fresh.push(self.enrich(analysis)),
            }
        }
        if !fresh.is_empty() {
            let outcome = self.builder.persist(self.repository.as_ref(), fresh);
            if analyses.is_empty() && outcome.all_failed() {
                return self.fail(
                    assessment_id,
                    &response.company_id,
                    attempt,
                    ProcessingStage::Analysis,
                    ProcessingError::AnalysisPersistFailed,
                );
            }
            analyses.extend(outcome.stored);
        }

        // Action plan
        if let Err(error) = self.stage_log(&response, attempt, ProcessingStage::ActionPlan) {
            return self.fail(
                assessment_id,
                &response.company_id,
                attempt,
                ProcessingStage::ActionPlan,
                ProcessingError::Repository(error),
            );
        }
        let needs_plan = analyses
            .iter()
            .any(|analysis| analysis.exposure_level.requires_mandatory_measures());
        let plans = if needs_plan && config.auto_generate_action_plans {
            match self
                .generator
                .generate(self.repository.as_ref(), &analyses, &org, now)
            {
                Ok(plans) => plans,
                Err(error) => {
                    return self.fail(
                        assessment_id,
                        &response.company_id,
                        attempt,
                        ProcessingStage::ActionPlan,
                        ProcessingError::Repository(error),
                    );
                }
            }
        } else {
            Vec::new()
        };
        let action_planned = !plans.is_empty();

        // Notification
        if let Err(error) = self.stage_log(&response, attempt, ProcessingStage::Notification) {
            return self.fail(
                assessment_id,
                &response.company_id,
                attempt,
                ProcessingStage::Notification,
                ProcessingError::Repository(error),
            );
        }
        let mut notifications = Vec::new();
        if config.notification_enabled {
            match self
                .notifications
                .notify_risks(self.repository.as_ref(), &analyses, &config, now)
            {
                Ok(created) => notifications.extend(created),
                Err(error) => {
                    return self.fail(
                        assessment_id,
                        &response.company_id,
                        attempt,
                        ProcessingStage::Notification,
                        ProcessingError::Repository(error),
                    );
                }
            }
            match self
                .notifications
                .notify_plans(self.repository.as_ref(), &plans, now)
            {
                Ok(created) => notifications.extend(created),
                Err(error) => {
                    return self.fail(
                        assessment_id,
                        &response.company_id,
                        attempt,
                        ProcessingStage::Notification,
                        ProcessingError::Repository(error),
                    );
                }
            }
        }

        // Terminal log row
        let terminal = ProcessingLogEntry {
            id: next_log_id(),
            assessment_response_id: response.id.clone(),
            company_id: response.company_id.clone(),
            attempt,
            stage: ProcessingStage::Finished,
            status: ProcessingStatus::Completed,
            error_message: None,
            created_at: self.clock.now(),
        };
        let log_id = match self.repository.append_log(terminal) {
            Ok(entry) => entry.id,
            Err(error) => {
                return self.fail(
                    assessment_id,
                    &response.company_id,
                    attempt,
                    ProcessingStage::Finished,
                    ProcessingError::Repository(error),
                );
            }
        };

        tracing::info!(
            assessment_id = %assessment_id,
            analyses = analyses.len(),
            plans = plans.len(),
            notifications = notifications.len(),
            "assessment response processed"
        );

        ProcessingOutcome::Completed(ProcessingReport {
            assessment_response_id: response.id,
            log_id,
            analyses,
            plans,
            notifications,
            action_planned,
        })
    }

    /// Advance due escalations; invoked from the processor poll loop.
    pub fn sweep_escalations(&self) {
        let now = self.clock.now();
        if let Err(error) = self
            .notifications
            .advance_due_escalations(self.repository.as_ref(), now)
        {
            tracing::warn!(error = %error, "escalation sweep failed; will retry next cycle");
        }
    }

    /// Record the permanent failure of an item that exhausted its retries.
    pub fn record_permanent_failure(&self, assessment_id: &AssessmentId, company_id: &str, message: &str) {
        let now = self.clock.now();
        let notify = match self.config_for(company_id) {
            Ok(Some(config)) => config.notification_enabled,
            _ => false,
        };
        if notify {
            if let Err(error) = self.notifications.notify_processing_failure(
                self.repository.as_ref(),
                company_id,
                assessment_id,
                message,
                now,
            ) {
                tracing::warn!(
                    assessment_id = %assessment_id,
                    error = %error,
                    "failed to record processing-error notification"
                );
            }
        }
        tracing::error!(
            assessment_id = %assessment_id,
            company_id,
            message,
            "assessment response permanently failed"
        );
    }

    /// Settle the bookkeeping for an attempt that never returned: the
    /// timeout or abort still produces its terminal error log row.
    pub fn record_attempt_abort(
        &self,
        assessment_id: &AssessmentId,
        company_id: &str,
        attempt: u32,
        error: ProcessingError,
    ) -> ProcessingOutcome {
        self.fail(
            assessment_id,
            company_id,
            attempt,
            ProcessingStage::Finished,
            error,
        )
    }

    /// Drop the cached config for a company after an out-of-band change.
    pub fn invalidate_config(&self, company_id: &str) {
        self.config_cache.invalidate(&company_id.to_string());
    }

    fn config_for(&self, company_id: &str) -> Result<Option<AutomationConfig>, RepositoryError> {
        let key = company_id.to_string();
        let now = self.clock.now();
        if let Some(config) = self.config_cache.get(&key, now) {
            return Ok(Some(config));
        }
        let config = self.repository.automation_config(company_id)?;
        if let Some(config) = &config {
            self.config_cache.insert(key, config.clone(), now);
        }
        Ok(config)
    }

    fn enrich(&self, analysis: RiskAnalysis) -> RiskAnalysis {
        let fallback = analysis.clone();
        match self.enricher.enhance(analysis) {
            Ok(enriched) => enriched,
            Err(error) => {
                tracing::warn!(
                    analysis_id = %fallback.id,
                    error = %error,
                    "enrichment failed; keeping basic analysis"
                );
                fallback
            }
        }
    }

    fn stage_log(
        &self,
        response: &AssessmentResponse,
        attempt: u32,
        stage: ProcessingStage,
    ) -> Result<(), RepositoryError> {
        self.repository
            .append_log(ProcessingLogEntry {
                id: next_log_id(),
                assessment_response_id: response.id.clone(),
                company_id: response.company_id.clone(),
                attempt,
                stage,
                status: ProcessingStatus::Processing,
                error_message: None,
                created_at: self.clock.now(),
            })
            .map(|_| ())
    }

    fn fail(
        &self,
        assessment_id: &AssessmentId,
        company_id: &str,
        attempt: u32,
        stage: ProcessingStage,
        error: ProcessingError,
    ) -> ProcessingOutcome {
        tracing::warn!(
            assessment_id = %assessment_id,
            ?stage,
            attempt,
            error = %error,
            "processing attempt failed"
        );

        let entry = ProcessingLogEntry {
            id: next_log_id(),
            assessment_response_id: assessment_id.clone(),
            company_id: company_id.to_string(),
            attempt,
            stage,
            status: ProcessingStatus::Error,
            error_message: Some(error.to_string()),
            created_at: self.clock.now(),
        };
        if let Err(log_error) = self.repository.append_log(entry) {
            tracing::error!(
                assessment_id = %assessment_id,
                error = %log_error,
                "could not append error log entry"
            );
        }

        ProcessingOutcome::Failed { stage, error }
    }
}
