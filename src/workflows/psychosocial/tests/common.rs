use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::psychosocial::catalog::CategoryCatalog;
use crate::workflows::psychosocial::clock::ManualClock;
use crate::workflows::psychosocial::domain::{
    ActionPlan, AnswerValue, AssessmentId, AssessmentResponse, AutomationConfig, Notification,
    NotificationKind, ProcessingLogEntry, RiskAnalysis,
};
use crate::workflows::psychosocial::enrichment::{EnrichmentError, RiskEnricher};
use crate::workflows::psychosocial::escalation::EscalationPolicy;
use crate::workflows::psychosocial::memory::InMemoryStore;
use crate::workflows::psychosocial::notifications::NotificationService;
use crate::workflows::psychosocial::orchestrator::AutomationOrchestrator;
use crate::workflows::psychosocial::repository::{
    AutomationRepository, DeliveryReceipt, NotificationDispatch, NotificationTransport,
    RepositoryError, TransportError,
};

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn critical_response(id: &str) -> AssessmentResponse {
    // Demandas de Trabalho [4,5,4,5,4] => score 85 => critico.
    let answers = [4.0, 5.0, 4.0, 5.0, 4.0]
        .iter()
        .enumerate()
        .map(|(index, value)| AnswerValue {
            question_id: format!("dt_{:02}", index + 1),
            category: "demandas_trabalho".to_string(),
            value: *value,
        })
        .collect();
    response_with(id, answers)
}

pub(super) fn calm_response(id: &str) -> AssessmentResponse {
    response_with(
        id,
        vec![
            AnswerValue {
                question_id: "dt_01".to_string(),
                category: "demandas_trabalho".to_string(),
                value: 1.0,
            },
            AnswerValue {
                question_id: "re_03".to_string(),
                category: "relacionamentos".to_string(),
                value: 1.0,
            },
        ],
    )
}

pub(super) fn two_category_response(id: &str) -> AssessmentResponse {
    response_with(
        id,
        vec![
            AnswerValue {
                question_id: "dt_01".to_string(),
                category: "demandas_trabalho".to_string(),
                value: 5.0,
            },
            AnswerValue {
                question_id: "re_03".to_string(),
                category: "relacionamentos".to_string(),
                value: 5.0,
            },
        ],
    )
}

pub(super) fn malformed_response(id: &str) -> AssessmentResponse {
    response_with(
        id,
        vec![AnswerValue {
            question_id: "zz_01".to_string(),
            category: "categoria_fantasma".to_string(),
            value: 3.0,
        }],
    )
}

pub(super) fn response_with(id: &str, answers: Vec<AnswerValue>) -> AssessmentResponse {
    AssessmentResponse {
        id: AssessmentId(id.to_string()),
        company_id: "co-1".to_string(),
        employee_id: "emp-1".to_string(),
        employee_name: Some("Ana Souza".to_string()),
        sector_id: "sec-1".to_string(),
        sector_name: Some("Atendimento".to_string()),
        role_id: "role-1".to_string(),
        template_id: "tpl-nr01".to_string(),
        answers,
        raw_score: None,
        completed_at: start_time() - chrono::Duration::minutes(10),
    }
}

pub(super) fn enabled_config() -> AutomationConfig {
    AutomationConfig::enabled_for("co-1")
}

pub(super) fn disabled_config() -> AutomationConfig {
    AutomationConfig {
        auto_process_enabled: false,
        ..AutomationConfig::enabled_for("co-1")
    }
}

/// Transport that records every dispatch for assertions.
#[derive(Default)]
pub(super) struct RecordingTransport {
    dispatches: Mutex<Vec<NotificationDispatch>>,
}

impl RecordingTransport {
    pub(super) fn dispatches(&self) -> Vec<NotificationDispatch> {
        self.dispatches
            .lock()
            .expect("transport mutex poisoned")
            .clone()
    }
}

impl NotificationTransport for RecordingTransport {
    fn send(&self, dispatch: &NotificationDispatch) -> Result<DeliveryReceipt, TransportError> {
        self.dispatches
            .lock()
            .expect("transport mutex poisoned")
            .push(dispatch.clone());
        Ok(DeliveryReceipt {
            delivered: true,
            transport_id: Some(format!("msg-{}", dispatch.template)),
        })
    }
}

/// Transport that always refuses delivery.
pub(super) struct OfflineTransport;

impl NotificationTransport for OfflineTransport {
    fn send(&self, _dispatch: &NotificationDispatch) -> Result<DeliveryReceipt, TransportError> {
        Err(TransportError::Transport("gateway offline".to_string()))
    }
}

/// Enricher that annotates every analysis, proving the hook runs.
pub(super) struct StampingEnricher;

impl RiskEnricher for StampingEnricher {
    fn enhance(
        &self,
        mut analysis: RiskAnalysis,
    ) -> Result<RiskAnalysis, EnrichmentError> {
        analysis.insights = Some(format!("contexto setorial para {}", analysis.category));
        Ok(analysis)
    }
}

/// Enricher that always fails, proving graceful degradation.
pub(super) struct BrokenEnricher;

impl RiskEnricher for BrokenEnricher {
    fn enhance(&self, _analysis: RiskAnalysis) -> Result<RiskAnalysis, EnrichmentError> {
        Err(EnrichmentError::Unavailable("model offline".to_string()))
    }
}

/// Store whose analysis writes fail a configurable number of times before
/// recovering; everything else delegates to the in-memory store.
pub(super) struct FlakyAnalysisStore {
    inner: InMemoryStore,
    failures_left: AtomicU32,
}

impl FlakyAnalysisStore {
    pub(super) fn failing(times: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures_left: AtomicU32::new(times),
        }
    }

    pub(super) fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

impl AutomationRepository for FlakyAnalysisStore {
    fn insert_response(&self, response: AssessmentResponse) -> Result<(), RepositoryError> {
        self.inner.insert_response(response)
    }

    fn fetch_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Option<AssessmentResponse>, RepositoryError> {
        self.inner.fetch_response(id)
    }

    fn insert_analysis(&self, analysis: RiskAnalysis) -> Result<RiskAnalysis, RepositoryError> {
        let remaining = self.failures_left.load(Ordering::Acquire);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::Release);
            return Err(RepositoryError::Unavailable("analysis table offline".to_string()));
        }
        self.inner.insert_analysis(analysis)
    }

    fn analyses_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError> {
        self.inner.analyses_for_response(id)
    }

    fn analyses_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError> {
        self.inner.analyses_in_range(company_id, from, to)
    }

    fn insert_plan(&self, plan: ActionPlan) -> Result<ActionPlan, RepositoryError> {
        self.inner.insert_plan(plan)
    }

    fn open_plan_exists(
        &self,
        sector_id: &str,
        trigger: &AssessmentId,
    ) -> Result<bool, RepositoryError> {
        self.inner.open_plan_exists(sector_id, trigger)
    }

    fn plans_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActionPlan>, RepositoryError> {
        self.inner.plans_in_range(company_id, from, to)
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        self.inner.insert_notification(notification)
    }

    fn notification_exists(
        &self,
        related_entity_id: &str,
        kind: NotificationKind,
        escalation_level: u8,
    ) -> Result<bool, RepositoryError> {
        self.inner
            .notification_exists(related_entity_id, kind, escalation_level)
    }

    fn fetch_notification(&self, id: &str) -> Result<Option<Notification>, RepositoryError> {
        self.inner.fetch_notification(id)
    }

    fn mark_notification_read(&self, id: &str) -> Result<bool, RepositoryError> {
        self.inner.mark_notification_read(id)
    }

    fn notifications_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_in_range(company_id, from, to)
    }

    fn append_log(
        &self,
        entry: ProcessingLogEntry,
    ) -> Result<ProcessingLogEntry, RepositoryError> {
        self.inner.append_log(entry)
    }

    fn logs_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError> {
        self.inner.logs_for_response(id)
    }

    fn logs_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError> {
        self.inner.logs_in_range(company_id, from, to)
    }

    fn automation_config(
        &self,
        company_id: &str,
    ) -> Result<Option<AutomationConfig>, RepositoryError> {
        self.inner.automation_config(company_id)
    }

    fn upsert_automation_config(&self, config: AutomationConfig) -> Result<(), RepositoryError> {
        self.inner.upsert_automation_config(config)
    }
}

pub(super) struct OrchestratorFixture<R> {
    pub(super) transport: Arc<RecordingTransport>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) orchestrator: Arc<AutomationOrchestrator<R, RecordingTransport>>,
}

pub(super) fn orchestrator_fixture<R>(store: Arc<R>) -> OrchestratorFixture<R>
where
    R: AutomationRepository + 'static,
{
    orchestrator_fixture_with_enricher(store, Arc::new(crate::workflows::psychosocial::enrichment::NoopEnricher))
}

pub(super) fn orchestrator_fixture_with_enricher<R>(
    store: Arc<R>,
    enricher: Arc<dyn RiskEnricher>,
) -> OrchestratorFixture<R>
where
    R: AutomationRepository + 'static,
{
    let transport = Arc::new(RecordingTransport::default());
    let clock = Arc::new(ManualClock::starting_at(start_time()));
    let notifications = Arc::new(NotificationService::new(
        transport.clone(),
        EscalationPolicy::standard(),
    ));
    let orchestrator = Arc::new(AutomationOrchestrator::new(
        store,
        Arc::new(CategoryCatalog::standard()),
        notifications,
        enricher,
        clock.clone(),
    ));

    OrchestratorFixture {
        transport,
        clock,
        orchestrator,
    }
}
