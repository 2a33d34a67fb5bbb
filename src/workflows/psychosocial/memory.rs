use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{
    ActionPlan, AssessmentId, AssessmentResponse, AutomationConfig, Notification,
    NotificationKind, ProcessingLogEntry, RiskAnalysis,
};
use super::repository::{
    AutomationRepository, DeliveryReceipt, NotificationDispatch, NotificationTransport,
    RepositoryError, TransportError,
};

/// In-process implementation of the persistence facade.
///
/// The production deployment swaps this for a database-backed adapter; the
/// pipeline itself only ever sees the trait.
#[derive(Default)]
pub struct InMemoryStore {
    responses: Mutex<HashMap<AssessmentId, AssessmentResponse>>,
    analyses: Mutex<Vec<RiskAnalysis>>,
    plans: Mutex<Vec<ActionPlan>>,
    notifications: Mutex<Vec<Notification>>,
    logs: Mutex<Vec<ProcessingLogEntry>>,
    configs: Mutex<HashMap<String, AutomationConfig>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo helper: store seeded with one automation config.
    pub fn with_config(config: AutomationConfig) -> Self {
        let store = Self::new();
        if let Err(error) = store.upsert_automation_config(config) {
            tracing::warn!(error = %error, "failed to seed automation config");
        }
        store
    }
}

fn in_window(at: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    at >= from && at <= to
}

impl AutomationRepository for InMemoryStore {
    fn insert_response(&self, response: AssessmentResponse) -> Result<(), RepositoryError> {
        let mut guard = self.responses.lock().expect("responses mutex poisoned");
        if guard.contains_key(&response.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(response.id.clone(), response);
        Ok(())
    }

    fn fetch_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Option<AssessmentResponse>, RepositoryError> {
        let guard = self.responses.lock().expect("responses mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert_analysis(&self, analysis: RiskAnalysis) -> Result<RiskAnalysis, RepositoryError> {
        let mut guard = self.analyses.lock().expect("analyses mutex poisoned");
        guard.push(analysis.clone());
        Ok(analysis)
    }

    fn analyses_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError> {
        let guard = self.analyses.lock().expect("analyses mutex poisoned");
        Ok(guard
            .iter()
            .filter(|analysis| &analysis.assessment_response_id == id)
            .cloned()
            .collect())
    }

    fn analyses_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError> {
        let guard = self.analyses.lock().expect("analyses mutex poisoned");
        Ok(guard
            .iter()
            .filter(|analysis| {
                analysis.company_id == company_id && in_window(analysis.evaluation_date, from, to)
            })
            .cloned()
            .collect())
    }

    fn insert_plan(&self, plan: ActionPlan) -> Result<ActionPlan, RepositoryError> {
        let mut guard = self.plans.lock().expect("plans mutex poisoned");
        guard.push(plan.clone());
        Ok(plan)
    }

    fn open_plan_exists(
        &self,
        sector_id: &str,
        trigger: &AssessmentId,
    ) -> Result<bool, RepositoryError> {
        let guard = self.plans.lock().expect("plans mutex poisoned");
        Ok(guard.iter().any(|plan| {
            plan.sector_id == sector_id
                && &plan.assessment_response_id == trigger
                && plan.status.is_open()
        }))
    }

    fn plans_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActionPlan>, RepositoryError> {
        let guard = self.plans.lock().expect("plans mutex poisoned");
        Ok(guard
            .iter()
            .filter(|plan| plan.company_id == company_id && in_window(plan.created_at, from, to))
            .cloned()
            .collect())
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        let mut guard = self.notifications.lock().expect("notifications mutex poisoned");
        guard.push(notification.clone());
        Ok(notification)
    }

    fn notification_exists(
        &self,
        related_entity_id: &str,
        kind: NotificationKind,
        escalation_level: u8,
    ) -> Result<bool, RepositoryError> {
        let guard = self.notifications.lock().expect("notifications mutex poisoned");
        Ok(guard.iter().any(|notification| {
            notification.related_entity_id == related_entity_id
                && notification.kind == kind
                && notification.escalation_level == escalation_level
        }))
    }

    fn fetch_notification(&self, id: &str) -> Result<Option<Notification>, RepositoryError> {
        let guard = self.notifications.lock().expect("notifications mutex poisoned");
        Ok(guard.iter().find(|n| n.id == id).cloned())
    }

    fn mark_notification_read(&self, id: &str) -> Result<bool, RepositoryError> {
        let mut guard = self.notifications.lock().expect("notifications mutex poisoned");
        match guard.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn notifications_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let guard = self.notifications.lock().expect("notifications mutex poisoned");
        Ok(guard
            .iter()
            .filter(|n| n.company_id == company_id && in_window(n.created_at, from, to))
            .cloned()
            .collect())
    }

    fn append_log(
        &self,
        entry: ProcessingLogEntry,
    ) -> Result<ProcessingLogEntry, RepositoryError> {
        let mut guard = self.logs.lock().expect("logs mutex poisoned");
        guard.push(entry.clone());
        Ok(entry)
    }

    fn logs_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError> {
        let guard = self.logs.lock().expect("logs mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| &entry.assessment_response_id == id)
            .cloned()
            .collect())
    }

    fn logs_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError> {
        let guard = self.logs.lock().expect("logs mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| entry.company_id == company_id && in_window(entry.created_at, from, to))
            .cloned()
            .collect())
    }

    fn automation_config(
        &self,
        company_id: &str,
    ) -> Result<Option<AutomationConfig>, RepositoryError> {
        let guard = self.configs.lock().expect("configs mutex poisoned");
        Ok(guard.get(company_id).cloned())
    }

    fn upsert_automation_config(&self, config: AutomationConfig) -> Result<(), RepositoryError> {
        let mut guard = self.configs.lock().expect("configs mutex poisoned");
        guard.insert(config.company_id.clone(), config);
        Ok(())
    }
}

/// Transport that records the dispatch in the service log and reports
/// success; the default wiring when no gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl NotificationTransport for LogTransport {
    fn send(&self, dispatch: &NotificationDispatch) -> Result<DeliveryReceipt, TransportError> {
        tracing::info!(
            recipient_role = dispatch.recipient_role.label(),
            template = %dispatch.template,
            methods = dispatch.delivery_methods.len(),
            "notification dispatched"
        );
        Ok(DeliveryReceipt {
            delivered: true,
            transport_id: None,
        })
    }
}
