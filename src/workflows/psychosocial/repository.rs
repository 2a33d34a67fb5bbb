use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActionPlan, AssessmentId, AssessmentResponse, AutomationConfig, DeliveryMethod, Notification,
    NotificationKind, ProcessingLogEntry, RecipientRole, RiskAnalysis,
};

/// Persistence facade the pipeline runs against.
///
/// Single-row writes only; the pipeline never assumes cross-table
/// transactions, which is why partial-category analysis persistence is
/// handled explicitly instead of being rolled back.
pub trait AutomationRepository: Send + Sync {
    fn insert_response(&self, response: AssessmentResponse) -> Result<(), RepositoryError>;
    fn fetch_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Option<AssessmentResponse>, RepositoryError>;

    fn insert_analysis(&self, analysis: RiskAnalysis) -> Result<RiskAnalysis, RepositoryError>;
    fn analyses_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError>;
    fn analyses_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RiskAnalysis>, RepositoryError>;

    fn insert_plan(&self, plan: ActionPlan) -> Result<ActionPlan, RepositoryError>;
    /// Idempotency probe: is there an open plan for this sector triggered
    /// by this response already?
    fn open_plan_exists(
        &self,
        sector_id: &str,
        trigger: &AssessmentId,
    ) -> Result<bool, RepositoryError>;
    fn plans_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActionPlan>, RepositoryError>;

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError>;
    /// Idempotency probe keyed by (related entity, kind, escalation tier).
    fn notification_exists(
        &self,
        related_entity_id: &str,
        kind: NotificationKind,
        escalation_level: u8,
    ) -> Result<bool, RepositoryError>;
    fn fetch_notification(&self, id: &str) -> Result<Option<Notification>, RepositoryError>;
    fn mark_notification_read(&self, id: &str) -> Result<bool, RepositoryError>;
    fn notifications_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError>;

    fn append_log(&self, entry: ProcessingLogEntry)
        -> Result<ProcessingLogEntry, RepositoryError>;
    fn logs_for_response(
        &self,
        id: &AssessmentId,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError>;
    fn logs_in_range(
        &self,
        company_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProcessingLogEntry>, RepositoryError>;

    fn automation_config(
        &self,
        company_id: &str,
    ) -> Result<Option<AutomationConfig>, RepositoryError>;
    fn upsert_automation_config(&self, config: AutomationConfig) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery request handed to the e-mail/SMS gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDispatch {
    pub recipient_role: RecipientRole,
    pub recipient_id: Option<String>,
    pub delivery_methods: Vec<DeliveryMethod>,
    pub template: String,
    pub payload: BTreeMap<String, String>,
}

/// Receipt returned by the transport on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub transport_id: Option<String>,
}

/// Trait describing the e-mail/SMS transport boundary.
///
/// Transport failures are logged by the caller, never retried here; retry
/// happens at the orchestration level through the queue.
pub trait NotificationTransport: Send + Sync {
    fn send(&self, dispatch: &NotificationDispatch) -> Result<DeliveryReceipt, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
