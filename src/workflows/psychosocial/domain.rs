use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a completed questionnaire response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw answer to a single questionnaire item, already tagged with the
/// category it contributes to by the template that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerValue {
    pub question_id: String,
    pub category: String,
    pub value: f32,
}

/// Completed questionnaire response. Immutable input to the pipeline;
/// created by the questionnaire flow and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResponse {
    pub id: AssessmentId,
    pub company_id: String,
    pub employee_id: String,
    #[serde(default)]
    pub employee_name: Option<String>,
    pub sector_id: String,
    #[serde(default)]
    pub sector_name: Option<String>,
    pub role_id: String,
    pub template_id: String,
    pub answers: Vec<AnswerValue>,
    #[serde(default)]
    pub raw_score: Option<f32>,
    pub completed_at: DateTime<Utc>,
}

/// Organizational context resolved for a response at processing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgContext {
    pub company_id: String,
    pub sector_id: String,
    pub sector_label: String,
    pub role_id: String,
    pub employee_id: String,
    pub employee_label: String,
}

impl OrgContext {
    /// Labels fall back to raw identifiers when the directory snapshot on
    /// the response carries no display names.
    pub fn from_response(response: &AssessmentResponse) -> Self {
        Self {
            company_id: response.company_id.clone(),
            sector_id: response.sector_id.clone(),
            sector_label: response
                .sector_name
                .clone()
                .unwrap_or_else(|| response.sector_id.clone()),
            role_id: response.role_id.clone(),
            employee_id: response.employee_id.clone(),
            employee_label: response
                .employee_name
                .clone()
                .unwrap_or_else(|| response.employee_id.clone()),
        }
    }
}

/// Discrete risk tier derived from a continuous 0-100 risk score.
///
/// Ordering matters: `Critico` is the worst tier and must compare greatest
/// so group priorities can be taken with `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureLevel {
    Baixo,
    Medio,
    Alto,
    Critico,
}

impl ExposureLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ExposureLevel::Baixo => "Baixo",
            ExposureLevel::Medio => "Médio",
            ExposureLevel::Alto => "Alto",
            ExposureLevel::Critico => "Crítico",
        }
    }

    /// Mandatory mitigation applies from `alto` upward (NR-01).
    pub fn requires_mandatory_measures(&self) -> bool {
        matches!(self, ExposureLevel::Alto | ExposureLevel::Critico)
    }

    /// Interval until the next scheduled re-evaluation.
    pub fn review_offset(&self) -> Duration {
        match self {
            ExposureLevel::Critico => Duration::days(30),
            ExposureLevel::Alto => Duration::days(90),
            ExposureLevel::Medio => Duration::days(180),
            ExposureLevel::Baixo => Duration::days(365),
        }
    }

    /// Action plan priority for this tier, when one is warranted at all.
    pub fn plan_priority(&self) -> Option<PlanPriority> {
        match self {
            ExposureLevel::Critico => Some(PlanPriority::Critical),
            ExposureLevel::Alto => Some(PlanPriority::High),
            _ => None,
        }
    }
}

/// Per-category scoring result produced by the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub risk_score: f32,
    pub exposure: ExposureLevel,
    pub answered_items: usize,
}

/// Lifecycle of an identified risk; later mitigation workflows move it
/// forward, the pipeline only ever creates rows in `Identified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Identified,
    InMitigation,
    Resolved,
}

/// One persisted risk analysis per (response, category).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub id: String,
    pub company_id: String,
    pub sector_id: String,
    pub role_id: String,
    pub employee_id: String,
    pub assessment_response_id: AssessmentId,
    pub category: String,
    pub risk_score: f32,
    pub exposure_level: ExposureLevel,
    pub recommended_actions: Vec<String>,
    pub mandatory_measures: Vec<String>,
    pub evaluation_date: DateTime<Utc>,
    pub next_evaluation_date: NaiveDate,
    pub status: RiskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPriority {
    High,
    Critical,
}

impl PlanPriority {
    pub fn label(&self) -> &'static str {
        match self {
            PlanPriority::High => "high",
            PlanPriority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl PlanStatus {
    /// Open in the idempotency sense: a plan in this state blocks the
    /// generator from creating another one for the same sector + trigger.
    pub fn is_open(&self) -> bool {
        matches!(self, PlanStatus::Open | PlanStatus::InProgress)
    }
}

/// Default follow-up item attached to a generated plan from a category
/// template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanItem {
    pub description: String,
    pub due_date: NaiveDate,
    pub completed: bool,
}

/// Mitigation plan synthesized from the high/critical analyses of one
/// sector. Created at most once per (sector, triggering response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    pub company_id: String,
    pub sector_id: String,
    pub assessment_response_id: AssessmentId,
    pub title: String,
    pub priority: PlanPriority,
    pub status: PlanStatus,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub items: Vec<ActionPlanItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    HighRisk,
    CriticalRisk,
    ProcessingError,
    ActionPlanGenerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Role a notification is addressed to when no concrete user is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Supervisor,
    Manager,
    HrAnalyst,
    SafetyOfficer,
}

impl RecipientRole {
    pub fn label(&self) -> &'static str {
        match self {
            RecipientRole::Supervisor => "supervisor",
            RecipientRole::Manager => "manager",
            RecipientRole::HrAnalyst => "hr_analyst",
            RecipientRole::SafetyOfficer => "safety_officer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    InApp,
    Email,
    Sms,
}

/// Persisted notification. Mutated only to mark it read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub company_id: String,
    pub recipient_role: RecipientRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub related_entity_id: String,
    pub message: String,
    pub delivery_methods: Vec<DeliveryMethod>,
    pub escalation_level: u8,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Pipeline stage a processing log row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Scoring,
    Analysis,
    ActionPlan,
    Notification,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error)
    }
}

/// Append-only audit row. One `processing` row per stage entered plus
/// exactly one terminal row (`completed` or `error`) per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub id: String,
    pub assessment_response_id: AssessmentId,
    pub company_id: String,
    pub attempt: u32,
    pub stage: ProcessingStage,
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-company automation toggles, read at dispatch time. A company with
/// no stored config is treated as having automation disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub company_id: String,
    pub auto_process_enabled: bool,
    pub auto_generate_action_plans: bool,
    pub notification_enabled: bool,
    pub critical_risk_escalation: bool,
    pub processing_delay_minutes: i64,
}

impl AutomationConfig {
    /// Fully-enabled config with no processing delay.
    pub fn enabled_for(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            auto_process_enabled: true,
            auto_generate_action_plans: true,
            notification_enabled: true,
            critical_risk_escalation: true,
            processing_delay_minutes: 0,
        }
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::minutes(self.processing_delay_minutes.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposure_ordering_tracks_severity() {
        assert!(ExposureLevel::Baixo < ExposureLevel::Medio);
        assert!(ExposureLevel::Medio < ExposureLevel::Alto);
        assert!(ExposureLevel::Alto < ExposureLevel::Critico);
    }

    #[test]
    fn review_offsets_follow_regulation_table() {
        assert_eq!(ExposureLevel::Critico.review_offset(), Duration::days(30));
        assert_eq!(ExposureLevel::Alto.review_offset(), Duration::days(90));
        assert_eq!(ExposureLevel::Medio.review_offset(), Duration::days(180));
        assert_eq!(ExposureLevel::Baixo.review_offset(), Duration::days(365));
    }

    #[test]
    fn only_upper_tiers_warrant_plans() {
        assert_eq!(ExposureLevel::Baixo.plan_priority(), None);
        assert_eq!(ExposureLevel::Medio.plan_priority(), None);
        assert_eq!(
            ExposureLevel::Alto.plan_priority(),
            Some(PlanPriority::High)
        );
        assert_eq!(
            ExposureLevel::Critico.plan_priority(),
            Some(PlanPriority::Critical)
        );
    }

    #[test]
    fn open_plan_states_block_regeneration() {
        assert!(PlanStatus::Open.is_open());
        assert!(PlanStatus::InProgress.is_open());
        assert!(!PlanStatus::Completed.is_open());
        assert!(!PlanStatus::Cancelled.is_open());
    }
}
