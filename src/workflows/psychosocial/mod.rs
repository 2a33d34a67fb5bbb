//! Psychosocial risk processing and automation pipeline.
//!
//! A completed questionnaire response is scored per risk category,
//! persisted as risk analyses, and — depending on exposure and company
//! configuration — turned into action plans and escalating notifications.
//! All of it runs as background work on a bounded worker pool with
//! retries and an append-only processing log.

pub mod analysis;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod domain;
pub mod enrichment;
pub mod escalation;
pub mod memory;
pub mod notifications;
pub mod orchestrator;
pub mod plans;
pub mod queue;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod stats;

#[cfg(test)]
mod tests;

pub use analysis::{AnalysisPersistOutcome, RiskAnalysisBuilder};
pub use catalog::{CategoryCatalog, CategoryDefinition, ScaleBounds, ThresholdLadder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    ActionPlan, ActionPlanItem, AnswerValue, AssessmentId, AssessmentResponse, AutomationConfig,
    CategoryScore, DeliveryMethod, ExposureLevel, Notification, NotificationKind,
    NotificationPriority, OrgContext, PlanPriority, PlanStatus, ProcessingLogEntry,
    ProcessingStage, ProcessingStatus, RecipientRole, RiskAnalysis, RiskStatus,
};
pub use enrichment::{EnrichmentError, NoopEnricher, RiskEnricher};
pub use escalation::{EscalationLevel, EscalationPolicy};
pub use memory::{InMemoryStore, LogTransport};
pub use notifications::NotificationService;
pub use orchestrator::{
    AutomationOrchestrator, ProcessingError, ProcessingOutcome, ProcessingReport,
};
pub use plans::ActionPlanGenerator;
pub use queue::{AssessmentQueue, JobProcessor, QueueStatus, WorkItemState};
pub use repository::{
    AutomationRepository, DeliveryReceipt, NotificationDispatch, NotificationTransport,
    RepositoryError, TransportError,
};
pub use router::automation_router;
pub use scoring::{AnswerItem, ScoringEngine, ScoringError};
pub use service::{AutomationService, TriggerOutcome};
pub use stats::{automation_stats, AutomationStats};
