use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::domain::{
    ActionPlan, AssessmentId, AutomationConfig, DeliveryMethod, ExposureLevel, Notification,
    NotificationKind, NotificationPriority, RecipientRole, RiskAnalysis,
};
use super::escalation::{EscalationLevel, EscalationPolicy, PendingEscalation};
use super::repository::{
    AutomationRepository, NotificationDispatch, NotificationTransport, RepositoryError,
};

static NOTIFICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_notification_id() -> String {
    let id = NOTIFICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("ntf-{id:06}")
}

/// Decides who must be told what and records it, with tiered escalation
/// for unacknowledged critical risks.
///
/// Creation is idempotent per (related entity, kind, tier), so a retried
/// processing attempt never duplicates alerts.
pub struct NotificationService<T> {
    transport: Arc<T>,
    policy: EscalationPolicy,
    pending: Mutex<Vec<PendingEscalation>>,
}

impl<T> NotificationService<T>
where
    T: NotificationTransport,
{
    pub fn new(transport: Arc<T>, policy: EscalationPolicy) -> Self {
        Self {
            transport,
            policy,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Notify on every terminal risk classification of one processing run.
    pub fn notify_risks<R: AutomationRepository>(
        &self,
        repository: &R,
        analyses: &[RiskAnalysis],
        config: &AutomationConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let mut created = Vec::new();

        for analysis in analyses {
            match analysis.exposure_level {
                ExposureLevel::Alto => {
                    created.extend(self.create_tier(
                        repository,
                        &analysis.company_id,
                        NotificationKind::HighRisk,
                        NotificationPriority::High,
                        &analysis.id,
                        high_risk_message(analysis),
                        &[RecipientRole::Supervisor],
                        &[DeliveryMethod::InApp, DeliveryMethod::Email],
                        1,
                        now,
                    )?);
                }
                ExposureLevel::Critico => {
                    let Some(first_tier) = self.policy.first() else {
                        continue;
                    };
                    let tier_created = self.create_tier(
                        repository,
                        &analysis.company_id,
                        NotificationKind::CriticalRisk,
                        NotificationPriority::Critical,
                        &analysis.id,
                        critical_risk_message(analysis),
                        &first_tier.roles,
                        &first_tier.delivery_methods,
                        first_tier.level,
                        now,
                    )?;

                    if config.critical_risk_escalation {
                        if let (Some(watch), Some(next)) =
                            (tier_created.first(), self.policy.next_after(first_tier.level))
                        {
                            self.schedule(watch, next, now);
                        }
                    }
                    created.extend(tier_created);
                }
                _ => {}
            }
        }

        if created.is_empty() {
            tracing::info!("risk classification requires no notification");
        }

        Ok(created)
    }

    /// Record one notification per generated plan.
    pub fn notify_plans<R: AutomationRepository>(
        &self,
        repository: &R,
        plans: &[ActionPlan],
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let mut created = Vec::new();
        for plan in plans {
            created.extend(self.create_tier(
                repository,
                &plan.company_id,
                NotificationKind::ActionPlanGenerated,
                NotificationPriority::Medium,
                &plan.id,
                plan_generated_message(plan),
                &[RecipientRole::HrAnalyst],
                &[DeliveryMethod::InApp, DeliveryMethod::Email],
                1,
                now,
            )?);
        }
        Ok(created)
    }

    /// Alert operators after a response exhausts its retry budget.
    pub fn notify_processing_failure<R: AutomationRepository>(
        &self,
        repository: &R,
        company_id: &str,
        assessment_id: &AssessmentId,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.create_tier(
            repository,
            company_id,
            NotificationKind::ProcessingError,
            NotificationPriority::High,
            &assessment_id.0,
            format!(
                "Falha definitiva no processamento da avaliação {}: {}",
                assessment_id.0, error_message
            ),
            &[RecipientRole::HrAnalyst],
            &[DeliveryMethod::InApp, DeliveryMethod::Email],
            1,
            now,
        )
    }

    /// Advance every due escalation whose watched notification is still
    /// unread. Called from the processor's poll loop; timing is therefore
    /// best-effort, bounded below by the tier delay.
    pub fn advance_due_escalations<R: AutomationRepository>(
        &self,
        repository: &R,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let due: Vec<PendingEscalation> = {
            let mut pending = self.pending.lock().expect("escalation mutex poisoned");
            let (ready, waiting): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|entry| entry.due_at <= now);
            *pending = waiting;
            ready
        };

        let mut created = Vec::new();
        for entry in due {
            let acknowledged = repository
                .fetch_notification(&entry.watch_notification_id)?
                .map(|notification| notification.is_read)
                .unwrap_or(false);
            if acknowledged {
                tracing::debug!(
                    related_entity_id = %entry.related_entity_id,
                    level = entry.next_level,
                    "escalation cancelled: previous tier acknowledged"
                );
                continue;
            }

            let Some(tier) = self.policy.level(entry.next_level) else {
                continue;
            };

            let tier_created = self.create_tier(
                repository,
                &entry.company_id,
                NotificationKind::CriticalRisk,
                NotificationPriority::Critical,
                &entry.related_entity_id,
                escalation_message(&entry.related_entity_id, tier),
                &tier.roles,
                &tier.delivery_methods,
                tier.level,
                now,
            )?;

            if let (Some(watch), Some(next)) =
                (tier_created.first(), self.policy.next_after(tier.level))
            {
                self.schedule(watch, next, now);
            }
            created.extend(tier_created);
        }

        Ok(created)
    }

    /// Pending advancement checks, exposed for status views and tests.
    pub fn pending_escalations(&self) -> usize {
        self.pending.lock().expect("escalation mutex poisoned").len()
    }

    fn schedule(&self, watch: &Notification, next: &EscalationLevel, now: DateTime<Utc>) {
        let mut pending = self.pending.lock().expect("escalation mutex poisoned");
        pending.push(PendingEscalation {
            company_id: watch.company_id.clone(),
            related_entity_id: watch.related_entity_id.clone(),
            watch_notification_id: watch.id.clone(),
            next_level: next.level,
            due_at: now + next.delay(),
        });
    }

    /// Create one notification per role of a tier, unless the tier has
    /// already fired for this entity. Delivery failures are logged only;
    /// re-delivery is the queue's concern, never the transport's.
    #[allow(clippy::too_many_arguments)]
    fn create_tier<R: AutomationRepository>(
        &self,
        repository: &R,
        company_id: &str,
        kind: NotificationKind,
        priority: NotificationPriority,
        related_entity_id: &str,
        message: String,
        roles: &[RecipientRole],
        delivery_methods: &[DeliveryMethod],
        level: u8,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        if repository.notification_exists(related_entity_id, kind, level)? {
            tracing::debug!(
                related_entity_id,
                ?kind,
                level,
                "notification already recorded; skipping duplicate"
            );
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(roles.len());
        for role in roles {
            let notification = Notification {
                id: next_notification_id(),
                company_id: company_id.to_string(),
                recipient_role: *role,
                recipient_id: None,
                kind,
                priority,
                related_entity_id: related_entity_id.to_string(),
                message: message.clone(),
                delivery_methods: delivery_methods.to_vec(),
                escalation_level: level,
                is_read: false,
                created_at: now,
            };
            let stored = repository.insert_notification(notification)?;

            let mut payload = BTreeMap::new();
            payload.insert("message".to_string(), stored.message.clone());
            payload.insert(
                "related_entity_id".to_string(),
                stored.related_entity_id.clone(),
            );
            let dispatch = NotificationDispatch {
                recipient_role: stored.recipient_role,
                recipient_id: stored.recipient_id.clone(),
                delivery_methods: stored.delivery_methods.clone(),
                template: template_for(kind).to_string(),
                payload,
            };
            if let Err(error) = self.transport.send(&dispatch) {
                tracing::warn!(
                    notification_id = %stored.id,
                    error = %error,
                    "notification transport failed; record kept"
                );
            }
            created.push(stored);
        }

        Ok(created)
    }
}

fn template_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::HighRisk => "high_risk",
        NotificationKind::CriticalRisk => "critical_risk",
        NotificationKind::ProcessingError => "processing_error",
        NotificationKind::ActionPlanGenerated => "action_plan_generated",
    }
}

fn high_risk_message(analysis: &RiskAnalysis) -> String {
    format!(
        "Risco alto identificado em {} (score {:.0}). Medidas obrigatórias registradas.",
        analysis.category, analysis.risk_score
    )
}

fn critical_risk_message(analysis: &RiskAnalysis) -> String {
    format!(
        "Risco crítico identificado em {} (score {:.0}). Ação imediata necessária.",
        analysis.category, analysis.risk_score
    )
}

fn escalation_message(related_entity_id: &str, tier: &EscalationLevel) -> String {
    format!(
        "Risco crítico {related_entity_id} sem reconhecimento; escalado para o nível {}.",
        tier.level
    )
}

fn plan_generated_message(plan: &ActionPlan) -> String {
    format!(
        "Plano de ação '{}' gerado com prioridade {}.",
        plan.title,
        plan.priority.label()
    )
}
