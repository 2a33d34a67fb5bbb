use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{DeliveryMethod, RecipientRole};

/// One ordered escalation tier: who gets told, how, and how long the
/// previous tier has to acknowledge before this one fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationLevel {
    pub level: u8,
    pub roles: Vec<RecipientRole>,
    pub delivery_methods: Vec<DeliveryMethod>,
    pub escalation_delay_minutes: i64,
}

impl EscalationLevel {
    pub fn delay(&self) -> Duration {
        Duration::minutes(self.escalation_delay_minutes.max(0))
    }
}

/// Ordered tier ladder for critical-risk escalation. Static config data;
/// the notification service only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    levels: Vec<EscalationLevel>,
}

impl EscalationPolicy {
    pub fn new(mut levels: Vec<EscalationLevel>) -> Self {
        levels.sort_by_key(|tier| tier.level);
        Self { levels }
    }

    /// Supervisor first, then manager, then safety/HR as the last resort.
    pub fn standard() -> Self {
        Self::new(vec![
            EscalationLevel {
                level: 1,
                roles: vec![RecipientRole::Supervisor],
                delivery_methods: vec![DeliveryMethod::InApp, DeliveryMethod::Email],
                escalation_delay_minutes: 0,
            },
            EscalationLevel {
                level: 2,
                roles: vec![RecipientRole::Manager],
                delivery_methods: vec![DeliveryMethod::Email],
                escalation_delay_minutes: 30,
            },
            EscalationLevel {
                level: 3,
                roles: vec![RecipientRole::SafetyOfficer, RecipientRole::HrAnalyst],
                delivery_methods: vec![DeliveryMethod::Email, DeliveryMethod::Sms],
                escalation_delay_minutes: 60,
            },
        ])
    }

    pub fn first(&self) -> Option<&EscalationLevel> {
        self.levels.first()
    }

    pub fn level(&self, level: u8) -> Option<&EscalationLevel> {
        self.levels.iter().find(|tier| tier.level == level)
    }

    pub fn next_after(&self, level: u8) -> Option<&EscalationLevel> {
        self.levels.iter().find(|tier| tier.level > level)
    }
}

/// Scheduled advancement check: if `watch_notification_id` is still unread
/// at `due_at`, the next tier is notified. Checked best-effort on each
/// queue poll cycle rather than by a wall-clock timer.
#[derive(Debug, Clone)]
pub struct PendingEscalation {
    pub company_id: String,
    pub related_entity_id: String,
    pub watch_notification_id: String,
    pub next_level: u8,
    pub due_at: DateTime<Utc>,
}
