use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ExposureLevel, ProcessingStatus};
use super::repository::{AutomationRepository, RepositoryError};

/// Operator-facing counters for one company over a reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutomationStats {
    pub total_processed: usize,
    pub successful_processed: usize,
    pub failed_processed: usize,
    pub high_risk_found: usize,
    pub critical_risk_found: usize,
    pub action_plans_generated: usize,
    pub notifications_sent: usize,
}

/// Compute the window counters from the audit trail.
///
/// Processed counts are per distinct response, not per attempt: a response
/// that failed twice and then completed counts once as successful, and a
/// permanently failed one counts once as failed.
pub fn automation_stats<R: AutomationRepository>(
    repository: &R,
    company_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<AutomationStats, RepositoryError> {
    let logs = repository.logs_in_range(company_id, from, to)?;

    let mut completed: HashSet<String> = HashSet::new();
    let mut errored: HashSet<String> = HashSet::new();
    for entry in &logs {
        match entry.status {
            ProcessingStatus::Completed => {
                completed.insert(entry.assessment_response_id.0.clone());
            }
            ProcessingStatus::Error => {
                errored.insert(entry.assessment_response_id.0.clone());
            }
            ProcessingStatus::Processing => {}
        }
    }
    let failed: HashSet<&String> = errored.difference(&completed).collect();

    let analyses = repository.analyses_in_range(company_id, from, to)?;
    let high_risk_found = analyses
        .iter()
        .filter(|analysis| analysis.exposure_level == ExposureLevel::Alto)
        .count();
    let critical_risk_found = analyses
        .iter()
        .filter(|analysis| analysis.exposure_level == ExposureLevel::Critico)
        .count();

    let action_plans_generated = repository.plans_in_range(company_id, from, to)?.len();
    let notifications_sent = repository
        .notifications_in_range(company_id, from, to)?
        .len();

    Ok(AutomationStats {
        total_processed: completed.len() + failed.len(),
        successful_processed: completed.len(),
        failed_processed: failed.len(),
        high_risk_found,
        critical_risk_found,
        action_plans_generated,
        notifications_sent,
    })
}
