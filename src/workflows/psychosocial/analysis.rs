use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::catalog::CategoryCatalog;
use super::domain::{
    AssessmentResponse, CategoryScore, OrgContext, RiskAnalysis, RiskStatus,
};
use super::repository::{AutomationRepository, RepositoryError};

static ANALYSIS_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_analysis_id() -> String {
    let id = ANALYSIS_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("ra-{id:06}")
}

/// Result of persisting one batch of analyses: category writes succeed or
/// fail independently because the store offers no cross-row transactions.
#[derive(Debug)]
pub struct AnalysisPersistOutcome {
    pub stored: Vec<RiskAnalysis>,
    pub failures: Vec<(String, RepositoryError)>,
}

impl AnalysisPersistOutcome {
    /// The stage only counts as failed when nothing at all was stored.
    pub fn all_failed(&self) -> bool {
        self.stored.is_empty() && !self.failures.is_empty()
    }
}

/// Turns category scores into persisted `RiskAnalysis` rows with the
/// mandatory-measure and re-evaluation rules applied.
pub struct RiskAnalysisBuilder {
    catalog: Arc<CategoryCatalog>,
}

impl RiskAnalysisBuilder {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self { catalog }
    }

    /// Build one analysis per scored category.
    ///
    /// Recommended actions come from the category template; for `alto` and
    /// `critico` the same actions become mandatory measures, which keeps
    /// the invariant that upper tiers never carry an empty measure list.
    pub fn build(
        &self,
        response: &AssessmentResponse,
        scores: &[CategoryScore],
        org: &OrgContext,
        evaluated_at: DateTime<Utc>,
    ) -> Vec<RiskAnalysis> {
        scores
            .iter()
            .map(|score| {
                let recommended: Vec<String> = self
                    .catalog
                    .definition(&score.category)
                    .map(|def| {
                        def.recommended_actions
                            .iter()
                            .map(|action| action.to_string())
                            .collect()
                    })
                    .unwrap_or_default();

                let mandatory = if score.exposure.requires_mandatory_measures() {
                    recommended.clone()
                } else {
                    Vec::new()
                };

                RiskAnalysis {
                    id: next_analysis_id(),
                    company_id: org.company_id.clone(),
                    sector_id: org.sector_id.clone(),
                    role_id: org.role_id.clone(),
                    employee_id: org.employee_id.clone(),
                    assessment_response_id: response.id.clone(),
                    category: score.category.clone(),
                    risk_score: score.risk_score,
                    exposure_level: score.exposure,
                    recommended_actions: recommended,
                    mandatory_measures: mandatory,
                    evaluation_date: evaluated_at,
                    next_evaluation_date: (evaluated_at + score.exposure.review_offset())
                        .date_naive(),
                    status: RiskStatus::Identified,
                    insights: None,
                }
            })
            .collect()
    }

    /// Persist analyses one row at a time. A failed category is logged and
    /// reported but never rolls back its siblings.
    pub fn persist<R: AutomationRepository>(
        &self,
        repository: &R,
        analyses: Vec<RiskAnalysis>,
    ) -> AnalysisPersistOutcome {
        let mut stored = Vec::with_capacity(analyses.len());
        let mut failures = Vec::new();

        for analysis in analyses {
            let category = analysis.category.clone();
            match repository.insert_analysis(analysis) {
                Ok(row) => stored.push(row),
                Err(error) => {
                    tracing::warn!(
                        category = %category,
                        error = %error,
                        "risk analysis write failed; continuing with remaining categories"
                    );
                    failures.push((category, error));
                }
            }
        }

        AnalysisPersistOutcome { stored, failures }
    }
}
