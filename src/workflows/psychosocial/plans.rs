use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::catalog::CategoryCatalog;
use super::domain::{
    ActionPlan, ActionPlanItem, OrgContext, PlanStatus, RiskAnalysis,
};
use super::repository::{AutomationRepository, RepositoryError};

static PLAN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_plan_id() -> String {
    let id = PLAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("plan-{id:06}")
}

/// Synthesizes mitigation plans from the high/critical analyses of a
/// processing run, one plan per sector, at most once per trigger.
pub struct ActionPlanGenerator {
    catalog: Arc<CategoryCatalog>,
}

impl ActionPlanGenerator {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self { catalog }
    }

    /// Generate and persist plans for every sector carrying at least one
    /// `alto`/`critico` analysis. Sectors that already have an open plan
    /// for this trigger are skipped so reprocessing never duplicates work.
    pub fn generate<R: AutomationRepository>(
        &self,
        repository: &R,
        analyses: &[RiskAnalysis],
        org: &OrgContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActionPlan>, RepositoryError> {
        let mut by_sector: BTreeMap<&str, Vec<&RiskAnalysis>> = BTreeMap::new();
        for analysis in analyses {
            if analysis.exposure_level.requires_mandatory_measures() {
                by_sector
                    .entry(analysis.sector_id.as_str())
                    .or_default()
                    .push(analysis);
            }
        }

        let mut created = Vec::new();
        for (sector_id, group) in by_sector {
            let trigger = &group[0].assessment_response_id;
            if repository.open_plan_exists(sector_id, trigger)? {
                tracing::debug!(
                    sector_id,
                    assessment_id = %trigger,
                    "open action plan already exists; skipping generation"
                );
                continue;
            }

            let Some(worst) = group.iter().map(|analysis| analysis.exposure_level).max() else {
                continue;
            };
            let Some(priority) = worst.plan_priority() else {
                continue;
            };

            let due_date = (now + worst.review_offset()).date_naive();
            let items = self.default_items(&group, due_date);

            let plan = ActionPlan {
                id: next_plan_id(),
                company_id: group[0].company_id.clone(),
                sector_id: sector_id.to_string(),
                assessment_response_id: trigger.clone(),
                title: format!(
                    "Plano de ação psicossocial — {} ({})",
                    org.sector_label, org.employee_label
                ),
                priority,
                status: PlanStatus::Open,
                due_date,
                created_at: now,
                items,
            };

            let stored = repository.insert_plan(plan)?;
            tracing::info!(
                plan_id = %stored.id,
                sector_id,
                priority = stored.priority.label(),
                "action plan generated"
            );
            created.push(stored);
        }

        Ok(created)
    }

    /// Default items only come from category templates; anything further
    /// is left to human follow-up.
    fn default_items(
        &self,
        group: &[&RiskAnalysis],
        due_date: chrono::NaiveDate,
    ) -> Vec<ActionPlanItem> {
        let mut items = Vec::new();
        for analysis in group {
            let Some(definition) = self.catalog.definition(&analysis.category) else {
                continue;
            };
            for description in definition.default_plan_items {
                items.push(ActionPlanItem {
                    description: description.to_string(),
                    due_date,
                    completed: false,
                });
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::psychosocial::domain::{
        AssessmentId, ExposureLevel, PlanPriority, RiskStatus,
    };
    use crate::workflows::psychosocial::memory::InMemoryStore;
    use chrono::NaiveDate;

    fn analysis(sector: &str, category: &str, exposure: ExposureLevel) -> RiskAnalysis {
        RiskAnalysis {
            id: format!("ra-test-{category}"),
            company_id: "co-1".to_string(),
            sector_id: sector.to_string(),
            role_id: "role-1".to_string(),
            employee_id: "emp-1".to_string(),
            assessment_response_id: AssessmentId("resp-1".to_string()),
            category: category.to_string(),
            risk_score: 80.0,
            exposure_level: exposure,
            recommended_actions: vec!["acao".to_string()],
            mandatory_measures: vec!["medida".to_string()],
            evaluation_date: Utc::now(),
            next_evaluation_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid"),
            status: RiskStatus::Identified,
            insights: None,
        }
    }

    fn org() -> OrgContext {
        OrgContext {
            company_id: "co-1".to_string(),
            sector_id: "sec-1".to_string(),
            sector_label: "Atendimento".to_string(),
            role_id: "role-1".to_string(),
            employee_id: "emp-1".to_string(),
            employee_label: "Ana Souza".to_string(),
        }
    }

    fn generator() -> ActionPlanGenerator {
        ActionPlanGenerator::new(Arc::new(CategoryCatalog::standard()))
    }

    #[test]
    fn priority_comes_from_worst_exposure_in_group() {
        let store = InMemoryStore::new();
        let analyses = vec![
            analysis("sec-1", "demandas_trabalho", ExposureLevel::Alto),
            analysis("sec-1", "apoio_lideranca", ExposureLevel::Critico),
        ];

        let plans = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("generation succeeds");

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].priority, PlanPriority::Critical);
        assert_eq!(plans[0].status, PlanStatus::Open);
    }

    #[test]
    fn low_and_medium_exposures_generate_nothing() {
        let store = InMemoryStore::new();
        let analyses = vec![
            analysis("sec-1", "demandas_trabalho", ExposureLevel::Baixo),
            analysis("sec-1", "apoio_lideranca", ExposureLevel::Medio),
        ];

        let plans = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("generation succeeds");
        assert!(plans.is_empty());
    }

    #[test]
    fn existing_open_plan_blocks_regeneration() {
        let store = InMemoryStore::new();
        let analyses = vec![analysis("sec-1", "demandas_trabalho", ExposureLevel::Critico)];

        let first = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("first run succeeds");
        assert_eq!(first.len(), 1);

        let second = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("second run succeeds");
        assert!(second.is_empty(), "second run must skip the open plan");
    }

    #[test]
    fn sectors_get_independent_plans() {
        let store = InMemoryStore::new();
        let analyses = vec![
            analysis("sec-1", "demandas_trabalho", ExposureLevel::Alto),
            analysis("sec-2", "relacionamentos", ExposureLevel::Critico),
        ];

        let plans = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("generation succeeds");

        assert_eq!(plans.len(), 2);
        let priorities: Vec<PlanPriority> = plans.iter().map(|p| p.priority).collect();
        assert!(priorities.contains(&PlanPriority::High));
        assert!(priorities.contains(&PlanPriority::Critical));
    }

    #[test]
    fn due_date_follows_the_offset_table() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let analyses = vec![analysis("sec-1", "demandas_trabalho", ExposureLevel::Critico)];

        let plans = generator()
            .generate(&store, &analyses, &org(), now)
            .expect("generation succeeds");
        assert_eq!(
            plans[0].due_date,
            (now + chrono::Duration::days(30)).date_naive()
        );
    }

    #[test]
    fn template_items_are_copied_onto_the_plan() {
        let store = InMemoryStore::new();
        let analyses = vec![analysis("sec-1", "demandas_trabalho", ExposureLevel::Critico)];

        let plans = generator()
            .generate(&store, &analyses, &org(), Utc::now())
            .expect("generation succeeds");
        assert_eq!(plans[0].items.len(), 2);
        assert!(plans[0].items.iter().all(|item| !item.completed));
    }
}
