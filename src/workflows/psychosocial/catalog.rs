use serde::{Deserialize, Serialize};

use super::domain::AssessmentResponse;
use super::scoring::{AnswerItem, ScoringError};

/// Bounds of the answer scale a category is collected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBounds {
    pub min: f32,
    pub max: f32,
}

impl ScaleBounds {
    pub const LIKERT_1_5: ScaleBounds = ScaleBounds { min: 1.0, max: 5.0 };

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Mirror a value on this scale, used for reverse-scored items.
    pub fn reverse(&self, value: f32) -> f32 {
        self.max - value + self.min
    }
}

/// Cut points of the exposure ladder on the rescaled 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLadder {
    pub medio: f32,
    pub alto: f32,
    pub critico: f32,
}

impl ThresholdLadder {
    pub const NR01_DEFAULT: ThresholdLadder = ThresholdLadder {
        medio: 25.0,
        alto: 50.0,
        critico: 75.0,
    };

    pub fn classify(&self, score: f32) -> super::domain::ExposureLevel {
        use super::domain::ExposureLevel;
        if score < self.medio {
            ExposureLevel::Baixo
        } else if score < self.alto {
            ExposureLevel::Medio
        } else if score < self.critico {
            ExposureLevel::Alto
        } else {
            ExposureLevel::Critico
        }
    }
}

/// Static catalog entry for one psychosocial risk category.
///
/// The five NR-01-aligned categories are the single taxonomy the pipeline
/// scores, mitigates, and plans against. Reverse-scored question ids are
/// declared here so callers never hard-code scoring direction.
#[derive(Debug, Clone)]
pub struct CategoryDefinition {
    pub key: &'static str,
    pub display_name: &'static str,
    pub scale: ScaleBounds,
    pub thresholds: ThresholdLadder,
    pub reverse_scored: &'static [&'static str],
    pub recommended_actions: &'static [&'static str],
    pub default_plan_items: &'static [&'static str],
}

impl CategoryDefinition {
    pub fn is_reverse_scored(&self, question_id: &str) -> bool {
        self.reverse_scored.contains(&question_id)
    }
}

/// Immutable catalog loaded at startup.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    definitions: Vec<CategoryDefinition>,
}

impl CategoryCatalog {
    pub fn standard() -> Self {
        Self {
            definitions: standard_definitions(),
        }
    }

    pub fn definitions(&self) -> &[CategoryDefinition] {
        &self.definitions
    }

    pub fn definition(&self, key: &str) -> Option<&CategoryDefinition> {
        self.definitions.iter().find(|def| def.key == key)
    }

    /// Validate raw answers and resolve each into a scoring item with its
    /// reverse flag applied from the category definition.
    ///
    /// Malformed input (unknown category, out-of-scale or non-finite
    /// values, no answers at all) is rejected up front; it will not become
    /// more valid on retry.
    pub fn resolve_items(
        &self,
        response: &AssessmentResponse,
    ) -> Result<Vec<AnswerItem>, ScoringError> {
        if response.answers.is_empty() {
            return Err(ScoringError::EmptyResponse {
                assessment_response_id: response.id.0.clone(),
            });
        }

        let mut items = Vec::with_capacity(response.answers.len());
        for answer in &response.answers {
            let definition = self.definition(&answer.category).ok_or_else(|| {
                ScoringError::UnknownCategory {
                    question_id: answer.question_id.clone(),
                    category: answer.category.clone(),
                }
            })?;

            if !answer.value.is_finite() {
                return Err(ScoringError::NonFiniteValue {
                    question_id: answer.question_id.clone(),
                });
            }
            if !definition.scale.contains(answer.value) {
                return Err(ScoringError::ValueOutOfRange {
                    question_id: answer.question_id.clone(),
                    value: answer.value,
                    min: definition.scale.min,
                    max: definition.scale.max,
                });
            }

            items.push(AnswerItem {
                question_id: answer.question_id.clone(),
                category: answer.category.clone(),
                value: answer.value,
                reverse_scored: definition.is_reverse_scored(&answer.question_id),
            });
        }

        Ok(items)
    }
}

fn standard_definitions() -> Vec<CategoryDefinition> {
    vec![
        CategoryDefinition {
            key: "demandas_trabalho",
            display_name: "Demandas de Trabalho",
            scale: ScaleBounds::LIKERT_1_5,
            thresholds: ThresholdLadder::NR01_DEFAULT,
            reverse_scored: &[],
            recommended_actions: &[
                "Revisar a distribuição de carga de trabalho entre a equipe",
                "Estabelecer pausas programadas durante a jornada",
                "Adequar prazos e metas à capacidade real do setor",
            ],
            default_plan_items: &[
                "Mapear picos de demanda do setor e redistribuir atividades",
                "Negociar prazos críticos com as lideranças envolvidas",
            ],
        },
        CategoryDefinition {
            key: "controle_autonomia",
            display_name: "Controle e Autonomia",
            scale: ScaleBounds::LIKERT_1_5,
            thresholds: ThresholdLadder::NR01_DEFAULT,
            // Positively phrased items: higher agreement means lower risk.
            reverse_scored: &["ca_01", "ca_02", "ca_03", "ca_04"],
            recommended_actions: &[
                "Ampliar a participação dos trabalhadores nas decisões do setor",
                "Flexibilizar a ordem e o ritmo de execução das tarefas",
            ],
            default_plan_items: &[
                "Instituir fórum mensal de escuta com o setor",
            ],
        },
        CategoryDefinition {
            key: "apoio_lideranca",
            display_name: "Apoio Social e Liderança",
            scale: ScaleBounds::LIKERT_1_5,
            thresholds: ThresholdLadder::NR01_DEFAULT,
            reverse_scored: &["al_01", "al_02", "al_03"],
            recommended_actions: &[
                "Capacitar lideranças em práticas de suporte e feedback",
                "Garantir canais diretos de apoio ao trabalhador",
            ],
            default_plan_items: &[
                "Treinar gestores do setor em liderança de apoio",
            ],
        },
        CategoryDefinition {
            key: "relacionamentos",
            display_name: "Relacionamentos Interpessoais",
            scale: ScaleBounds::LIKERT_1_5,
            thresholds: ThresholdLadder::NR01_DEFAULT,
            reverse_scored: &["re_01", "re_02"],
            recommended_actions: &[
                "Mediar conflitos identificados no setor",
                "Reforçar o código de conduta e os canais de denúncia",
            ],
            default_plan_items: &[
                "Conduzir diagnóstico de clima com apoio do RH",
            ],
        },
        CategoryDefinition {
            key: "reconhecimento_recompensa",
            display_name: "Reconhecimento e Recompensa",
            scale: ScaleBounds::LIKERT_1_5,
            thresholds: ThresholdLadder::NR01_DEFAULT,
            reverse_scored: &["rr_01", "rr_02", "rr_03"],
            recommended_actions: &[
                "Revisar critérios de reconhecimento e progressão",
                "Dar visibilidade às entregas do setor nas comunicações internas",
            ],
            default_plan_items: &[],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::psychosocial::domain::{AssessmentId, ExposureLevel};
    use chrono::Utc;

    fn response_with(answers: Vec<AnswerValue>) -> AssessmentResponse {
        AssessmentResponse {
            id: AssessmentId("resp-1".to_string()),
            company_id: "co-1".to_string(),
            employee_id: "emp-1".to_string(),
            employee_name: None,
            sector_id: "sec-1".to_string(),
            sector_name: None,
            role_id: "role-1".to_string(),
            template_id: "tpl-nr01".to_string(),
            answers,
            raw_score: None,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn ladder_boundaries_are_half_open() {
        let ladder = ThresholdLadder::NR01_DEFAULT;
        assert_eq!(ladder.classify(0.0), ExposureLevel::Baixo);
        assert_eq!(ladder.classify(24.9), ExposureLevel::Baixo);
        assert_eq!(ladder.classify(25.0), ExposureLevel::Medio);
        assert_eq!(ladder.classify(50.0), ExposureLevel::Alto);
        assert_eq!(ladder.classify(75.0), ExposureLevel::Critico);
        assert_eq!(ladder.classify(100.0), ExposureLevel::Critico);
    }

    #[test]
    fn resolve_marks_reverse_scored_questions() {
        let catalog = CategoryCatalog::standard();
        let response = response_with(vec![
            AnswerValue {
                question_id: "ca_01".to_string(),
                category: "controle_autonomia".to_string(),
                value: 4.0,
            },
            AnswerValue {
                question_id: "dt_01".to_string(),
                category: "demandas_trabalho".to_string(),
                value: 4.0,
            },
        ]);

        let items = catalog.resolve_items(&response).expect("valid answers");
        assert!(items[0].reverse_scored);
        assert!(!items[1].reverse_scored);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let catalog = CategoryCatalog::standard();
        let response = response_with(vec![AnswerValue {
            question_id: "xx_01".to_string(),
            category: "nao_existe".to_string(),
            value: 3.0,
        }]);

        let error = catalog.resolve_items(&response).expect_err("must reject");
        assert!(matches!(error, ScoringError::UnknownCategory { .. }));
    }

    #[test]
    fn out_of_scale_value_is_rejected() {
        let catalog = CategoryCatalog::standard();
        let response = response_with(vec![AnswerValue {
            question_id: "dt_01".to_string(),
            category: "demandas_trabalho".to_string(),
            value: 9.0,
        }]);

        let error = catalog.resolve_items(&response).expect_err("must reject");
        assert!(matches!(error, ScoringError::ValueOutOfRange { .. }));
    }

    #[test]
    fn empty_response_is_rejected() {
        let catalog = CategoryCatalog::standard();
        let response = response_with(Vec::new());
        let error = catalog.resolve_items(&response).expect_err("must reject");
        assert!(matches!(error, ScoringError::EmptyResponse { .. }));
    }
}
