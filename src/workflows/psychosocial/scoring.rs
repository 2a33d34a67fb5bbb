use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::CategoryCatalog;
use super::domain::CategoryScore;

/// Fully-resolved scoring input: one answered item with its reverse flag
/// already taken from the category definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerItem {
    pub question_id: String,
    pub category: String,
    pub value: f32,
    pub reverse_scored: bool,
}

/// Input validation failures. These are terminal: retrying the same
/// payload cannot succeed.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("response {assessment_response_id} has no answered items")]
    EmptyResponse { assessment_response_id: String },
    #[error("question {question_id} references unknown category '{category}'")]
    UnknownCategory {
        question_id: String,
        category: String,
    },
    #[error("question {question_id} value {value} outside scale [{min}, {max}]")]
    ValueOutOfRange {
        question_id: String,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("question {question_id} value is not a finite number")]
    NonFiniteValue { question_id: String },
}

/// Stateless scorer: mean per category (reverse-scored items mirrored on
/// the scale), rescaled to 0-100 and classified on the category ladder.
///
/// Deterministic and side-effect free; the primary unit-test surface of
/// the pipeline.
pub struct ScoringEngine {
    catalog: Arc<CategoryCatalog>,
}

impl ScoringEngine {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Score resolved items. Categories with zero answered items are
    /// omitted from the output, never reported as zero.
    pub fn score(&self, items: &[AnswerItem]) -> Vec<CategoryScore> {
        let mut grouped: BTreeMap<&str, Vec<&AnswerItem>> = BTreeMap::new();
        for item in items {
            grouped.entry(item.category.as_str()).or_default().push(item);
        }

        let mut scores = Vec::new();
        for definition in self.catalog.definitions() {
            let Some(answered) = grouped.get(definition.key) else {
                continue;
            };
            if answered.is_empty() {
                continue;
            }

            let sum: f32 = answered
                .iter()
                .map(|item| {
                    if item.reverse_scored {
                        definition.scale.reverse(item.value)
                    } else {
                        item.value
                    }
                })
                .sum();
            let mean = sum / answered.len() as f32;
            let risk_score = (mean - definition.scale.min) / definition.scale.span() * 100.0;

            scores.push(CategoryScore {
                category: definition.key.to_string(),
                risk_score,
                exposure: definition.thresholds.classify(risk_score),
                answered_items: answered.len(),
            });
        }

        scores
    }
}
