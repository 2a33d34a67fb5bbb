use super::domain::RiskAnalysis;

/// Optional AI-assisted enrichment of a finished analysis.
///
/// The orchestrator calls this after the statistical analysis is built;
/// the basic analysis must stand on its own, so failures here degrade
/// gracefully and are never fatal to the processing attempt.
pub trait RiskEnricher: Send + Sync {
    fn enhance(&self, analysis: RiskAnalysis) -> Result<RiskAnalysis, EnrichmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("enrichment provider unavailable: {0}")]
    Unavailable(String),
    #[error("enrichment timed out")]
    Timeout,
}

/// Default capability: passes the analysis through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnricher;

impl RiskEnricher for NoopEnricher {
    fn enhance(&self, analysis: RiskAnalysis) -> Result<RiskAnalysis, EnrichmentError> {
        Ok(analysis)
    }
}
