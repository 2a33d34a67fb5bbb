use std::sync::Arc;

use super::common::{
    calm_response, critical_response, disabled_config, enabled_config, malformed_response,
    orchestrator_fixture, orchestrator_fixture_with_enricher, two_category_response,
    BrokenEnricher, FlakyAnalysisStore, StampingEnricher,
};
use crate::workflows::psychosocial::clock::Clock;
use crate::workflows::psychosocial::domain::{
    AutomationConfig, ExposureLevel, NotificationKind, PlanPriority, ProcessingStage,
    ProcessingStatus,
};
use crate::workflows::psychosocial::memory::InMemoryStore;
use crate::workflows::psychosocial::orchestrator::{ProcessingError, ProcessingOutcome};
use crate::workflows::psychosocial::repository::AutomationRepository;

#[test]
fn critical_response_runs_the_full_pipeline() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture(store.clone());
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    let report = match outcome {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(report.analyses.len(), 1);
    let analysis = &report.analyses[0];
    assert_eq!(analysis.exposure_level, ExposureLevel::Critico);
    assert!((analysis.risk_score - 85.0).abs() < 1e-3);
    assert!(!analysis.mandatory_measures.is_empty());

    assert!(report.action_planned);
    assert_eq!(report.plans.len(), 1);
    assert_eq!(report.plans[0].priority, PlanPriority::Critical);

    assert!(report
        .notifications
        .iter()
        .any(|n| n.kind == NotificationKind::CriticalRisk));
    assert!(report
        .notifications
        .iter()
        .any(|n| n.kind == NotificationKind::ActionPlanGenerated));

    // One processing row per stage entered plus exactly one terminal row.
    let logs = store.logs_for_response(&response.id).expect("logs");
    let terminal: Vec<_> = logs
        .iter()
        .filter(|entry| entry.status.is_terminal())
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, ProcessingStatus::Completed);
    assert_eq!(terminal[0].stage, ProcessingStage::Finished);
    assert_eq!(terminal[0].id, report.log_id);
    let stages: Vec<ProcessingStage> = logs
        .iter()
        .filter(|entry| entry.status == ProcessingStatus::Processing)
        .map(|entry| entry.stage)
        .collect();
    assert_eq!(
        stages,
        vec![
            ProcessingStage::Scoring,
            ProcessingStage::Analysis,
            ProcessingStage::ActionPlan,
            ProcessingStage::Notification,
        ]
    );

    // Transport saw the critical alert and the plan notice.
    let templates: Vec<String> = fixture
        .transport
        .dispatches()
        .into_iter()
        .map(|dispatch| dispatch.template)
        .collect();
    assert!(templates.contains(&"critical_risk".to_string()));
    assert!(templates.contains(&"action_plan_generated".to_string()));
}

#[test]
fn calm_response_skips_plans_and_alerts() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture(store.clone());
    let response = calm_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    let report = match outcome {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(report.analyses.len(), 2);
    assert!(report
        .analyses
        .iter()
        .all(|analysis| analysis.mandatory_measures.is_empty()));
    assert!(!report.action_planned);
    assert!(report.plans.is_empty());
    assert!(report.notifications.is_empty());
}

#[test]
fn disabled_automation_leaves_no_trace() {
    let store = Arc::new(InMemoryStore::with_config(disabled_config()));
    let fixture = orchestrator_fixture(store.clone());
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    assert!(matches!(outcome, ProcessingOutcome::Disabled));

    assert!(store.logs_for_response(&response.id).expect("logs").is_empty());
    assert!(store
        .analyses_for_response(&response.id)
        .expect("analyses")
        .is_empty());
}

#[test]
fn missing_config_counts_as_disabled() {
    let store = Arc::new(InMemoryStore::new());
    let fixture = orchestrator_fixture(store.clone());
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    assert!(matches!(outcome, ProcessingOutcome::Disabled));
}

#[test]
fn processing_delay_defers_the_attempt() {
    let config = AutomationConfig {
        processing_delay_minutes: 60,
        ..enabled_config()
    };
    let store = Arc::new(InMemoryStore::with_config(config));
    let fixture = orchestrator_fixture(store.clone());
    let response = critical_response("resp-1");
    let completed_at = response.completed_at;
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    match outcome {
        ProcessingOutcome::Deferred { until } => {
            assert_eq!(until, completed_at + chrono::Duration::minutes(60));
        }
        other => panic!("expected deferral, got {other:?}"),
    }
    assert!(store.logs_for_response(&response.id).expect("logs").is_empty());
}

#[test]
fn malformed_answers_fail_without_retry() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture(store.clone());
    let response = malformed_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    match outcome {
        ProcessingOutcome::Failed { stage, error } => {
            assert_eq!(stage, ProcessingStage::Scoring);
            assert!(!error.is_retryable());
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let logs = store.logs_for_response(&response.id).expect("logs");
    let errors: Vec<_> = logs
        .iter()
        .filter(|entry| entry.status == ProcessingStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .error_message
        .as_deref()
        .expect("error message recorded")
        .contains("categoria_fantasma"));
}

#[test]
fn unknown_response_is_an_input_error() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture(store.clone());

    let missing = crate::workflows::psychosocial::domain::AssessmentId("ghost".to_string());
    let outcome = fixture.orchestrator.process(&missing, 1);
    match outcome {
        ProcessingOutcome::Failed { error, .. } => {
            assert!(matches!(error, ProcessingError::ResponseNotFound(_)));
            assert!(!error.is_retryable());
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn reprocessing_never_duplicates_action_plans() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture(store.clone());
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let first = fixture.orchestrator.process(&response.id, 1);
    let first = match first {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(first.plans.len(), 1);

    let second = fixture.orchestrator.process(&response.id, 2);
    let second = match second {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert!(second.plans.is_empty(), "second run must skip the open plan");
    assert!(!second.action_planned);

    let window_start = fixture.clock.now() - chrono::Duration::days(1);
    let window_end = fixture.clock.now() + chrono::Duration::days(1);
    let plans = store
        .plans_in_range("co-1", window_start, window_end)
        .expect("plans");
    assert_eq!(plans.len(), 1);
}

#[test]
fn one_failed_category_does_not_sink_the_attempt() {
    let store = Arc::new(FlakyAnalysisStore::failing(1));
    store
        .upsert_automation_config(enabled_config())
        .expect("seed config");
    let fixture = orchestrator_fixture(store.clone());
    let response = two_category_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    let report = match outcome {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(report.analyses.len(), 1, "surviving category is kept");
    assert_eq!(
        store
            .inner()
            .analyses_for_response(&response.id)
            .expect("analyses")
            .len(),
        1
    );
}

#[test]
fn losing_every_category_fails_the_analysis_stage() {
    let store = Arc::new(FlakyAnalysisStore::failing(u32::MAX));
    store
        .upsert_automation_config(enabled_config())
        .expect("seed config");
    let fixture = orchestrator_fixture(store.clone());
    let response = two_category_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    match outcome {
        ProcessingOutcome::Failed { stage, error } => {
            assert_eq!(stage, ProcessingStage::Analysis);
            assert!(matches!(error, ProcessingError::AnalysisPersistFailed));
            assert!(error.is_retryable());
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn enrichment_annotates_analyses() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture_with_enricher(store.clone(), Arc::new(StampingEnricher));
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    let report = match outcome {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert!(report.analyses[0]
        .insights
        .as_deref()
        .expect("insights recorded")
        .contains("demandas_trabalho"));
}

#[test]
fn broken_enrichment_degrades_to_basic_analysis() {
    let store = Arc::new(InMemoryStore::with_config(enabled_config()));
    let fixture = orchestrator_fixture_with_enricher(store.clone(), Arc::new(BrokenEnricher));
    let response = critical_response("resp-1");
    store.insert_response(response.clone()).expect("insert response");

    let outcome = fixture.orchestrator.process(&response.id, 1);
    let report = match outcome {
        ProcessingOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(report.analyses.len(), 1);
    assert!(report.analyses[0].insights.is_none());
}
