use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AssessmentId, AssessmentResponse, AutomationConfig};
use super::repository::{AutomationRepository, NotificationTransport, RepositoryError};
use super::service::AutomationService;

/// Router builder exposing the automation pipeline over HTTP.
pub fn automation_router<R, T>(service: Arc<AutomationService<R, T>>) -> Router
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    Router::new()
        .route("/api/v1/assessments", post(submit_handler::<R, T>))
        .route(
            "/api/v1/assessments/:assessment_id/process",
            post(trigger_handler::<R, T>),
        )
        .route("/api/v1/automation/stats", get(stats_handler::<R, T>))
        .route(
            "/api/v1/automation/queue/start",
            post(queue_start_handler::<R, T>),
        )
        .route(
            "/api/v1/automation/queue/stop",
            post(queue_stop_handler::<R, T>),
        )
        .route(
            "/api/v1/automation/queue/status",
            get(queue_status_handler::<R, T>),
        )
        .route(
            "/api/v1/automation/config",
            put(config_handler::<R, T>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_read_handler::<R, T>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
    axum::Json(response): axum::Json<AssessmentResponse>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    let assessment_id = response.id.clone();
    match service.submit_assessment(response) {
        Ok(()) => {
            let payload = json!({
                "assessment_id": assessment_id.0,
                "status": "queued",
            });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn trigger_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    let outcome = service
        .trigger_processing(&AssessmentId(assessment_id))
        .await;
    (StatusCode::OK, axum::Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsQuery {
    company_id: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

pub(crate) async fn stats_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
    Query(query): Query<StatsQuery>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or_else(|| to - Duration::days(30));

    match service.stats(&query.company_id, from, to) {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn queue_start_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    service.start_processing();
    (StatusCode::OK, axum::Json(json!({ "status": "started" }))).into_response()
}

pub(crate) async fn queue_stop_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    service.stop_processing().await;
    (StatusCode::OK, axum::Json(json!({ "status": "stopped" }))).into_response()
}

pub(crate) async fn queue_status_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    (StatusCode::OK, axum::Json(service.queue_status())).into_response()
}

pub(crate) async fn config_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
    axum::Json(config): axum::Json<AutomationConfig>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    match service.upsert_automation_config(config) {
        Ok(()) => (StatusCode::NO_CONTENT, ()).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn mark_read_handler<R, T>(
    State(service): State<Arc<AutomationService<R, T>>>,
    Path(notification_id): Path<String>,
) -> Response
where
    R: AutomationRepository + 'static,
    T: NotificationTransport + 'static,
{
    match service.mark_notification_read(&notification_id) {
        Ok(true) => (StatusCode::OK, axum::Json(json!({ "updated": true }))).into_response(),
        Ok(false) => {
            let payload = json!({ "error": "notification not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(RepositoryError::NotFound) => {
            let payload = json!({ "error": "notification not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
