mod connections;
mod messages;
mod notifications;
mod posts;
mod users;

use std::future::Future;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use founderhub_domain::identity::ActorIdentity;
use founderhub_domain::idempotency::BeginOutcome;
use founderhub_domain::ports::idempotency::{IdempotencyKey, StoredResponse};
use serde::Serialize;

use crate::{error::ApiError, middleware as app_middleware, observability, state::AppState};

const BASE_BODY_LIMIT: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(users::routes())
        .merge(connections::routes())
        .merge(notifications::routes())
        .merge(messages::routes())
        .merge(posts::routes())
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    // Attachments travel base64-encoded inside JSON.
    let body_limit = state.config.attachment_max_bytes / 3 * 4 + BASE_BODY_LIMIT;

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .route_layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.is_test() {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> Response {
    let (status_code, status) = match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            tracing::warn!(error = %err, database = state.db.name(), "database probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        database: state.db.name(),
    };
    (status_code, Json(body)).into_response()
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::NotFound.into_response(),
    }
}

/// Runs `work` at most once per (operation, actor, `x-request-id`).
/// Replays return the stored response; a duplicate that arrives while the
/// first attempt is still running is a conflict. Failed attempts release the
/// key so the client may retry.
pub(crate) async fn idempotent<T, F>(
    state: &AppState,
    headers: &HeaderMap,
    operation: &'static str,
    actor: &ActorIdentity,
    success: StatusCode,
    work: F,
) -> Result<Response, ApiError>
where
    T: Serialize,
    F: Future<Output = Result<T, ApiError>>,
{
    let request_id = request_id_from_headers(headers)?;
    let key = IdempotencyKey::new(operation, actor.user_id.clone(), request_id);

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, operation, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => {
            observability::register_idempotency_replay(operation);
            Ok(to_response(response))
        }
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let value = match work.await {
                Ok(value) => value,
                Err(err) => {
                    if let Err(release_err) = state.idempotency.abandon(&key).await {
                        tracing::warn!(error = %release_err, operation, "idempotency release failed");
                    }
                    return Err(err);
                }
            };
            let response = StoredResponse {
                status_code: success.as_u16(),
                body: serde_json::to_value(&value).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, operation, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn to_response(response: StoredResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
