use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post},
};
use founderhub_domain::DomainResult;
use founderhub_domain::connections::PendingConnection;
use founderhub_domain::users::UserSummary;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::idempotent;
use crate::error::{ApiError, map_domain_error};
use crate::middleware::AuthContext;
use crate::observability;
use crate::state::AppState;
use crate::validation;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/connections", post(send_request).get(list_connections))
        .route("/v1/connections/received", get(list_received))
        .route("/v1/connections/sent", get(list_sent))
        .route("/v1/connections/recommendations", get(recommendations))
        .route("/v1/connections/:connection_id/accept", post(accept))
        .route("/v1/connections/:connection_id/reject", post(reject))
        .route("/v1/connections/:connection_id/cancel", post(cancel))
        .route("/v1/connections/users/:user_id", delete(remove))
}

fn observe<T>(transition: &'static str, result: DomainResult<T>) -> Result<T, ApiError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(_) => "error",
    };
    observability::register_connection_transition(transition, outcome);
    result.map_err(map_domain_error)
}

#[derive(Debug, Deserialize, Validate)]
struct SendRequest {
    #[validate(length(min = 1, max = 128))]
    receiver_id: String,
}

async fn send_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SendRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    idempotent(&state, &headers, "connection_request", &actor, StatusCode::CREATED, async {
        observe(
            "request",
            state
                .connections
                .send_request(&actor, &payload.receiver_id)
                .await,
        )
    })
    .await
}

async fn accept(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(connection_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let connection_id = validation::identifier("connection_id", &connection_id)?;
    idempotent(&state, &headers, "connection_accept", &actor, StatusCode::OK, async {
        observe("accept", state.connections.accept(&actor, &connection_id).await)
    })
    .await
}

async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(connection_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let connection_id = validation::identifier("connection_id", &connection_id)?;
    idempotent(&state, &headers, "connection_reject", &actor, StatusCode::OK, async {
        observe("reject", state.connections.reject(&actor, &connection_id).await)
    })
    .await
}

#[derive(Serialize)]
struct CancelResponse {
    connection_id: String,
    cancelled: bool,
}

async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(connection_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let connection_id = validation::identifier("connection_id", &connection_id)?;
    idempotent(&state, &headers, "connection_cancel", &actor, StatusCode::OK, async {
        observe("cancel", state.connections.cancel(&actor, &connection_id).await)?;
        Ok(CancelResponse {
            connection_id: connection_id.clone(),
            cancelled: true,
        })
    })
    .await
}

#[derive(Serialize)]
struct RemoveResponse {
    user_id: String,
    removed_records: usize,
}

async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let user_id = validation::identifier("user_id", &user_id)?;
    idempotent(&state, &headers, "connection_remove", &actor, StatusCode::OK, async {
        let removed_records = observe("remove", state.connections.remove(&actor, &user_id).await)?;
        Ok(RemoveResponse {
            user_id: user_id.clone(),
            removed_records,
        })
    })
    .await
}

async fn list_connections(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let actor = auth.actor()?;
    let connections = state
        .connections
        .list_connections(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(connections))
}

async fn list_received(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<PendingConnection>>, ApiError> {
    let actor = auth.actor()?;
    let pending = state
        .connections
        .list_received(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(pending))
}

async fn list_sent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<PendingConnection>>, ApiError> {
    let actor = auth.actor()?;
    let pending = state
        .connections
        .list_sent(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(pending))
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
}

async fn recommendations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let actor = auth.actor()?;
    let limit = query.limit.unwrap_or(state.config.recommendation_limit);
    let recommended = state
        .connections
        .recommendations(&actor.user_id, limit)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(recommended))
}
