use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
};
use founderhub_domain::notifications::{NotificationListQuery, NotificationPage};
use serde::{Deserialize, Serialize};

use super::idempotent;
use crate::error::{ApiError, map_domain_error};
use crate::middleware::AuthContext;
use crate::state::AppState;
use crate::validation;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/unread-count", get(unread_count))
        .route("/v1/notifications/read-all", post(mark_all_read))
        .route("/v1/notifications/:notification_id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    limit: Option<usize>,
    cursor_created_at_ms: Option<i64>,
    cursor_notification_id: Option<String>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let actor = auth.actor()?;
    let page = state
        .notifications
        .list_for_user(
            &actor.user_id,
            NotificationListQuery {
                limit: query.limit,
                cursor_created_at_ms: query.cursor_created_at_ms,
                cursor_notification_id: query.cursor_notification_id,
            },
        )
        .await
        .map_err(map_domain_error)?;
    Ok(Json(page))
}

#[derive(Serialize)]
struct UnreadCountResponse {
    unread_count: usize,
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let actor = auth.actor()?;
    let unread_count = state
        .notifications
        .unread_count(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let notification_id = validation::identifier("notification_id", &notification_id)?;
    idempotent(&state, &headers, "notification_read", &actor, StatusCode::OK, async {
        state
            .notifications
            .mark_read(&actor, &notification_id)
            .await
            .map_err(map_domain_error)
    })
    .await
}

#[derive(Serialize)]
struct MarkAllReadResponse {
    updated: usize,
}

async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    idempotent(&state, &headers, "notification_read_all", &actor, StatusCode::OK, async {
        let updated = state
            .notifications
            .mark_all_read(&actor)
            .await
            .map_err(map_domain_error)?;
        Ok(MarkAllReadResponse { updated })
    })
    .await
}
