use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
};
use founderhub_domain::users::{ProfilePatch, RegisterUserInput, UserKind, UserProfile};
use serde::Deserialize;
use validator::Validate;

use super::idempotent;
use crate::error::{ApiError, map_domain_error};
use crate::middleware::AuthContext;
use crate::state::AppState;
use crate::validation;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register))
        .route("/v1/users/me", get(me).patch(update_me))
        .route("/v1/users/me/deactivate", post(deactivate))
        .route("/v1/users/:user_id", get(get_user))
        .route("/v1/onelink/:slug", get(resolve_one_link))
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(length(min = 1, max = 64))]
    one_link: String,
    #[validate(length(min = 1, max = 120))]
    display_name: String,
    #[validate(length(max = 280))]
    headline: Option<String>,
    kind: UserKind,
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let input = RegisterUserInput {
        one_link: payload.one_link,
        display_name: payload.display_name,
        headline: payload.headline,
        kind: payload.kind,
    };
    idempotent(&state, &headers, "user_register", &actor, StatusCode::CREATED, async {
        state
            .users
            .register(&actor, input)
            .await
            .map_err(map_domain_error)
    })
    .await
}

async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserProfile>, ApiError> {
    let actor = auth.actor()?;
    let profile = state
        .users
        .get(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    display_name: Option<String>,
    #[validate(length(max = 280))]
    headline: Option<String>,
    kind: Option<UserKind>,
}

async fn update_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let patch = ProfilePatch {
        display_name: payload.display_name,
        headline: payload.headline,
        kind: payload.kind,
    };
    idempotent(&state, &headers, "user_update", &actor, StatusCode::OK, async {
        state
            .users
            .update_profile(&actor, patch)
            .await
            .map_err(map_domain_error)
    })
    .await
}

async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    idempotent(&state, &headers, "user_deactivate", &actor, StatusCode::OK, async {
        state
            .users
            .deactivate(&actor)
            .await
            .map_err(map_domain_error)
    })
    .await
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = validation::identifier("user_id", &user_id)?;
    let profile = state.users.get(&user_id).await.map_err(map_domain_error)?;
    Ok(Json(profile))
}

async fn resolve_one_link(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .users
        .resolve_one_link(&slug)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(profile))
}
