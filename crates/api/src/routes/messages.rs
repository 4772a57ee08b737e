use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use founderhub_domain::messaging::{
    AttachmentUpload, ChatOverview, Message, SendMessageInput,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::idempotent;
use crate::error::{ApiError, map_domain_error};
use crate::middleware::AuthContext;
use crate::state::AppState;
use crate::validation;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/chats", get(list_chats))
        .route("/v1/chats/direct", post(open_direct))
        .route("/v1/chats/community", post(create_community))
        .route("/v1/chats/:chat_id/members", post(add_member))
        .route(
            "/v1/chats/:chat_id/messages",
            get(get_messages).post(send_message).delete(clear_chat),
        )
        .route("/v1/chats/:chat_id/read", post(mark_read))
        .route("/v1/chats/:chat_id/unread-count", get(unread_count))
        .route("/v1/chats/:chat_id/clear", post(clear_for_user))
}

#[derive(Debug, Deserialize, Validate)]
struct OpenDirectRequest {
    #[validate(length(min = 1, max = 128))]
    peer_id: String,
}

async fn open_direct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<OpenDirectRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    idempotent(&state, &headers, "chat_open_direct", &actor, StatusCode::OK, async {
        state
            .messaging
            .open_direct_chat(&actor, &payload.peer_id)
            .await
            .map_err(map_domain_error)
    })
    .await
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCommunityRequest {
    #[validate(length(min = 1, max = 120))]
    name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    member_ids: Vec<String>,
}

async fn create_community(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateCommunityRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    idempotent(&state, &headers, "chat_create_community", &actor, StatusCode::CREATED, async {
        state
            .messaging
            .create_community(&actor, &payload.name, &payload.member_ids)
            .await
            .map_err(map_domain_error)
    })
    .await
}

#[derive(Debug, Deserialize, Validate)]
struct AddMemberRequest {
    #[validate(length(min = 1, max = 128))]
    user_id: String,
}

async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    idempotent(&state, &headers, "chat_add_member", &actor, StatusCode::OK, async {
        state
            .messaging
            .add_community_member(&actor, &chat_id, &payload.user_id)
            .await
            .map_err(map_domain_error)
    })
    .await
}

async fn list_chats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ChatOverview>>, ApiError> {
    let actor = auth.actor()?;
    let chats = state
        .messaging
        .list_chats(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(chats))
}

async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    let messages = state
        .messaging
        .get_messages(&actor, &chat_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize, Validate)]
struct AttachmentPayload {
    #[validate(length(min = 1, max = 255))]
    file_name: String,
    #[validate(length(min = 1, max = 255))]
    content_type: String,
    data_base64: String,
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessageRequest {
    body: Option<String>,
    #[validate(nested)]
    attachment: Option<AttachmentPayload>,
}

fn decode_attachment(payload: AttachmentPayload) -> Result<AttachmentUpload, ApiError> {
    let bytes = STANDARD
        .decode(payload.data_base64.trim())
        .map_err(|err| ApiError::Validation(format!("attachment is not valid base64: {err}")))?;
    Ok(AttachmentUpload {
        file_name: payload.file_name,
        content_type: payload.content_type,
        bytes,
    })
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    let input = SendMessageInput {
        body: payload.body,
        attachment: payload.attachment.map(decode_attachment).transpose()?,
    };
    idempotent(&state, &headers, "chat_send_message", &actor, StatusCode::CREATED, async {
        state
            .messaging
            .send(&actor, &chat_id, input)
            .await
            .map_err(map_domain_error)
    })
    .await
}

#[derive(Serialize)]
struct AffectedMessages {
    chat_id: String,
    affected: usize,
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    idempotent(&state, &headers, "chat_mark_read", &actor, StatusCode::OK, async {
        let affected = state
            .messaging
            .mark_read(&actor, &chat_id)
            .await
            .map_err(map_domain_error)?;
        Ok(AffectedMessages {
            chat_id: chat_id.clone(),
            affected,
        })
    })
    .await
}

#[derive(Serialize)]
struct UnreadCountResponse {
    chat_id: String,
    unread_count: usize,
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    let unread_count = state
        .messaging
        .unread_count(&actor, &chat_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(UnreadCountResponse {
        chat_id,
        unread_count,
    }))
}

async fn clear_for_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    idempotent(&state, &headers, "chat_clear_for_user", &actor, StatusCode::OK, async {
        let affected = state
            .messaging
            .clear_for_user(&actor, &chat_id)
            .await
            .map_err(map_domain_error)?;
        Ok(AffectedMessages {
            chat_id: chat_id.clone(),
            affected,
        })
    })
    .await
}

async fn clear_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let chat_id = validation::identifier("chat_id", &chat_id)?;
    idempotent(&state, &headers, "chat_clear", &actor, StatusCode::OK, async {
        let affected = state
            .messaging
            .clear_chat(&actor, &chat_id)
            .await
            .map_err(map_domain_error)?;
        Ok(AffectedMessages {
            chat_id: chat_id.clone(),
            affected,
        })
    })
    .await
}
