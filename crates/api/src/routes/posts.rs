use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post},
};
use founderhub_domain::DomainResult;
use founderhub_domain::posts::{CreatePostInput, PollInput, Post};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::idempotent;
use crate::error::{ApiError, map_domain_error};
use crate::middleware::AuthContext;
use crate::state::AppState;
use crate::validation;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/posts", post(create_post).get(list_posts))
        .route("/v1/posts/saved", get(list_saved))
        .route("/v1/posts/:post_id", get(get_post).delete(delete_post))
        .route("/v1/posts/:post_id/like", post(like).delete(unlike))
        .route("/v1/posts/:post_id/comments", post(comment))
        .route(
            "/v1/posts/:post_id/comments/:comment_id",
            delete(delete_comment),
        )
        .route("/v1/posts/:post_id/save", post(save).delete(unsave))
        .route("/v1/posts/:post_id/share", post(share))
        .route("/v1/posts/:post_id/vote", post(vote))
}

/// A post with its derived like count.
#[derive(Serialize)]
struct PostView {
    #[serde(flatten)]
    post: Post,
    like_count: usize,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            like_count: post.like_count(),
            post,
        }
    }
}

fn view(result: DomainResult<Post>) -> Result<PostView, ApiError> {
    result.map(PostView::from).map_err(map_domain_error)
}

#[derive(Debug, Deserialize, Validate)]
struct PollRequest {
    #[validate(length(min = 1, max = 280))]
    question: String,
    #[validate(length(min = 2, max = 10))]
    options: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 5000))]
    body: String,
    #[validate(nested)]
    poll: Option<PollRequest>,
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let input = CreatePostInput {
        body: payload.body,
        poll: payload.poll.map(|poll| PollInput {
            question: poll.question,
            options: poll.options,
        }),
    };
    idempotent(&state, &headers, "post_create", &actor, StatusCode::CREATED, async {
        view(state.posts.create_post(&actor, input).await)
    })
    .await
}

#[derive(Debug, Deserialize)]
struct PostListQuery {
    author_id: Option<String>,
    limit: Option<usize>,
}

async fn list_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let actor = auth.actor()?;
    let author_id = match query.author_id {
        Some(author_id) => validation::identifier("author_id", &author_id)?,
        None => actor.user_id,
    };
    let posts = state
        .posts
        .list_by_author(&author_id, query.limit)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(posts.into_iter().map(PostView::from).collect()))
}

async fn list_saved(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let actor = auth.actor()?;
    let posts = state
        .posts
        .list_saved(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(posts.into_iter().map(PostView::from).collect()))
}

async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<PostView>, ApiError> {
    let post_id = validation::identifier("post_id", &post_id)?;
    Ok(Json(view(state.posts.get_post(&post_id).await)?))
}

#[derive(Serialize)]
struct DeletedPost {
    post_id: String,
    deleted: bool,
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_delete", &actor, StatusCode::OK, async {
        state
            .posts
            .delete_post(&actor, &post_id)
            .await
            .map_err(map_domain_error)?;
        Ok(DeletedPost {
            post_id: post_id.clone(),
            deleted: true,
        })
    })
    .await
}

async fn like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_like", &actor, StatusCode::OK, async {
        view(state.posts.like(&actor, &post_id).await)
    })
    .await
}

async fn unlike(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_unlike", &actor, StatusCode::OK, async {
        view(state.posts.unlike(&actor, &post_id).await)
    })
    .await
}

#[derive(Debug, Deserialize, Validate)]
struct CommentRequest {
    #[validate(length(min = 1, max = 2000))]
    body: String,
}

async fn comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_comment", &actor, StatusCode::CREATED, async {
        state
            .posts
            .comment(&actor, &post_id, &payload.body)
            .await
            .map_err(map_domain_error)
    })
    .await
}

async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    let comment_id = validation::identifier("comment_id", &comment_id)?;
    idempotent(&state, &headers, "post_delete_comment", &actor, StatusCode::OK, async {
        view(state.posts.delete_comment(&actor, &post_id, &comment_id).await)
    })
    .await
}

async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_save", &actor, StatusCode::OK, async {
        view(state.posts.save(&actor, &post_id).await)
    })
    .await
}

async fn unsave(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_unsave", &actor, StatusCode::OK, async {
        view(state.posts.unsave(&actor, &post_id).await)
    })
    .await
}

async fn share(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_share", &actor, StatusCode::OK, async {
        view(state.posts.share(&actor, &post_id).await)
    })
    .await
}

#[derive(Debug, Deserialize, Validate)]
struct VoteRequest {
    #[validate(length(min = 1, max = 64))]
    option_id: String,
}

async fn vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.actor()?;
    let post_id = validation::identifier("post_id", &post_id)?;
    idempotent(&state, &headers, "post_vote", &actor, StatusCode::OK, async {
        view(state.posts.vote(&actor, &post_id, &payload.option_id).await)
    })
    .await
}
