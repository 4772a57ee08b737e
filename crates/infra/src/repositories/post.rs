use std::collections::HashMap;
use std::sync::Arc;

use founderhub_domain::DomainResult;
use founderhub_domain::error::DomainError;
use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::posts::PostRepository;
use founderhub_domain::posts::{Comment, Poll, Post, PostMutation};
use founderhub_domain::util::{now_ms, pull_all, push_unique};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::surreal_support::{
    SurrealClient, check_response, decode_rows, map_surreal_error, parse_datetime_ms, take_rows,
    to_rfc3339,
};

const VOTE_ATTEMPTS: usize = 3;

#[derive(Clone, Default)]
pub struct InMemoryPostRepository {
    store: Arc<RwLock<HashMap<String, Post>>>,
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, post_id: &str, apply: F) -> DomainResult<PostMutation>
    where
        F: FnOnce(&mut Post) -> bool,
    {
        let mut store = self.store.write().await;
        let post = store.get_mut(post_id).ok_or(DomainError::NotFound)?;
        let changed = apply(post);
        if changed {
            post.updated_at_ms = now_ms();
        }
        Ok(PostMutation {
            post: post.clone(),
            changed,
        })
    }
}

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.post_id.cmp(&a.post_id))
    });
}

impl PostRepository for InMemoryPostRepository {
    fn create(&self, post: &Post) -> BoxFuture<'_, DomainResult<Post>> {
        let post = post.clone();
        Box::pin(async move {
            let mut store = self.store.write().await;
            if store.contains_key(&post.post_id) {
                return Err(DomainError::Conflict);
            }
            store.insert(post.post_id.clone(), post.clone());
            Ok(post)
        })
    }

    fn get(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        let post_id = post_id.to_string();
        Box::pin(async move { Ok(self.store.read().await.get(&post_id).cloned()) })
    }

    fn delete(&self, post_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let post_id = post_id.to_string();
        Box::pin(async move { Ok(self.store.write().await.remove(&post_id).is_some()) })
    }

    fn list_by_author(&self, author_id: &str, limit: usize) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        let author_id = author_id.to_string();
        Box::pin(async move {
            let store = self.store.read().await;
            let mut posts: Vec<Post> = store
                .values()
                .filter(|post| post.author_id == author_id)
                .cloned()
                .collect();
            newest_first(&mut posts);
            posts.truncate(limit);
            Ok(posts)
        })
    }

    fn list_saved(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let store = self.store.read().await;
            let mut posts: Vec<Post> = store
                .values()
                .filter(|post| post.saved_by.contains(&user_id))
                .cloned()
                .collect();
            newest_first(&mut posts);
            Ok(posts)
        })
    }

    fn add_like(&self, post_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.mutate(&post_id, |post| push_unique(&mut post.likes, &user_id))
                .await
        })
    }

    fn remove_like(&self, post_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.mutate(&post_id, |post| pull_all(&mut post.likes, &user_id))
                .await
        })
    }

    fn add_comment(&self, post_id: &str, comment: &Comment) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        let comment = comment.clone();
        Box::pin(async move {
            let mutation = self
                .mutate(&post_id, |post| {
                    post.comments.push(comment);
                    true
                })
                .await?;
            Ok(mutation.post)
        })
    }

    fn remove_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let comment_id = comment_id.to_string();
        Box::pin(async move {
            self.mutate(&post_id, |post| {
                let before = post.comments.len();
                post.comments.retain(|comment| comment.comment_id != comment_id);
                before != post.comments.len()
            })
            .await
        })
    }

    fn set_saved(
        &self,
        post_id: &str,
        user_id: &str,
        saved: bool,
    ) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.mutate(&post_id, |post| {
                if saved {
                    push_unique(&mut post.saved_by, &user_id)
                } else {
                    pull_all(&mut post.saved_by, &user_id)
                }
            })
            .await
        })
    }

    fn increment_share(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        Box::pin(async move {
            let mutation = self
                .mutate(&post_id, |post| {
                    post.share_count += 1;
                    true
                })
                .await?;
            Ok(mutation.post)
        })
    }

    fn record_vote(
        &self,
        post_id: &str,
        option_id: &str,
        voter_id: &str,
    ) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        let option_id = option_id.to_string();
        let voter_id = voter_id.to_string();
        Box::pin(async move {
            let mut store = self.store.write().await;
            let post = store.get_mut(&post_id).ok_or(DomainError::NotFound)?;
            let poll = post
                .poll
                .as_mut()
                .ok_or_else(|| DomainError::Validation("post has no poll".into()))?;
            if !poll.apply_vote(&option_id, &voter_id) {
                return Err(DomainError::Validation(format!(
                    "unknown poll option '{option_id}'"
                )));
            }
            post.updated_at_ms = now_ms();
            Ok(post.clone())
        })
    }
}

const POST_FIELDS: &str = "post_id, author_id, body, likes, comments, saved_by, share_count, \
     poll, revision, <string>created_at AS created_at, <string>updated_at AS updated_at";

#[derive(Debug, Deserialize)]
struct SurrealPostRow {
    post_id: String,
    author_id: String,
    body: String,
    #[serde(default)]
    likes: Vec<String>,
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    saved_by: Vec<String>,
    #[serde(default)]
    share_count: u64,
    #[serde(default)]
    poll: Option<Poll>,
    #[serde(default)]
    revision: u64,
    created_at: String,
    updated_at: String,
}

impl SurrealPostRow {
    fn into_post(self) -> DomainResult<(Post, u64)> {
        let post = Post {
            created_at_ms: parse_datetime_ms(&self.created_at)?,
            updated_at_ms: parse_datetime_ms(&self.updated_at)?,
            post_id: self.post_id,
            author_id: self.author_id,
            body: self.body,
            likes: self.likes,
            comments: self.comments,
            saved_by: self.saved_by,
            share_count: self.share_count,
            poll: self.poll,
        };
        Ok((post, self.revision))
    }
}

fn decode_posts(rows: Vec<Value>) -> DomainResult<Vec<(Post, u64)>> {
    decode_rows::<SurrealPostRow>(rows, "post")?
        .into_iter()
        .map(SurrealPostRow::into_post)
        .collect()
}

/// Guarded single-record update. The assignment only applies when `guard`
/// holds; the pre-image and post-image are returned so callers can tell
/// whether anything changed.
fn guarded_update_script(assignment: &str, guard: Option<&str>) -> String {
    let guard = guard
        .map(|guard| format!(" WHERE {guard}"))
        .unwrap_or_default();
    format!(
        "BEGIN TRANSACTION;\n\
         LET $before = (SELECT {POST_FIELDS} FROM type::thing('post', $post_id));\n\
         IF array::len($before) = 0 {{ THROW 'not_found:post ' + $post_id; }};\n\
         UPDATE type::thing('post', $post_id) SET {assignment}, revision += 1, \
         updated_at = <datetime>$updated_at{guard} RETURN NONE;\n\
         RETURN $before;\n\
         SELECT {POST_FIELDS} FROM type::thing('post', $post_id);\n\
         COMMIT TRANSACTION;"
    )
}

#[derive(Clone)]
pub struct SurrealPostRepository {
    client: SurrealClient,
}

impl SurrealPostRepository {
    pub fn with_client(client: SurrealClient) -> Self {
        Self { client }
    }

    async fn select_posts(&self, sql: String, params: Value) -> DomainResult<Vec<Post>> {
        let mut response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        Ok(decode_posts(take_rows(&mut response, 0)?)?
            .into_iter()
            .map(|(post, _)| post)
            .collect())
    }

    async fn get_with_revision(&self, post_id: &str) -> DomainResult<Option<(Post, u64)>> {
        let mut response = self
            .client
            .query(format!("SELECT {POST_FIELDS} FROM type::thing('post', $post_id)"))
            .bind(("post_id", post_id.to_string()))
            .await
            .map_err(map_surreal_error)?;
        Ok(decode_posts(take_rows(&mut response, 0)?)?.pop())
    }

    async fn guarded_update(
        &self,
        post_id: &str,
        assignment: &str,
        guard: Option<&str>,
        mut params: Value,
    ) -> DomainResult<PostMutation> {
        if let Value::Object(map) = &mut params {
            map.insert("post_id".into(), Value::String(post_id.to_string()));
            map.insert("updated_at".into(), Value::String(to_rfc3339(now_ms())?));
        }
        let response = self
            .client
            .query(guarded_update_script(assignment, guard))
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        let mut response = check_response(response)?;
        let before = decode_posts(take_rows(&mut response, 3)?)?.pop();
        let (after, after_revision) = decode_posts(take_rows(&mut response, 4)?)?
            .pop()
            .ok_or(DomainError::NotFound)?;
        let changed = before.is_none_or(|(_, revision)| revision != after_revision);
        Ok(PostMutation {
            post: after,
            changed,
        })
    }
}

impl PostRepository for SurrealPostRepository {
    fn create(&self, post: &Post) -> BoxFuture<'_, DomainResult<Post>> {
        let post = post.clone();
        Box::pin(async move {
            let response = self
                .client
                .query(
                    "CREATE type::thing('post', $post_id) CONTENT { \
                     post_id: $post_id, author_id: $author_id, body: $body, likes: $likes, \
                     comments: $comments, saved_by: $saved_by, share_count: $share_count, \
                     poll: $poll, revision: 0, created_at: <datetime>$created_at, \
                     updated_at: <datetime>$updated_at } RETURN NONE",
                )
                .bind(json!({
                    "post_id": post.post_id,
                    "author_id": post.author_id,
                    "body": post.body,
                    "likes": post.likes,
                    "comments": post.comments,
                    "saved_by": post.saved_by,
                    "share_count": post.share_count,
                    "poll": post.poll,
                    "created_at": to_rfc3339(post.created_at_ms)?,
                    "updated_at": to_rfc3339(post.updated_at_ms)?,
                }))
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(post)
        })
    }

    fn get(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        let post_id = post_id.to_string();
        Box::pin(async move {
            Ok(self
                .get_with_revision(&post_id)
                .await?
                .map(|(post, _)| post))
        })
    }

    fn delete(&self, post_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let post_id = post_id.to_string();
        Box::pin(async move {
            let response = self
                .client
                .query(
                    "LET $gone = (SELECT VALUE post_id FROM type::thing('post', $post_id));\n\
                     DELETE type::thing('post', $post_id) RETURN NONE;\n\
                     RETURN array::len($gone) > 0;",
                )
                .bind(("post_id", post_id))
                .await
                .map_err(map_surreal_error)?;
            let mut response = check_response(response)?;
            let deleted: Option<bool> = response.take(2).map_err(map_surreal_error)?;
            Ok(deleted.unwrap_or(false))
        })
    }

    fn list_by_author(&self, author_id: &str, limit: usize) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        let params = json!({ "author_id": author_id, "limit": limit });
        Box::pin(async move {
            self.select_posts(
                format!(
                    "SELECT {POST_FIELDS} FROM post WHERE author_id = $author_id \
                     ORDER BY created_at DESC, post_id DESC LIMIT $limit"
                ),
                params,
            )
            .await
        })
    }

    fn list_saved(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        let params = json!({ "user_id": user_id });
        Box::pin(async move {
            self.select_posts(
                format!(
                    "SELECT {POST_FIELDS} FROM post WHERE saved_by CONTAINS $user_id \
                     ORDER BY created_at DESC, post_id DESC"
                ),
                params,
            )
            .await
        })
    }

    fn add_like(&self, post_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let params = json!({ "user_id": user_id });
        Box::pin(async move {
            self.guarded_update(
                &post_id,
                "likes = array::append(likes, $user_id)",
                Some("likes CONTAINSNOT $user_id"),
                params,
            )
            .await
        })
    }

    fn remove_like(&self, post_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let params = json!({ "user_id": user_id });
        Box::pin(async move {
            self.guarded_update(
                &post_id,
                "likes = array::complement(likes, [$user_id])",
                Some("likes CONTAINS $user_id"),
                params,
            )
            .await
        })
    }

    fn add_comment(&self, post_id: &str, comment: &Comment) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        let params = json!({ "comment": comment });
        Box::pin(async move {
            let mutation = self
                .guarded_update(
                    &post_id,
                    "comments = array::append(comments, $comment)",
                    None,
                    params,
                )
                .await?;
            Ok(mutation.post)
        })
    }

    fn remove_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let params = json!({ "comment_id": comment_id });
        Box::pin(async move {
            self.guarded_update(
                &post_id,
                "comments = comments[WHERE comment_id != $comment_id]",
                Some("comments.comment_id CONTAINS $comment_id"),
                params,
            )
            .await
        })
    }

    fn set_saved(
        &self,
        post_id: &str,
        user_id: &str,
        saved: bool,
    ) -> BoxFuture<'_, DomainResult<PostMutation>> {
        let post_id = post_id.to_string();
        let params = json!({ "user_id": user_id });
        Box::pin(async move {
            let (assignment, guard) = if saved {
                (
                    "saved_by = array::append(saved_by, $user_id)",
                    "saved_by CONTAINSNOT $user_id",
                )
            } else {
                (
                    "saved_by = array::complement(saved_by, [$user_id])",
                    "saved_by CONTAINS $user_id",
                )
            };
            self.guarded_update(&post_id, assignment, Some(guard), params)
                .await
        })
    }

    fn increment_share(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        Box::pin(async move {
            let mutation = self
                .guarded_update(&post_id, "share_count += 1", None, json!({}))
                .await?;
            Ok(mutation.post)
        })
    }

    fn record_vote(
        &self,
        post_id: &str,
        option_id: &str,
        voter_id: &str,
    ) -> BoxFuture<'_, DomainResult<Post>> {
        let post_id = post_id.to_string();
        let option_id = option_id.to_string();
        let voter_id = voter_id.to_string();
        Box::pin(async move {
            // The poll is rewritten whole, so concurrent votes race on `revision`.
            for _ in 0..VOTE_ATTEMPTS {
                let (post, revision) = self
                    .get_with_revision(&post_id)
                    .await?
                    .ok_or(DomainError::NotFound)?;
                let mut poll = post
                    .poll
                    .ok_or_else(|| DomainError::Validation("post has no poll".into()))?;
                if !poll.apply_vote(&option_id, &voter_id) {
                    return Err(DomainError::Validation(format!(
                        "unknown poll option '{option_id}'"
                    )));
                }
                let mutation = self
                    .guarded_update(
                        &post_id,
                        "poll = $poll",
                        Some("revision = $revision"),
                        json!({ "poll": poll, "revision": revision }),
                    )
                    .await?;
                if mutation.changed {
                    return Ok(mutation.post);
                }
                tracing::debug!(post_id = %post_id, "poll vote lost a revision race, retrying");
            }
            Err(DomainError::Conflict)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use founderhub_domain::posts::PollOption;

    fn post(post_id: &str, author_id: &str, at: i64) -> Post {
        Post {
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            body: "launching today".to_string(),
            likes: vec![],
            comments: vec![],
            saved_by: vec![],
            share_count: 0,
            poll: Some(Poll {
                question: "which plan?".to_string(),
                options: vec![
                    PollOption {
                        option_id: "opt-1".to_string(),
                        label: "seed".to_string(),
                        voter_ids: vec![],
                    },
                    PollOption {
                        option_id: "opt-2".to_string(),
                        label: "bootstrap".to_string(),
                        voter_ids: vec![],
                    },
                ],
            }),
            created_at_ms: at,
            updated_at_ms: at,
        }
    }

    #[tokio::test]
    async fn likes_are_idempotent_per_user() {
        let repo = InMemoryPostRepository::new();
        repo.create(&post("p-1", "alice", 1)).await.expect("create");

        assert!(repo.add_like("p-1", "bob").await.expect("like").changed);
        let again = repo.add_like("p-1", "bob").await.expect("like again");
        assert!(!again.changed);
        assert_eq!(again.post.like_count(), 1);

        assert!(repo.remove_like("p-1", "bob").await.expect("unlike").changed);
        assert!(!repo.remove_like("p-1", "bob").await.expect("unlike").changed);
    }

    #[tokio::test]
    async fn vote_moves_between_options() {
        let repo = InMemoryPostRepository::new();
        repo.create(&post("p-1", "alice", 1)).await.expect("create");

        repo.record_vote("p-1", "opt-1", "bob").await.expect("vote");
        let post = repo.record_vote("p-1", "opt-2", "bob").await.expect("revote");
        let poll = post.poll.expect("poll");
        assert!(poll.options[0].voter_ids.is_empty());
        assert_eq!(poll.options[1].voter_ids, vec!["bob".to_string()]);

        let err = repo.record_vote("p-1", "opt-9", "bob").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn saved_and_author_listings_are_newest_first() {
        let repo = InMemoryPostRepository::new();
        for (id, at) in [("p-1", 1), ("p-2", 3), ("p-3", 2)] {
            repo.create(&post(id, "alice", at)).await.expect("create");
        }
        repo.set_saved("p-1", "bob", true).await.expect("save");
        repo.set_saved("p-2", "bob", true).await.expect("save");

        let authored: Vec<_> = repo
            .list_by_author("alice", 2)
            .await
            .expect("list")
            .into_iter()
            .map(|p| p.post_id)
            .collect();
        assert_eq!(authored, vec!["p-2", "p-3"]);

        let saved: Vec<_> = repo
            .list_saved("bob")
            .await
            .expect("saved")
            .into_iter()
            .map(|p| p.post_id)
            .collect();
        assert_eq!(saved, vec!["p-2", "p-1"]);
        assert!(!repo.set_saved("p-3", "bob", false).await.expect("unsave").changed);
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let repo = InMemoryPostRepository::new();
        let err = repo.increment_share("nope").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
        assert!(!repo.delete("nope").await.expect("delete"));
    }

    #[test]
    fn guarded_update_script_checks_existence_before_writing() {
        let sql = guarded_update_script("likes = array::append(likes, $user_id)", Some("likes CONTAINSNOT $user_id"));
        let throw = sql.find("THROW 'not_found:post '").expect("existence guard");
        let update = sql.find("UPDATE type::thing('post', $post_id)").expect("update");
        assert!(throw < update);
        assert!(sql.contains("WHERE likes CONTAINSNOT $user_id RETURN NONE"));
        assert!(sql.starts_with("BEGIN TRANSACTION;"));
    }
}
