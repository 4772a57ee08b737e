use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::notifications::{
    NotificationDraft, NotificationMatch, NotificationService, NotificationSubject,
    NotificationType, RecipientRef,
};
use crate::ports::posts::PostRepository;
use crate::util::{now_ms, pull_all, push_unique, uuid_v7_without_dashes};

const MAX_POST_LENGTH: usize = 5000;
const MAX_COMMENT_LENGTH: usize = 2000;
const MAX_POLL_QUESTION_LENGTH: usize = 280;
const MAX_POLL_OPTION_LENGTH: usize = 200;
const MIN_POLL_OPTIONS: usize = 2;
const MAX_POLL_OPTIONS: usize = 10;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOption {
    pub option_id: String,
    pub label: String,
    pub voter_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Poll {
    pub question: String,
    pub options: Vec<PollOption>,
}

impl Poll {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.option_id == option_id)
    }

    /// One vote per user: pulls the voter everywhere, then adds them to
    /// `option_id`.
    pub fn apply_vote(&mut self, option_id: &str, voter_id: &str) -> bool {
        if !self.has_option(option_id) {
            return false;
        }
        for option in &mut self.options {
            if option.option_id == option_id {
                push_unique(&mut option.voter_ids, voter_id);
            } else {
                pull_all(&mut option.voter_ids, voter_id);
            }
        }
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    pub likes: Vec<String>,
    pub comments: Vec<Comment>,
    pub saved_by: Vec<String>,
    pub share_count: u64,
    pub poll: Option<Poll>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Post {
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostMutation {
    pub post: Post,
    pub changed: bool,
}

#[derive(Clone, Debug)]
pub struct PollInput {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct CreatePostInput {
    pub body: String,
    pub poll: Option<PollInput>,
}

#[derive(Clone)]
pub struct PostService {
    repository: Arc<dyn PostRepository>,
    notifications: NotificationService,
}

impl PostService {
    pub fn new(repository: Arc<dyn PostRepository>, notifications: NotificationService) -> Self {
        Self {
            repository,
            notifications,
        }
    }

    pub async fn create_post(
        &self,
        actor: &ActorIdentity,
        input: CreatePostInput,
    ) -> DomainResult<Post> {
        let body = validate_text("body", &input.body, MAX_POST_LENGTH)?;
        let poll = input.poll.map(build_poll).transpose()?;
        let now = now_ms();
        let post = Post {
            post_id: uuid_v7_without_dashes(),
            author_id: actor.user_id.clone(),
            body,
            likes: Vec::new(),
            comments: Vec::new(),
            saved_by: Vec::new(),
            share_count: 0,
            poll,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let post = self.repository.create(&post).await?;
        tracing::info!(post_id = %post.post_id, author_id = %post.author_id, "post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> DomainResult<Post> {
        self.repository
            .get(post_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_by_author(
        &self,
        author_id: &str,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Post>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.repository.list_by_author(author_id, limit).await
    }

    pub async fn delete_post(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<()> {
        let post = self.get_post(post_id).await?;
        if !actor.is(&post.author_id) && !actor.role.is_admin() {
            return Err(DomainError::Forbidden(
                "only the author may delete this post".into(),
            ));
        }
        if !self.repository.delete(post_id).await? {
            return Err(DomainError::NotFound);
        }
        tracing::info!(post_id = %post_id, "post deleted");
        if let Err(err) = self
            .notifications
            .delete_for_subject(&NotificationSubject::post(post_id))
            .await
        {
            tracing::warn!(post_id = %post_id, error = %err, "failed to drop post notifications");
        }
        Ok(())
    }

    pub async fn like(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<Post> {
        let mutation = self.repository.add_like(post_id, &actor.user_id).await?;
        if mutation.changed {
            self.notify_author(actor, &mutation.post, NotificationType::PostLiked)
                .await;
        }
        Ok(mutation.post)
    }

    pub async fn unlike(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<Post> {
        let mutation = self.repository.remove_like(post_id, &actor.user_id).await?;
        if mutation.changed {
            self.retract(NotificationMatch {
                recipient_id: mutation.post.author_id.clone(),
                sender_id: actor.user_id.clone(),
                notification_type: NotificationType::PostLiked,
                subject_id: mutation.post.post_id.clone(),
                item_id: None,
            })
            .await;
        }
        Ok(mutation.post)
    }

    pub async fn like_count(&self, post_id: &str) -> DomainResult<usize> {
        Ok(self.get_post(post_id).await?.like_count())
    }

    pub async fn comment(
        &self,
        actor: &ActorIdentity,
        post_id: &str,
        body: &str,
    ) -> DomainResult<Comment> {
        let body = validate_text("comment", body, MAX_COMMENT_LENGTH)?;
        let comment = Comment {
            comment_id: uuid_v7_without_dashes(),
            author_id: actor.user_id.clone(),
            body,
            created_at_ms: now_ms(),
        };
        let post = self.repository.add_comment(post_id, &comment).await?;
        self.notify(
            actor,
            &post,
            NotificationType::PostCommented,
            NotificationSubject::post(&post.post_id).with_item(&comment.comment_id),
        )
        .await;
        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        actor: &ActorIdentity,
        post_id: &str,
        comment_id: &str,
    ) -> DomainResult<Post> {
        let post = self.get_post(post_id).await?;
        let comment = post
            .comments
            .iter()
            .find(|comment| comment.comment_id == comment_id)
            .ok_or(DomainError::NotFound)?;
        if !actor.is(&comment.author_id) && !actor.is(&post.author_id) && !actor.role.is_admin() {
            return Err(DomainError::Forbidden(
                "only the comment or post author may delete this comment".into(),
            ));
        }
        let matching = NotificationMatch {
            recipient_id: post.author_id.clone(),
            sender_id: comment.author_id.clone(),
            notification_type: NotificationType::PostCommented,
            subject_id: post.post_id.clone(),
            item_id: Some(comment.comment_id.clone()),
        };
        let mutation = self.repository.remove_comment(post_id, comment_id).await?;
        if !mutation.changed {
            return Err(DomainError::NotFound);
        }
        self.retract(matching).await;
        Ok(mutation.post)
    }

    pub async fn save(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<Post> {
        Ok(self
            .repository
            .set_saved(post_id, &actor.user_id, true)
            .await?
            .post)
    }

    pub async fn unsave(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<Post> {
        Ok(self
            .repository
            .set_saved(post_id, &actor.user_id, false)
            .await?
            .post)
    }

    pub async fn list_saved(&self, actor: &ActorIdentity) -> DomainResult<Vec<Post>> {
        self.repository.list_saved(&actor.user_id).await
    }

    pub async fn share(&self, actor: &ActorIdentity, post_id: &str) -> DomainResult<Post> {
        let post = self.repository.increment_share(post_id).await?;
        self.notify_author(actor, &post, NotificationType::PostShared)
            .await;
        Ok(post)
    }

    pub async fn vote(
        &self,
        actor: &ActorIdentity,
        post_id: &str,
        option_id: &str,
    ) -> DomainResult<Post> {
        let post = self.get_post(post_id).await?;
        let poll = post
            .poll
            .as_ref()
            .ok_or_else(|| DomainError::Validation("post has no poll".into()))?;
        if !poll.has_option(option_id) {
            return Err(DomainError::Validation(format!(
                "unknown poll option {option_id}"
            )));
        }
        self.repository
            .record_vote(post_id, option_id, &actor.user_id)
            .await
    }

    async fn notify_author(
        &self,
        actor: &ActorIdentity,
        post: &Post,
        notification_type: NotificationType,
    ) {
        self.notify(
            actor,
            post,
            notification_type,
            NotificationSubject::post(&post.post_id),
        )
        .await;
    }

    async fn notify(
        &self,
        actor: &ActorIdentity,
        post: &Post,
        notification_type: NotificationType,
        subject: NotificationSubject,
    ) {
        let draft = NotificationDraft {
            recipient: RecipientRef::UserId(post.author_id.clone()),
            sender_id: actor.user_id.clone(),
            notification_type,
            subject: Some(subject),
        };
        if let Err(err) = self.notifications.add(draft).await {
            tracing::warn!(
                post_id = %post.post_id,
                notification_type = notification_type.as_str(),
                error = %err,
                "failed to emit notification"
            );
        }
    }

    async fn retract(&self, matching: NotificationMatch) {
        if let Err(err) = self.notifications.delete(&matching).await {
            tracing::warn!(
                post_id = %matching.subject_id,
                notification_type = matching.notification_type.as_str(),
                error = %err,
                "failed to retract notification"
            );
        }
    }
}

fn validate_text(field: &str, value: &str, max: usize) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(DomainError::Validation(format!(
            "{field} exceeds max length of {max}"
        )));
    }
    Ok(value.to_string())
}

fn build_poll(input: PollInput) -> DomainResult<Poll> {
    let question = validate_text("poll question", &input.question, MAX_POLL_QUESTION_LENGTH)?;
    if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&input.options.len()) {
        return Err(DomainError::Validation(format!(
            "poll needs between {MIN_POLL_OPTIONS} and {MAX_POLL_OPTIONS} options"
        )));
    }
    let options = input
        .options
        .iter()
        .enumerate()
        .map(|(index, label)| {
            Ok(PollOption {
                option_id: format!("opt-{}", index + 1),
                label: validate_text("poll option", label, MAX_POLL_OPTION_LENGTH)?,
                voter_ids: Vec::new(),
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;
    Ok(Poll { question, options })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> Poll {
        build_poll(PollInput {
            question: "Seed or bootstrap?".into(),
            options: vec!["Seed".into(), "Bootstrap".into()],
        })
        .expect("poll")
    }

    #[test]
    fn poll_ids_follow_option_order() {
        let poll = poll();
        let ids: Vec<_> = poll.options.iter().map(|o| o.option_id.as_str()).collect();
        assert_eq!(ids, vec!["opt-1", "opt-2"]);
    }

    #[test]
    fn revote_moves_the_vote() {
        let mut poll = poll();
        assert!(poll.apply_vote("opt-1", "alice"));
        assert!(poll.apply_vote("opt-2", "alice"));
        assert!(poll.options[0].voter_ids.is_empty());
        assert_eq!(poll.options[1].voter_ids, vec!["alice"]);
        assert!(!poll.apply_vote("opt-9", "alice"));
    }

    #[test]
    fn poll_option_bounds_are_enforced() {
        let err = build_poll(PollInput {
            question: "?".into(),
            options: vec!["only".into()],
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn body_is_trimmed_and_bounded() {
        assert_eq!(validate_text("body", "  hi ", 10).unwrap(), "hi");
        assert!(validate_text("body", "   ", 10).is_err());
        assert!(validate_text("body", &"x".repeat(11), 10).is_err());
    }
}
