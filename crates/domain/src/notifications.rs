use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::notifications::{NotificationRepository, NotificationRepositoryListQuery};
use crate::ports::users::UserRepository;
use crate::util::now_ms;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ConnectionRequest,
    ConnectionAccepted,
    PostLiked,
    PostCommented,
    PostShared,
    AchievementCompleted,
    Meeting,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::ConnectionAccepted => "connection_accepted",
            Self::PostLiked => "post_liked",
            Self::PostCommented => "post_commented",
            Self::PostShared => "post_shared",
            Self::AchievementCompleted => "achievement_completed",
            Self::Meeting => "meeting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connection_request" => Some(Self::ConnectionRequest),
            "connection_accepted" => Some(Self::ConnectionAccepted),
            "post_liked" => Some(Self::PostLiked),
            "post_commented" => Some(Self::PostCommented),
            "post_shared" => Some(Self::PostShared),
            "achievement_completed" => Some(Self::AchievementCompleted),
            "meeting" => Some(Self::Meeting),
            _ => None,
        }
    }

    /// The subject kind a notification of this type refers to.
    pub fn subject_kind(&self) -> SubjectKind {
        match self {
            Self::ConnectionRequest | Self::ConnectionAccepted => SubjectKind::Connection,
            Self::PostLiked | Self::PostCommented | Self::PostShared => SubjectKind::Post,
            Self::AchievementCompleted => SubjectKind::Achievement,
            Self::Meeting => SubjectKind::Meeting,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Post,
    Connection,
    Meeting,
    Achievement,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Connection => "connection",
            Self::Meeting => "meeting",
            Self::Achievement => "achievement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(Self::Post),
            "connection" => Some(Self::Connection),
            "meeting" => Some(Self::Meeting),
            "achievement" => Some(Self::Achievement),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSubject {
    pub kind: SubjectKind,
    pub id: String,
    /// Item inside the subject that produced the notification, e.g. a comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl NotificationSubject {
    fn new(kind: SubjectKind, id: String) -> Self {
        Self {
            kind,
            id,
            item_id: None,
        }
    }

    pub fn post(post_id: impl Into<String>) -> Self {
        Self::new(SubjectKind::Post, post_id.into())
    }

    pub fn connection(connection_id: impl Into<String>) -> Self {
        Self::new(SubjectKind::Connection, connection_id.into())
    }

    pub fn achievement(code: impl Into<String>) -> Self {
        Self::new(SubjectKind::Achievement, code.into())
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub notification_type: NotificationType,
    pub subject: Option<NotificationSubject>,
    pub is_read: bool,
    pub created_at_ms: i64,
}

/// Listing and unread counting share this filter: only notifications that
/// point at a subject are surfaced to the recipient.
pub fn is_visible(notification: &Notification) -> bool {
    notification.subject.is_some()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientRef {
    UserId(String),
    OneLink(String),
}

#[derive(Clone, Debug)]
pub struct NotificationDraft {
    pub recipient: RecipientRef,
    pub sender_id: String,
    pub notification_type: NotificationType,
    pub subject: Option<NotificationSubject>,
}

/// Identifies the notifications produced by an action that is being undone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationMatch {
    pub recipient_id: String,
    pub sender_id: String,
    pub notification_type: NotificationType,
    pub subject_id: String,
    /// When set, only notifications for this item of the subject match.
    pub item_id: Option<String>,
}

impl NotificationMatch {
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.recipient_id == self.recipient_id
            && notification.sender_id == self.sender_id
            && notification.notification_type == self.notification_type
            && notification.subject.as_ref().is_some_and(|subject| {
                subject.id == self.subject_id
                    && self
                        .item_id
                        .as_ref()
                        .is_none_or(|item_id| subject.item_id.as_ref() == Some(item_id))
            })
    }
}

#[derive(Clone, Debug, Default)]
pub struct NotificationListQuery {
    pub limit: Option<usize>,
    pub cursor_created_at_ms: Option<i64>,
    pub cursor_notification_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationCursor {
    pub created_at_ms: i64,
    pub notification_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub next_cursor: Option<NotificationCursor>,
}

#[derive(Clone)]
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { repository, users }
    }

    /// Persists a notification, or returns `None` when the resolved
    /// recipient is the sender.
    pub async fn add(&self, draft: NotificationDraft) -> DomainResult<Option<Notification>> {
        if let Some(subject) = &draft.subject {
            let expected = draft.notification_type.subject_kind();
            if subject.kind != expected {
                return Err(DomainError::Validation(format!(
                    "{} notifications must reference a {} subject",
                    draft.notification_type.as_str(),
                    expected.as_str()
                )));
            }
        }

        let recipient_id = self.resolve_recipient(&draft.recipient).await?;
        if recipient_id == draft.sender_id {
            tracing::debug!(
                user_id = %recipient_id,
                notification_type = draft.notification_type.as_str(),
                "self notification suppressed"
            );
            return Ok(None);
        }

        let notification = Notification {
            notification_id: crate::util::uuid_v7_without_dashes(),
            recipient_id,
            sender_id: draft.sender_id,
            notification_type: draft.notification_type,
            subject: draft.subject,
            is_read: false,
            created_at_ms: now_ms(),
        };
        self.repository.create(&notification).await.map(Some)
    }

    pub async fn delete(&self, matching: &NotificationMatch) -> DomainResult<usize> {
        self.repository.delete_matching(matching).await
    }

    /// Drops every notification pointing at `subject`, whoever sent it.
    pub async fn delete_for_subject(&self, subject: &NotificationSubject) -> DomainResult<usize> {
        self.repository
            .delete_by_subject(subject.kind, &subject.id)
            .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        query: NotificationListQuery,
    ) -> DomainResult<NotificationPage> {
        if query.cursor_created_at_ms.is_some() != query.cursor_notification_id.is_some() {
            return Err(DomainError::Validation(
                "cursor_created_at_ms and cursor_notification_id must be provided together".into(),
            ));
        }
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let items = self
            .repository
            .list_visible(&NotificationRepositoryListQuery {
                user_id: user_id.to_string(),
                cursor_created_at_ms: query.cursor_created_at_ms,
                cursor_notification_id: query.cursor_notification_id,
                limit: limit + 1,
            })
            .await?;
        Ok(paginate(items, limit))
    }

    pub async fn unread_count(&self, user_id: &str) -> DomainResult<usize> {
        self.repository.count_unread_visible(user_id).await
    }

    pub async fn mark_read(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<Notification> {
        self.repository
            .mark_read(&actor.user_id, notification_id)
            .await
    }

    pub async fn mark_all_read(&self, actor: &ActorIdentity) -> DomainResult<usize> {
        self.repository.mark_all_read(&actor.user_id).await
    }

    async fn resolve_recipient(&self, recipient: &RecipientRef) -> DomainResult<String> {
        match recipient {
            RecipientRef::UserId(user_id) => Ok(user_id.clone()),
            RecipientRef::OneLink(slug) => {
                let slug = crate::users::normalize_one_link(slug)?;
                self.users
                    .get_by_one_link(&slug)
                    .await?
                    .map(|profile| profile.user_id)
                    .ok_or(DomainError::NotFound)
            }
        }
    }
}

fn paginate(mut items: Vec<Notification>, limit: usize) -> NotificationPage {
    let has_more = items.len() > limit;
    items.truncate(limit);
    let next_cursor = if has_more {
        items.last().map(|item| NotificationCursor {
            created_at_ms: item.created_at_ms,
            notification_id: item.notification_id.clone(),
        })
    } else {
        None
    };
    NotificationPage { items, next_cursor }
}
