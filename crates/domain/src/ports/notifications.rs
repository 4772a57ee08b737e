use crate::DomainResult;
use crate::notifications::{Notification, NotificationMatch, SubjectKind};

#[derive(Clone, Debug)]
pub struct NotificationRepositoryListQuery {
    pub user_id: String,
    pub cursor_created_at_ms: Option<i64>,
    pub cursor_notification_id: Option<String>,
    pub limit: usize,
}

pub trait NotificationRepository: Send + Sync {
    fn create(
        &self,
        notification: &Notification,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Notification>>;

    fn delete_matching(
        &self,
        matching: &NotificationMatch,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    fn delete_by_subject(
        &self,
        kind: SubjectKind,
        subject_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    /// Newest first, keyed by `(created_at_ms, notification_id)` descending.
    /// Only rows passing [`crate::notifications::is_visible`] are returned.
    fn list_visible(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Notification>>>;

    fn count_unread_visible(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    /// `Forbidden` when the notification belongs to another recipient.
    fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Notification>>;

    fn mark_all_read(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;
}
