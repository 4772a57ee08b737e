use crate::DomainResult;
use crate::messaging::{Chat, ChatKind, Message};

pub trait MessageRepository: Send + Sync {
    /// `Conflict` when a direct chat already exists for the member pair.
    fn create_chat(&self, chat: &Chat) -> crate::ports::BoxFuture<'_, DomainResult<Chat>>;

    fn get_chat(&self, chat_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Option<Chat>>>;

    fn find_direct_chat(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Chat>>>;

    fn add_member(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Chat>>;

    fn list_chats_for_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Chat>>>;

    fn create_message(&self, message: &Message)
    -> crate::ports::BoxFuture<'_, DomainResult<Message>>;

    /// Messages not soft-deleted by `viewer`, ordered by
    /// `(created_at_ms, message_id)` ascending.
    fn list_visible(
        &self,
        chat_id: &str,
        viewer_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    fn last_visible(
        &self,
        chat_id: &str,
        viewer_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Marks every message unread by `viewer` as read. Returns rows changed.
    fn mark_read(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    fn count_unread(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    /// Adds `viewer` to `deleted_by` on every message. Returns rows changed.
    fn hide_all_for(
        &self,
        chat_id: &str,
        viewer_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;

    fn delete_all_messages(&self, chat_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;
}
