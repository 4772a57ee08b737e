use crate::DomainResult;
use crate::posts::{Comment, Post, PostMutation};

/// Engagement writes are single-record atomic operations; `changed` reports
/// whether the guarded mutation actually applied.
pub trait PostRepository: Send + Sync {
    fn create(&self, post: &Post) -> crate::ports::BoxFuture<'_, DomainResult<Post>>;

    fn get(&self, post_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Option<Post>>>;

    fn delete(&self, post_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    /// Newest first.
    fn list_by_author(
        &self,
        author_id: &str,
        limit: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Post>>>;

    /// Newest first.
    fn list_saved(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Post>>>;

    fn add_like(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<PostMutation>>;

    fn remove_like(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<PostMutation>>;

    fn add_comment(
        &self,
        post_id: &str,
        comment: &Comment,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Post>>;

    fn remove_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<PostMutation>>;

    fn set_saved(
        &self,
        post_id: &str,
        user_id: &str,
        saved: bool,
    ) -> crate::ports::BoxFuture<'_, DomainResult<PostMutation>>;

    fn increment_share(&self, post_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Post>>;

    /// Moves the voter onto `option_id`, dropping any earlier vote.
    fn record_vote(
        &self,
        post_id: &str,
        option_id: &str,
        voter_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Post>>;
}
