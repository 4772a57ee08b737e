use crate::DomainResult;
use crate::users::UserProfile;

pub trait UserRepository: Send + Sync {
    fn create(&self, user: &UserProfile) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>>;

    fn get(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    fn get_by_one_link(
        &self,
        one_link: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    /// Preserves the order of `user_ids`; unknown ids are skipped.
    fn list_by_ids(
        &self,
        user_ids: &[String],
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<UserProfile>>>;

    /// Writes profile fields only. Relationship lists and achievements are
    /// owned by the connection unit of work.
    fn update_profile(
        &self,
        user: &UserProfile,
    ) -> crate::ports::BoxFuture<'_, DomainResult<UserProfile>>;

    /// Active users, oldest registration first.
    fn list_active(
        &self,
        limit: usize,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<UserProfile>>>;
}
