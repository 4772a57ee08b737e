use crate::DomainResult;
use crate::connections::{Connection, ConnectionChange, PendingDirection};

pub trait ConnectionRepository: Send + Sync {
    fn get(
        &self,
        connection_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Connection>>>;

    /// The pending connection for the unordered pair, in either direction.
    fn find_pending_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Connection>>>;

    /// Every record between the pair regardless of direction or status.
    fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Connection>>>;

    /// Pending connections where `user_id` is on the given side, newest first.
    fn list_pending(
        &self,
        user_id: &str,
        direction: PendingDirection,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Connection>>>;

    /// Applies the whole change or nothing.
    ///
    /// * `Create` fails with `Conflict` when the pair already has a pending record.
    /// * status writes compare against the expected status and fail with
    ///   `Conflict` on mismatch or `NotFound` when the record is gone.
    /// * a relationship edit or award for an unknown user fails with `NotFound`.
    fn commit(&self, change: &ConnectionChange) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}
