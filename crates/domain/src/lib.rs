pub mod auth;
pub mod connections;
pub mod error;
pub mod idempotency;
pub mod identity;
pub mod messaging;
pub mod notifications;
pub mod ports;
pub mod posts;
pub mod users;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
