use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod connections;
pub mod db;
pub mod idempotency;
pub mod messaging;
pub mod notifications;
pub mod posts;
pub mod storage;
pub mod users;
