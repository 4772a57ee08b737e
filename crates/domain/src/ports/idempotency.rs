use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::BoxFuture;

/// Scopes a client retry: the same `request_id` for the same operation by
/// the same actor replays the first outcome.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdempotencyKey {
    pub operation: String,
    pub actor_id: String,
    pub request_id: String,
}

impl IdempotencyKey {
    pub fn new(
        operation: impl Into<String>,
        actor_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            actor_id: actor_id.into(),
            request_id: request_id.into(),
        }
    }

    pub fn cache_key(&self, prefix: &str) -> String {
        format!(
            "{prefix}:idem:{}:{}:{}",
            self.operation, self.actor_id, self.request_id
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    InProgress,
    Completed { response: StoredResponse },
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
    #[error("idempotency record could not be encoded: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved,
    Existing(IdempotencyRecord),
}

pub trait IdempotencyStore: Send + Sync {
    /// Stores `InProgress` only when no live record exists for the key.
    fn reserve(
        &self,
        key: &IdempotencyKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ReserveOutcome, IdempotencyError>>;

    fn store(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>>;

    fn release(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>>;
}
