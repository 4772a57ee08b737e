use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::ports::BoxFuture;
use crate::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyStore, ReserveOutcome,
    StoredResponse,
};

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub in_progress_ttl: Duration,
    pub completed_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            in_progress_ttl: Duration::from_secs(30),
            completed_ttl: Duration::from_secs(60 * 60 * 24),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BeginOutcome {
    Started,
    InProgress,
    Replay(StoredResponse),
}

#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    config: IdempotencyConfig,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    pub async fn begin(&self, key: &IdempotencyKey) -> Result<BeginOutcome, IdempotencyError> {
        match self
            .store
            .reserve(key, self.config.in_progress_ttl)
            .await?
        {
            ReserveOutcome::Reserved => Ok(BeginOutcome::Started),
            ReserveOutcome::Existing(IdempotencyRecord::InProgress) => Ok(BeginOutcome::InProgress),
            ReserveOutcome::Existing(IdempotencyRecord::Completed { response }) => {
                Ok(BeginOutcome::Replay(response))
            }
        }
    }

    pub async fn complete(
        &self,
        key: &IdempotencyKey,
        response: StoredResponse,
    ) -> Result<(), IdempotencyError> {
        self.store
            .store(
                key,
                &IdempotencyRecord::Completed { response },
                self.config.completed_ttl,
            )
            .await
    }

    /// Drops the reservation so a failed attempt can be retried with the
    /// same request id.
    pub async fn abandon(&self, key: &IdempotencyKey) -> Result<(), IdempotencyError> {
        self.store.release(key).await
    }
}

#[derive(Clone, Debug)]
struct Slot {
    record: IdempotencyRecord,
    expires_at: Instant,
}

/// Process-local store used by the memory backend and tests.
#[derive(Clone, Debug)]
pub struct InMemoryIdempotencyStore {
    prefix: String,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn reserve(
        &self,
        key: &IdempotencyKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ReserveOutcome, IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            if let Some(slot) = slots.get(&cache_key) {
                if slot.expires_at > now {
                    return Ok(ReserveOutcome::Existing(slot.record.clone()));
                }
            }
            slots.insert(
                cache_key,
                Slot {
                    record: IdempotencyRecord::InProgress,
                    expires_at: now + ttl,
                },
            );
            Ok(ReserveOutcome::Reserved)
        })
    }

    fn store(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        let record = record.clone();
        Box::pin(async move {
            self.slots.lock().await.insert(
                cache_key,
                Slot {
                    record,
                    expires_at: Instant::now() + ttl,
                },
            );
            Ok(())
        })
    }

    fn release(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move {
            self.slots.lock().await.remove(&cache_key);
            Ok(())
        })
    }
}
