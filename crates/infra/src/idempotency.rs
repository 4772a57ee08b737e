use std::time::Duration;

use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyStore, ReserveOutcome,
};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const DEFAULT_PREFIX: &str = "founderhub";
const RESERVE_RETRY_LIMIT: usize = 2;

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str) -> Result<Self, IdempotencyError> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, IdempotencyError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| IdempotencyError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| IdempotencyError::Unavailable(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn cache_key(&self, key: &IdempotencyKey) -> String {
        key.cache_key(&self.prefix)
    }
}

fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn encode(record: &IdempotencyRecord) -> Result<String, IdempotencyError> {
    serde_json::to_string(record).map_err(|err| IdempotencyError::Serialization(err.to_string()))
}

fn decode(payload: &str) -> Result<IdempotencyRecord, IdempotencyError> {
    serde_json::from_str(payload).map_err(|err| IdempotencyError::Serialization(err.to_string()))
}

fn unavailable(err: redis::RedisError) -> IdempotencyError {
    IdempotencyError::Unavailable(err.to_string())
}

impl IdempotencyStore for RedisIdempotencyStore {
    fn reserve(
        &self,
        key: &IdempotencyKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ReserveOutcome, IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            let payload = encode(&IdempotencyRecord::InProgress)?;
            let mut conn = self.manager.clone();
            for _ in 0..RESERVE_RETRY_LIMIT {
                let claimed: Option<String> = redis::cmd("SET")
                    .arg(&cache_key)
                    .arg(&payload)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms(ttl))
                    .query_async(&mut conn)
                    .await
                    .map_err(unavailable)?;
                if claimed.is_some() {
                    return Ok(ReserveOutcome::Reserved);
                }

                // The holder may expire between SET NX and GET; claim again.
                let existing: Option<String> = conn.get(&cache_key).await.map_err(unavailable)?;
                if let Some(existing) = existing {
                    return Ok(ReserveOutcome::Existing(decode(&existing)?));
                }
            }
            Err(IdempotencyError::Unavailable(
                "failed to claim idempotency key".into(),
            ))
        })
    }

    fn store(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = self.cache_key(key);
        let record = record.clone();
        Box::pin(async move {
            let payload = encode(&record)?;
            let mut conn = self.manager.clone();
            let _: () = conn
                .pset_ex(&cache_key, payload, ttl_ms(ttl))
                .await
                .map_err(unavailable)?;
            Ok(())
        })
    }

    fn release(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: usize = conn.del(&cache_key).await.map_err(unavailable)?;
            Ok(())
        })
    }
}
