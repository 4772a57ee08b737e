use std::sync::Arc;
use std::time::Duration;

use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::db::{DbAdapter, DbError};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Idempotent table and index definitions, applied at startup.
const SCHEMA: &str = "
DEFINE TABLE IF NOT EXISTS user_profile SCHEMALESS;
DEFINE INDEX IF NOT EXISTS user_profile_one_link ON user_profile FIELDS one_link UNIQUE;
DEFINE TABLE IF NOT EXISTS connection SCHEMALESS;
DEFINE INDEX IF NOT EXISTS connection_sender ON connection FIELDS sender_id, status;
DEFINE INDEX IF NOT EXISTS connection_receiver ON connection FIELDS receiver_id, status;
DEFINE TABLE IF NOT EXISTS connection_pending SCHEMALESS;
DEFINE TABLE IF NOT EXISTS notification SCHEMALESS;
DEFINE INDEX IF NOT EXISTS notification_recipient ON notification FIELDS recipient_id, created_at;
DEFINE TABLE IF NOT EXISTS chat SCHEMALESS;
DEFINE TABLE IF NOT EXISTS chat_direct SCHEMALESS;
DEFINE TABLE IF NOT EXISTS message SCHEMALESS;
DEFINE INDEX IF NOT EXISTS message_chat ON message FIELDS chat_id, created_at;
DEFINE TABLE IF NOT EXISTS post SCHEMALESS;
DEFINE INDEX IF NOT EXISTS post_author ON post FIELDS author_id, created_at;
";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// Opens one shared WebSocket client, signs in as root and applies the schema.
pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(strip_scheme(&db_config.endpoint)).await?;
    db.signin(Root {
        username: &db_config.username,
        password: &db_config.password,
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    db.query(SCHEMA).await?.check()?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "surreal schema applied"
    );
    Ok(Arc::new(db))
}

#[derive(Debug, Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
}

impl SurrealAdapter {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl DbAdapter for SurrealAdapter {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            let address = socket_address(&self.config.endpoint)?;
            timeout(HEALTH_PROBE_TIMEOUT, TcpStream::connect(&address))
                .await
                .map_err(|_| DbError::Unavailable(format!("connect to {address} timed out")))?
                .map_err(|err| DbError::Unavailable(format!("connect to {address} failed: {err}")))?;
            tracing::debug!(address = %address, "surreal health probe succeeded");
            Ok(())
        })
    }
}

/// Health adapter for the in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter;

impl DbAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}

fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint)
}

fn socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized)
        .map_err(|err| DbError::Unavailable(format!("invalid surreal endpoint '{endpoint}': {err}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DbError::Unavailable(format!("surreal endpoint '{endpoint}' has no host")))?;
    let port = parsed.port().unwrap_or(match parsed.scheme() {
        "wss" | "https" => 443,
        _ => 8000,
    });
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_to_surreal_port() {
        assert_eq!(socket_address("ws://db.internal").unwrap(), "db.internal:8000");
        assert_eq!(socket_address("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert_eq!(socket_address("wss://db.example.com").unwrap(), "db.example.com:443");
    }

    #[test]
    fn strip_scheme_keeps_host_and_port() {
        assert_eq!(strip_scheme("ws://127.0.0.1:8000"), "127.0.0.1:8000");
        assert_eq!(strip_scheme("127.0.0.1:8000"), "127.0.0.1:8000");
    }

    #[tokio::test]
    async fn memory_adapter_is_always_healthy() {
        let adapter = MemoryAdapter;
        assert_eq!(adapter.name(), "memory");
        assert!(adapter.health_check().await.is_ok());
    }
}
