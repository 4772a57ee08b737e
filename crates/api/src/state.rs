use std::sync::Arc;

use founderhub_domain::connections::ConnectionService;
use founderhub_domain::idempotency::{IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore};
use founderhub_domain::messaging::MessagingService;
use founderhub_domain::notifications::NotificationService;
use founderhub_domain::ports::connections::ConnectionRepository;
use founderhub_domain::ports::db::DbAdapter;
use founderhub_domain::ports::idempotency::IdempotencyStore;
use founderhub_domain::ports::messaging::MessageRepository;
use founderhub_domain::ports::notifications::NotificationRepository;
use founderhub_domain::ports::posts::PostRepository;
use founderhub_domain::ports::storage::ObjectStorage;
use founderhub_domain::ports::users::UserRepository;
use founderhub_domain::posts::PostService;
use founderhub_domain::users::UserService;
use founderhub_infra::config::AppConfig;
use founderhub_infra::db::{self, DbConfig, MemoryAdapter, SurrealAdapter};
use founderhub_infra::idempotency::RedisIdempotencyStore;
use founderhub_infra::repositories::{
    InMemoryMessageRepository, InMemoryNotificationRepository, InMemoryPostRepository,
    InMemorySocialGraph, SurrealMessageRepository, SurrealNotificationRepository,
    SurrealPostRepository, SurrealSocialGraph,
};
use founderhub_infra::storage::object_storage_from_config;

const IDEMPOTENCY_PREFIX: &str = "founderhub";

struct Repositories {
    db: Arc<dyn DbAdapter>,
    users: Arc<dyn UserRepository>,
    connections: Arc<dyn ConnectionRepository>,
    notifications: Arc<dyn NotificationRepository>,
    messages: Arc<dyn MessageRepository>,
    posts: Arc<dyn PostRepository>,
}

impl Repositories {
    fn in_memory() -> Self {
        let graph = InMemorySocialGraph::new();
        Self {
            db: Arc::new(MemoryAdapter),
            users: Arc::new(graph.clone()),
            connections: Arc::new(graph),
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            posts: Arc::new(InMemoryPostRepository::new()),
        }
    }

    async fn surreal(config: &AppConfig) -> anyhow::Result<Self> {
        let db_config = DbConfig::from_app_config(config);
        let client = db::connect(&db_config).await?;
        let graph = SurrealSocialGraph::with_client(client.clone());
        Ok(Self {
            db: Arc::new(SurrealAdapter::new(db_config)),
            users: Arc::new(graph.clone()),
            connections: Arc::new(graph),
            notifications: Arc::new(SurrealNotificationRepository::with_client(client.clone())),
            messages: Arc::new(SurrealMessageRepository::with_client(client.clone())),
            posts: Arc::new(SurrealPostRepository::with_client(client)),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<dyn DbAdapter>,
    pub idempotency: IdempotencyService,
    pub users: UserService,
    pub connections: ConnectionService,
    pub notifications: NotificationService,
    pub messaging: MessagingService,
    pub posts: PostService,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let repositories = if config.uses_surreal() {
            tracing::info!(endpoint = %config.surreal_endpoint, "using surreal backend");
            Repositories::surreal(&config).await?
        } else {
            tracing::info!("using in-memory backend");
            Repositories::in_memory()
        };
        let store: Arc<dyn IdempotencyStore> = if config.uses_redis_idempotency() {
            Arc::new(RedisIdempotencyStore::connect(&config.redis_url).await?)
        } else {
            Arc::new(InMemoryIdempotencyStore::new(IDEMPOTENCY_PREFIX))
        };
        let storage = object_storage_from_config(&config);
        Ok(Self::assemble(config, repositories, store, storage))
    }

    /// In-memory backends around a caller-provided idempotency store.
    #[cfg(test)]
    pub fn with_idempotency_store(config: AppConfig, store: Arc<dyn IdempotencyStore>) -> Self {
        let storage = object_storage_from_config(&config);
        Self::assemble(config, Repositories::in_memory(), store, storage)
    }

    fn assemble(
        config: AppConfig,
        repositories: Repositories,
        store: Arc<dyn IdempotencyStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let notifications = NotificationService::new(
            repositories.notifications.clone(),
            repositories.users.clone(),
        );
        let connections = ConnectionService::new(
            repositories.users.clone(),
            repositories.connections.clone(),
            notifications.clone(),
        );
        let messaging = MessagingService::new(
            repositories.messages.clone(),
            repositories.users.clone(),
            storage,
        )
        .with_attachment_limit(config.attachment_max_bytes);
        let posts = PostService::new(repositories.posts.clone(), notifications.clone());
        Self {
            idempotency: IdempotencyService::new(store, IdempotencyConfig::default()),
            users: UserService::new(repositories.users.clone()),
            db: repositories.db,
            config,
            connections,
            notifications,
            messaging,
            posts,
        }
    }
}
