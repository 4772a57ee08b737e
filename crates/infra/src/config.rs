use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub redis_url: String,
    pub idempotency_backend: String,
    pub jwt_secret: String,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_public_base_url: String,
    pub attachment_max_bytes: usize,
    pub recommendation_limit: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "founderhub")?
            .set_default("surreal_db", "main")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("idempotency_backend", "memory")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("storage_endpoint", "memory")?
            .set_default("storage_bucket", "founderhub-attachments-dev")?
            .set_default("storage_public_base_url", "http://127.0.0.1:9000/founderhub-attachments-dev")?
            .set_default("attachment_max_bytes", 10 * 1024 * 1024)?
            .set_default("recommendation_limit", 10)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn is_test(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("test")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    pub fn uses_redis_idempotency(&self) -> bool {
        self.idempotency_backend.eq_ignore_ascii_case("redis")
    }

    /// `memory` keeps attachments in process; anything else is an HTTP
    /// object endpoint.
    pub fn uses_memory_storage(&self) -> bool {
        self.storage_endpoint.eq_ignore_ascii_case("memory")
    }

    /// In-process backends with a fixed secret, for tests across crates.
    pub fn default_for_tests() -> Self {
        AppConfig {
            app_env: "test".to_string(),
            port: 0,
            log_level: "info".to_string(),
            data_backend: "memory".to_string(),
            surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
            surreal_ns: "founderhub".to_string(),
            surreal_db: "main".to_string(),
            surreal_user: "root".to_string(),
            surreal_pass: "root".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            idempotency_backend: "memory".to_string(),
            jwt_secret: "secret".to_string(),
            storage_endpoint: "memory".to_string(),
            storage_bucket: "bucket".to_string(),
            storage_public_base_url: "http://cdn.test".to_string(),
            attachment_max_bytes: 64 * 1024,
            recommendation_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_switches_ignore_case() {
        let mut config = AppConfig::default_for_tests();
        config.app_env = "Test".to_string();
        config.data_backend = "SURREAL".to_string();
        assert!(config.is_test());
        assert!(!config.is_production());
        assert!(config.uses_surreal());
        assert!(!config.uses_redis_idempotency());
        assert!(config.uses_memory_storage());
    }
}
