use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use founderhub_domain::DomainResult;
use founderhub_domain::error::DomainError;
use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::storage::{ObjectMetadata, ObjectStorage};
use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::config::AppConfig;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);
const UPLOAD_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    pub bytes: Vec<u8>,
}

/// Keeps uploads in process; used for local runs and tests.
#[derive(Clone)]
pub struct InMemoryObjectStorage {
    public_base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl InMemoryObjectStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: Arc::default(),
        }
    }

    pub async fn get(&self, object_key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(object_key).cloned()
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn upload(&self, bytes: &[u8], metadata: &ObjectMetadata) -> BoxFuture<'_, DomainResult<String>> {
        let object = StoredObject {
            metadata: metadata.clone(),
            bytes: bytes.to_vec(),
        };
        Box::pin(async move {
            let url = public_url(&self.public_base_url, &object.metadata.object_key);
            self.objects
                .write()
                .await
                .insert(object.metadata.object_key.clone(), object);
            Ok(url)
        })
    }
}

/// S3-compatible bucket reached with plain `PUT {endpoint}/{bucket}/{key}`.
#[derive(Clone, Debug)]
pub struct HttpObjectStorage {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_base_url: String,
}

impl HttpObjectStorage {
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            endpoint: config.storage_endpoint.trim_end_matches('/').to_string(),
            bucket: config.storage_bucket.trim_matches('/').to_string(),
            public_base_url: config.storage_public_base_url.clone(),
        }
    }

    fn object_url(&self, object_key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, object_key)
    }
}

impl ObjectStorage for HttpObjectStorage {
    fn upload(&self, bytes: &[u8], metadata: &ObjectMetadata) -> BoxFuture<'_, DomainResult<String>> {
        let body = bytes.to_vec();
        let metadata = metadata.clone();
        Box::pin(async move {
            let url = self.object_url(&metadata.object_key);
            for attempt in 0..UPLOAD_ATTEMPTS {
                let result = self
                    .http
                    .put(&url)
                    .header(reqwest::header::CONTENT_TYPE, metadata.content_type.as_str())
                    .header(
                        reqwest::header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"{}\"", metadata.file_name),
                    )
                    .body(body.clone())
                    .send()
                    .await;
                let retryable = match result {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!(
                            object_key = %metadata.object_key,
                            size_bytes = metadata.size_bytes,
                            "attachment uploaded"
                        );
                        return Ok(public_url(&self.public_base_url, &metadata.object_key));
                    }
                    Ok(response) if response.status().is_server_error() => {
                        format!("object store returned {}", response.status())
                    }
                    Ok(response) => {
                        return Err(DomainError::Integration(format!(
                            "object store rejected upload: {}",
                            response.status()
                        )));
                    }
                    Err(err) => err.to_string(),
                };
                if attempt + 1 < UPLOAD_ATTEMPTS {
                    tracing::warn!(object_key = %metadata.object_key, error = %retryable, "retrying attachment upload");
                    sleep(RETRY_BACKOFF).await;
                    continue;
                }
                return Err(DomainError::Integration(retryable));
            }
            Err(DomainError::Integration("attachment upload not attempted".into()))
        })
    }
}

fn public_url(base: &str, object_key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), object_key)
}

pub fn object_storage_from_config(config: &AppConfig) -> Arc<dyn ObjectStorage> {
    if config.uses_memory_storage() {
        Arc::new(InMemoryObjectStorage::new(config.storage_public_base_url.clone()))
    } else {
        Arc::new(HttpObjectStorage::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(key: &str) -> ObjectMetadata {
        ObjectMetadata {
            object_key: key.to_string(),
            file_name: "deck.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 3,
        }
    }

    #[tokio::test]
    async fn memory_storage_returns_public_url() {
        let storage = InMemoryObjectStorage::new("http://cdn.test/");
        let url = storage
            .upload(b"pdf", &metadata("chats/c-1/abc/deck.pdf"))
            .await
            .expect("upload");
        assert_eq!(url, "http://cdn.test/chats/c-1/abc/deck.pdf");
        let stored = storage.get("chats/c-1/abc/deck.pdf").await.expect("stored");
        assert_eq!(stored.bytes, b"pdf".to_vec());
    }

    #[test]
    fn http_storage_addresses_bucket_path() {
        let mut config = AppConfig::default_for_tests();
        config.storage_endpoint = "http://minio:9000/".to_string();
        config.storage_bucket = "/attachments/".to_string();
        let storage = HttpObjectStorage::from_config(&config);
        assert_eq!(
            storage.object_url("chats/c-1/f.png"),
            "http://minio:9000/attachments/chats/c-1/f.png"
        );
    }
}
