// src/storage.rs
//
// Object-storage collaborators. The orchestrator receives an ObjectStore by
// injection so hosts can point it at the hosted backend or a test double.

use crate::error::{ImagePipelineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Remote object storage as the pipeline sees it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes under `path`, returning the public URL of the stored
    /// object.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Public URL for a stored path. No network round-trip.
    fn public_url(&self, path: &str) -> String;

    /// Opportunistic existence probe for the backing bucket. Never fails:
    /// transport and server errors read as "unknown" and report false.
    async fn bucket_exists(&self) -> bool;
}

// =============================================================================
// HOSTED BACKEND
// =============================================================================

/// Error body shape the hosted storage service returns on failed requests.
#[derive(Debug, Deserialize)]
struct StorageErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// REST client for the hosted storage service.
///
/// Paths are bucket-relative; uploads land at
/// `{base_url}/object/{bucket}/{path}` and are served from
/// `{base_url}/object/public/{bucket}/{path}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

impl HttpObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            bucket: bucket.into(),
            api_key: api_key.into(),
        }
    }

    fn error_message(body: &str) -> String {
        match serde_json::from_str::<StorageErrorBody>(body) {
            Ok(parsed) => parsed
                .message
                .or(parsed.error)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, path);
        debug!(%url, size = bytes.len(), "uploading object");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ImagePipelineError::upload_failed(path, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImagePipelineError::upload_failed(
                path,
                format!("status {status}: {}", Self::error_message(&body)),
            ));
        }

        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    async fn bucket_exists(&self) -> bool {
        let url = format!("{}/bucket/{}", self.base_url, self.bucket);
        match self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(bucket = %self.bucket, error = %err, "bucket existence check failed");
                false
            }
        }
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// A stored object's bytes plus the content type it was uploaded with.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory ObjectStore for tests and local development.
pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_base_url("https://store.local")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().expect("store lock").get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.objects.lock().expect("store lock").insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn bucket_exists(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryObjectStore::new();
        assert!(store.is_empty());

        let url = store
            .upload("post-images/u1/a.webp", vec![1, 2, 3], "image/webp")
            .await
            .unwrap();
        assert_eq!(url, "https://store.local/post-images/u1/a.webp");
        assert_eq!(store.len(), 1);

        let stored = store.object("post-images/u1/a.webp").unwrap();
        assert_eq!(stored.bytes, vec![1, 2, 3]);
        assert_eq!(stored.content_type, "image/webp");
        assert!(store.bucket_exists().await);
    }

    #[tokio::test]
    async fn test_memory_store_custom_base_url_trims_slash() {
        let store = MemoryObjectStore::with_base_url("https://cdn.example/");
        assert_eq!(store.public_url("x.webp"), "https://cdn.example/x.webp");
    }

    #[test]
    fn test_http_store_public_url_shape() {
        let store = HttpObjectStore::new("https://api.example/storage/v1/", "blog-images", "k");
        assert_eq!(
            store.public_url("post-images/u1/a.webp"),
            "https://api.example/storage/v1/object/public/blog-images/post-images/u1/a.webp"
        );
    }

    #[test]
    fn test_http_store_error_message_parsing() {
        assert_eq!(
            HttpObjectStore::error_message(r#"{"message":"bucket not found"}"#),
            "bucket not found"
        );
        assert_eq!(
            HttpObjectStore::error_message(r#"{"error":"invalid token"}"#),
            "invalid token"
        );
        assert_eq!(HttpObjectStore::error_message("plain text"), "plain text");
    }
}
