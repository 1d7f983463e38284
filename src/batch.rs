// src/batch.rs
//
// The batch upload orchestrator: find locally-referenced images in rich-text
// HTML, run each through the transcoder, upload the result, and rewrite the
// document to point at the uploaded URLs.
//
// Items are processed strictly sequentially with a fixed inter-item delay.
// That bounds peak decode/encode pressure in the host at the cost of total
// latency scaling linearly with image count.

use crate::error::{ImagePipelineError, Result};
use crate::ops::UploadProfile;
use crate::storage::ObjectStore;
use crate::transcoder::{transcode, SourceImage, TranscodeOptions, TranscodeResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use rand::distr::Alphanumeric;
use rand::Rng as _;
use regex::Regex;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src="([^">]+)""#).expect("img src pattern"));

/// Extract image references using local/ephemeral URI schemes (`blob:`,
/// `data:`) from HTML, in document order. Remote URLs already point at
/// durable storage and are skipped. Duplicates are kept; each occurrence is
/// processed independently.
pub fn extract_local_image_sources(html: &str) -> Vec<String> {
    IMG_SRC_RE
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|src| src.starts_with("blob:") || src.starts_with("data:"))
        .collect()
}

/// Status snapshot surfaced to the caller while a batch runs.
/// `completed` counts both successes and failures and reaches `total`
/// exactly once, after the last item.
#[derive(Clone, Debug, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub current: String,
    pub failed: Vec<String>,
}

/// Per-image record for a successfully processed reference.
#[derive(Clone, Debug, Serialize)]
pub struct UploadResult {
    pub original_src: String,
    pub uploaded_url: String,
    pub metadata: TranscodeResult,
}

/// Final report of one batch pass: the rewritten HTML, the uploads in
/// discovery order, and the references that could not be processed (left
/// untouched in the HTML).
#[derive(Clone, Debug)]
pub struct ProcessedDocument {
    pub html: String,
    pub uploads: Vec<UploadResult>,
    pub failed: Vec<String>,
}

/// Resolves a local/ephemeral URI into image bytes.
///
/// `blob:` handles only exist inside the editing session, so dereferencing
/// them is the host's job; the pipeline ships a resolver for self-contained
/// `data:` URIs.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<SourceImage>;

    /// Release the resource behind `reference` once it has been superseded
    /// by an uploaded URL. Only called for `blob:` references.
    fn release(&self, _reference: &str) {}
}

/// Resolver for base64 `data:` URIs. Anything else fails through the normal
/// per-item failure path.
pub struct DataUriResolver;

#[async_trait]
impl SourceResolver for DataUriResolver {
    async fn fetch(&self, reference: &str) -> Result<SourceImage> {
        decode_data_uri(reference)
    }
}

fn decode_data_uri(reference: &str) -> Result<SourceImage> {
    let payload = reference.strip_prefix("data:").ok_or_else(|| {
        ImagePipelineError::dereference_failed(
            reference,
            "not a data: URI; blob: references need a session-aware resolver",
        )
    })?;

    let (header, body) = payload.split_once(',').ok_or_else(|| {
        ImagePipelineError::dereference_failed(reference, "malformed data: URI (no comma)")
    })?;

    let media_type = header.strip_suffix(";base64").ok_or_else(|| {
        ImagePipelineError::dereference_failed(
            reference,
            "unsupported data: URI encoding; only base64 payloads are handled",
        )
    })?;

    let bytes = BASE64_STANDARD
        .decode(body)
        .map_err(|e| ImagePipelineError::dereference_failed(reference, e.to_string()))?;

    let content_type = if media_type.is_empty() {
        "text/plain"
    } else {
        media_type
    };
    Ok(SourceImage::new("inline-image", content_type, bytes))
}

/// Tunables for one batch pass. Defaults match the production editor flow.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Key prefix inside the bucket; final keys are
    /// `{key_prefix}/{owner}/{timestamp}_{suffix}.{ext}`.
    pub key_prefix: String,
    /// Transcode bounds applied to every in-document image.
    pub options: TranscodeOptions,
    /// Bound on dereferencing one local URI.
    pub fetch_timeout: Duration,
    /// Bound on one storage upload.
    pub upload_timeout: Duration,
    /// Throttle between items. Not an error-recovery mechanism.
    pub inter_item_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            key_prefix: "post-images".to_string(),
            options: UploadProfile::content().into(),
            fetch_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(30),
            inter_item_delay: Duration::from_millis(500),
        }
    }
}

/// Orchestrates the find -> transcode -> upload -> rewrite pass over one
/// document. Both collaborators are injected; nothing here is global.
pub struct DocumentImageProcessor<S, R> {
    store: S,
    resolver: R,
    config: BatchConfig,
}

impl<S: ObjectStore, R: SourceResolver> DocumentImageProcessor<S, R> {
    pub fn new(store: S, resolver: R) -> Self {
        Self::with_config(store, resolver, BatchConfig::default())
    }

    pub fn with_config(store: S, resolver: R, config: BatchConfig) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    /// The injected object store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The injected resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Process every locally-referenced image in `html` for `owner_id`.
    ///
    /// Individual item failures are recorded and never abort the batch; the
    /// only up-front failure is a blank owner id. Failed references stay
    /// unchanged in the returned HTML and are listed in the report.
    #[instrument(skip_all, fields(owner = owner_id))]
    pub async fn process_document_images(
        &self,
        html: &str,
        owner_id: &str,
        mut on_progress: Option<&mut (dyn FnMut(&BatchProgress) + Send)>,
    ) -> Result<ProcessedDocument> {
        if owner_id.trim().is_empty() {
            return Err(ImagePipelineError::MissingOwner);
        }

        let sources = extract_local_image_sources(html);
        let total = sources.len();
        info!(count = total, "processing document images");

        if total > 0 && !self.store.bucket_exists().await {
            warn!("bucket existence check failed; attempting uploads anyway");
        }

        let mut progress = BatchProgress {
            total,
            completed: 0,
            current: format!("Found {total} images to process"),
            failed: Vec::new(),
        };
        emit(&mut on_progress, &progress);

        let mut processed_html = html.to_string();
        let mut uploads = Vec::new();

        for (index, src) in sources.iter().enumerate() {
            match self.process_single(src, owner_id, index).await {
                Ok(result) => {
                    // Every occurrence of the local reference is superseded.
                    processed_html = processed_html.replace(src.as_str(), &result.uploaded_url);
                    debug!(index, url = %result.uploaded_url, "image processed");
                    uploads.push(result);
                }
                Err(err) => {
                    warn!(
                        index,
                        reference = truncate_reference(src),
                        error = %err,
                        "failed to process image"
                    );
                    progress.failed.push(src.clone());
                }
            }

            progress.completed += 1;
            progress.current = format!("Processed image {} of {}", index + 1, total);
            emit(&mut on_progress, &progress);

            if index + 1 < total {
                tokio::time::sleep(self.config.inter_item_delay).await;
            }
        }

        progress.current = "Processing complete".to_string();
        emit(&mut on_progress, &progress);

        info!(
            succeeded = uploads.len(),
            failed = progress.failed.len(),
            "document image processing complete"
        );

        Ok(ProcessedDocument {
            html: processed_html,
            uploads,
            failed: progress.failed,
        })
    }

    async fn process_single(
        &self,
        reference: &str,
        owner_id: &str,
        index: usize,
    ) -> Result<UploadResult> {
        let fetch_ms = self.config.fetch_timeout.as_millis() as u64;
        let source =
            match tokio::time::timeout(self.config.fetch_timeout, self.resolver.fetch(reference))
                .await
            {
                Ok(fetched) => fetched?,
                Err(_) => {
                    return Err(ImagePipelineError::dereference_timeout(reference, fetch_ms))
                }
            };
        debug!(index, size = source.len(), "dereferenced local image");

        // Pixel work runs on the blocking pool so it never stalls the
        // executor driving progress callbacks.
        let options = self.config.options.clone();
        let metadata = tokio::task::spawn_blocking(move || transcode(&source, &options))
            .await
            .map_err(|e| ImagePipelineError::internal(format!("transcode task failed: {e}")))??;

        let path = self.object_key(owner_id, metadata.format.extension());
        let upload_ms = self.config.upload_timeout.as_millis() as u64;
        let uploaded_url = match tokio::time::timeout(
            self.config.upload_timeout,
            self.store
                .upload(&path, metadata.data.clone(), metadata.content_type()),
        )
        .await
        {
            Ok(uploaded) => uploaded?,
            Err(_) => return Err(ImagePipelineError::upload_timeout(path, upload_ms)),
        };

        if reference.starts_with("blob:") {
            self.resolver.release(reference);
        }

        Ok(UploadResult {
            original_src: reference.to_string(),
            uploaded_url,
            metadata,
        })
    }

    /// Collision-resistant, owner-scoped storage key.
    fn object_key(&self, owner_id: &str, extension: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(7)
            .map(char::from)
            .collect();
        format!(
            "{}/{}/{}_{}.{}",
            self.config.key_prefix,
            owner_id,
            timestamp,
            suffix.to_lowercase(),
            extension
        )
    }
}

fn emit(on_progress: &mut Option<&mut (dyn FnMut(&BatchProgress) + Send)>, progress: &BatchProgress) {
    if let Some(callback) = on_progress.as_mut() {
        callback(progress);
    }
}

/// Shorten long data: payloads for log lines.
fn truncate_reference(reference: &str) -> &str {
    reference.get(..48).unwrap_or(reference)
}
