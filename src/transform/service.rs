//! Image service orchestrating the request pipeline.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           ImageService                            │
//! │                                                                   │
//! │  transform():  accept gate ─► verify ─► parse ─► processing gate  │
//! │                   ─► load source + watermarks ─► render (blocking)│
//! │                                                                   │
//! │  upload():     processing gate ─► decode/normalize ─► store       │
//! │  delete():     origin + cache removal                             │
//! │        │                  │                      │                │
//! │        ▼                  ▼                      ▼                │
//! │  ┌───────────┐   ┌──────────────────┐   ┌──────────────────┐      │
//! │  │ Admission │   │ OperationParser  │   │ CachedStore<O>   │      │
//! │  └───────────┘   └──────────────────┘   └──────────────────┘      │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::cache::CachedStore;
use crate::error::{ServeError, TransformError};
use crate::io::OriginStore;
use crate::params::OperationParser;
use crate::server::auth::SignatureVerifier;
use crate::stats::{PoolSnapshot, StatsSnapshot};

use super::encoder::{EncodingPolicy, ImageFormat};
use super::engine::RasterEngine;
use super::pipeline::{prepare_upload, render, WatermarkSource};

// =============================================================================
// Responses
// =============================================================================

/// A transformed image ready to be sent.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub data: Bytes,
    pub format: ImageFormat,
    /// Format was negotiated from the `Accept` header
    pub vary: bool,
}

impl RenderedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// JSON body returned by the upload endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Bound applied to uploads before storing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_width: u32,
    pub max_height: u32,
}

// =============================================================================
// Image Service
// =============================================================================

/// Serves transform, upload and delete requests against a cached origin.
///
/// # Type Parameters
///
/// * `O` - The origin store behind the disk cache (S3 in production)
pub struct ImageService<O: OriginStore> {
    cache: Arc<CachedStore<O>>,
    parser: OperationParser,
    verifier: SignatureVerifier,
    admission: AdmissionController,
    encoding: EncodingPolicy,
    upload_limits: UploadLimits,
}

impl<O: OriginStore> ImageService<O> {
    pub fn new(
        cache: CachedStore<O>,
        parser: OperationParser,
        verifier: SignatureVerifier,
        admission: AdmissionController,
    ) -> Self {
        Self {
            cache: Arc::new(cache),
            parser,
            verifier,
            admission,
            encoding: EncodingPolicy::default(),
            upload_limits: UploadLimits::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingPolicy) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.upload_limits = limits;
        self
    }

    pub fn cache(&self) -> &CachedStore<O> {
        &self.cache
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Run one transform request.
    ///
    /// `raw_query` is the request path (and query string) as received,
    /// `accept` the request's `Accept` header.
    pub async fn transform(
        &self,
        raw_query: &str,
        accept: Option<&str>,
    ) -> Result<RenderedImage, ServeError> {
        let _accepted = self.admission.try_accept()?;
        self.admission.stats().record_resized();

        if raw_query.trim_matches('/').is_empty() {
            return Err(ServeError::EmptyQuery);
        }

        let verified = self.verifier.verify(raw_query)?;
        let (key, spec) = self.parser.parse(verified)?;

        let _slot = self.admission.acquire_processing().await?;

        let source = self.cache.load(&key).await?;

        let mut watermarks = Vec::new();
        if spec.resize {
            for wm in &spec.watermarks {
                let data = self.cache.load(&wm.path).await.map_err(|e| {
                    TransformError::Watermark {
                        path: wm.path.clone(),
                        message: e.to_string(),
                    }
                })?;
                watermarks.push(data);
            }
        }

        let encoding = self.encoding.negotiate(accept);
        let quality = self.encoding.quality(encoding.format, spec.quality);

        debug!(
            key = %key,
            resize = spec.resize,
            width = spec.width,
            height = spec.height,
            format = encoding.format.content_type(),
            quality = quality,
            "Rendering image"
        );

        let data = tokio::task::spawn_blocking(move || {
            let sources: Vec<WatermarkSource<'_>> = spec
                .watermarks
                .iter()
                .zip(watermarks.iter())
                .map(|(spec, data)| WatermarkSource {
                    spec,
                    data: &data[..],
                })
                .collect();
            render::<RasterEngine>(&source, &spec, &sources, encoding.format, quality)
        })
        .await
        .map_err(|e| TransformError::Worker(e.to_string()))??;

        Ok(RenderedImage {
            data: Bytes::from(data),
            format: encoding.format,
            vary: encoding.vary,
        })
    }

    /// Normalize and store an uploaded image.
    ///
    /// Without a `key` the image is stored under a random name.
    pub async fn upload(&self, key: Option<&str>, body: Bytes) -> Result<UploadedInfo, ServeError> {
        self.admission.stats().record_uploaded();

        let name = match key {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => random_name(),
        };

        let _slot = self.admission.acquire_processing().await?;

        let limits = self.upload_limits;
        let prepared = tokio::task::spawn_blocking(move || {
            prepare_upload::<RasterEngine>(&body, limits.max_width, limits.max_height)
        })
        .await
        .map_err(|e| TransformError::Worker(e.to_string()))??;

        self.cache.store(&name, Bytes::from(prepared.data)).await?;

        info!(
            key = %name,
            width = prepared.width,
            height = prepared.height,
            "Uploaded image"
        );

        Ok(UploadedInfo {
            name,
            width: prepared.width,
            height: prepared.height,
        })
    }

    /// Remove `key` from the origin and the cache.
    pub async fn delete(&self, key: &str) -> Result<(), ServeError> {
        if key.is_empty() {
            return Err(ServeError::BadRequest("empty key arg".to_string()));
        }
        self.admission.stats().record_deleted();

        self.cache.delete(key).await?;
        info!(key = %key, "Deleted image");
        Ok(())
    }

    /// Current counters, gate availability and pool occupancy.
    pub fn stats(&self) -> StatsSnapshot {
        let stats = self.admission.stats();
        let pool = self.cache.pool();
        StatsSnapshot {
            resized: stats.resized(),
            uploaded: stats.uploaded(),
            deleted: stats.deleted(),
            rejected: stats.rejected(),
            canceled: stats.canceled(),
            in_progress: stats.in_progress(),
            accept_available: self.admission.accept_available(),
            processing_available: self.admission.processing_available(),
            pool: PoolSnapshot {
                pooled_buffers: pool.pooled_buffers(),
                pooled_bytes: pool.pooled_bytes(),
            },
            uptime_secs: stats.uptime_secs(),
        }
    }
}

/// 16 random bytes in v4 UUID layout, base64url without padding.
pub fn random_name() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}
