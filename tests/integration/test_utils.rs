//! Test utilities for integration tests.
//!
//! This module provides an in-memory origin store, a service builder wired to
//! a temporary cache directory, and helpers for generating and checking
//! test images.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

use imgserv::admission::AdmissionController;
use imgserv::cache::CachedStore;
use imgserv::error::IoError;
use imgserv::io::{BufferPool, OriginStore};
use imgserv::params::{OperationParser, Presets};
use imgserv::server::auth::SignatureVerifier;
use imgserv::stats::Stats;
use imgserv::transform::{EncodingPolicy, ImageService, UploadLimits};
use imgserv::{create_router, RouterConfig};

// =============================================================================
// Mock Origin Store with Request Tracking
// =============================================================================

/// In-memory origin store that counts every call per key.
///
/// Clones share the same objects and counters, so a test can keep a handle
/// after moving the store into a service.
#[derive(Clone, Default)]
pub struct MockOriginStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    get_counts: Arc<RwLock<HashMap<String, usize>>>,
    put_count: Arc<RwLock<usize>>,
}

impl MockOriginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: impl Into<String>, data: Vec<u8>) -> Self {
        self.objects
            .try_write()
            .unwrap()
            .insert(key.into(), Bytes::from(data));
        self
    }

    /// Every `get` of `key` fails with a storage error.
    pub fn with_failure(self, key: impl Into<String>) -> Self {
        self.failing.try_write().unwrap().insert(key.into());
        self
    }

    pub async fn get_count(&self, key: &str) -> usize {
        self.get_counts.read().await.get(key).copied().unwrap_or(0)
    }

    pub async fn put_count(&self) -> usize {
        *self.put_count.read().await
    }

    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert(key.to_string(), Bytes::from(data));
    }
}

#[async_trait]
impl OriginStore for MockOriginStore {
    async fn get(&self, key: &str, buf: &mut Vec<u8>) -> Result<(), IoError> {
        *self
            .get_counts
            .write()
            .await
            .entry(key.to_string())
            .or_insert(0) += 1;

        if self.failing.read().await.contains(key) {
            return Err(IoError::S3(format!("injected failure for {}", key)));
        }

        match self.objects.read().await.get(key) {
            Some(data) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            None => Err(IoError::NotFound(format!("mock://{}", key))),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        *self.put_count.write().await += 1;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), IoError> {
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(IoError::NotFound(format!("mock://{}", key))),
        }
    }

    fn namespace(&self) -> &str {
        "mock-bucket"
    }
}

// =============================================================================
// Service Builder
// =============================================================================

/// Builds an [`ImageService`] over a [`MockOriginStore`] with test defaults.
pub struct ServiceBuilder {
    verifier: SignatureVerifier,
    presets: Presets,
    max_clients: usize,
    concurrency: usize,
    queue_timeout: Option<Duration>,
    encoding: EncodingPolicy,
    upload_limits: UploadLimits,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            verifier: SignatureVerifier::None,
            presets: Presets::empty(),
            max_clients: 100,
            concurrency: 2,
            queue_timeout: None,
            encoding: EncodingPolicy::default(),
            upload_limits: UploadLimits::default(),
        }
    }

    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_presets(mut self, json: &str) -> Self {
        self.presets = Presets::from_json(json).unwrap();
        self
    }

    pub fn with_gates(mut self, max_clients: usize, concurrency: usize) -> Self {
        self.max_clients = max_clients;
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingPolicy) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_upload_limits(mut self, max_width: u32, max_height: u32) -> Self {
        self.upload_limits = UploadLimits {
            max_width,
            max_height,
        };
        self
    }

    pub fn build(self, origin: MockOriginStore, cache_root: &Path) -> ImageService<MockOriginStore> {
        let cache = CachedStore::new(origin, cache_root, BufferPool::new()).unwrap();
        let admission = AdmissionController::new(
            self.max_clients,
            self.concurrency,
            self.queue_timeout,
            Arc::new(Stats::new()),
        );
        ImageService::new(
            cache,
            OperationParser::new(Arc::new(self.presets)),
            self.verifier,
            admission,
        )
        .with_encoding(self.encoding)
        .with_upload_limits(self.upload_limits)
    }

    /// Build the service and wrap it in a router without request tracing.
    pub fn router(self, origin: MockOriginStore, cache_root: &Path) -> Router {
        create_router(
            self.build(origin, cache_root),
            RouterConfig::new().with_tracing(false),
        )
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

/// A collected response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

pub async fn get_with_accept(router: &Router, uri: &str, accept: &str) -> TestResponse {
    let request = Request::builder()
        .uri(uri)
        .header("accept", accept)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

pub async fn post(router: &Router, uri: &str, body: Vec<u8>) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}

// =============================================================================
// Test Image Creation
// =============================================================================

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// Create an opaque RGB PNG with a gradient pattern.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// Create an RGB JPEG with a gradient pattern.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// Create a solid, fully opaque RGBA PNG, handy as a watermark.
pub fn create_solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

// =============================================================================
// Validation Helpers
// =============================================================================

/// Check if data is a decodable JPEG.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return false;
    }
    image::load_from_memory_with_format(data, ImageFormat::Jpeg).is_ok()
}

/// Check if data is a decodable WebP.
pub fn is_valid_webp(data: &[u8]) -> bool {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return false;
    }
    image::load_from_memory_with_format(data, ImageFormat::WebP).is_ok()
}

/// Dimensions of an encoded image.
pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

/// Decoded RGB pixel at (`x`, `y`).
pub fn pixel_at(data: &[u8], x: u32, y: u32) -> [u8; 3] {
    let img = image::load_from_memory(data).unwrap().to_rgb8();
    img.get_pixel(x, y).0
}
