//! API integration tests for transform, upload, delete and stat endpoints.
//!
//! Tests verify:
//! - Resize, crop and fill geometry of transformed images
//! - Format negotiation and response headers
//! - Watermark compositing
//! - Error status codes and JSON error bodies

use tempfile::TempDir;

use imgserv::config::OutputFormat;
use imgserv::transform::EncodingPolicy;

use super::test_utils::{
    create_solid_png, create_test_jpeg, create_test_png, dimensions, get, get_with_accept,
    is_valid_jpeg, is_valid_webp, pixel_at, post, MockOriginStore, ServiceBuilder, TestResponse,
};

/// CORS adds its own `Vary` values, so look through all of them.
fn varies_on_accept(response: &TestResponse) -> bool {
    response
        .headers
        .get_all("vary")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.eq_ignore_ascii_case("accept"))
}

fn origin_with_photo() -> MockOriginStore {
    MockOriginStore::new().with_object("photo.png", create_test_png(400, 300))
}

// =============================================================================
// Transform Geometry
// =============================================================================

#[tokio::test]
async fn test_resize_contain() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/r200x100/photo.png").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(is_valid_jpeg(&response.body));
    assert_eq!(dimensions(&response.body), (133, 100));
}

#[tokio::test]
async fn test_resize_width_only() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/r200/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (200, 150));
}

#[tokio::test]
async fn test_resize_crop_mode() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/rc200x100/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (200, 100));
}

#[tokio::test]
async fn test_smart_gravity() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/rc100x100,gs/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (100, 100));
}

#[tokio::test]
async fn test_crop_mode_small_source_falls_back_to_fill() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/rc800x600/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (800, 600));

    // Padding is white
    let [r, g, b] = pixel_at(&response.body, 5, 5);
    assert!(r > 240 && g > 240 && b > 240);
}

#[tokio::test]
async fn test_fill_mode_pads_to_canvas() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/rf300x300/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (300, 300));
}

#[tokio::test]
async fn test_pixel_ratio_scales_output() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/rc100x100,p2/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (200, 200));
}

#[tokio::test]
async fn test_small_source_is_never_enlarged() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("small.png", create_test_png(50, 40));
    let router = ServiceBuilder::new().router(origin, cache.path());

    // Padded onto the requested canvas instead
    let response = get(&router, "/rc100x80/small.png").await;
    assert_eq!(dimensions(&response.body), (100, 80));

    let response = get(&router, "/r100x80/small.png").await;
    assert_eq!(dimensions(&response.body), (50, 40));
}

#[tokio::test]
async fn test_crop_without_resize() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/c10x10x100x50/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (100, 50));

    // Rectangle running past the edge is clamped
    let response = get(&router, "/c350x250x100x100/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (50, 50));
}

#[tokio::test]
async fn test_crop_origin_outside_image() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/c500x0x10x10/photo.png").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "transform_error");
}

#[tokio::test]
async fn test_escaped_key() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("foo/bar", create_test_jpeg(64, 64));
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = get(&router, "/r32x32,q85/foo%2Fbar").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (32, 32));
    assert_eq!(origin.get_count("foo/bar").await, 1);
}

#[tokio::test]
async fn test_nested_key_path() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("2024/01/cat.jpg", create_test_jpeg(64, 64));
    let router = ServiceBuilder::new().router(origin, cache.path());

    let response = get(&router, "/r32/2024/01/cat.jpg").await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_presets() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new()
        .with_presets(r#"{"thumb": {"resize": true, "mode": "crop", "width": 64, "height": 64}}"#)
        .router(origin_with_photo(), cache.path());

    let response = get(&router, "/_thumb/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (64, 64));

    let response = get(&router, "/_thumb,r32x32/photo.png").await;
    assert_eq!(dimensions(&response.body), (32, 32));

    let response = get(&router, "/_missing/photo.png").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "parse_error");
}

// =============================================================================
// Output Format
// =============================================================================

#[tokio::test]
async fn test_vary_negotiates_webp() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get_with_accept(&router, "/r100/photo.png", "image/webp,*/*").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("image/webp"));
    assert!(varies_on_accept(&response));
    assert!(is_valid_webp(&response.body));

    let response = get_with_accept(&router, "/r100/photo.png", "image/png").await;
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(varies_on_accept(&response));
}

#[tokio::test]
async fn test_fixed_jpeg_output() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new()
        .with_encoding(EncodingPolicy {
            output: OutputFormat::Jpeg,
            ..Default::default()
        })
        .router(origin_with_photo(), cache.path());

    let response = get_with_accept(&router, "/r100/photo.png", "image/webp").await;
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(!varies_on_accept(&response));
}

#[tokio::test]
async fn test_response_headers() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/r100/photo.png").await;
    assert_eq!(
        response.header("cache-control"),
        Some("public, max-age=3600")
    );
    let length: usize = response.header("content-length").unwrap().parse().unwrap();
    assert_eq!(length, response.body.len());
}

#[tokio::test]
async fn test_quality_changes_output_size() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let low = get(&router, "/r300,q10/photo.png").await;
    let high = get(&router, "/r300,q95/photo.png").await;
    assert!(low.body.len() < high.body.len());
}

#[tokio::test]
async fn test_quality_changes_webp_output_size() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let low = get_with_accept(&router, "/r300,q10/photo.png", "image/webp").await;
    let high = get_with_accept(&router, "/r300,q95/photo.png", "image/webp").await;
    assert_eq!(low.header("content-type"), Some("image/webp"));
    assert!(is_valid_webp(&low.body));
    assert!(
        low.body.len() < high.body.len(),
        "q10 gave {} bytes, q95 gave {}",
        low.body.len(),
        high.body.len()
    );
}

#[tokio::test]
async fn test_oversized_requests_rejected() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    for uri in [
        "/rf200000x200000/photo.png",
        "/rf4294967295x4294967295/photo.png",
        "/rc10x10,p1e9/photo.png",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status, 500, "{}", uri);
        assert_eq!(response.json()["error"], "image_too_large", "{}", uri);
    }

    // The server keeps serving
    assert_eq!(get(&router, "/r100/photo.png").await.status, 200);
}

// =============================================================================
// Watermarks
// =============================================================================

#[tokio::test]
async fn test_watermark_composited_at_position() {
    let cache = TempDir::new().unwrap();
    let origin = origin_with_photo().with_object("mark.png", create_solid_png(20, 20, [255, 0, 0, 255]));
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = get(&router, "/r200x150,q100,wmark.png-nw/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (200, 150));

    let [r, g, b] = pixel_at(&response.body, 5, 5);
    assert!(r > 200 && g < 60 && b < 60, "expected red, got {:?}", (r, g, b));
    assert_eq!(origin.get_count("mark.png").await, 1);
}

#[tokio::test]
async fn test_watermark_ignored_without_resize() {
    let cache = TempDir::new().unwrap();
    let origin = origin_with_photo().with_object("mark.png", create_solid_png(20, 20, [255, 0, 0, 255]));
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = get(&router, "/q90,wmark.png-nw/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(origin.get_count("mark.png").await, 0);
}

#[tokio::test]
async fn test_missing_watermark_fails_request() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/r100,wnowhere.png/photo.png").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "watermark_error");
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_missing_image_returns_404() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(MockOriginStore::new(), cache.path());

    let response = get(&router, "/r100/missing.jpg").await;
    assert_eq!(response.status, 404);

    let error = response.json();
    assert_eq!(error["error"], "not_found");
    assert_eq!(error["status"], 404);
}

#[tokio::test]
async fn test_empty_query_returns_400() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    let response = get(&router, "/").await;
    assert_eq!(response.status, 400);
    assert_eq!(response.json()["error"], "empty_query");
}

#[tokio::test]
async fn test_malformed_operations_return_500() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(origin_with_photo(), cache.path());

    for uri in [
        "/z100/photo.png",
        "/r/photo.png",
        "/q101/photo.png",
        "/gc/photo.png",
        "/c1x2x3/photo.png",
        "/r100/bad%zzkey",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status, 500, "uri {}", uri);
        assert_eq!(response.json()["error"], "parse_error", "uri {}", uri);
    }
}

#[tokio::test]
async fn test_undecodable_source_returns_500() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("junk.jpg", b"not an image".to_vec());
    let router = ServiceBuilder::new().router(origin, cache.path());

    let response = get(&router, "/r100/junk.jpg").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "decode_error");
}

#[tokio::test]
async fn test_origin_failure_returns_500() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_failure("broken.jpg");
    let router = ServiceBuilder::new().router(origin, cache.path());

    let response = get(&router, "/r100/broken.jpg").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "storage_error");
}

#[tokio::test]
async fn test_favicon_is_404() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = get(&router, "/favicon.ico").await;
    assert_eq!(response.status, 404);
    assert_eq!(origin.get_count("favicon.ico").await, 0);
}

// =============================================================================
// Upload, Delete, Stat, Health
// =============================================================================

#[tokio::test]
async fn test_upload_with_key() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = post(&router, "/upload?key=new.jpg", create_test_png(120, 80)).await;
    assert_eq!(response.status, 200);

    let info = response.json();
    assert_eq!(info["name"], "new.jpg");
    assert_eq!(info["width"], 120);
    assert_eq!(info["height"], 80);

    let stored = origin.object("new.jpg").await.unwrap();
    assert!(is_valid_jpeg(&stored));

    // Served from the local cache, the origin is never asked
    let response = get(&router, "/r60/new.jpg").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (60, 40));
    assert_eq!(origin.get_count("new.jpg").await, 0);
}

#[tokio::test]
async fn test_upload_without_key_gets_random_name() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = post(&router, "/upload", create_test_jpeg(32, 32)).await;
    assert_eq!(response.status, 200);

    let info = response.json();
    let name = info["name"].as_str().unwrap();
    assert_eq!(name.len(), 22);
    assert!(origin.object(name).await.is_some());
}

#[tokio::test]
async fn test_upload_downscales_to_limits() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new()
        .with_upload_limits(100, 100)
        .router(MockOriginStore::new(), cache.path());

    let response = post(&router, "/upload?key=big.jpg", create_test_png(400, 200)).await;
    let info = response.json();
    assert_eq!(info["width"], 100);
    assert_eq!(info["height"], 50);
}

#[tokio::test]
async fn test_upload_rejects_garbage() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let response = post(&router, "/upload?key=junk", b"definitely not an image".to_vec()).await;
    assert_eq!(response.status, 500);
    assert_eq!(origin.put_count().await, 0);
}

#[tokio::test]
async fn test_upload_file() {
    let cache = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let path = files.path().join("local.png");
    std::fs::write(&path, create_test_png(40, 30)).unwrap();

    let origin = MockOriginStore::new();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    let uri = format!("/upload_file?key=local.jpg&filename={}", path.display());
    let response = get(&router, &uri).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json()["width"], 40);
    assert!(origin.object("local.jpg").await.is_some());

    let response = get(&router, "/upload_file?key=x&filename=/definitely/missing.png").await;
    assert_eq!(response.status, 500);
    assert_eq!(response.json()["error"], "upload_error");

    let response = get(&router, "/upload_file?key=x").await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_delete() {
    let cache = TempDir::new().unwrap();
    let origin = origin_with_photo();
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    assert_eq!(get(&router, "/r100/photo.png").await.status, 200);

    let response = get(&router, "/delete?key=photo.png").await;
    assert_eq!(response.status, 200);
    assert!(origin.object("photo.png").await.is_none());

    // Local copy is gone too
    assert_eq!(get(&router, "/r100/photo.png").await.status, 404);

    assert_eq!(get(&router, "/delete?key=photo.png").await.status, 404);
    assert_eq!(get(&router, "/delete").await.status, 400);
}

#[tokio::test]
async fn test_stat_endpoint() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new()
        .with_gates(10, 3)
        .router(origin_with_photo(), cache.path());

    get(&router, "/r100/photo.png").await;
    get(&router, "/r100/photo.png").await;
    post(&router, "/upload?key=u.jpg", create_test_png(10, 10)).await;

    let response = get(&router, "/stat").await;
    assert_eq!(response.status, 200);

    let stats = response.json();
    assert_eq!(stats["resized"], 2);
    assert_eq!(stats["uploaded"], 1);
    assert_eq!(stats["rejected"], 0);
    assert_eq!(stats["in_progress"], 0);
    assert_eq!(stats["accept_available"], 10);
    assert_eq!(stats["processing_available"], 3);
    assert!(stats["pool"]["pooled_buffers"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let cache = TempDir::new().unwrap();
    let router = ServiceBuilder::new().router(MockOriginStore::new(), cache.path());

    let response = get(&router, "/health").await;
    assert_eq!(response.status, 200);

    let health = response.json();
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());
}
