//! Operation language and preset integration tests.
//!
//! Tests verify:
//! - Presets loaded from a file drive real transforms
//! - A parsed spec written as a preset parses back to the same spec
//! - Parse failures never reach the origin

use std::io::Write;
use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir};

use imgserv::params::{OperationParser, Presets, TransformSpec};

use super::test_utils::{create_test_png, dimensions, get, MockOriginStore, ServiceBuilder};

fn preset_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_presets_from_file() {
    let file = preset_file(
        r#"{
            "avatar": {"resize": true, "mode": "crop", "width": 64, "height": 64, "quality": 70},
            "hero": {"resize": true, "width": 1200, "watermarks": [{"path": "logo.png", "position": "nw"}]}
        }"#,
    );
    let presets = Presets::from_file(file.path()).unwrap();
    assert_eq!(presets.len(), 2);

    let parser = OperationParser::new(Arc::new(presets));
    let (_, avatar) = parser.parse("/_avatar/u/1.jpg").unwrap();
    assert_eq!((avatar.width, avatar.height, avatar.quality), (64, 64, 70));

    let (_, hero) = parser.parse("/_hero,q60/cover.jpg").unwrap();
    assert_eq!(hero.width, 1200);
    assert_eq!(hero.quality, 60);
    assert_eq!(hero.watermarks[0].path, "logo.png");
    assert_eq!(hero.watermarks[0].size, 100);
}

#[test]
fn test_invalid_preset_file_rejected() {
    let file = preset_file(r#"{"bad": {"quality": 0}}"#);
    assert!(Presets::from_file(file.path()).is_err());

    let missing = std::path::Path::new("/nonexistent/presets.json");
    assert!(Presets::from_file(missing).is_err());
}

#[test]
fn test_parsed_spec_reloads_as_preset() {
    let parser = OperationParser::new(Arc::new(Presets::empty()));
    let (_, spec) = parser
        .parse("/rf320x200,c5x6x70x80,gs,q77,wmark.png-10x20-40,p1.5/k.jpg")
        .unwrap();

    let canonical = serde_json::to_string(&spec).unwrap();
    let presets = Presets::from_json(&format!(r#"{{"copy": {}}}"#, canonical)).unwrap();
    let reparsed = OperationParser::new(Arc::new(presets))
        .parse("/_copy/k.jpg")
        .unwrap()
        .1;

    assert_eq!(reparsed, spec);

    let back: TransformSpec = serde_json::from_str(&canonical).unwrap();
    assert_eq!(serde_json::to_string(&back).unwrap(), canonical);
}

#[tokio::test]
async fn test_preset_served_over_http() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("photo.png", create_test_png(300, 150));
    let router = ServiceBuilder::new()
        .with_presets(r#"{"square": {"resize": true, "mode": "crop", "width": 40, "height": 40}}"#)
        .router(origin, cache.path());

    let response = get(&router, "/_square/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (40, 40));

    let response = get(&router, "/_square,r80x20/photo.png").await;
    assert_eq!(response.status, 200);
    assert_eq!(dimensions(&response.body), (80, 20));
}

#[tokio::test]
async fn test_parse_failures_skip_origin() {
    let cache = TempDir::new().unwrap();
    let origin = MockOriginStore::new().with_object("photo.png", create_test_png(30, 30));
    let router = ServiceBuilder::new().router(origin.clone(), cache.path());

    for uri in [
        "/photo.png",
        "/z1/photo.png",
        "/q0/photo.png",
        "/c1x2x3/photo.png",
        "/gf/photo.png",
        "/w/photo.png",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status, 500, "{}", uri);
        assert_eq!(response.json()["error"], "parse_error", "{}", uri);
    }

    assert_eq!(origin.get_count("photo.png").await, 0);
}
