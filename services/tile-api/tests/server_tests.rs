//! End-to-end tests for the tile server.
//!
//! Each test launches a real server through the registry on an ephemeral
//! port and drives it over HTTP, exercising the full path from routing
//! through the render pipeline to the response cache. The demo scenes
//! stand in for disk rasters so the tests need no fixture files.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use raster::{GeoTiffSource, RasterSource, SampleBlock};
use reqwest::StatusCode;
use tile_api::config::ServiceConfig;
use tile_api::{AppState, ServerKey, ServerRegistry};
use tile_common::{BoundingBox, CrsCode, DataType};

// ============================================================================
// Harness
// ============================================================================

/// Launch a default server on an ephemeral port and return its base URL.
async fn launch() -> (Arc<ServerRegistry>, String) {
    let state = Arc::new(AppState::new(ServiceConfig::default()));
    let registry = Arc::new(ServerRegistry::new(state));
    let key = registry
        .launch(ServerKey::Default, "127.0.0.1")
        .await
        .expect("launch default server");
    let server = registry.get(key).await.expect("default server is live");
    (registry, server.base_url())
}

/// GET a URL and return status, the `X-Cache` marker, and the body.
async fn fetch(url: &str) -> (StatusCode, String, Bytes) {
    let response = reqwest::get(url).await.expect("request succeeds");
    let status = response.status();
    let cache = response
        .headers()
        .get("X-Cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.bytes().await.expect("body downloads");
    (status, cache, body)
}

async fn fetch_json(url: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = fetch(url).await;
    let value = serde_json::from_slice(&body).expect("body is JSON");
    (status, value)
}

fn error_message(body: &Bytes) -> String {
    let value: serde_json::Value = serde_json::from_slice(body).expect("error body is JSON");
    value["message"].as_str().unwrap_or_default().to_string()
}

// ============================================================================
// Registry lifecycle
// ============================================================================

#[tokio::test]
async fn test_default_server_launch_is_idempotent() {
    let state = Arc::new(AppState::new(ServiceConfig::default()));
    let registry = ServerRegistry::new(state);

    let first = registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();
    let second = registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(registry.count().await, 1);
    let server = registry.get(first).await.unwrap();
    assert_ne!(server.port, 0);
    registry.shutdown(first, true).await;
}

#[tokio::test]
async fn test_default_server_requires_forced_shutdown() {
    let state = Arc::new(AppState::new(ServiceConfig::default()));
    let registry = ServerRegistry::new(state);
    let key = registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();

    registry.shutdown(key, false).await;
    assert!(registry.is_live(key).await);
    assert!(registry.get(key).await.is_ok());

    registry.shutdown(key, true).await;
    assert!(!registry.is_live(key).await);
    assert_eq!(registry.count().await, 0);
    let err = registry.get(key).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Tile server for this source has been shutdown."
    );
}

#[tokio::test]
async fn test_ephemeral_port_key_resolves_to_assigned_port() {
    let state = Arc::new(AppState::new(ServiceConfig::default()));
    let registry = ServerRegistry::new(state);

    let key = registry.launch(ServerKey::Port(0), "127.0.0.1").await.unwrap();
    let port = match key {
        ServerKey::Port(port) => port,
        other => panic!("expected a port key, got {:?}", other),
    };
    assert_ne!(port, 0);
    assert!(registry.get(key).await.is_ok());

    // Non-default servers tear down without force.
    registry.shutdown(key, false).await;
    assert!(registry.get(key).await.is_err());
}

// ============================================================================
// Tile rendering and the response cache
// ============================================================================

#[tokio::test]
async fn test_tile_render_is_idempotent_and_cached() {
    let (registry, base) = launch().await;
    let url = format!("{}/api/tiles/0/0/0.png?filename=bahamas", base);

    let (status, cache, first) = fetch(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache, "MISS");
    assert!(first.starts_with(b"\x89PNG\r\n\x1a\n"));

    let (status, cache, second) = fetch(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache, "HIT");
    assert_eq!(first, second);

    registry.shutdown(ServerKey::Default, true).await;
}

/// The cache fingerprint sorts query pairs, so a permuted request is a hit.
#[tokio::test]
async fn test_cache_fingerprint_ignores_parameter_order() {
    let (registry, base) = launch().await;
    let first_url = format!(
        "{}/api/tiles/0/0/0.png?filename=bahamas&band=1&min=0&max=255",
        base
    );
    let permuted_url = format!(
        "{}/api/tiles/0/0/0.png?max=255&band=1&filename=bahamas&min=0",
        base
    );

    let (_, cache, first) = fetch(&first_url).await;
    assert_eq!(cache, "MISS");
    let (_, cache, permuted) = fetch(&permuted_url).await;
    assert_eq!(cache, "HIT");
    assert_eq!(first, permuted);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_styled_and_default_requests_cache_separately() {
    let (registry, base) = launch().await;

    let (_, cache, plain) =
        fetch(&format!("{}/api/tiles/0/0/0.png?filename=bahamas", base)).await;
    assert_eq!(cache, "MISS");
    let (_, cache, styled) =
        fetch(&format!("{}/api/tiles/0/0/0.png?filename=bahamas&band=1", base)).await;
    assert_eq!(cache, "MISS");
    assert_ne!(plain, styled);

    registry.shutdown(ServerKey::Default, true).await;
}

/// For a raster whose bands are natively red, green, and blue, selecting the
/// bands in any order with matching primary-color ramps reproduces the plain
/// composite byte for byte.
#[tokio::test]
async fn test_native_rgb_band_aliases_render_identically() {
    let (registry, base) = launch().await;

    let (status, _, plain) =
        fetch(&format!("{}/api/thumbnail.png?filename=bahamas", base)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, _, ordered) = fetch(&format!(
        "{}/api/thumbnail.png?filename=bahamas&band=1&band=2&band=3",
        base
    ))
    .await;
    let (_, _, reversed) = fetch(&format!(
        "{}/api/thumbnail.png?filename=bahamas&band=3&band=2&band=1&palette=b&palette=g&palette=r",
        base
    ))
    .await;

    assert_eq!(plain, ordered);
    assert_eq!(plain, reversed);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_debug_tiles_are_not_cached() {
    let (registry, base) = launch().await;
    let url = format!("{}/api/tiles/debug/3/2/1.png?sleep=0", base);

    let (status, cache, first) = fetch(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache, "MISS");
    assert!(first.starts_with(b"\x89PNG"));
    let (_, cache, _) = fetch(&url).await;
    assert_eq!(cache, "MISS");

    registry.shutdown(ServerKey::Default, true).await;
}

// ============================================================================
// Region export
// ============================================================================

/// Exported regions come back as GeoTIFF and reopen with bounds matching the
/// requested ROI to within one snapped pixel.
#[tokio::test]
async fn test_world_region_export_crops_to_requested_bounds() {
    let (registry, base) = launch().await;
    let url = format!(
        "{}/api/world/region.tif?filename=bahamas&left=-78.047&right=-77.381&bottom=24.056&top=24.691",
        base
    );

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..2], b"II");

    let source = GeoTiffSource::from_reader(Cursor::new(body.to_vec()), "region".to_string())
        .expect("exported region reopens");
    let caps = source.capabilities();
    assert_eq!(caps.crs, Some(CrsCode::Epsg4326));
    assert_eq!(caps.band_count, 3);
    let bounds = caps.bounds.expect("exported region is georeferenced");
    assert!((bounds.min_x - -78.047).abs() < 0.02);
    assert!((bounds.max_x - -77.381).abs() < 0.02);
    assert!((bounds.min_y - 24.056).abs() < 0.02);
    assert!((bounds.max_y - 24.691).abs() < 0.02);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_pixel_region_export_accepts_inverted_bounds() {
    let (registry, base) = launch().await;
    let url = format!(
        "{}/api/pixel/region.tif?filename=bahamas&left=300&right=100&top=50&bottom=150",
        base
    );

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::OK);

    let source = GeoTiffSource::from_reader(Cursor::new(body.to_vec()), "region".to_string())
        .expect("exported region reopens");
    let caps = source.capabilities();
    assert_eq!(caps.width, 200);
    assert_eq!(caps.height, 100);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_unknown_region_encoding_is_rejected() {
    let (registry, base) = launch().await;
    let url = format!(
        "{}/api/world/region.tif?filename=bahamas&left=-78&right=-77&bottom=24&top=25&encoding=bmp",
        base
    );

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Format bmp is not a valid encoding.");

    registry.shutdown(ServerKey::Default, true).await;
}

// ============================================================================
// Bounds and pixel lookups
// ============================================================================

/// A raster spanning the full globe reports latitudes clamped inside the
/// valid WGS84 range rather than the raw edge values.
#[tokio::test]
async fn test_bounds_latitudes_clamp_inside_valid_range() {
    let (w, h) = (16u32, 8u32);
    let block = SampleBlock {
        width: w,
        height: h,
        dtype: DataType::UInt8,
        bands: vec![(0..w * h).map(|i| (i % 256) as f64).collect()],
        mask: vec![1; (w * h) as usize],
    };
    let tif = raster::write_geotiff(
        &block,
        Some((CrsCode::Epsg4326, BoundingBox::new(-180.0, -90.0, 180.0, 90.0))),
        None,
    )
    .expect("global raster encodes");
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("global.tif");
    std::fs::write(&path, tif).expect("raster lands on disk");

    let (registry, base) = launch().await;
    let url = format!("{}/api/bounds?filename={}", base, path.display());
    let (status, value) = fetch_json(&url).await;
    assert_eq!(status, StatusCode::OK);

    let ymin = value["ymin"].as_f64().unwrap();
    let ymax = value["ymax"].as_f64().unwrap();
    assert!(ymin.is_finite() && ymax.is_finite());
    assert_eq!(ymin, -89.9999);
    assert_eq!(ymax, 89.9999);
    assert_eq!(value["xmin"].as_f64().unwrap(), -180.0);
    assert_eq!(value["xmax"].as_f64().unwrap(), 180.0);
    assert_eq!(value["units"], "EPSG:4326");

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_bounds_for_non_geospatial_source_fall_back_to_pixels() {
    let (registry, base) = launch().await;

    let (_, metadata) =
        fetch_json(&format!("{}/api/metadata?filename=pixels", base)).await;
    let width = metadata["width"].as_f64().unwrap();
    let height = metadata["height"].as_f64().unwrap();

    let (status, bounds) =
        fetch_json(&format!("{}/api/bounds?filename=pixels&units=EPSG:4326", base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bounds["units"], "pixels");
    assert_eq!(bounds["xmin"].as_f64().unwrap(), 0.0);
    assert_eq!(bounds["ymin"].as_f64().unwrap(), 0.0);
    assert_eq!(bounds["xmax"].as_f64().unwrap(), width);
    assert_eq!(bounds["ymax"].as_f64().unwrap(), height);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_pixel_lookup_returns_one_based_band_values() {
    let (registry, base) = launch().await;
    let url = format!("{}/api/pixel?filename=bahamas&x=10&y=10", base);

    let (status, value) = fetch_json(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["units"], "pixels");
    assert_eq!(value["col"].as_u64().unwrap(), 10);
    assert_eq!(value["row"].as_u64().unwrap(), 10);
    let bands = value["bands"].as_object().unwrap();
    assert_eq!(bands.len(), 3);
    assert!(bands.contains_key("1"));
    assert!(!bands.contains_key("0"));

    registry.shutdown(ServerKey::Default, true).await;
}

// ============================================================================
// Style validation
// ============================================================================

/// Style errors surface before any raster is opened: a bad palette on a
/// nonexistent file reports the palette, not the missing file.
#[tokio::test]
async fn test_invalid_palette_is_rejected_before_raster_io() {
    let (registry, base) = launch().await;
    let url = format!(
        "{}/api/thumbnail.png?filename=/no/such/raster.tif&palette=not-a-colormap",
        base
    );

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_message(&body),
        "Please use a valid colormap name. Invalid: not-a-colormap"
    );

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_band_index_zero_is_rejected() {
    let (registry, base) = launch().await;
    let url = format!("{}/api/tiles/0/0/0.png?filename=bahamas&band=0", base);

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("0 is an invalid band index. Bands start at 1."));

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_band_style_length_mismatch_names_the_parameter() {
    let (registry, base) = launch().await;
    let url = format!(
        "{}/api/thumbnail.png?filename=bahamas&band=1&max=10&max=20&max=30",
        base
    );

    let (status, _, body) = fetch(&url).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = error_message(&body);
    assert!(message.contains("max"), "message names the parameter: {}", message);
    assert!(message.contains("3 values for 1 selected bands"));

    registry.shutdown(ServerKey::Default, true).await;
}

// ============================================================================
// Service surface
// ============================================================================

#[tokio::test]
async fn test_missing_filename_serves_demo_imagery() {
    let (registry, base) = launch().await;

    let (status, value) = fetch_json(&format!("{}/api/metadata", base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["filename"], "bahamas");
    assert_eq!(value["band_count"].as_u64().unwrap(), 3);

    registry.shutdown(ServerKey::Default, true).await;
}

#[tokio::test]
async fn test_health_reports_cache_statistics() {
    let (registry, base) = launch().await;
    fetch(&format!("{}/api/tiles/0/0/0.png?filename=bahamas", base)).await;

    let (status, value) = fetch_json(&format!("{}/health", base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "ok");
    assert_eq!(value["cache"]["misses"].as_u64().unwrap(), 1);
    assert_eq!(value["cache"]["entry_count"].as_u64().unwrap(), 1);

    registry.shutdown(ServerKey::Default, true).await;
}
