//! Shared helpers for the tile endpoints: query-parameter access, source
//! resolution, the blocking render pipeline, and response building.

use crate::cache;
use crate::config;
use crate::state::AppState;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use raster::{band_stats, open_source, read_preview, PixelWindow, RasterSource, PREVIEW_MAX_SIZE};
use renderer::{RenderPlan, RenderedImage};
use serde::Serialize;
use tile_common::{StyleDescriptor, TileError, TileResult};
use tracing::debug;

// ============================================================================
// Query parameters
// ============================================================================

/// Decoded query pairs in request order, duplicates preserved.
pub type QueryPairs = Vec<(String, String)>;

/// First value of a query parameter.
pub fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Parse an optional numeric parameter.
pub fn parse_f64(params: &[(String, String)], name: &str) -> TileResult<Option<f64>> {
    match param(params, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            TileError::invalid_param(name, format!("expected a number, got '{}'", raw))
        }),
    }
}

/// Parse a numeric parameter that the endpoint cannot work without.
pub fn require_f64(params: &[(String, String)], name: &str) -> TileResult<f64> {
    parse_f64(params, name)?.ok_or_else(|| TileError::MissingParameter(name.to_string()))
}

/// Parse an optional integer parameter.
pub fn parse_u32(params: &[(String, String)], name: &str) -> TileResult<Option<u32>> {
    match param(params, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            TileError::invalid_param(name, format!("expected an integer, got '{}'", raw))
        }),
    }
}

/// Parse a boolean flag, accepting the usual true/false spellings.
pub fn parse_flag(params: &[(String, String)], name: &str, default: bool) -> TileResult<bool> {
    match param(params, name) {
        None => Ok(default),
        Some(raw) => config::parse_bool(raw).ok_or_else(|| {
            TileError::invalid_param(name, format!("expected a boolean, got '{}'", raw))
        }),
    }
}

/// The source a request points at: explicit parameter, process default, or
/// the built-in demo imagery.
pub fn requested_filename(state: &AppState, params: &[(String, String)]) -> String {
    if let Some(filename) = param(params, "filename") {
        return filename.to_string();
    }
    if let Some(filename) = &state.config.default_filename {
        return filename.clone();
    }
    debug!("no filename in request or configuration, serving demo imagery");
    "bahamas".to_string()
}

// ============================================================================
// Blocking render pipeline
// ============================================================================

/// Run a synchronous raster operation off the async worker threads.
///
/// Opening sources, sampling windows, and encoding images are CPU and disk
/// bound; they go through `spawn_blocking` so tile serving stays responsive.
pub async fn run_blocking<T, F>(op: F) -> TileResult<T>
where
    F: FnOnce() -> TileResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| TileError::InternalError(format!("raster worker failed: {}", err)))?
}

/// Sample a window of a source and compose it into RGBA pixels.
///
/// Builds the render plan from the style, pulls preview statistics only when
/// the plan needs them, and masks by the plan's resolved nodata.
pub fn compose_window(
    source: &dyn RasterSource,
    style: &StyleDescriptor,
    window: &PixelWindow,
    out_width: u32,
    out_height: u32,
) -> TileResult<RenderedImage> {
    let caps = source.capabilities();
    let plan = RenderPlan::build(caps, style)?;
    let stats = if plan.needs_stats() {
        Some(band_stats(&read_preview(source, PREVIEW_MAX_SIZE)?))
    } else {
        None
    };
    let block = source.read_window(window, &plan.bands, out_width, out_height, plan.nodata)?;
    plan.compose(&block, source.color_table(), stats.as_deref())
}

// ============================================================================
// Response building
// ============================================================================

/// Whether a response came out of the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn label(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Encoded payload response with cache headers.
pub fn payload_response(payload: Bytes, mime: &str, cache: CacheStatus) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CACHE_CONTROL, "max-age=3600")
        .header("X-Cache", cache.label())
        .body(payload.into())
        .unwrap()
}

/// Error payload in the service's JSON shape: `{"message": ...}`.
pub fn error_response(err: &TileError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "message": err.to_string() }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

/// 200 JSON response.
pub fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap(),
        Err(err) => error_response(&TileError::from(err)),
    }
}

/// Serve a cacheable endpoint: fingerprint the request, consult the response
/// cache, build on a miss, and store the result.
///
/// Only successful payloads are cached; errors are returned directly so a
/// transient failure does not poison two hours of requests.
pub async fn cached_response<F>(
    state: &AppState,
    path: &str,
    params: &QueryPairs,
    build: F,
) -> Response
where
    F: FnOnce() -> TileResult<(Vec<u8>, &'static str)> + Send + 'static,
{
    let key = cache::fingerprint(path, params);
    if let Some((payload, mime)) = state.cache.get(&key).await {
        return payload_response(payload, &mime, CacheStatus::Hit);
    }
    match run_blocking(build).await {
        Ok((bytes, mime)) => {
            let payload = Bytes::from(bytes);
            state.cache.insert(key, payload.clone(), mime).await;
            payload_response(payload, mime, CacheStatus::Miss)
        }
        Err(err) => error_response(&err),
    }
}

/// Resolve and open the raster a request points at.
///
/// Thin wrapper kept for handler readability; `open_source` does path,
/// URL, and demo-alias resolution.
pub fn open_requested(filename: &str) -> TileResult<Box<dyn RasterSource>> {
    open_source(filename)
}
