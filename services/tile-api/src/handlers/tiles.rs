//! XYZ tile endpoints: styled map tiles and the static debug grid tile.

use crate::handlers::common::{self, QueryPairs};
use crate::state::AppState;
use crate::style;
use axum::extract::{Extension, Path, Query};
use axum::response::Response;
use renderer::{debug_tile, draw_debug_overlay, encode_image, ImageFormat};
use std::sync::Arc;
use std::time::Duration;
use tile_common::crs::parse_projection;
use tile_common::tile::TILE_SIZE;
use tile_common::{CrsCode, TileCoord, TileError, TileResult};
use tracing::instrument;

/// Serve one styled map tile addressed as `{z}/{x}/{y}.{ext}`.
///
/// Tiles default to EPSG:3857 addressing; non-geospatial sources fall back
/// to the pixel pyramid regardless of the requested projection. Successful
/// tiles land in the response cache under their request fingerprint.
#[instrument(skip(state, params))]
pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((z, x, y_ext)): Path<(u8, u32, String)>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match styled_tile(&state, z, x, &y_ext, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn styled_tile(
    state: &AppState,
    z: u8,
    x: u32,
    y_ext: &str,
    params: &QueryPairs,
) -> TileResult<Response> {
    let (y_raw, ext) = split_row_extension(y_ext);
    let format = ImageFormat::from_extension(ext)?;
    if matches!(format, ImageFormat::Tiff) {
        // Tiles are viewer payloads; TIFF output is region-export only.
        return Err(TileError::UnsupportedFormat(ext.to_string()));
    }
    let y: u32 = y_raw.parse().map_err(|_| {
        TileError::invalid_param("y", format!("expected an integer tile row, got '{}'", y_raw))
    })?;
    let tile = TileCoord::new(z, x, y)?;
    let style = style::resolve(params)?;
    let projection = parse_projection(
        common::param(params, "projection"),
        Some(CrsCode::Epsg3857),
    )?;
    let grid = common::parse_flag(params, "grid", false)?;
    let filename = common::requested_filename(state, params);

    let path = format!("/api/tiles/{}/{}/{}.{}", z, x, y, ext);
    Ok(common::cached_response(state, &path, params, move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let projection = if caps.is_geospatial() { projection } else { None };
        let window = raster::tile_window(caps, tile, projection)?;
        let mut image =
            common::compose_window(source.as_ref(), &style, &window, TILE_SIZE, TILE_SIZE)?;
        if grid {
            draw_debug_overlay(&mut image, &tile.to_string());
        }
        Ok((encode_image(&image, format)?, format.mime()))
    })
    .await)
}

/// Serve a synthetic grid tile for exercising tile viewers.
///
/// The payload only depends on the tile address, so it skips the cache. An
/// optional `sleep` parameter (seconds, default 0.5) delays the response to
/// simulate a slow server.
#[instrument(skip(params))]
pub async fn debug_tile_handler(
    Path((z, x, y_ext)): Path<(u8, u32, String)>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match grid_tile(z, x, y_ext, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn grid_tile(z: u8, x: u32, y_ext: String, params: &QueryPairs) -> TileResult<Response> {
    let (y_raw, _) = split_row_extension(&y_ext);
    let y: u32 = y_raw.parse().map_err(|_| {
        TileError::invalid_param("y", format!("expected an integer tile row, got '{}'", y_raw))
    })?;
    let tile = TileCoord::new(z, x, y)?;
    let delay = common::parse_f64(params, "sleep")?.unwrap_or(0.5);
    if delay.is_finite() && delay > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }
    let image = debug_tile(&tile.to_string(), TILE_SIZE);
    let bytes = encode_image(&image, ImageFormat::Png)?;
    Ok(common::payload_response(
        bytes.into(),
        ImageFormat::Png.mime(),
        common::CacheStatus::Miss,
    ))
}

/// Split `"{y}.{ext}"`, defaulting the extension to PNG when absent.
fn split_row_extension(y_ext: &str) -> (&str, &str) {
    match y_ext.rsplit_once('.') {
        Some((y, ext)) => (y, ext),
        None => (y_ext, "png"),
    }
}
