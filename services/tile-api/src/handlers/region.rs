//! Region export endpoints: crop a source by world or pixel coordinates and
//! return the result as a tiled GeoTIFF or a rendered PNG/JPEG.

use crate::handlers::common::{self, CacheStatus, QueryPairs};
use crate::state::AppState;
use crate::style;
use axum::extract::{Extension, Query};
use axum::response::Response;
use raster::{pixel_window_for_bounds, region_window, window_native_bounds, PixelWindow};
use raster::{write_geotiff, RasterSource};
use renderer::{encode_image, resolve_nodata, ImageFormat};
use std::sync::Arc;
use tile_common::crs::{parse_projection, transform_bounds};
use tile_common::{BoundingBox, CrsCode, StyleDescriptor, TileError, TileResult};
use tracing::instrument;

/// Output encoding for a region export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionEncoding {
    /// Raw samples as a GeoTIFF, all bands, native dtype.
    Tiled,
    Png,
    Jpeg,
}

impl RegionEncoding {
    /// Parse an `encoding` value, accepting extensions (`tif`, `png`, `jpg`)
    /// and encoder names (`TILED`, `PNG`, `JPEG`) case-insensitively.
    fn parse(value: Option<&str>, default: RegionEncoding) -> TileResult<RegionEncoding> {
        let raw = match value {
            None => return Ok(default),
            Some(raw) if raw.trim().is_empty() => return Ok(default),
            Some(raw) => raw.trim(),
        };
        match raw.to_lowercase().as_str() {
            "tif" | "tiff" | "tiled" => Ok(RegionEncoding::Tiled),
            "png" => Ok(RegionEncoding::Png),
            "jpg" | "jpeg" => Ok(RegionEncoding::Jpeg),
            _ => Err(TileError::UnsupportedFormat(raw.to_string())),
        }
    }
}

/// Export a crop addressed in world coordinates.
///
/// `left`/`right`/`bottom`/`top` are interpreted in `units` (default
/// EPSG:4326) and require a geospatial source. The default `TILED` encoding
/// returns raw samples as a GeoTIFF with the source's georeferencing tags.
#[instrument(skip(state, params))]
pub async fn region_world_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match region_world(&state, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn region_world(state: &AppState, params: &QueryPairs) -> TileResult<Response> {
    let left = common::require_f64(params, "left")?;
    let right = common::require_f64(params, "right")?;
    let bottom = common::require_f64(params, "bottom")?;
    let top = common::require_f64(params, "top")?;
    let units = parse_projection(common::param(params, "units"), Some(CrsCode::Epsg4326))?
        .ok_or_else(|| {
            TileError::invalid_param("units", "expected a coordinate reference system")
        })?;
    let encoding = RegionEncoding::parse(common::param(params, "encoding"), RegionEncoding::Tiled)?;
    let style = style::resolve(params)?;
    let filename = common::requested_filename(state, params);

    let (bytes, mime) = common::run_blocking(move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let native_crs = match (caps.crs, caps.bounds) {
            (Some(crs), Some(_)) => crs,
            _ => {
                return Err(TileError::invalid_param(
                    "units",
                    "Source image must have geospatial reference.",
                ))
            }
        };
        let request_bbox = BoundingBox::new(left, bottom, right, top);
        let native_bbox = transform_bounds(&request_bbox, units, native_crs);
        let window = pixel_window_for_bounds(caps, &native_bbox);
        let (window, out_w, out_h) = region_window(caps, &window)?;
        render_region(source.as_ref(), &style, &window, out_w, out_h, encoding)
    })
    .await?;
    Ok(common::payload_response(bytes.into(), mime, CacheStatus::Miss))
}

/// Export a crop addressed in pixel coordinates.
///
/// Bounds are normalized, so swapped corners still select the intended rows
/// and columns. Encoding defaults to `TILED` for geospatial sources and
/// `JPEG` otherwise.
#[instrument(skip(state, params))]
pub async fn region_pixel_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match region_pixel(&state, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn region_pixel(state: &AppState, params: &QueryPairs) -> TileResult<Response> {
    let left = common::require_f64(params, "left")?;
    let right = common::require_f64(params, "right")?;
    let bottom = common::require_f64(params, "bottom")?;
    let top = common::require_f64(params, "top")?;
    let encoding = common::param(params, "encoding").map(str::to_string);
    let style = style::resolve(params)?;
    let filename = common::requested_filename(state, params);

    let (bytes, mime) = common::run_blocking(move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let default_encoding = if caps.is_geospatial() {
            RegionEncoding::Tiled
        } else {
            RegionEncoding::Jpeg
        };
        let encoding = RegionEncoding::parse(encoding.as_deref(), default_encoding)?;
        let bbox = BoundingBox::normalized(left, right, bottom, top);
        let window = PixelWindow::new(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y);
        let (window, out_w, out_h) = region_window(caps, &window)?;
        render_region(source.as_ref(), &style, &window, out_w, out_h, encoding)
    })
    .await?;
    Ok(common::payload_response(bytes.into(), mime, CacheStatus::Miss))
}

/// Produce the encoded payload for a clamped region window.
fn render_region(
    source: &dyn RasterSource,
    style: &StyleDescriptor,
    window: &PixelWindow,
    out_w: u32,
    out_h: u32,
    encoding: RegionEncoding,
) -> TileResult<(Vec<u8>, &'static str)> {
    match encoding {
        RegionEncoding::Tiled => {
            let caps = source.capabilities();
            let bands: Vec<usize> = (1..=caps.band_count).collect();
            let declared = style.bands.iter().find_map(|b| b.nodata).or(caps.nodata);
            let sentinel = resolve_nodata(caps, style.bands.iter().find_map(|b| b.nodata));
            let block = source.read_window(window, &bands, out_w, out_h, sentinel)?;
            let georef = match (caps.crs, caps.bounds) {
                (Some(crs), Some(_)) => Some((crs, window_native_bounds(caps, window))),
                _ => None,
            };
            Ok((write_geotiff(&block, georef, declared)?, "image/tiff"))
        }
        RegionEncoding::Png => {
            let image = common::compose_window(source, style, window, out_w, out_h)?;
            Ok((encode_image(&image, ImageFormat::Png)?, ImageFormat::Png.mime()))
        }
        RegionEncoding::Jpeg => {
            let image = common::compose_window(source, style, window, out_w, out_h)?;
            Ok((
                encode_image(&image, ImageFormat::Jpeg)?,
                ImageFormat::Jpeg.mime(),
            ))
        }
    }
}
