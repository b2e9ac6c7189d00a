//! Introspection endpoints: metadata, bounds, pixel lookup, histogram, and
//! the palette catalog.

use crate::handlers::common::{self, QueryPairs};
use crate::state::AppState;
use crate::style;
use axum::extract::{Extension, Query};
use axum::response::Response;
use raster::{scaled_dims, PixelWindow, PREVIEW_MAX_SIZE};
use renderer::RenderPlan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tile_common::crs::{
    clamp_wgs84_latitude, mercator_to_wgs84, parse_projection, transform_bounds,
    wgs84_to_mercator,
};
use tile_common::tile::{pyramid_levels, TILE_SIZE};
use tile_common::{
    BoundingBox, ColorInterp, CrsCode, DataType, RasterCapabilities, TileError, TileResult,
};
use tracing::instrument;

// ============================================================================
// Payload shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct BoundsReport {
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    units: String,
}

impl BoundsReport {
    fn new(bbox: BoundingBox, units: String) -> Self {
        BoundsReport {
            xmin: bbox.min_x,
            xmax: bbox.max_x,
            ymin: bbox.min_y,
            ymax: bbox.max_y,
            units,
        }
    }
}

#[derive(Debug, Serialize)]
struct BoundsPayload {
    #[serde(flatten)]
    bounds: BoundsReport,
    filename: String,
}

#[derive(Debug, Serialize)]
struct MetadataPayload {
    filename: String,
    width: u32,
    height: u32,
    band_count: usize,
    dtype: DataType,
    color_interp: Vec<ColorInterp>,
    band_descriptions: Vec<Option<String>>,
    nodata: Option<f64>,
    crs: Option<String>,
    bounds: BoundsReport,
    levels: u8,
    tile_size: u32,
}

impl MetadataPayload {
    fn from_caps(caps: &RasterCapabilities) -> Self {
        let (bbox, units) = reported_bounds(caps, Some(CrsCode::Epsg4326));
        MetadataPayload {
            filename: caps.source.clone(),
            width: caps.width,
            height: caps.height,
            band_count: caps.band_count,
            dtype: caps.dtype,
            color_interp: caps.color_interp.clone(),
            band_descriptions: caps.band_descriptions.clone(),
            nodata: caps.nodata,
            crs: caps.crs.map(|crs| crs.to_string()),
            bounds: BoundsReport::new(bbox, units),
            levels: pyramid_levels(caps.width, caps.height),
            tile_size: TILE_SIZE,
        }
    }
}

#[derive(Debug, Serialize)]
struct PixelPayload {
    x: f64,
    y: f64,
    units: String,
    col: u32,
    row: u32,
    bands: BTreeMap<usize, f64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Source metadata: dimensions, band layout, CRS, reported bounds, and the
/// pyramid depth tile viewers need.
#[instrument(skip(state, params))]
pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    let filename = common::requested_filename(&state, &params);
    common::cached_response(&state, "/api/metadata", &params, move || {
        let source = common::open_requested(&filename)?;
        let payload = MetadataPayload::from_caps(source.capabilities());
        Ok((serde_json::to_vec(&payload)?, "application/json"))
    })
    .await
}

/// Source bounds in the requested units (default EPSG:4326).
///
/// Non-geospatial sources always report pixel bounds. WGS84 output clamps
/// latitudes so full-extent Web-Mercator sources stay usable downstream.
#[instrument(skip(state, params))]
pub async fn bounds_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match bounds(&state, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn bounds(state: &AppState, params: &QueryPairs) -> TileResult<Response> {
    let units = parse_projection(common::param(params, "units"), Some(CrsCode::Epsg4326))?;
    let filename = common::requested_filename(state, params);
    let payload = common::run_blocking(move || {
        let source = common::open_requested(&filename)?;
        let (bbox, units) = reported_bounds(source.capabilities(), units);
        Ok(BoundsPayload {
            bounds: BoundsReport::new(bbox, units),
            filename,
        })
    })
    .await?;
    Ok(common::json_response(&payload))
}

/// Sample every band at one location.
///
/// `x`/`y` are interpreted in `units`: pixel space by default, or a CRS for
/// geospatial sources. The response echoes the query and reports the
/// resolved pixel address alongside the band values.
#[instrument(skip(state, params))]
pub async fn pixel_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match pixel(&state, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn pixel(state: &AppState, params: &QueryPairs) -> TileResult<Response> {
    let x = common::require_f64(params, "x")?;
    let y = common::require_f64(params, "y")?;
    let units = parse_projection(common::param(params, "units"), None)?;
    let units_label = match units {
        Some(crs) => crs.to_string(),
        None => "pixels".to_string(),
    };
    let filename = common::requested_filename(state, params);
    let payload = common::run_blocking(move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let (col, row) = locate_pixel(caps, x, y, units)?;
        let values = source.read_pixel(col, row)?;
        let bands: BTreeMap<usize, f64> =
            values.into_iter().enumerate().map(|(i, v)| (i + 1, v)).collect();
        Ok(PixelPayload {
            x,
            y,
            units: units_label,
            col,
            row,
            bands,
        })
    })
    .await?;
    Ok(common::json_response(&payload))
}

/// Per-band value distribution over the styled band selection.
///
/// Computed from a downsampled full-extent read with nodata masking applied,
/// so large sources stay cheap to summarize.
#[instrument(skip(state, params))]
pub async fn histogram_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    match histogram(&state, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn histogram(state: &AppState, params: &QueryPairs) -> TileResult<Response> {
    let bins = common::parse_u32(params, "bins")?.unwrap_or(256) as usize;
    let density = common::parse_flag(params, "density", false)?;
    let style = style::resolve(params)?;
    let filename = common::requested_filename(state, params);
    let histograms = common::run_blocking(move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let plan = RenderPlan::build(caps, &style)?;
        let (out_w, out_h) = scaled_dims(caps.width, caps.height, PREVIEW_MAX_SIZE);
        let window = PixelWindow::new(0.0, 0.0, caps.width as f64, caps.height as f64);
        let block = source.read_window(&window, &plan.bands, out_w, out_h, plan.nodata)?;
        raster::histogram(&block, bins, density)
    })
    .await?;
    Ok(common::json_response(&histograms))
}

/// The palette catalog, grouped by family.
#[instrument(skip(state, params))]
pub async fn palettes_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Response {
    common::cached_response(&state, "/api/palettes", &params, || {
        Ok((serde_json::to_vec(&renderer::catalog())?, "application/json"))
    })
    .await
}

// ============================================================================
// Coordinate helpers
// ============================================================================

/// Bounds to report for a source in the requested units.
///
/// Non-geospatial sources and explicit pixel units report pixel bounds;
/// WGS84 output is latitude-clamped.
fn reported_bounds(caps: &RasterCapabilities, units: Option<CrsCode>) -> (BoundingBox, String) {
    match (caps.crs, caps.bounds, units) {
        (Some(crs), Some(native), Some(target)) => {
            let bbox = transform_bounds(&native, crs, target);
            let bbox = if target == CrsCode::Epsg4326 {
                clamp_wgs84_latitude(&bbox)
            } else {
                bbox
            };
            (bbox, target.to_string())
        }
        _ => (caps.pixel_bounds(), "pixels".to_string()),
    }
}

/// Resolve a query location to a whole pixel address.
fn locate_pixel(
    caps: &RasterCapabilities,
    x: f64,
    y: f64,
    units: Option<CrsCode>,
) -> TileResult<(u32, u32)> {
    let (col, row) = match units {
        None => (x, y),
        Some(units_crs) => {
            let (crs, bounds) = match (caps.crs, caps.bounds) {
                (Some(crs), Some(bounds)) => (crs, bounds),
                _ => {
                    return Err(TileError::invalid_param(
                        "units",
                        "Source image must have geospatial reference.",
                    ))
                }
            };
            let (nx, ny) = if units_crs == crs {
                (x, y)
            } else if units_crs == CrsCode::Epsg4326 {
                wgs84_to_mercator(x, y)
            } else {
                mercator_to_wgs84(x, y)
            };
            (
                (nx - bounds.min_x) / bounds.width() * caps.width as f64,
                (bounds.max_y - ny) / bounds.height() * caps.height as f64,
            )
        }
    };
    let col = col.floor();
    let row = row.floor();
    if !col.is_finite() || col < 0.0 || col >= caps.width as f64 {
        return Err(TileError::invalid_param(
            "x",
            format!("column {} is outside image width {}", col, caps.width),
        ));
    }
    if !row.is_finite() || row < 0.0 || row >= caps.height as f64 {
        return Err(TileError::invalid_param(
            "y",
            format!("row {} is outside image height {}", row, caps.height),
        ));
    }
    Ok((col as u32, row as u32))
}
