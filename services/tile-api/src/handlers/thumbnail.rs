//! Full-extent thumbnail endpoint.

use crate::handlers::common::{self, QueryPairs};
use crate::state::AppState;
use crate::style;
use axum::extract::{Extension, Query};
use axum::http::Uri;
use axum::response::Response;
use raster::{scaled_dims, PixelWindow};
use renderer::{encode_image, ImageFormat};
use std::sync::Arc;
use tile_common::{TileError, TileResult};
use tracing::instrument;

/// Longest-edge bound applied when the request does not pass `max_size`.
pub const DEFAULT_MAX_SIZE: u32 = 512;

/// Serve a downscaled rendering of the whole source.
///
/// Routed as `/api/thumbnail.{ext}` with a bare `/api/thumbnail` alias that
/// defaults to PNG. Output fits in `max_size` on the longest edge and is
/// cached under the request fingerprint like tiles are.
#[instrument(skip(state, params))]
pub async fn thumbnail_handler(
    Extension(state): Extension<Arc<AppState>>,
    uri: Uri,
    Query(params): Query<QueryPairs>,
) -> Response {
    match thumbnail(&state, &uri, &params).await {
        Ok(response) => response,
        Err(err) => common::error_response(&err),
    }
}

async fn thumbnail(state: &AppState, uri: &Uri, params: &QueryPairs) -> TileResult<Response> {
    let ext = extension_from_path(uri.path());
    let format = ImageFormat::from_extension(ext)?;
    let style = style::resolve(params)?;
    let max_size = common::parse_u32(params, "max_size")?.unwrap_or(DEFAULT_MAX_SIZE);
    if max_size == 0 {
        return Err(TileError::invalid_param(
            "max_size",
            "max_size must be a positive integer",
        ));
    }
    let filename = common::requested_filename(state, params);

    let path = format!("/api/thumbnail.{}", ext);
    Ok(common::cached_response(state, &path, params, move || {
        let source = common::open_requested(&filename)?;
        let caps = source.capabilities();
        let (out_w, out_h) = scaled_dims(caps.width, caps.height, max_size);
        let window = PixelWindow::new(0.0, 0.0, caps.width as f64, caps.height as f64);
        let image = common::compose_window(source.as_ref(), &style, &window, out_w, out_h)?;
        Ok((encode_image(&image, format)?, format.mime()))
    })
    .await)
}

/// Extension of the final path segment, defaulting to PNG when absent.
fn extension_from_path(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_path() {
        assert_eq!(extension_from_path("/api/thumbnail.png"), "png");
        assert_eq!(extension_from_path("/api/thumbnail.tiff"), "tiff");
        assert_eq!(extension_from_path("/api/thumbnail"), "png");
    }
}
