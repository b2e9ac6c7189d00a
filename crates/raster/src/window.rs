//! Window computation and masked bilinear sampling.

use crate::source::{PixelWindow, Planes, SampleBlock};
use tile_common::crs::transform_bounds;
use tile_common::tile::{pyramid_levels, TILE_SIZE};
use tile_common::{BoundingBox, CrsCode, RasterCapabilities, TileCoord, TileError, TileResult};

#[inline]
fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    // NaN samples never contribute, whatever the declared sentinel.
    if value.is_nan() {
        return true;
    }
    matches!(nodata, Some(nd) if value == nd)
}

/// Resample a window of the planes to `out_w` x `out_h` with bilinear
/// interpolation. Out-of-coverage and nodata samples are excluded from the
/// interpolation; output pixels with no valid contributor are masked.
pub(crate) fn sample_planes(
    planes: &Planes,
    window: &PixelWindow,
    bands_idx0: &[usize],
    out_w: u32,
    out_h: u32,
    nodata: Option<f64>,
) -> SampleBlock {
    let n_bands = bands_idx0.len();
    let n_pixels = out_w as usize * out_h as usize;
    let mut bands_out = vec![vec![0.0f64; n_pixels]; n_bands];
    let mut mask = vec![0u8; n_pixels];

    let sx_step = window.width() / out_w as f64;
    let sy_step = window.height() / out_h as f64;
    let (src_w, src_h) = (planes.width as i64, planes.height as i64);

    let corner_valid = |col: i64, row: i64| -> bool {
        if col < 0 || row < 0 || col >= src_w || row >= src_h {
            return false;
        }
        bands_idx0.iter().all(|&b| {
            !is_nodata(planes.value(b, col as u32, row as u32), nodata)
        })
    };

    let mut acc = vec![0.0f64; n_bands];
    for j in 0..out_h {
        let sy = window.y0 + (j as f64 + 0.5) * sy_step - 0.5;
        let r0 = sy.floor() as i64;
        let wy = sy - r0 as f64;
        for i in 0..out_w {
            let sx = window.x0 + (i as f64 + 0.5) * sx_step - 0.5;
            let c0 = sx.floor() as i64;
            let wx = sx - c0 as f64;

            let corners = [
                (c0, r0, (1.0 - wx) * (1.0 - wy)),
                (c0 + 1, r0, wx * (1.0 - wy)),
                (c0, r0 + 1, (1.0 - wx) * wy),
                (c0 + 1, r0 + 1, wx * wy),
            ];

            acc.iter_mut().for_each(|a| *a = 0.0);
            let mut total_weight = 0.0f64;
            for &(col, row, weight) in &corners {
                if weight <= 0.0 || !corner_valid(col, row) {
                    continue;
                }
                total_weight += weight;
                for (slot, &b) in acc.iter_mut().zip(bands_idx0) {
                    *slot += weight * planes.value(b, col as u32, row as u32);
                }
            }

            let out_idx = j as usize * out_w as usize + i as usize;
            if total_weight > 0.0 {
                mask[out_idx] = 255;
                for (band, &sum) in bands_out.iter_mut().zip(acc.iter()) {
                    band[out_idx] = sum / total_weight;
                }
            }
        }
    }

    SampleBlock {
        width: out_w,
        height: out_h,
        dtype: planes.dtype,
        bands: bands_out,
        mask,
    }
}

/// Map a native-CRS bounding box to fractional pixel coordinates.
pub fn pixel_window_for_bounds(caps: &RasterCapabilities, bbox: &BoundingBox) -> PixelWindow {
    let bounds = caps.bounds.unwrap_or_else(|| caps.pixel_bounds());
    let res_x = bounds.width() / caps.width as f64;
    let res_y = bounds.height() / caps.height as f64;
    PixelWindow::new(
        (bbox.min_x - bounds.min_x) / res_x,
        (bounds.max_y - bbox.max_y) / res_y,
        (bbox.max_x - bounds.min_x) / res_x,
        (bounds.max_y - bbox.min_y) / res_y,
    )
}

/// Map a pixel window back to native-CRS bounds.
pub fn window_native_bounds(caps: &RasterCapabilities, window: &PixelWindow) -> BoundingBox {
    let bounds = caps.bounds.unwrap_or_else(|| caps.pixel_bounds());
    let res_x = bounds.width() / caps.width as f64;
    let res_y = bounds.height() / caps.height as f64;
    BoundingBox::new(
        bounds.min_x + window.x0 * res_x,
        bounds.max_y - window.y1 * res_y,
        bounds.min_x + window.x1 * res_x,
        bounds.max_y - window.y0 * res_y,
    )
}

/// Compute the pixel window covered by an XYZ tile.
///
/// `projection` of `Some(EPSG:3857)` selects the Web-Mercator tile grid and
/// requires a geospatial source; `None` selects the pixel pyramid. Tile grids
/// in other CRS are not served.
pub fn tile_window(
    caps: &RasterCapabilities,
    tile: TileCoord,
    projection: Option<CrsCode>,
) -> TileResult<PixelWindow> {
    match projection {
        Some(CrsCode::Epsg3857) => {
            let (crs, _) = match (caps.crs, caps.bounds) {
                (Some(crs), Some(bounds)) => (crs, bounds),
                _ => {
                    return Err(TileError::invalid_param(
                        "projection",
                        "Source image must have geospatial reference.",
                    ))
                }
            };
            let native = transform_bounds(&tile.mercator_bounds(), CrsCode::Epsg3857, crs);
            Ok(pixel_window_for_bounds(caps, &native))
        }
        Some(other) => Err(TileError::UnsupportedCrs(format!(
            "{} (tiles are served in EPSG:3857 or pixel space)",
            other
        ))),
        None => {
            let levels = pyramid_levels(caps.width, caps.height);
            if tile.z >= levels {
                return Err(TileError::invalid_param(
                    "z",
                    format!(
                        "zoom {} exceeds the deepest pixel-pyramid level {}",
                        tile.z,
                        levels - 1
                    ),
                ));
            }
            let scale = (1u64 << (levels - 1 - tile.z)) as f64;
            let span = TILE_SIZE as f64 * scale;
            let x0 = tile.x as f64 * span;
            let y0 = tile.y as f64 * span;
            Ok(PixelWindow::new(x0, y0, x0 + span, y0 + span))
        }
    }
}

/// Clamp a fractional window to the image and snap it to whole pixels.
///
/// Returns the snapped window and its native-resolution output size. A window
/// with no overlap is a request error, not a server fault.
pub fn region_window(
    caps: &RasterCapabilities,
    window: &PixelWindow,
) -> TileResult<(PixelWindow, u32, u32)> {
    if !window.overlaps(caps.width, caps.height) {
        return Err(TileError::NoRegionOverlap);
    }
    let x0 = window.x0.max(0.0).floor();
    let y0 = window.y0.max(0.0).floor();
    let x1 = window.x1.min(caps.width as f64).ceil();
    let y1 = window.y1.min(caps.height as f64).ceil();
    let out_w = (x1 - x0) as u32;
    let out_h = (y1 - y0) as u32;
    if out_w == 0 || out_h == 0 {
        return Err(TileError::NoRegionOverlap);
    }
    Ok((PixelWindow::new(x0, y0, x1, y1), out_w, out_h))
}

/// Scale dimensions to fit inside `max_size`, preserving aspect ratio.
pub fn scaled_dims(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let largest = width.max(height);
    if largest <= max_size {
        return (width, height);
    }
    let scale = max_size as f64 / largest as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PlaneBuf, Planes};

    fn gradient_planes(w: u32, h: u32) -> Planes {
        // Single band where value == column index.
        let mut data = Vec::with_capacity((w * h) as usize);
        for _ in 0..h {
            for x in 0..w {
                data.push(x as f64);
            }
        }
        Planes::new(w, h, vec![PlaneBuf::F64(data)]).unwrap()
    }

    #[test]
    fn test_native_resolution_crop_is_exact() {
        let planes = gradient_planes(8, 4);
        let window = PixelWindow::new(2.0, 1.0, 6.0, 3.0);
        let block = sample_planes(&planes, &window, &[0], 4, 2, None);
        assert_eq!(block.bands[0][0], 2.0);
        assert_eq!(block.bands[0][3], 5.0);
        assert!(block.mask.iter().all(|&m| m == 255));
    }

    #[test]
    fn test_downsample_interpolates() {
        let planes = gradient_planes(4, 1);
        // Full width resampled to two pixels: centers at source x=0.5 and 2.5.
        let window = PixelWindow::new(0.0, 0.0, 4.0, 1.0);
        let block = sample_planes(&planes, &window, &[0], 2, 1, None);
        assert!((block.bands[0][0] - 0.5).abs() < 1e-9);
        assert!((block.bands[0][1] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_outside_window_is_masked() {
        let planes = gradient_planes(4, 4);
        let window = PixelWindow::new(-4.0, 0.0, 0.0, 4.0);
        let block = sample_planes(&planes, &window, &[0], 4, 4, None);
        assert!(block.is_fully_masked());
    }

    #[test]
    fn test_nan_nodata_masks_samples() {
        let data = vec![f64::NAN, 1.0, 2.0, 3.0];
        let planes = Planes::new(2, 2, vec![PlaneBuf::F64(data)]).unwrap();
        let window = PixelWindow::new(0.0, 0.0, 2.0, 2.0);
        let block = sample_planes(&planes, &window, &[0], 2, 2, Some(f64::NAN));
        assert_eq!(block.mask[0], 0);
        assert_eq!(block.mask[1], 255);
        assert_eq!(block.bands[0][3], 3.0);
    }

    #[test]
    fn test_region_window_snaps_and_rejects_no_overlap() {
        let caps = RasterCapabilities {
            source: "t".into(),
            width: 100,
            height: 50,
            band_count: 1,
            dtype: tile_common::DataType::UInt8,
            color_interp: vec![tile_common::ColorInterp::Gray],
            band_descriptions: vec![None],
            nodata: None,
            crs: None,
            bounds: None,
        };
        let (win, w, h) =
            region_window(&caps, &PixelWindow::new(10.2, 5.9, 20.1, 15.0)).unwrap();
        assert_eq!((win.x0, win.y0, win.x1, win.y1), (10.0, 5.0, 21.0, 15.0));
        assert_eq!((w, h), (11, 10));

        let err = region_window(&caps, &PixelWindow::new(200.0, 0.0, 300.0, 10.0));
        assert!(matches!(err, Err(TileError::NoRegionOverlap)));
    }

    #[test]
    fn test_scaled_dims() {
        assert_eq!(scaled_dims(1000, 500, 500), (500, 250));
        assert_eq!(scaled_dims(100, 50, 500), (100, 50));
        assert_eq!(scaled_dims(4000, 10, 400), (400, 1));
    }
}
