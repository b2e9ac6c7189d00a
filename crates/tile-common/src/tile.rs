//! Slippy Map XYZ tile addressing and grid math.

use crate::bbox::BoundingBox;
use crate::crs::{mercator_to_wgs84, WEB_MERCATOR_EXTENT};
use crate::error::TileError;
use serde::{Deserialize, Serialize};

/// Edge length of a served tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// A tile address in the XYZ scheme (y counts down from the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate, validating that x and y fit the zoom level.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, TileError> {
        if z > 30 {
            return Err(TileError::invalid_param(
                "z",
                format!("zoom level {} exceeds the supported maximum of 30", z),
            ));
        }
        let n = 1u64 << z;
        if (x as u64) >= n || (y as u64) >= n {
            return Err(TileError::invalid_param(
                "x/y",
                format!("tile ({}, {}) is out of range for zoom {}", x, y, z),
            ));
        }
        Ok(Self { z, x, y })
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn tiles_across(&self) -> u64 {
        1u64 << self.z
    }

    /// Web-Mercator bounds of this tile.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let n = self.tiles_across() as f64;
        let span = 2.0 * WEB_MERCATOR_EXTENT / n;
        let min_x = -WEB_MERCATOR_EXTENT + self.x as f64 * span;
        let max_y = WEB_MERCATOR_EXTENT - self.y as f64 * span;
        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }

    /// WGS84 bounds of this tile.
    pub fn wgs84_bounds(&self) -> BoundingBox {
        let m = self.mercator_bounds();
        let (min_lon, min_lat) = mercator_to_wgs84(m.min_x, m.min_y);
        let (max_lon, max_lat) = mercator_to_wgs84(m.max_x, m.max_y);
        BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.x, self.y, self.z)
    }
}

/// Pyramid depth for serving a non-geospatial image as pixel-space tiles.
///
/// The deepest level renders the image at native resolution; level 0 is the
/// most zoomed-out. An image fitting a single tile has one level.
pub fn pyramid_levels(width: u32, height: u32) -> u8 {
    let max_dim = width.max(height).max(1) as u64;
    let mut levels: u8 = 1;
    while max_dim > (TILE_SIZE as u64) << (levels - 1) as u64 {
        levels += 1;
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_tile_covers_mercator_plane() {
        let tile = TileCoord::new(0, 0, 0).unwrap();
        let b = tile.mercator_bounds();
        assert!((b.min_x + WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((b.max_x - WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((b.min_y + WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((b.max_y - WEB_MERCATOR_EXTENT).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_one_quadrants() {
        let nw = TileCoord::new(1, 0, 0).unwrap().mercator_bounds();
        assert!((nw.min_x + WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((nw.max_x).abs() < 1e-6);
        assert!((nw.min_y).abs() < 1e-6);
        assert!((nw.max_y - WEB_MERCATOR_EXTENT).abs() < 1e-6);

        let se = TileCoord::new(1, 1, 1).unwrap().mercator_bounds();
        assert!((se.min_x).abs() < 1e-6);
        assert!((se.max_y).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_tile_rejected() {
        assert!(TileCoord::new(2, 4, 0).is_err());
        assert!(TileCoord::new(2, 0, 4).is_err());
        assert!(TileCoord::new(2, 3, 3).is_ok());
    }

    #[test]
    fn test_wgs84_bounds_of_root() {
        let b = TileCoord::new(0, 0, 0).unwrap().wgs84_bounds();
        assert!((b.min_x + 180.0).abs() < 1e-6);
        assert!((b.max_x - 180.0).abs() < 1e-6);
        assert!((b.max_y - 85.05112877980659).abs() < 1e-6);
    }

    #[test]
    fn test_pyramid_levels() {
        assert_eq!(pyramid_levels(256, 256), 1);
        assert_eq!(pyramid_levels(257, 100), 2);
        assert_eq!(pyramid_levels(1024, 512), 3);
        assert_eq!(pyramid_levels(1, 1), 1);
    }
}
