//! Coordinate reference system codes and Web-Mercator math.

use crate::bbox::BoundingBox;
use crate::error::TileError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-width of the Web-Mercator plane in meters.
pub const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Latitude beyond which Web-Mercator Y is undefined.
pub const MERCATOR_LATITUDE_LIMIT: f64 = 85.05112877980659;

/// Clamp threshold for latitudes reported in WGS84 output, keeping
/// reprojected poles finite for downstream Web-Mercator consumers.
pub const WGS84_LATITUDE_CLAMP: f64 = 89.9999;

/// CRS codes supported by the tile service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lat/lon in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS string from a request parameter.
    ///
    /// Accepts formats like "EPSG:4326", "epsg:3857", "CRS:84", and the
    /// legacy "EPSG:900913" alias for Web Mercator.
    pub fn from_user_string(s: &str) -> Result<Self, TileError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(TileError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Get the valid bounds for this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Epsg4326 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => BoundingBox::new(
                -WEB_MERCATOR_EXTENT,
                -WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
            ),
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// Resolve a `projection`/`units` request value.
///
/// `None` keeps the endpoint default; the strings "none", "pixel", "pixels",
/// "null", and "undefined" (any case) explicitly select pixel space and
/// resolve to `None`.
pub fn parse_projection(
    value: Option<&str>,
    default: Option<CrsCode>,
) -> Result<Option<CrsCode>, TileError> {
    match value {
        None => Ok(default),
        Some(s) => {
            let lowered = s.trim().to_lowercase();
            if matches!(
                lowered.as_str(),
                "none" | "pixel" | "pixels" | "null" | "undefined"
            ) {
                Ok(None)
            } else {
                CrsCode::from_user_string(s).map(Some)
            }
        }
    }
}

/// Convert Web-Mercator meters to WGS84 degrees.
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x / WEB_MERCATOR_EXTENT * 180.0;
    let lat = y / WEB_MERCATOR_EXTENT * 180.0;
    let lat = 180.0 / std::f64::consts::PI
        * (2.0 * (lat * std::f64::consts::PI / 180.0).exp().atan() - std::f64::consts::PI / 2.0);
    (lon, lat)
}

/// Convert WGS84 degrees to Web-Mercator meters.
///
/// Latitude is clamped to the Mercator validity limit so poleward inputs map
/// to the edge of the Web-Mercator plane instead of infinity.
pub fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon / 180.0 * WEB_MERCATOR_EXTENT;
    let lat = lat.clamp(-MERCATOR_LATITUDE_LIMIT, MERCATOR_LATITUDE_LIMIT);
    let y = ((std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan()).ln()
        / std::f64::consts::PI
        * WEB_MERCATOR_EXTENT;
    (x, y)
}

/// Reproject an axis-aligned bounding box between the supported CRS pair.
pub fn transform_bounds(bbox: &BoundingBox, from: CrsCode, to: CrsCode) -> BoundingBox {
    if from == to {
        return *bbox;
    }
    let (min_x, min_y, max_x, max_y) = match (from, to) {
        (CrsCode::Epsg4326, CrsCode::Epsg3857) => {
            let (min_x, min_y) = wgs84_to_mercator(bbox.min_x, bbox.min_y);
            let (max_x, max_y) = wgs84_to_mercator(bbox.max_x, bbox.max_y);
            (min_x, min_y, max_x, max_y)
        }
        (CrsCode::Epsg3857, CrsCode::Epsg4326) => {
            let (min_x, min_y) = mercator_to_wgs84(bbox.min_x, bbox.min_y);
            let (max_x, max_y) = mercator_to_wgs84(bbox.max_x, bbox.max_y);
            (min_x, min_y, max_x, max_y)
        }
        _ => (bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y),
    };
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

/// Clamp a WGS84 bounding box's latitudes to ±89.9999°.
///
/// Applied only when reporting bounds in WGS84; native and pixel paths are
/// never clamped.
pub fn clamp_wgs84_latitude(bbox: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        bbox.min_x,
        bbox.min_y.clamp(-WGS84_LATITUDE_CLAMP, WGS84_LATITUDE_CLAMP),
        bbox.max_x,
        bbox.max_y.clamp(-WGS84_LATITUDE_CLAMP, WGS84_LATITUDE_CLAMP),
    )
}
