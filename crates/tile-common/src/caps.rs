//! Raster capability metadata used by the rendering decision functions.

use crate::bbox::BoundingBox;
use crate::crs::CrsCode;
use serde::{Deserialize, Serialize};

/// Pixel sample data type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Whether samples are floating point (nodata masking uses NaN).
    pub fn is_floating_point(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Whether samples already fit the 8-bit output range.
    pub fn is_eight_bit(&self) -> bool {
        matches!(self, DataType::UInt8)
    }
}

/// Color interpretation assigned to one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorInterp {
    Gray,
    Red,
    Green,
    Blue,
    Alpha,
    Palette,
    Undefined,
}

/// Introspected facts about an opened raster.
///
/// This is the complete input to band auto-selection and the color rendering
/// decision tree; once populated, no further source introspection is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterCapabilities {
    /// Identifier the source was opened from (path, URL, or demo alias).
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub band_count: usize,
    pub dtype: DataType,
    /// Per-band color interpretation, `band_count` entries.
    pub color_interp: Vec<ColorInterp>,
    /// Per-band human-readable descriptions, `band_count` entries.
    pub band_descriptions: Vec<Option<String>>,
    /// Nodata value declared by the source, if any.
    pub nodata: Option<f64>,
    /// Native CRS; `None` for non-geospatial images.
    pub crs: Option<CrsCode>,
    /// Native-CRS bounds; `None` for non-geospatial images.
    pub bounds: Option<BoundingBox>,
}

impl RasterCapabilities {
    /// Whether the source carries a geospatial reference.
    pub fn is_geospatial(&self) -> bool {
        self.crs.is_some() && self.bounds.is_some()
    }

    /// Bounds of the image in pixel space.
    pub fn pixel_bounds(&self) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    /// Color interpretation of a 1-based band, `Undefined` when out of range.
    pub fn interp_of(&self, band: usize) -> ColorInterp {
        band.checked_sub(1)
            .and_then(|i| self.color_interp.get(i))
            .copied()
            .unwrap_or(ColorInterp::Undefined)
    }
}
