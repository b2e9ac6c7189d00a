//! Common types and utilities shared across all tile service crates.

pub mod bbox;
pub mod caps;
pub mod crs;
pub mod error;
pub mod style;
pub mod tile;

pub use bbox::BoundingBox;
pub use caps::{ColorInterp, DataType, RasterCapabilities};
pub use crs::CrsCode;
pub use error::{TileError, TileResult};
pub use style::{BandStyle, PaletteRef, Scheme, StyleDescriptor};
pub use tile::TileCoord;
