//! Image rendering for tile serving.
//!
//! Turns sampled raster blocks plus a resolved style descriptor into RGBA
//! pixels and encodes them:
//! - Colormap lookup tables (named catalog or literal color lists)
//! - Per-band linear rescaling with stats-derived or explicit ranges
//! - Embedded palette passthrough for indexed rasters
//! - PNG (hand-rolled, auto indexed/RGBA), JPEG, and TIFF encoding

pub mod encode;
pub mod engine;
pub mod grid;
pub mod palettes;
pub mod png;

pub use encode::{encode_image, ImageFormat};
pub use engine::{resolve_nodata, select_bands, RenderPlan, RenderedImage};
pub use grid::{debug_tile, draw_debug_overlay};
pub use palettes::{catalog, is_valid_palette, resolve_palette, ColorTable, PaletteCatalog};
