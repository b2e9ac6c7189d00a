//! Raster source adapter: opens local, remote, and built-in demo rasters and
//! exposes windowed sampling, pixel lookup, and statistics primitives.
//!
//! Sources are opened per request and dropped when the request completes;
//! nothing here is shared across requests.

pub mod demo;
pub mod geotiff;
pub mod memory;
pub mod path;
pub mod source;
pub mod stats;
pub mod window;

pub use geotiff::{write_geotiff, GeoTiffSource};
pub use memory::MemoryRaster;
pub use path::{cache_dir, open_source, purge_cache, resolve_source, ResolvedSource};
pub use source::{PixelWindow, RasterSource, SampleBlock};
pub use stats::{band_stats, histogram, read_preview, BandStats, Histogram, PREVIEW_MAX_SIZE};
pub use window::{
    pixel_window_for_bounds, region_window, scaled_dims, tile_window, window_native_bounds,
};
