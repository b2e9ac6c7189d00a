//! HTTP request handlers for the tile service endpoints.
//!
//! This module is organized into submodules:
//! - `tiles`: XYZ map tiles and the synthetic debug grid tile
//! - `thumbnail`: full-extent thumbnails
//! - `info`: metadata, bounds, pixel lookup, histogram, palette catalog
//! - `region`: world- and pixel-addressed region exports
//! - `health`: liveness and cache counters
//! - `common`: shared utilities (query parsing, render pipeline, responses)

pub mod common;
pub mod health;
pub mod info;
pub mod region;
pub mod thumbnail;
pub mod tiles;

pub use common::{
    cached_response, error_response, json_response, payload_response, CacheStatus, QueryPairs,
};

pub use tiles::{debug_tile_handler, tile_handler};

pub use health::health_handler;

pub use thumbnail::thumbnail_handler;

pub use info::{
    bounds_handler, histogram_handler, metadata_handler, palettes_handler, pixel_handler,
};

pub use region::{region_pixel_handler, region_world_handler};
