//! Local tile server core.
//!
//! Serves map tiles, thumbnails, region exports, and raster introspection
//! for local or remote imagery. Two pieces make it embeddable: a
//! [`registry::ServerRegistry`] that launches and reuses background server
//! instances keyed by port, and a [`client::TileClient`] that wraps one
//! source with the URLs a tile viewer needs.

pub mod cache;
pub mod client;
pub mod config;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod style;

use axum::{extract::Extension, routing::get, Router};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use client::{TileClient, TileClientOptions};
pub use registry::{ServerDownError, ServerInstance, ServerKey, ServerRegistry};
pub use state::AppState;

/// Build the service router over shared state.
///
/// Every registry instance serves this same router, so all servers in one
/// process share a response cache and a default filename.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.config.cors;
    let router = Router::new()
        // Map tiles
        .route("/api/tiles/:z/:x/:y_ext", get(handlers::tile_handler))
        .route(
            "/api/tiles/debug/:z/:x/:y_ext",
            get(handlers::debug_tile_handler),
        )
        // Thumbnails; the extension picks the encoder, the bare path is PNG
        .route("/api/thumbnail", get(handlers::thumbnail_handler))
        .route("/api/thumbnail.png", get(handlers::thumbnail_handler))
        .route("/api/thumbnail.jpg", get(handlers::thumbnail_handler))
        .route("/api/thumbnail.jpeg", get(handlers::thumbnail_handler))
        .route("/api/thumbnail.tif", get(handlers::thumbnail_handler))
        .route("/api/thumbnail.tiff", get(handlers::thumbnail_handler))
        // Source introspection
        .route("/api/metadata", get(handlers::metadata_handler))
        .route("/api/bounds", get(handlers::bounds_handler))
        .route("/api/pixel", get(handlers::pixel_handler))
        .route("/api/histogram", get(handlers::histogram_handler))
        .route("/api/palettes", get(handlers::palettes_handler))
        // Region exports
        .route("/api/world/region.tif", get(handlers::region_world_handler))
        .route("/api/pixel/region.tif", get(handlers::region_pixel_handler))
        // Health
        .route("/health", get(handlers::health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
