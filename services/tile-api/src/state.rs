//! Shared application state.

use crate::cache::ResponseCache;
use crate::config::ServiceConfig;

/// State shared by every request handler.
///
/// One `AppState` backs all server instances launched from a registry, so
/// cached responses are shared no matter which listener served the request.
pub struct AppState {
    /// Process-level options (default source, verbosity).
    pub config: ServiceConfig,

    /// Response cache for rendered tiles, thumbnails, and metadata.
    pub cache: ResponseCache,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            cache: ResponseCache::default(),
        }
    }
}
