//! Error types for the tile service crates.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile service operations.
#[derive(Debug, Error)]
pub enum TileError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("`style` query parameter is malformed and likely not properly URL encoded")]
    MalformedStyle,

    #[error("Please use a valid colormap name. Invalid: {0}")]
    UnknownPalette(String),

    #[error("Format {0} is not a valid encoding.")]
    UnsupportedFormat(String),

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    // === Source Errors ===
    #[error("Path does not exist: {0}")]
    SourceNotFound(String),

    #[error("Failed to open raster source: {0}")]
    SourceReadError(String),

    #[error("No output generated, check that the bounds of your ROI overlap source imagery and that your source image is valid.")]
    NoRegionOverlap,

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl TileError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::MissingParameter(_)
            | TileError::InvalidParameter { .. }
            | TileError::MalformedStyle
            | TileError::UnknownPalette(_)
            | TileError::UnsupportedFormat(_)
            | TileError::UnsupportedCrs(_)
            | TileError::SourceReadError(_)
            | TileError::NoRegionOverlap => 400,

            TileError::SourceNotFound(_) => 404,

            _ => 500,
        }
    }

    /// Shorthand for an invalid-parameter error.
    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        TileError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        TileError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        TileError::InternalError(format!("JSON error: {}", err))
    }
}
