//! Canonical style descriptor shared by the resolver and the render engine.

use serde::{Deserialize, Serialize};

/// Default palette resolution when a request does not set `n_colors`.
pub const DEFAULT_N_COLORS: u16 = 255;

/// How palette colors map onto the value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Linear,
    Discrete,
}

/// Reference to a colormap: a catalog name or a literal color list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaletteRef {
    /// Named catalog entry ("viridis", "red", ...) or a single hex color.
    Named(String),
    /// Literal list of hex colors forming evenly spaced stops.
    Colors(Vec<String>),
}

/// Style for one selected band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStyle {
    /// 1-based band index.
    pub band: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<PaletteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
}

impl BandStyle {
    /// A band entry with no range, palette, or nodata overrides.
    pub fn plain(band: usize) -> Self {
        Self {
            band,
            min: None,
            max: None,
            palette: None,
            nodata: None,
        }
    }

    /// Whether an explicit value range was requested for this band.
    pub fn has_explicit_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Normalized, order-independent rendering style.
///
/// An empty `bands` list defers band selection to raster introspection; the
/// render engine resolves it to a concrete selection before any pixels are
/// produced. This structure is also the wire schema of the `style` query
/// parameter (percent-encoded JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    #[serde(default)]
    pub bands: Vec<BandStyle>,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default = "default_n_colors")]
    pub n_colors: u16,
}

fn default_n_colors() -> u16 {
    DEFAULT_N_COLORS
}

impl Default for StyleDescriptor {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            scheme: Scheme::Linear,
            n_colors: DEFAULT_N_COLORS,
        }
    }
}

impl StyleDescriptor {
    /// Whether band selection is deferred to raster introspection.
    pub fn is_auto(&self) -> bool {
        self.bands.is_empty()
    }

    /// The selected 1-based band indexes, in request order.
    pub fn indexes(&self) -> Vec<usize> {
        self.bands.iter().map(|b| b.band).collect()
    }

    /// Whether any band carries an explicit vmin/vmax.
    pub fn has_explicit_range(&self) -> bool {
        self.bands.iter().any(BandStyle::has_explicit_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_auto() {
        let style = StyleDescriptor::default();
        assert!(style.is_auto());
        assert_eq!(style.scheme, Scheme::Linear);
        assert_eq!(style.n_colors, DEFAULT_N_COLORS);
    }

    #[test]
    fn test_json_roundtrip() {
        let style = StyleDescriptor {
            bands: vec![BandStyle {
                band: 2,
                min: Some(0.0),
                max: Some(100.0),
                palette: Some(PaletteRef::Named("viridis".to_string())),
                nodata: Some(-9999.0),
            }],
            scheme: Scheme::Discrete,
            n_colors: 16,
        };
        let json = serde_json::to_string(&style).unwrap();
        let back: StyleDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, style);
    }

    #[test]
    fn test_palette_ref_untagged_forms() {
        let named: PaletteRef = serde_json::from_str("\"viridis\"").unwrap();
        assert_eq!(named, PaletteRef::Named("viridis".to_string()));

        let colors: PaletteRef = serde_json::from_str("[\"#000\",\"#f00\"]").unwrap();
        assert_eq!(
            colors,
            PaletteRef::Colors(vec!["#000".to_string(), "#f00".to_string()])
        );
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let style: StyleDescriptor = serde_json::from_str("{\"bands\":[{\"band\":1}]}").unwrap();
        assert_eq!(style.n_colors, DEFAULT_N_COLORS);
        assert_eq!(style.scheme, Scheme::Linear);
        assert!(!style.bands[0].has_explicit_range());
    }
}
