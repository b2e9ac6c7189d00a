//! Colormap catalog and lookup-table evaluation.
//!
//! Named colormaps are stored as evenly spaced gradient stops sampled from
//! the matplotlib reference maps; the single-hue "simple" set is a ramp from
//! black to one primary. Literal color lists accept hex strings and the few
//! recognized color names.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use tile_common::{PaletteRef, Scheme, TileError, TileResult};

// ============================================================================
// Gradient stop tables
// ============================================================================

const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [109, 205, 89],
    [180, 222, 44],
    [253, 231, 37],
];

const PLASMA: &[[u8; 3]] = &[
    [13, 8, 135],
    [84, 2, 163],
    [139, 10, 165],
    [185, 50, 137],
    [219, 92, 104],
    [244, 136, 73],
    [254, 188, 43],
    [240, 249, 33],
];

const INFERNO: &[[u8; 3]] = &[
    [0, 0, 4],
    [40, 11, 84],
    [101, 21, 110],
    [159, 42, 99],
    [212, 72, 66],
    [245, 125, 21],
    [250, 193, 39],
    [252, 255, 164],
];

const MAGMA: &[[u8; 3]] = &[
    [0, 0, 4],
    [35, 16, 99],
    [96, 19, 110],
    [157, 46, 124],
    [222, 73, 104],
    [247, 120, 92],
    [254, 194, 135],
    [252, 253, 191],
];

const CIVIDIS: &[[u8; 3]] = &[
    [0, 32, 76],
    [36, 64, 106],
    [87, 92, 109],
    [124, 123, 120],
    [160, 156, 117],
    [201, 191, 99],
    [255, 234, 70],
];

const JET: &[[u8; 3]] = &[
    [0, 0, 128],
    [0, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 0],
    [128, 0, 0],
];

const RAINBOW: &[[u8; 3]] = &[
    [128, 0, 255],
    [0, 100, 255],
    [0, 212, 213],
    [125, 255, 122],
    [255, 212, 0],
    [255, 100, 0],
    [255, 0, 0],
];

const TERRAIN: &[[u8; 3]] = &[
    [51, 51, 153],
    [0, 153, 255],
    [0, 204, 102],
    [255, 255, 153],
    [128, 92, 84],
    [255, 255, 255],
];

const COOLWARM: &[[u8; 3]] = &[
    [59, 76, 192],
    [144, 178, 254],
    [221, 221, 221],
    [245, 156, 125],
    [180, 4, 38],
];

const HOT: &[[u8; 3]] = &[
    [11, 0, 0],
    [140, 0, 0],
    [255, 0, 0],
    [255, 130, 0],
    [255, 255, 0],
    [255, 255, 128],
    [255, 255, 255],
];

const BONE: &[[u8; 3]] = &[
    [0, 0, 0],
    [84, 84, 116],
    [169, 200, 200],
    [255, 255, 255],
];

const COPPER: &[[u8; 3]] = &[[0, 0, 0], [206, 129, 82], [255, 199, 127]];

const GRAY: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];
const COOL: &[[u8; 3]] = &[[0, 255, 255], [255, 0, 255]];
const SPRING: &[[u8; 3]] = &[[255, 0, 255], [255, 255, 0]];
const SUMMER: &[[u8; 3]] = &[[0, 128, 102], [255, 255, 102]];
const AUTUMN: &[[u8; 3]] = &[[255, 0, 0], [255, 255, 0]];
const WINTER: &[[u8; 3]] = &[[0, 0, 255], [0, 255, 128]];

const MATPLOTLIB_COLORMAPS: &[(&str, &[[u8; 3]])] = &[
    ("viridis", VIRIDIS),
    ("plasma", PLASMA),
    ("inferno", INFERNO),
    ("magma", MAGMA),
    ("cividis", CIVIDIS),
    ("jet", JET),
    ("rainbow", RAINBOW),
    ("terrain", TERRAIN),
    ("coolwarm", COOLWARM),
    ("hot", HOT),
    ("bone", BONE),
    ("copper", COPPER),
    ("gray", GRAY),
    ("greys", GRAY),
    ("cool", COOL),
    ("spring", SPRING),
    ("summer", SUMMER),
    ("autumn", AUTUMN),
    ("winter", WINTER),
];

/// Single-hue ramps from black, addressable by letter or full name.
const SIMPLE_PALETTES: &[(&str, [u8; 3])] = &[
    ("r", [255, 0, 0]),
    ("red", [255, 0, 0]),
    ("g", [0, 255, 0]),
    ("green", [0, 255, 0]),
    ("b", [0, 0, 255]),
    ("blue", [0, 0, 255]),
];

/// Color names accepted inside literal color lists.
const NAMED_COLORS: &[(&str, [u8; 4])] = &[
    ("r", [255, 0, 0, 255]),
    ("red", [255, 0, 0, 255]),
    ("g", [0, 255, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("b", [0, 0, 255, 255]),
    ("blue", [0, 0, 255, 255]),
    ("c", [0, 255, 255, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("m", [255, 0, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("y", [255, 255, 0, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("k", [0, 0, 0, 255]),
    ("black", [0, 0, 0, 255]),
    ("w", [255, 255, 255, 255]),
    ("white", [255, 255, 255, 255]),
    ("orange", [255, 165, 0, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
];

static MATPLOTLIB_STOPS: Lazy<HashMap<&'static str, Vec<[u8; 4]>>> = Lazy::new(|| {
    MATPLOTLIB_COLORMAPS
        .iter()
        .map(|(name, stops)| {
            let rgba: Vec<[u8; 4]> = stops.iter().map(|c| [c[0], c[1], c[2], 255]).collect();
            (*name, rgba)
        })
        .collect()
});

// ============================================================================
// Lookup tables
// ============================================================================

/// Evaluated colormap: ordered RGBA stops plus the scheme that maps a
/// normalized value onto them.
///
/// Linear tables interpolate between adjacent stops, so a two-stop
/// black-to-primary ramp reproduces an 8-bit channel exactly. Discrete
/// tables carve `[0, 1]` into one equal bucket per stop; two stops split
/// at exactly 0.5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    stops: Vec<[u8; 4]>,
    scheme: Scheme,
}

impl ColorTable {
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn entries(&self) -> &[[u8; 4]] {
        &self.stops
    }

    /// Look up the color for a normalized value in `[0, 1]`.
    pub fn sample(&self, t: f64) -> [u8; 4] {
        let t = t.clamp(0.0, 1.0);
        if self.stops.len() == 1 {
            return self.stops[0];
        }
        match self.scheme {
            Scheme::Linear => lerp_stops(&self.stops, t),
            Scheme::Discrete => {
                let n = self.stops.len();
                let idx = ((t * n as f64).floor() as usize).min(n - 1);
                self.stops[idx]
            }
        }
    }
}

/// Whether a palette reference names a known colormap (or, for literal
/// lists, whether every entry parses as a color).
pub fn is_valid_palette(palette: &PaletteRef) -> bool {
    match palette {
        PaletteRef::Named(name) => {
            let lower = name.to_ascii_lowercase();
            MATPLOTLIB_STOPS.contains_key(lower.as_str())
                || SIMPLE_PALETTES.iter().any(|(n, _)| *n == lower)
        }
        PaletteRef::Colors(list) => {
            !list.is_empty() && list.iter().all(|c| parse_color(c).is_ok())
        }
    }
}

/// Evaluate a palette reference into a color lookup table.
///
/// Named matplotlib maps are resampled to `n_colors` stops. Simple ramps
/// and literal color lists keep their own stop count; `n_colors` does not
/// apply to them.
pub fn resolve_palette(
    palette: &PaletteRef,
    n_colors: usize,
    scheme: Scheme,
) -> TileResult<ColorTable> {
    if n_colors == 0 {
        return Err(TileError::invalid_param(
            "n_colors",
            "n_colors must be a positive integer",
        ));
    }
    let stops: Vec<[u8; 4]> = match palette {
        PaletteRef::Named(name) => {
            let lower = name.to_ascii_lowercase();
            if let Some(anchors) = MATPLOTLIB_STOPS.get(lower.as_str()) {
                bake_gradient(anchors, n_colors)
            } else if let Some(&(_, hue)) = SIMPLE_PALETTES.iter().find(|(n, _)| *n == lower) {
                vec![[0, 0, 0, 255], [hue[0], hue[1], hue[2], 255]]
            } else {
                return Err(TileError::UnknownPalette(name.clone()));
            }
        }
        PaletteRef::Colors(list) => {
            if list.is_empty() {
                return Err(TileError::UnknownPalette("[]".to_string()));
            }
            list.iter().map(|c| parse_color(c)).collect::<TileResult<_>>()?
        }
    };
    Ok(ColorTable { stops, scheme })
}

/// Resample a gradient to `n` evenly spaced stops.
fn bake_gradient(anchors: &[[u8; 4]], n: usize) -> Vec<[u8; 4]> {
    if n == 1 {
        return vec![anchors[0]];
    }
    (0..n)
        .map(|i| lerp_stops(anchors, i as f64 / (n - 1) as f64))
        .collect()
}

fn lerp_stops(stops: &[[u8; 4]], t: f64) -> [u8; 4] {
    let pos = t * (stops.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(stops.len() - 1);
    let frac = pos - lo as f64;
    let mut out = [0u8; 4];
    for ch in 0..4 {
        let a = stops[lo][ch] as f64;
        let b = stops[hi][ch] as f64;
        out[ch] = (a + (b - a) * frac).round() as u8;
    }
    out
}

/// Parse one color entry: `#rgb`, `#rrggbb`, `#rrggbbaa` (the leading `#`
/// is optional), or a recognized color name.
pub fn parse_color(value: &str) -> TileResult<[u8; 4]> {
    let trimmed = value.trim();
    if let Some(&(_, rgba)) = NAMED_COLORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(rgba);
    }
    let hex = trimmed.trim_start_matches('#');
    let invalid = || TileError::UnknownPalette(value.to_string());
    let nibble = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
    };
    match hex.len() {
        3 => {
            let mut out = [255u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16).ok_or_else(invalid)? as u8;
                out[i] = v * 16 + v;
            }
            Ok(out)
        }
        6 => Ok([nibble(0..2)?, nibble(2..4)?, nibble(4..6)?, 255]),
        8 => Ok([nibble(0..2)?, nibble(2..4)?, nibble(4..6)?, nibble(6..8)?]),
        _ => Err(invalid()),
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Known palette names, grouped for the catalog endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PaletteCatalog {
    pub matplotlib: Vec<&'static str>,
    pub simple: Vec<&'static str>,
}

pub fn catalog() -> PaletteCatalog {
    let mut matplotlib: Vec<&'static str> =
        MATPLOTLIB_COLORMAPS.iter().map(|(name, _)| *name).collect();
    matplotlib.sort_unstable();
    // Single-letter aliases stay usable but are not listed.
    let simple: Vec<&'static str> = SIMPLE_PALETTES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| name.len() > 1)
        .collect();
    PaletteCatalog { matplotlib, simple }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#FF0000").unwrap(), [255, 0, 0, 255]);
        assert_eq!(parse_color("00ff00").unwrap(), [0, 255, 0, 255]);
        assert_eq!(parse_color("#f00").unwrap(), [255, 0, 0, 255]);
        assert_eq!(parse_color("#00000080").unwrap(), [0, 0, 0, 128]);
        assert_eq!(parse_color("blue").unwrap(), [0, 0, 255, 255]);
        assert!(parse_color("#GGGGGG").is_err());
        assert!(parse_color("notacolor").is_err());
    }

    #[test]
    fn test_named_palette_endpoints() {
        let table = resolve_palette(
            &PaletteRef::Named("gray".to_string()),
            256,
            Scheme::Linear,
        )
        .unwrap();
        // Matplotlib names resample to n_colors stops.
        assert_eq!(table.len(), 256);
        assert_eq!(table.sample(0.0), [0, 0, 0, 255]);
        assert_eq!(table.sample(1.0), [255, 255, 255, 255]);

        let viridis = resolve_palette(
            &PaletteRef::Named("viridis".to_string()),
            255,
            Scheme::Linear,
        )
        .unwrap();
        assert_eq!(viridis.len(), 255);
        assert_eq!(viridis.sample(0.0), [68, 1, 84, 255]);
        assert_eq!(viridis.sample(1.0), [253, 231, 37, 255]);
    }

    #[test]
    fn test_simple_palette_ramps_from_black() {
        let table = resolve_palette(
            &PaletteRef::Named("red".to_string()),
            255,
            Scheme::Linear,
        )
        .unwrap();
        // Simple ramps stay two stops no matter what n_colors says.
        assert_eq!(table.len(), 2);
        assert_eq!(table.sample(0.0), [0, 0, 0, 255]);
        assert_eq!(table.sample(1.0), [255, 0, 0, 255]);
        // Letter alias resolves to the same ramp.
        let letter =
            resolve_palette(&PaletteRef::Named("r".to_string()), 255, Scheme::Linear).unwrap();
        assert_eq!(letter.sample(0.5), table.sample(0.5));
    }

    #[test]
    fn test_linear_primary_ramp_reproduces_channel() {
        // A black-to-primary ramp must invert the [0, 255] normalization
        // exactly, or styled RGB composites drift from raw passthrough.
        let table =
            resolve_palette(&PaletteRef::Named("r".to_string()), 255, Scheme::Linear).unwrap();
        for v in 0..=255u32 {
            let c = table.sample(v as f64 / 255.0);
            assert_eq!(c, [v as u8, 0, 0, 255]);
        }
    }

    #[test]
    fn test_unknown_palette_rejected() {
        let err = resolve_palette(
            &PaletteRef::Named("not-a-colormap".to_string()),
            255,
            Scheme::Linear,
        )
        .unwrap_err();
        assert!(matches!(err, TileError::UnknownPalette(_)));
        assert!(err.to_string().contains("not-a-colormap"));
    }

    #[test]
    fn test_discrete_scheme_splits_evenly() {
        let table = resolve_palette(
            &PaletteRef::Colors(vec!["#000000".into(), "#ffffff".into()]),
            10,
            Scheme::Discrete,
        )
        .unwrap();
        // Literal lists keep their own stop count.
        assert_eq!(table.len(), 2);
        // Two colors split at exactly 0.5.
        assert_eq!(table.sample(0.49), [0, 0, 0, 255]);
        assert_eq!(table.sample(0.5), [255, 255, 255, 255]);
        assert_eq!(table.sample(1.0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_literal_list_validation() {
        assert!(is_valid_palette(&PaletteRef::Colors(vec![
            "#001122".into(),
            "red".into()
        ])));
        assert!(!is_valid_palette(&PaletteRef::Colors(vec![
            "#001122".into(),
            "bogus".into()
        ])));
        assert!(!is_valid_palette(&PaletteRef::Colors(vec![])));
    }

    #[test]
    fn test_catalog_groups() {
        let cat = catalog();
        assert!(cat.matplotlib.contains(&"viridis"));
        assert!(cat.simple.contains(&"red"));
        assert!(!cat.simple.contains(&"r"));
    }
}
