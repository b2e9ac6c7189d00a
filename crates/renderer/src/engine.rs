//! Band selection, nodata resolution, and the color rendering decision tree.
//!
//! `RenderPlan` is built from raster capabilities plus a style descriptor
//! before any pixels are sampled; invalid requests fail here instead of
//! mid-render. Composition then turns a sampled block into RGBA pixels with
//! the mask driving the alpha channel.

use crate::palettes::{self, ColorTable};
use raster::{BandStats, SampleBlock};
use tile_common::{
    ColorInterp, PaletteRef, RasterCapabilities, StyleDescriptor, TileError, TileResult,
};
use tracing::debug;

// ============================================================================
// Rendered image
// ============================================================================

/// Composed RGBA image ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel.
    pub pixels: Vec<u8>,
}

impl RenderedImage {
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }
}

// ============================================================================
// Deterministic heuristics
// ============================================================================

/// Pick bands when the style left selection to raster introspection.
///
/// Checked in fixed priority order: color-interpretation red/green/blue,
/// then band descriptions literally named "red"/"green"/"blue", then bands
/// 1-2-3 when at least three exist, then band 1 alone.
pub fn select_bands(caps: &RasterCapabilities) -> Vec<usize> {
    let by_interp = |want: ColorInterp| {
        caps.color_interp
            .iter()
            .position(|&c| c == want)
            .map(|i| i + 1)
    };
    if let (Some(r), Some(g), Some(b)) = (
        by_interp(ColorInterp::Red),
        by_interp(ColorInterp::Green),
        by_interp(ColorInterp::Blue),
    ) {
        return vec![r, g, b];
    }

    let by_desc = |want: &str| {
        caps.band_descriptions
            .iter()
            .position(|d| d.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(want)))
            .map(|i| i + 1)
    };
    if let (Some(r), Some(g), Some(b)) = (by_desc("red"), by_desc("green"), by_desc("blue")) {
        return vec![r, g, b];
    }

    if caps.band_count >= 3 {
        return vec![1, 2, 3];
    }
    vec![1]
}

/// Resolve the masking sentinel for a request.
///
/// An explicit override wins verbatim. Floating-point rasters that declare a
/// nodata value mask through NaN (samples equal to the declared value never
/// reach composition as finite numbers); other rasters mask by the declared
/// value directly.
pub fn resolve_nodata(caps: &RasterCapabilities, explicit: Option<f64>) -> Option<f64> {
    if explicit.is_some() {
        return explicit;
    }
    match caps.nodata {
        Some(_) if caps.dtype.is_floating_point() => Some(f64::NAN),
        declared => declared,
    }
}

// ============================================================================
// Render plan
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Rule 1: a named or literal colormap was resolved.
    Colormapped,
    /// Rule 2: single band whose native interpretation is an indexed palette.
    Embedded,
    /// Rule 3: linear rescale of each band into [0, 255].
    Rescale,
    /// Rule 4: 8-bit passthrough.
    Raw,
}

#[derive(Debug, Clone)]
struct Layer {
    band: usize,
    min: Option<f64>,
    max: Option<f64>,
    lut: Option<ColorTable>,
}

/// Everything the compositor needs, decided before any raster I/O.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// 1-based bands to sample, in composition order.
    pub bands: Vec<usize>,
    /// Masking sentinel to pass to the sampler.
    pub nodata: Option<f64>,
    mode: Mode,
    layers: Vec<Layer>,
    eight_bit: bool,
}

impl RenderPlan {
    pub fn build(caps: &RasterCapabilities, style: &StyleDescriptor) -> TileResult<Self> {
        let band_styles = if style.is_auto() {
            select_bands(caps)
                .into_iter()
                .map(tile_common::BandStyle::plain)
                .collect()
        } else {
            style.bands.clone()
        };

        for entry in &band_styles {
            if entry.band == 0 || entry.band > caps.band_count {
                return Err(TileError::invalid_param(
                    "band",
                    format!(
                        "band {} is out of range for a {}-band raster",
                        entry.band, caps.band_count
                    ),
                ));
            }
        }

        let n_colors = style.n_colors as usize;
        let mut layers = Vec::with_capacity(band_styles.len());
        let mut any_lut = false;
        for entry in &band_styles {
            let lut = match &entry.palette {
                Some(palette) => {
                    any_lut = true;
                    Some(palettes::resolve_palette(palette, n_colors, style.scheme)?)
                }
                None => None,
            };
            layers.push(Layer {
                band: entry.band,
                min: entry.min,
                max: entry.max,
                lut,
            });
        }

        let explicit_nodata = band_styles.iter().find_map(|b| b.nodata);
        let nodata = resolve_nodata(caps, explicit_nodata);

        let mode = if any_lut {
            // Bands without their own palette in a colormapped request get
            // positional primary ramps so mixed styles still composite.
            for (pos, layer) in layers.iter_mut().enumerate() {
                if layer.lut.is_none() {
                    let primary = match pos {
                        0 => "r",
                        1 => "g",
                        2 => "b",
                        _ => "gray",
                    };
                    layer.lut = Some(palettes::resolve_palette(
                        &PaletteRef::Named(primary.to_string()),
                        n_colors,
                        style.scheme,
                    )?);
                }
            }
            Mode::Colormapped
        } else if layers.len() == 1 && caps.interp_of(layers[0].band) == ColorInterp::Palette {
            // Embedded palettes win over rescaling even with an explicit
            // range: indexed colors cannot be meaningfully rescaled.
            Mode::Embedded
        } else if !caps.dtype.is_eight_bit() || layers.iter().any(|l| l.min.is_some() || l.max.is_some())
        {
            Mode::Rescale
        } else {
            Mode::Raw
        };

        debug!(?mode, bands = ?layers.iter().map(|l| l.band).collect::<Vec<_>>(), "render plan");
        Ok(Self {
            bands: layers.iter().map(|l| l.band).collect(),
            nodata,
            mode,
            layers,
            eight_bit: caps.dtype.is_eight_bit(),
        })
    }

    /// Whether composition needs per-band statistics to fill missing ranges.
    ///
    /// 8-bit rasters never do: an unspecified side defaults to the dtype
    /// edge (0 or 255) rather than the observed data range.
    pub fn needs_stats(&self) -> bool {
        if self.eight_bit {
            return false;
        }
        match self.mode {
            Mode::Embedded | Mode::Raw => false,
            Mode::Colormapped | Mode::Rescale => self
                .layers
                .iter()
                .any(|l| l.min.is_none() || l.max.is_none()),
        }
    }

    /// Compose a sampled block into RGBA pixels.
    ///
    /// `embedded` is the raster's own color table (required for paletted
    /// sources); `stats` are full-source per-band statistics indexed by
    /// band - 1 (required when `needs_stats`).
    pub fn compose(
        &self,
        block: &SampleBlock,
        embedded: Option<&[[u8; 4]]>,
        stats: Option<&[BandStats]>,
    ) -> TileResult<RenderedImage> {
        if block.bands.len() != self.layers.len() {
            return Err(TileError::InternalError(format!(
                "sampled {} bands for a {}-layer plan",
                block.bands.len(),
                self.layers.len()
            )));
        }
        let ranges = self.resolve_ranges(stats)?;
        let n_pixels = block.pixel_count();
        let mut out = RenderedImage::transparent(block.width, block.height);

        match self.mode {
            Mode::Embedded => {
                let table = embedded.ok_or_else(|| {
                    TileError::RenderError(
                        "raster reports an indexed palette but carries no color table".to_string(),
                    )
                })?;
                if table.is_empty() {
                    return Err(TileError::RenderError(
                        "raster color table is empty".to_string(),
                    ));
                }
                let plane = &block.bands[0];
                for p in 0..n_pixels {
                    if block.mask[p] == 0 {
                        continue;
                    }
                    let idx = (plane[p].round().max(0.0) as usize).min(table.len() - 1);
                    out.pixels[p * 4..p * 4 + 4].copy_from_slice(&table[idx]);
                }
            }
            Mode::Colormapped => {
                for p in 0..n_pixels {
                    if block.mask[p] == 0 {
                        continue;
                    }
                    let mut acc = [0.0f64; 3];
                    let mut alpha = 0.0f64;
                    for (li, layer) in self.layers.iter().enumerate() {
                        let (lo, hi) = ranges[li];
                        let t = (block.bands[li][p] - lo) / (hi - lo);
                        let lut = layer
                            .lut
                            .as_ref()
                            .ok_or_else(|| {
                                TileError::InternalError(
                                    "colormapped layer lost its lookup table".to_string(),
                                )
                            })?;
                        let color = lut.sample(t);
                        let a = color[3] as f64 / 255.0;
                        acc[0] += color[0] as f64 * a;
                        acc[1] += color[1] as f64 * a;
                        acc[2] += color[2] as f64 * a;
                        alpha = alpha.max(color[3] as f64);
                    }
                    let i = p * 4;
                    out.pixels[i] = acc[0].round().min(255.0) as u8;
                    out.pixels[i + 1] = acc[1].round().min(255.0) as u8;
                    out.pixels[i + 2] = acc[2].round().min(255.0) as u8;
                    out.pixels[i + 3] = alpha.round().min(255.0) as u8;
                }
            }
            Mode::Rescale => {
                for p in 0..n_pixels {
                    if block.mask[p] == 0 {
                        continue;
                    }
                    let mut channel = [0u8; 4];
                    for li in 0..self.layers.len().min(4) {
                        let (lo, hi) = ranges[li];
                        let t = ((block.bands[li][p] - lo) / (hi - lo)).clamp(0.0, 1.0);
                        channel[li] = (t * 255.0).round() as u8;
                    }
                    out.set_channels(p, &channel, self.layers.len());
                }
            }
            Mode::Raw => {
                for p in 0..n_pixels {
                    if block.mask[p] == 0 {
                        continue;
                    }
                    let mut channel = [0u8; 4];
                    for li in 0..self.layers.len().min(4) {
                        channel[li] = block.bands[li][p].round().clamp(0.0, 255.0) as u8;
                    }
                    out.set_channels(p, &channel, self.layers.len());
                }
            }
        }
        Ok(out)
    }

    fn resolve_ranges(&self, stats: Option<&[BandStats]>) -> TileResult<Vec<(f64, f64)>> {
        self.layers
            .iter()
            .map(|layer| {
                let (lo, hi) = match (layer.min, layer.max) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    (min, max) if self.eight_bit => {
                        (min.unwrap_or(0.0), max.unwrap_or(255.0))
                    }
                    (min, max) => {
                        let s = stats
                            .and_then(|all| all.get(layer.band - 1))
                            .ok_or_else(|| {
                                TileError::InternalError(format!(
                                    "band {} needs statistics but none were computed",
                                    layer.band
                                ))
                            })?;
                        (min.unwrap_or(s.min), max.unwrap_or(s.max))
                    }
                };
                // Constant bands render as their low color, not a crash.
                if hi > lo {
                    Ok((lo, hi))
                } else {
                    Ok((lo, lo + 1.0))
                }
            })
            .collect()
    }
}

impl RenderedImage {
    /// Write 1, 3, or 4 sampled channels into an output pixel: single band
    /// becomes gray, a fourth band becomes alpha.
    fn set_channels(&mut self, p: usize, channel: &[u8; 4], count: usize) {
        let i = p * 4;
        match count {
            1 => {
                self.pixels[i] = channel[0];
                self.pixels[i + 1] = channel[0];
                self.pixels[i + 2] = channel[0];
                self.pixels[i + 3] = 255;
            }
            4 => self.pixels[i..i + 4].copy_from_slice(channel),
            _ => {
                self.pixels[i] = channel[0];
                self.pixels[i + 1] = channel[1];
                self.pixels[i + 2] = channel[2];
                self.pixels[i + 3] = 255;
            }
        }
    }
}
