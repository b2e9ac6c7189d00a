//! Per-band statistics and histograms over sampled blocks.
//!
//! Stats are computed from a downsampled preview of the full extent rather
//! than the native-resolution image, which keeps them cheap enough to run on
//! every unstyled render.

use crate::source::{PixelWindow, RasterSource, SampleBlock};
use crate::window::scaled_dims;
use serde::Serialize;
use tile_common::{TileError, TileResult};

/// Largest preview edge used when deriving stats for rescaling.
pub const PREVIEW_MAX_SIZE: u32 = 1024;

/// Summary statistics for one band, ignoring masked pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    /// Number of unmasked pixels the stats were computed from.
    pub valid: u64,
}

impl BandStats {
    /// Value range used for linear rescaling. Degenerate bands (all masked
    /// or constant) report a range of 1 so rescaling never divides by zero.
    pub fn range(&self) -> f64 {
        let span = self.max - self.min;
        if span > 0.0 && span.is_finite() {
            span
        } else {
            1.0
        }
    }
}

/// Binned value distribution for one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Count per bin, or probability density when requested.
    pub counts: Vec<f64>,
    /// Bin edges, one more than `counts`.
    pub edges: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub valid: u64,
}

/// Compute min/max/mean/std for every band plane in `block`.
pub fn band_stats(block: &SampleBlock) -> Vec<BandStats> {
    block
        .bands
        .iter()
        .map(|plane| plane_stats(plane, &block.mask))
        .collect()
}

fn plane_stats(plane: &[f64], mask: &[u8]) -> BandStats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut valid = 0u64;
    for (value, &m) in plane.iter().zip(mask) {
        if m == 0 || !value.is_finite() {
            continue;
        }
        min = min.min(*value);
        max = max.max(*value);
        sum += value;
        sum_sq += value * value;
        valid += 1;
    }
    if valid == 0 {
        return BandStats {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            std: 0.0,
            valid: 0,
        };
    }
    let n = valid as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    BandStats {
        min,
        max,
        mean,
        std: variance.sqrt(),
        valid,
    }
}

/// Bin every band of `block` into `bins` equal-width buckets.
///
/// With `density` the counts are normalized so the area under the histogram
/// sums to one, matching numpy's `density=True`.
pub fn histogram(block: &SampleBlock, bins: usize, density: bool) -> TileResult<Vec<Histogram>> {
    if bins == 0 || bins > 65_536 {
        return Err(TileError::invalid_param(
            "bins",
            "bins must be between 1 and 65536",
        ));
    }
    Ok(block
        .bands
        .iter()
        .map(|plane| plane_histogram(plane, &block.mask, bins, density))
        .collect())
}

fn plane_histogram(plane: &[f64], mask: &[u8], bins: usize, density: bool) -> Histogram {
    let stats = plane_stats(plane, mask);
    // Constant data still gets a well-formed positive-width range.
    let (lo, hi) = if stats.valid == 0 {
        (0.0, 1.0)
    } else if stats.max > stats.min {
        (stats.min, stats.max)
    } else {
        (stats.min - 0.5, stats.max + 0.5)
    };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0.0f64; bins];
    for (value, &m) in plane.iter().zip(mask) {
        if m == 0 || !value.is_finite() {
            continue;
        }
        let mut idx = ((value - lo) / width) as usize;
        // The top edge is inclusive.
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1.0;
    }
    if density && stats.valid > 0 {
        let norm = stats.valid as f64 * width;
        for c in &mut counts {
            *c /= norm;
        }
    }

    let edges = (0..=bins).map(|i| lo + i as f64 * width).collect();
    Histogram {
        counts,
        edges,
        min: stats.min,
        max: stats.max,
        valid: stats.valid,
    }
}

/// Read a downsampled full-extent block with every band, at most
/// `max_size` pixels on the longest edge.
pub fn read_preview(source: &dyn RasterSource, max_size: u32) -> TileResult<SampleBlock> {
    let caps = source.capabilities();
    if max_size == 0 {
        return Err(TileError::invalid_param(
            "max_size",
            "max_size must be a positive integer",
        ));
    }
    let (out_w, out_h) = scaled_dims(caps.width, caps.height, max_size);
    let bands: Vec<usize> = (1..=caps.band_count).collect();
    let window = PixelWindow::new(0.0, 0.0, caps.width as f64, caps.height as f64);
    source.read_window(&window, &bands, out_w, out_h, caps.nodata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRaster;

    fn block_of(values: Vec<f64>, mask: Vec<u8>) -> SampleBlock {
        let n = values.len() as u32;
        SampleBlock {
            width: n,
            height: 1,
            dtype: tile_common::DataType::Float64,
            bands: vec![values],
            mask,
        }
    }

    #[test]
    fn test_band_stats_ignores_masked() {
        let block = block_of(vec![1.0, 2.0, 3.0, 100.0], vec![1, 1, 1, 0]);
        let stats = band_stats(&block);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].min, 1.0);
        assert_eq!(stats[0].max, 3.0);
        assert!((stats[0].mean - 2.0).abs() < 1e-12);
        assert_eq!(stats[0].valid, 3);
    }

    #[test]
    fn test_band_stats_all_masked() {
        let block = block_of(vec![5.0, 6.0], vec![0, 0]);
        let stats = band_stats(&block);
        assert_eq!(stats[0].valid, 0);
        assert_eq!(stats[0].range(), 1.0);
    }

    #[test]
    fn test_histogram_counts_sum_to_valid() {
        let block = block_of(vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.0], vec![1; 6]);
        let hists = histogram(&block, 4, false).unwrap();
        let h = &hists[0];
        assert_eq!(h.counts.iter().sum::<f64>(), 6.0);
        assert_eq!(h.edges.len(), 5);
        assert_eq!(h.min, 0.0);
        assert_eq!(h.max, 4.0);
        // Top edge is inclusive: both 4.0 samples land in the last bin.
        assert_eq!(h.counts[3], 3.0);
    }

    #[test]
    fn test_histogram_density_integrates_to_one() {
        let block = block_of(vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0], vec![1; 6]);
        let hists = histogram(&block, 5, true).unwrap();
        let h = &hists[0];
        let width = h.edges[1] - h.edges[0];
        let area: f64 = h.counts.iter().map(|c| c * width).sum();
        assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_rejects_zero_bins() {
        let block = block_of(vec![1.0], vec![1]);
        assert!(histogram(&block, 0, false).is_err());
    }

    #[test]
    fn test_read_preview_caps_longest_edge() {
        let raster = MemoryRaster::from_u8_bands(
            "preview",
            2048,
            512,
            vec![vec![7u8; 2048 * 512]],
        )
        .unwrap();
        let block = read_preview(&raster, 256).unwrap();
        assert_eq!(block.width, 256);
        assert_eq!(block.height, 64);
        assert_eq!(block.bands.len(), 1);
    }
}
