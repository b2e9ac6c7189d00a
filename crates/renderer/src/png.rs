//! PNG encoding for rendered RGBA tiles.
//!
//! Two encodings are produced:
//! - **Indexed (color type 3)** when the tile has at most 256 unique colors.
//!   Styled tiles almost always fit: a lookup table caps the color count.
//! - **RGBA (color type 6)** otherwise.
//!
//! `encode_auto` picks between them; chunks are written by hand with flate2
//! for the IDAT stream and crc32fast for chunk checksums.

use crate::engine::RenderedImage;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use tile_common::{TileError, TileResult};

/// Indexed output holds at most this many palette entries.
const MAX_PALETTE_SIZE: usize = 256;

/// Pixel count from which palette extraction runs in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// Encode RGBA pixels, choosing indexed output when the colors fit.
pub fn encode_auto(image: &RenderedImage) -> TileResult<Vec<u8>> {
    let num_pixels = image.pixels.len() / 4;
    let extracted = if num_pixels >= PARALLEL_THRESHOLD {
        extract_palette_parallel(&image.pixels)
    } else {
        extract_palette_sequential(&image.pixels)
    };
    match extracted {
        Some((palette, indices)) => encode_indexed(image.width, image.height, &palette, &indices),
        None => encode_rgba(image),
    }
}

/// Encode as indexed PNG from a palette and per-pixel indices.
pub fn encode_indexed(
    width: u32,
    height: u32,
    palette: &[[u8; 4]],
    indices: &[u8],
) -> TileResult<Vec<u8>> {
    let mut png = Vec::new();
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(3); // color type: indexed
    ihdr.push(0); // compression
    ihdr.push(0); // filter
    ihdr.push(0); // interlace
    write_chunk(&mut png, b"IHDR", &ihdr);

    let mut plte = Vec::with_capacity(palette.len() * 3);
    for color in palette {
        plte.extend_from_slice(&color[..3]);
    }
    write_chunk(&mut png, b"PLTE", &plte);

    // tRNS carries per-entry alpha; omitted when everything is opaque.
    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(indices, width as usize, height as usize, 1)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Encode as full RGBA PNG.
pub fn encode_rgba(image: &RenderedImage) -> TileResult<Vec<u8>> {
    let mut png = Vec::new();
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&image.width.to_be_bytes());
    ihdr.extend_from_slice(&image.height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(6); // color type: RGBA
    ihdr.push(0);
    ihdr.push(0);
    ihdr.push(0);
    write_chunk(&mut png, b"IHDR", &ihdr);

    let idat = deflate_scanlines(
        &image.pixels,
        image.width as usize,
        image.height as usize,
        4,
    )?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

#[inline(always)]
fn pack_color(pixel: &[u8]) -> u32 {
    (pixel[0] as u32)
        | ((pixel[1] as u32) << 8)
        | ((pixel[2] as u32) << 16)
        | ((pixel[3] as u32) << 24)
}

#[inline(always)]
fn unpack_color(packed: u32) -> [u8; 4] {
    [
        packed as u8,
        (packed >> 8) as u8,
        (packed >> 16) as u8,
        (packed >> 24) as u8,
    ]
}

fn extract_palette_sequential(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for pixel in pixels.chunks_exact(4) {
        let packed = pack_color(pixel);
        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push(unpack_color(packed));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

/// Parallel palette extraction: collect unique colors per chunk, merge,
/// then map pixels to indices in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);
    let chunk_size = chunk_pixels * 4;

    let unique_colors: Vec<u32> = pixels
        .par_chunks(chunk_size)
        .flat_map(|chunk| {
            let mut local: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for pixel in chunk.chunks_exact(4) {
                local.insert(pack_color(pixel), ());
                if local.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local.into_keys().collect::<Vec<_>>()
        })
        .collect();

    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE_SIZE);
    for packed in unique_colors {
        if !color_to_index.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            let idx = palette.len() as u8;
            color_to_index.insert(packed, idx);
            palette.push(unpack_color(packed));
        }
    }

    let num_pixels = pixels.len() / 4;
    let mut indices = vec![0u8; num_pixels];
    indices
        .par_chunks_mut(chunk_pixels)
        .enumerate()
        .for_each(|(chunk_idx, idx_chunk)| {
            let start = chunk_idx * chunk_pixels;
            for (i, idx) in idx_chunk.iter_mut().enumerate() {
                let offset = (start + i) * 4;
                if offset + 3 < pixels.len() {
                    let packed = pack_color(&pixels[offset..offset + 4]);
                    *idx = *color_to_index.get(&packed).unwrap_or(&0);
                }
            }
        });

    Some((palette, indices))
}

/// Prefix each scanline with a filter byte (0 = none) and deflate the lot.
fn deflate_scanlines(
    data: &[u8],
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
) -> TileResult<Vec<u8>> {
    let row_bytes = width * bytes_per_pixel;
    let mut uncompressed = Vec::with_capacity(height * (1 + row_bytes));
    for y in 0..height {
        uncompressed.push(0);
        let start = y * row_bytes;
        uncompressed.extend_from_slice(&data[start..start + row_bytes]);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder
        .write_all(&uncompressed)
        .map_err(|e| TileError::RenderError(format!("IDAT compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| TileError::RenderError(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_from(pixels: Vec<u8>, width: u32, height: u32) -> RenderedImage {
        RenderedImage {
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn test_extract_palette_simple() {
        let pixels = [
            255, 0, 0, 255, // red
            0, 255, 0, 255, // green
            0, 0, 255, 255, // blue
            255, 0, 0, 255, // red again
        ];
        let (palette, indices) = extract_palette_sequential(&pixels).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(indices.len(), 4);
        assert_eq!(indices[0], indices[3]);
    }

    #[test]
    fn test_extract_palette_keeps_alpha() {
        let pixels = [255, 0, 0, 255, 0, 0, 0, 0];
        let (palette, _) = extract_palette_sequential(&pixels).unwrap();
        assert!(palette.iter().any(|c| c[3] == 0));
        assert!(palette.iter().any(|c| c[3] == 255));
    }

    #[test]
    fn test_extract_palette_parallel_matches() {
        // Large enough to cross the parallel threshold, few enough colors
        // to stay indexed.
        let mut pixels = Vec::with_capacity(128 * 128 * 4);
        for y in 0..128u32 {
            for x in 0..128u32 {
                let c = (((x / 8) + (y / 8)) % 40) as u8;
                pixels.extend_from_slice(&[c * 5, 100 + c * 3, 200 - c * 2, 255]);
            }
        }
        let (palette, indices) = extract_palette_parallel(&pixels).unwrap();
        assert!(palette.len() <= 40);
        assert_eq!(indices.len(), 128 * 128);
        // Indices map back to the original colors.
        for (i, pixel) in pixels.chunks_exact(4).enumerate() {
            assert_eq!(&palette[indices[i] as usize][..], pixel);
        }
    }

    #[test]
    fn test_too_many_colors_falls_back_to_rgba() {
        let mut pixels = Vec::with_capacity(300 * 4);
        for i in 0..300u32 {
            pixels.extend_from_slice(&[(i % 256) as u8, (i / 2) as u8, (i / 3) as u8, 255]);
        }
        assert!(extract_palette_sequential(&pixels).is_none());
        let png = encode_auto(&image_from(pixels, 300, 1)).unwrap();
        assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        // Color type byte in IHDR: 6 = RGBA.
        assert_eq!(png[25], 6);
    }

    #[test]
    fn test_indexed_output_is_smaller() {
        let mut pixels = Vec::with_capacity(64 * 64 * 4);
        for y in 0..64u32 {
            for x in 0..64u32 {
                if (x + y) % 2 == 0 {
                    pixels.extend_from_slice(&[200, 30, 30, 255]);
                } else {
                    pixels.extend_from_slice(&[30, 30, 200, 255]);
                }
            }
        }
        let image = image_from(pixels, 64, 64);
        let auto = encode_auto(&image).unwrap();
        let rgba = encode_rgba(&image).unwrap();
        assert_eq!(auto[25], 3);
        assert!(auto.len() < rgba.len());
    }

    #[test]
    fn test_transparent_tile_encodes_trns() {
        let image = RenderedImage::transparent(8, 8);
        let png = encode_auto(&image).unwrap();
        // Indexed with a single transparent entry; the tRNS chunk must be
        // present for viewers to honor the alpha.
        assert!(png.windows(4).any(|w| w == b"tRNS"));
    }
}
