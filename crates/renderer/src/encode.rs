//! Output format dispatch: PNG, JPEG, and TIFF encodings of rendered tiles.

use crate::engine::RenderedImage;
use crate::png;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::tiff::TiffEncoder;
use image::ColorType;
use std::io::Cursor;
use tile_common::{TileError, TileResult};

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Tiff,
}

impl ImageFormat {
    /// Parse a file extension (without the dot), case-insensitive.
    pub fn from_extension(ext: &str) -> TileResult<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "tif" | "tiff" => Ok(Self::Tiff),
            other => Err(TileError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
        }
    }
}

/// Encode a composed image in the requested format.
pub fn encode_image(image: &RenderedImage, format: ImageFormat) -> TileResult<Vec<u8>> {
    match format {
        ImageFormat::Png => png::encode_auto(image),
        ImageFormat::Jpeg => {
            // JPEG carries no alpha; transparent pixels flatten onto white.
            let rgb = flatten_onto_white(image);
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            encoder
                .encode(&rgb, image.width, image.height, ColorType::Rgb8)
                .map_err(|e| TileError::RenderError(format!("JPEG encoding failed: {}", e)))?;
            Ok(out)
        }
        ImageFormat::Tiff => {
            let mut cursor = Cursor::new(Vec::new());
            TiffEncoder::new(&mut cursor)
                .encode(&image.pixels, image.width, image.height, ColorType::Rgba8)
                .map_err(|e| TileError::RenderError(format!("TIFF encoding failed: {}", e)))?;
            Ok(cursor.into_inner())
        }
    }
}

fn flatten_onto_white(image: &RenderedImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(image.pixels.len() / 4 * 3);
    for pixel in image.pixels.chunks_exact(4) {
        let alpha = pixel[3] as u16;
        for ch in 0..3 {
            let v = (pixel[ch] as u16 * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(v as u8);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_parsing() {
        assert_eq!(ImageFormat::from_extension("png").unwrap(), ImageFormat::Png);
        assert_eq!(ImageFormat::from_extension("JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_extension("jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_extension("tif").unwrap(), ImageFormat::Tiff);
        let err = ImageFormat::from_extension("bmp").unwrap_err();
        assert!(matches!(err, TileError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("bmp"));
    }

    #[test]
    fn test_jpeg_flattens_transparency_onto_white() {
        let mut image = RenderedImage::transparent(2, 1);
        image.set_pixel(0, 0, [200, 10, 10, 255]);
        let rgb = flatten_onto_white(&image);
        assert_eq!(&rgb[0..3], &[200, 10, 10]);
        // The untouched pixel is fully transparent and becomes white.
        assert_eq!(&rgb[3..6], &[255, 255, 255]);
    }

    #[test]
    fn test_encoders_emit_magic_bytes() {
        let mut image = RenderedImage::transparent(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                image.set_pixel(x, y, [x as u8 * 60, y as u8 * 60, 90, 255]);
            }
        }
        let png = encode_image(&image, ImageFormat::Png).unwrap();
        assert_eq!(&png[0..4], &[137, 80, 78, 71]);

        let jpeg = encode_image(&image, ImageFormat::Jpeg).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);

        let tiff = encode_image(&image, ImageFormat::Tiff).unwrap();
        assert!(tiff.starts_with(b"II") || tiff.starts_with(b"MM"));
    }
}
