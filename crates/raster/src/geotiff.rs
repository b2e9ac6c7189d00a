//! GeoTIFF reading and writing via the `tiff` crate.
//!
//! The reader decodes the full image up front; sources are opened per request
//! and the decoded planes live only as long as the request. Geo tags handled:
//! ModelPixelScale, ModelTiepoint, GeoKeyDirectory (EPSG code), GDAL_NODATA,
//! and ColorMap for paletted rasters.

use crate::source::{check_bands, PixelWindow, PlaneBuf, Planes, RasterSource, SampleBlock};
use crate::window::sample_planes;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKindStandard};
use tiff::tags::Tag;
use tiff::ColorType;
use tile_common::{
    BoundingBox, ColorInterp, CrsCode, DataType, RasterCapabilities, TileError, TileResult,
};

const GEOKEY_MODEL_TYPE: u16 = 1024;
const GEOKEY_RASTER_TYPE: u16 = 1025;
const GEOKEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEOKEY_PROJECTED_TYPE: u16 = 3072;

fn tiff_err(context: &str, err: tiff::TiffError) -> TileError {
    TileError::SourceReadError(format!("{}: {}", context, err))
}

/// A GeoTIFF (or plain TIFF) opened from a local file.
pub struct GeoTiffSource {
    caps: RasterCapabilities,
    planes: Planes,
    color_table: Option<Vec<[u8; 4]>>,
}

impl GeoTiffSource {
    /// Open a TIFF from disk.
    pub fn open(path: &Path) -> TileResult<Self> {
        let source = path.display().to_string();
        let file = File::open(path)
            .map_err(|e| TileError::SourceReadError(format!("{}: {}", source, e)))?;
        Self::from_reader(BufReader::new(file), source)
    }

    /// Open a TIFF from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R, source: String) -> TileResult<Self> {
        let mut decoder = Decoder::new(reader)
            .map_err(|e| tiff_err(&source, e))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(|e| tiff_err(&source, e))?;
        let color_type = decoder.colortype().map_err(|e| tiff_err(&source, e))?;
        let color_interp = interp_for_color_type(&color_type, &source)?;
        let band_count = color_interp.len();

        let pixel_scale = read_f64_tag(&mut decoder, Tag::ModelPixelScaleTag);
        let tiepoint = read_f64_tag(&mut decoder, Tag::ModelTiepointTag);
        let geokeys = read_u16_tag(&mut decoder, Tag::GeoKeyDirectoryTag);
        let nodata = read_nodata_tag(&mut decoder);
        let color_table = read_color_table(&mut decoder);

        let (crs, bounds) = match (pixel_scale, tiepoint) {
            (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
                let crs = match geokeys.as_deref().and_then(epsg_from_geokeys) {
                    Some(4326) => CrsCode::Epsg4326,
                    Some(3857) | Some(900913) => CrsCode::Epsg3857,
                    Some(code) => {
                        return Err(TileError::UnsupportedCrs(format!("EPSG:{}", code)))
                    }
                    None => {
                        return Err(TileError::SourceReadError(format!(
                            "{}: georeferenced TIFF carries no EPSG code",
                            source
                        )))
                    }
                };
                let (sx, sy) = (scale[0], scale[1].abs());
                let origin_x = tie[3] - tie[0] * sx;
                let origin_y = tie[4] + tie[1] * sy;
                let bounds = BoundingBox::new(
                    origin_x,
                    origin_y - height as f64 * sy,
                    origin_x + width as f64 * sx,
                    origin_y,
                );
                (Some(crs), Some(bounds))
            }
            _ => (None, None),
        };

        let result = decoder.read_image().map_err(|e| tiff_err(&source, e))?;
        let planes = planes_from_decoding(result, width, height, band_count, &source)?;

        let caps = RasterCapabilities {
            source,
            width,
            height,
            band_count,
            dtype: planes.dtype,
            color_interp,
            band_descriptions: vec![None; band_count],
            nodata,
            crs,
            bounds,
        };

        Ok(Self {
            caps,
            planes,
            color_table,
        })
    }
}

impl RasterSource for GeoTiffSource {
    fn capabilities(&self) -> &RasterCapabilities {
        &self.caps
    }

    fn read_window(
        &self,
        window: &PixelWindow,
        bands: &[usize],
        out_w: u32,
        out_h: u32,
        nodata: Option<f64>,
    ) -> TileResult<SampleBlock> {
        check_bands(bands, self.caps.band_count)?;
        let idx0: Vec<usize> = bands.iter().map(|b| b - 1).collect();
        Ok(sample_planes(
            &self.planes,
            window,
            &idx0,
            out_w,
            out_h,
            nodata,
        ))
    }

    fn read_pixel(&self, col: u32, row: u32) -> TileResult<Vec<f64>> {
        if col >= self.caps.width || row >= self.caps.height {
            return Err(TileError::invalid_param(
                "x/y",
                format!("pixel ({}, {}) is outside the image", col, row),
            ));
        }
        Ok((0..self.caps.band_count)
            .map(|b| self.planes.value(b, col, row))
            .collect())
    }

    fn color_table(&self) -> Option<&[[u8; 4]]> {
        self.color_table.as_deref()
    }
}

fn interp_for_color_type(ct: &ColorType, source: &str) -> TileResult<Vec<ColorInterp>> {
    Ok(match ct {
        ColorType::Gray(_) => vec![ColorInterp::Gray],
        ColorType::GrayA(_) => vec![ColorInterp::Gray, ColorInterp::Alpha],
        ColorType::RGB(_) => vec![ColorInterp::Red, ColorInterp::Green, ColorInterp::Blue],
        ColorType::RGBA(_) => vec![
            ColorInterp::Red,
            ColorInterp::Green,
            ColorInterp::Blue,
            ColorInterp::Alpha,
        ],
        ColorType::Palette(_) => vec![ColorInterp::Palette],
        other => {
            return Err(TileError::SourceReadError(format!(
                "{}: unsupported TIFF color type {:?}",
                source, other
            )))
        }
    })
}

fn read_f64_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Option<Vec<f64>> {
    decoder
        .find_tag(tag)
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok())
}

fn read_u16_tag<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Option<Vec<u16>> {
    decoder
        .find_tag(tag)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16_vec().ok())
}

fn read_nodata_tag<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let value = decoder.find_tag(Tag::GdalNodata).ok().flatten()?;
    let text = value.into_string().ok()?;
    let trimmed = text.trim_matches(char::from(0)).trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        Some(f64::NAN)
    } else {
        trimmed.parse::<f64>().ok()
    }
}

fn read_color_table<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<Vec<[u8; 4]>> {
    let raw = read_u16_tag(decoder, Tag::from_u16_exhaustive(320))?;
    if raw.is_empty() || raw.len() % 3 != 0 {
        return None;
    }
    let n = raw.len() / 3;
    // TIFF color maps hold 16-bit channels; GDAL scales 8-bit values by 257.
    Some(
        (0..n)
            .map(|i| {
                [
                    (raw[i] >> 8) as u8,
                    (raw[i + n] >> 8) as u8,
                    (raw[i + 2 * n] >> 8) as u8,
                    255,
                ]
            })
            .collect(),
    )
}

fn epsg_from_geokeys(dir: &[u16]) -> Option<u32> {
    if dir.len() < 4 {
        return None;
    }
    let n_keys = dir[3] as usize;
    let mut geographic = None;
    let mut projected = None;
    for k in 0..n_keys {
        let off = 4 + k * 4;
        if off + 3 >= dir.len() {
            break;
        }
        let (key, location, value) = (dir[off], dir[off + 1], dir[off + 3]);
        if location != 0 {
            continue;
        }
        match key {
            GEOKEY_GEOGRAPHIC_TYPE => geographic = Some(u32::from(value)),
            GEOKEY_PROJECTED_TYPE => projected = Some(u32::from(value)),
            _ => {}
        }
    }
    projected.or(geographic)
}

fn planes_from_decoding(
    result: DecodingResult,
    width: u32,
    height: u32,
    band_count: usize,
    source: &str,
) -> TileResult<Planes> {
    fn split<T: Copy>(data: Vec<T>, n: usize) -> Vec<Vec<T>> {
        if n == 1 {
            return vec![data];
        }
        let per_band = data.len() / n;
        let mut out: Vec<Vec<T>> = (0..n).map(|_| Vec::with_capacity(per_band)).collect();
        for (i, v) in data.into_iter().enumerate() {
            out[i % n].push(v);
        }
        out
    }

    let bands = match result {
        DecodingResult::U8(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::U8)
            .collect(),
        DecodingResult::U16(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::U16)
            .collect(),
        DecodingResult::I16(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::I16)
            .collect(),
        DecodingResult::U32(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::U32)
            .collect(),
        DecodingResult::I32(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::I32)
            .collect(),
        DecodingResult::F32(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::F32)
            .collect(),
        DecodingResult::F64(data) => split(data, band_count)
            .into_iter()
            .map(PlaneBuf::F64)
            .collect(),
        _ => {
            return Err(TileError::SourceReadError(format!(
                "{}: unsupported TIFF sample format",
                source
            )))
        }
    };
    Planes::new(width, height, bands)
}

// ============================================================================
// GeoTIFF writing (region export)
// ============================================================================

fn geokey_directory(crs: CrsCode) -> [u16; 16] {
    match crs {
        // Model type 2 = geographic, keyed by GeographicTypeGeoKey.
        CrsCode::Epsg4326 => [
            1, 1, 0, 3, //
            GEOKEY_MODEL_TYPE, 0, 1, 2, //
            GEOKEY_RASTER_TYPE, 0, 1, 1, //
            GEOKEY_GEOGRAPHIC_TYPE, 0, 1, 4326,
        ],
        // Model type 1 = projected, keyed by ProjectedCSTypeGeoKey.
        CrsCode::Epsg3857 => [
            1, 1, 0, 3, //
            GEOKEY_MODEL_TYPE, 0, 1, 1, //
            GEOKEY_RASTER_TYPE, 0, 1, 1, //
            GEOKEY_PROJECTED_TYPE, 0, 1, 3857,
        ],
    }
}

fn write_geo_tags<W: Write + Seek>(
    enc: &mut DirectoryEncoder<'_, W, TiffKindStandard>,
    width: u32,
    height: u32,
    georef: Option<(CrsCode, BoundingBox)>,
    nodata: Option<f64>,
) -> TileResult<()> {
    if let Some((crs, bounds)) = georef {
        let sx = bounds.width() / width as f64;
        let sy = bounds.height() / height as f64;
        enc.write_tag(Tag::ModelPixelScaleTag, &[sx, sy, 0.0][..])
            .map_err(|e| tiff_err("ModelPixelScale", e))?;
        enc.write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, bounds.min_x, bounds.max_y, 0.0][..],
        )
        .map_err(|e| tiff_err("ModelTiepoint", e))?;
        enc.write_tag(Tag::GeoKeyDirectoryTag, &geokey_directory(crs)[..])
            .map_err(|e| tiff_err("GeoKeyDirectory", e))?;
    }
    if let Some(nd) = nodata {
        let text = if nd.is_nan() {
            "nan".to_string()
        } else {
            format!("{}", nd)
        };
        enc.write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| tiff_err("GDAL_NODATA", e))?;
    }
    Ok(())
}

fn interleave_as<T, F>(block: &SampleBlock, convert: F) -> Vec<T>
where
    F: Fn(f64) -> T,
    T: Copy,
{
    let n_pixels = block.pixel_count();
    let n_bands = block.bands.len();
    let mut out = Vec::with_capacity(n_pixels * n_bands);
    for p in 0..n_pixels {
        for band in &block.bands {
            out.push(convert(band[p]));
        }
    }
    out
}

/// Encode a sampled block as an in-memory (Geo)TIFF.
///
/// Supported shapes: 1/3/4-band uint8, and single-band data of any other
/// supported type (written as the narrowest lossless TIFF sample type).
pub fn write_geotiff(
    block: &SampleBlock,
    georef: Option<(CrsCode, BoundingBox)>,
    nodata: Option<f64>,
) -> TileResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut tiff =
        TiffEncoder::new(&mut cursor).map_err(|e| tiff_err("TIFF encoder", e))?;
    let (w, h) = (block.width, block.height);

    macro_rules! encode {
        ($ct:ty, $data:expr) => {{
            let mut img = tiff
                .new_image::<$ct>(w, h)
                .map_err(|e| tiff_err("TIFF image", e))?;
            write_geo_tags(img.encoder(), w, h, georef, nodata)?;
            img.write_data($data)
                .map_err(|e| tiff_err("TIFF data", e))?;
        }};
    }

    let as_u8 = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    match (block.dtype, block.bands.len()) {
        (DataType::UInt8, 1) => encode!(colortype::Gray8, &interleave_as(block, as_u8)),
        (DataType::UInt8, 3) => encode!(colortype::RGB8, &interleave_as(block, as_u8)),
        (DataType::UInt8, 4) => encode!(colortype::RGBA8, &interleave_as(block, as_u8)),
        (DataType::UInt16, 1) => encode!(
            colortype::Gray16,
            &interleave_as(block, |v| v.round().clamp(0.0, 65535.0) as u16)
        ),
        (DataType::UInt32, 1) => encode!(
            colortype::Gray32,
            &interleave_as(block, |v| v.round().max(0.0) as u32)
        ),
        (DataType::Int16, 1) | (DataType::Float32, 1) => encode!(
            colortype::Gray32Float,
            &interleave_as(block, |v| v as f32)
        ),
        (DataType::Int32, 1) | (DataType::Float64, 1) => {
            encode!(colortype::Gray64Float, &interleave_as(block, |v| v))
        }
        (dtype, n) => {
            return Err(TileError::RenderError(format!(
                "TIFF export does not support {} band(s) of {:?} data",
                n, dtype
            )))
        }
    }

    drop(tiff);
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::DataType;

    fn rgb_block(w: u32, h: u32) -> SampleBlock {
        let n = (w * h) as usize;
        let mut r = Vec::with_capacity(n);
        let mut g = Vec::with_capacity(n);
        let b = vec![7.0; n];
        for j in 0..h {
            for i in 0..w {
                r.push(i as f64 % 256.0);
                g.push(j as f64 % 256.0);
            }
        }
        SampleBlock {
            width: w,
            height: h,
            dtype: DataType::UInt8,
            bands: vec![r, g, b],
            mask: vec![255; n],
        }
    }

    #[test]
    fn test_rgb_geotiff_roundtrip() {
        let block = rgb_block(40, 20);
        let bounds = BoundingBox::new(-78.0, 24.0, -77.0, 24.5);
        let bytes = write_geotiff(&block, Some((CrsCode::Epsg4326, bounds)), None).unwrap();

        let src =
            GeoTiffSource::from_reader(Cursor::new(bytes), "roundtrip".to_string()).unwrap();
        let caps = src.capabilities();
        assert_eq!((caps.width, caps.height), (40, 20));
        assert_eq!(caps.band_count, 3);
        assert_eq!(caps.dtype, DataType::UInt8);
        assert_eq!(caps.crs, Some(CrsCode::Epsg4326));

        let got = caps.bounds.unwrap();
        assert!((got.min_x - bounds.min_x).abs() < 1e-9);
        assert!((got.max_y - bounds.max_y).abs() < 1e-9);
        assert!((got.max_x - bounds.max_x).abs() < 1e-9);

        let px = src.read_pixel(3, 5).unwrap();
        assert_eq!(px, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_float_geotiff_roundtrip_with_nan_nodata() {
        let values = vec![1.5, f64::NAN, 3.25, 4.0];
        let block = SampleBlock {
            width: 2,
            height: 2,
            dtype: DataType::Float32,
            bands: vec![values],
            mask: vec![255, 0, 255, 255],
        };
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let bytes =
            write_geotiff(&block, Some((CrsCode::Epsg3857, bounds)), Some(f64::NAN)).unwrap();

        let src = GeoTiffSource::from_reader(Cursor::new(bytes), "dem".to_string()).unwrap();
        let caps = src.capabilities();
        assert_eq!(caps.dtype, DataType::Float32);
        assert_eq!(caps.crs, Some(CrsCode::Epsg3857));
        assert!(caps.nodata.is_some_and(f64::is_nan));

        let px = src.read_pixel(0, 1).unwrap();
        assert!((px[0] - 3.25).abs() < 1e-6);
        assert!(src.read_pixel(1, 0).unwrap()[0].is_nan());
    }

    #[test]
    fn test_plain_tiff_is_non_geospatial() {
        let block = SampleBlock {
            width: 3,
            height: 2,
            dtype: DataType::UInt8,
            bands: vec![vec![0.0, 64.0, 128.0, 192.0, 255.0, 32.0]],
            mask: vec![255; 6],
        };
        let bytes = write_geotiff(&block, None, None).unwrap();
        let src = GeoTiffSource::from_reader(Cursor::new(bytes), "plain".to_string()).unwrap();
        assert!(!src.capabilities().is_geospatial());
        assert_eq!(src.capabilities().color_interp, vec![ColorInterp::Gray]);
    }

    #[test]
    fn test_out_of_range_band_rejected() {
        let block = rgb_block(4, 4);
        let bytes = write_geotiff(&block, None, None).unwrap();
        let src = GeoTiffSource::from_reader(Cursor::new(bytes), "t".to_string()).unwrap();
        let window = PixelWindow::new(0.0, 0.0, 4.0, 4.0);
        assert!(src.read_window(&window, &[4], 4, 4, None).is_err());
        assert!(src.read_window(&window, &[0], 4, 4, None).is_err());
        assert!(src.read_window(&window, &[3], 4, 4, None).is_ok());
    }
}
