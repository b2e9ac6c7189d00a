//! The raster source capability interface and its pixel-buffer plumbing.

use tile_common::{DataType, RasterCapabilities, TileError, TileResult};

/// A window in fractional pixel coordinates (y grows downward).
///
/// Windows may extend beyond the image; samples outside coverage come back
/// masked rather than failing the read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelWindow {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PixelWindow {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Whether any part of the window overlaps an image of the given size.
    pub fn overlaps(&self, width: u32, height: u32) -> bool {
        self.x1 > 0.0 && self.x0 < width as f64 && self.y1 > 0.0 && self.y0 < height as f64
    }
}

/// One decoded, resampled block of pixel data.
///
/// Values are widened to f64 regardless of the source data type; `dtype`
/// records the native type so the render engine can decide whether the data
/// is already 8-bit. The mask is 255 for valid samples and 0 for nodata or
/// out-of-coverage pixels, shared across bands.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    pub width: u32,
    pub height: u32,
    pub dtype: DataType,
    pub bands: Vec<Vec<f64>>,
    pub mask: Vec<u8>,
}

impl SampleBlock {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether every sample in the block is masked out.
    pub fn is_fully_masked(&self) -> bool {
        self.mask.iter().all(|&m| m == 0)
    }
}

/// Capability interface over one opened raster.
///
/// Implementations hold their pixels decoded in memory; reads never touch
/// the original backing store again after open.
pub trait RasterSource: Send {
    /// Introspected facts about the raster.
    fn capabilities(&self) -> &RasterCapabilities;

    /// Read a window resampled to `out_w` x `out_h`.
    ///
    /// `bands` are 1-based source band indexes. `nodata` is the resolved
    /// masking sentinel (NaN masks NaN samples); `None` masks nothing except
    /// out-of-coverage pixels.
    fn read_window(
        &self,
        window: &PixelWindow,
        bands: &[usize],
        out_w: u32,
        out_h: u32,
        nodata: Option<f64>,
    ) -> TileResult<SampleBlock>;

    /// Exact (nearest) sample of every band at one pixel.
    fn read_pixel(&self, col: u32, row: u32) -> TileResult<Vec<f64>>;

    /// The raster's embedded color table, if it is a paletted image.
    fn color_table(&self) -> Option<&[[u8; 4]]>;
}

/// Validate 1-based band indexes against the band count.
pub(crate) fn check_bands(bands: &[usize], band_count: usize) -> TileResult<()> {
    for &b in bands {
        if b == 0 || b > band_count {
            return Err(TileError::invalid_param(
                "band",
                format!(
                    "band {} is out of range; source has {} band(s)",
                    b, band_count
                ),
            ));
        }
    }
    Ok(())
}

/// Native-typed storage for one band's samples.
pub(crate) enum PlaneBuf {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl PlaneBuf {
    #[inline]
    pub(crate) fn get(&self, idx: usize) -> f64 {
        match self {
            PlaneBuf::U8(v) => v[idx] as f64,
            PlaneBuf::U16(v) => v[idx] as f64,
            PlaneBuf::I16(v) => v[idx] as f64,
            PlaneBuf::U32(v) => v[idx] as f64,
            PlaneBuf::I32(v) => v[idx] as f64,
            PlaneBuf::F32(v) => v[idx] as f64,
            PlaneBuf::F64(v) => v[idx],
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            PlaneBuf::U8(v) => v.len(),
            PlaneBuf::U16(v) => v.len(),
            PlaneBuf::I16(v) => v.len(),
            PlaneBuf::U32(v) => v.len(),
            PlaneBuf::I32(v) => v.len(),
            PlaneBuf::F32(v) => v.len(),
            PlaneBuf::F64(v) => v.len(),
        }
    }

    pub(crate) fn dtype(&self) -> DataType {
        match self {
            PlaneBuf::U8(_) => DataType::UInt8,
            PlaneBuf::U16(_) => DataType::UInt16,
            PlaneBuf::I16(_) => DataType::Int16,
            PlaneBuf::U32(_) => DataType::UInt32,
            PlaneBuf::I32(_) => DataType::Int32,
            PlaneBuf::F32(_) => DataType::Float32,
            PlaneBuf::F64(_) => DataType::Float64,
        }
    }
}

/// Decoded per-band planes for one raster.
pub(crate) struct Planes {
    pub width: u32,
    pub height: u32,
    pub dtype: DataType,
    pub bands: Vec<PlaneBuf>,
}

impl Planes {
    pub(crate) fn new(width: u32, height: u32, bands: Vec<PlaneBuf>) -> TileResult<Self> {
        let expected = width as usize * height as usize;
        let dtype = bands
            .first()
            .map(PlaneBuf::dtype)
            .ok_or_else(|| TileError::SourceReadError("raster has no bands".to_string()))?;
        for band in &bands {
            if band.len() != expected {
                return Err(TileError::SourceReadError(format!(
                    "band length {} does not match {}x{} image",
                    band.len(),
                    width,
                    height
                )));
            }
            if band.dtype() != dtype {
                return Err(TileError::SourceReadError(
                    "bands have mixed data types".to_string(),
                ));
            }
        }
        Ok(Self {
            width,
            height,
            dtype,
            bands,
        })
    }

    #[inline]
    pub(crate) fn value(&self, band: usize, col: u32, row: u32) -> f64 {
        self.bands[band].get(row as usize * self.width as usize + col as usize)
    }
}
