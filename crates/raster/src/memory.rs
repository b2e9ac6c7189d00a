//! In-memory raster sources, used by the demo catalog and tests.

use crate::source::{check_bands, PixelWindow, PlaneBuf, Planes, RasterSource, SampleBlock};
use crate::window::sample_planes;
use tile_common::{BoundingBox, ColorInterp, CrsCode, RasterCapabilities, TileError, TileResult};

/// A raster constructed from band planes held in memory.
pub struct MemoryRaster {
    caps: RasterCapabilities,
    planes: Planes,
    color_table: Option<Vec<[u8; 4]>>,
}

impl MemoryRaster {
    fn from_planes(source: &str, planes: Planes) -> Self {
        let band_count = planes.bands.len();
        let color_interp = match band_count {
            1 => vec![ColorInterp::Gray],
            n => vec![ColorInterp::Undefined; n],
        };
        let caps = RasterCapabilities {
            source: source.to_string(),
            width: planes.width,
            height: planes.height,
            band_count,
            dtype: planes.dtype,
            color_interp,
            band_descriptions: vec![None; band_count],
            nodata: None,
            crs: None,
            bounds: None,
        };
        Self {
            caps,
            planes,
            color_table: None,
        }
    }

    /// Build from uint8 planes, one `width * height` vector per band.
    pub fn from_u8_bands(
        source: &str,
        width: u32,
        height: u32,
        bands: Vec<Vec<u8>>,
    ) -> TileResult<Self> {
        let planes = Planes::new(width, height, bands.into_iter().map(PlaneBuf::U8).collect())?;
        Ok(Self::from_planes(source, planes))
    }

    /// Build from float32 planes.
    pub fn from_f32_bands(
        source: &str,
        width: u32,
        height: u32,
        bands: Vec<Vec<f32>>,
    ) -> TileResult<Self> {
        let planes = Planes::new(width, height, bands.into_iter().map(PlaneBuf::F32).collect())?;
        Ok(Self::from_planes(source, planes))
    }

    /// Build from float64 planes.
    pub fn from_f64_bands(
        source: &str,
        width: u32,
        height: u32,
        bands: Vec<Vec<f64>>,
    ) -> TileResult<Self> {
        let planes = Planes::new(width, height, bands.into_iter().map(PlaneBuf::F64).collect())?;
        Ok(Self::from_planes(source, planes))
    }

    /// Attach a geospatial reference.
    pub fn with_geo(mut self, crs: CrsCode, bounds: BoundingBox) -> Self {
        self.caps.crs = Some(crs);
        self.caps.bounds = Some(bounds);
        self
    }

    /// Set per-band color interpretation; the length must match the bands.
    pub fn with_color_interp(mut self, interp: Vec<ColorInterp>) -> Self {
        if interp.len() == self.caps.band_count {
            self.caps.color_interp = interp;
        }
        self
    }

    /// Set per-band descriptions; the length must match the bands.
    pub fn with_descriptions(mut self, descriptions: Vec<Option<String>>) -> Self {
        if descriptions.len() == self.caps.band_count {
            self.caps.band_descriptions = descriptions;
        }
        self
    }

    /// Declare a nodata value.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.caps.nodata = Some(nodata);
        self
    }

    /// Attach an embedded color table and mark the band as paletted.
    pub fn with_color_table(mut self, table: Vec<[u8; 4]>) -> Self {
        self.color_table = Some(table);
        if self.caps.band_count == 1 {
            self.caps.color_interp = vec![ColorInterp::Palette];
        }
        self
    }
}

impl RasterSource for MemoryRaster {
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
