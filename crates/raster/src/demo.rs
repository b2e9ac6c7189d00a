//! Built-in demo rasters.
//!
//! Deterministic synthetic scenes standing in for the sample imagery the
//! service is usually pointed at, so every endpoint works with zero fixture
//! files. Content must be byte-stable across runs: rendered output is cached
//! and compared byte-for-byte.

use crate::memory::MemoryRaster;
use tile_common::{BoundingBox, ColorInterp, CrsCode};

/// Which synthetic scene a demo alias resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoScene {
    /// 3-band uint8 RGB imagery over the Bahamas, EPSG:4326.
    Rgb,
    /// Single-band float32 terrain with NaN nodata holes, EPSG:4326.
    Elevation,
    /// Single-band uint8 image with no geospatial reference.
    Pixels,
}

/// Geographic bounds of the RGB demo scene.
pub const DEMO_RGB_BOUNDS: BoundingBox = BoundingBox {
    min_x: -78.95,
    min_y: 23.50,
    max_x: -76.40,
    max_y: 25.60,
};

/// Build the raster for a demo scene.
pub fn build(scene: DemoScene) -> MemoryRaster {
    match scene {
        DemoScene::Rgb => demo_rgb(),
        DemoScene::Elevation => demo_elevation(),
        DemoScene::Pixels => demo_pixels(),
    }
}

fn demo_rgb() -> MemoryRaster {
    let (w, h) = (510u32, 420u32);
    let n = (w * h) as usize;
    let mut r = Vec::with_capacity(n);
    let mut g = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);
    for y in 0..h {
        for x in 0..w {
            // Shallow-water banding with island blobs.
            let fx = x as f64 / (w - 1) as f64;
            let fy = y as f64 / (h - 1) as f64;
            let swell = ((fx * 9.0).sin() * (fy * 7.0).cos() + 1.0) / 2.0;
            let island = (((fx - 0.4).powi(2) + (fy - 0.55).powi(2)).sqrt() * 12.0)
                .min(1.0);
            r.push((40.0 + 120.0 * swell * (1.0 - island) + 60.0 * (1.0 - island)) as u8);
            g.push((90.0 + 110.0 * swell) as u8);
            b.push((150.0 + 90.0 * fy * (1.0 - swell * 0.5)) as u8);
        }
    }
    MemoryRaster::from_u8_bands("bahamas", w, h, vec![r, g, b])
        .expect("demo planes are sized to the scene")
        .with_geo(CrsCode::Epsg4326, DEMO_RGB_BOUNDS)
        .with_color_interp(vec![ColorInterp::Red, ColorInterp::Green, ColorInterp::Blue])
}

fn demo_elevation() -> MemoryRaster {
    let (w, h) = (256u32, 256u32);
    let n = (w * h) as usize;
    let mut band = Vec::with_capacity(n);
    for y in 0..h {
        for x in 0..w {
            let fx = x as f64 / (w - 1) as f64;
            let fy = y as f64 / (h - 1) as f64;
            // A lake of missing samples in the south-west quadrant.
            let lake = ((fx - 0.25).powi(2) + (fy - 0.7).powi(2)).sqrt() < 0.12;
            if lake {
                band.push(f32::NAN);
            } else {
                let ridges = (fx * 11.0).sin() * (fy * 6.0).cos();
                band.push((1850.0 + 900.0 * ridges + 650.0 * fy) as f32);
            }
        }
    }
    MemoryRaster::from_f32_bands("elevation", w, h, vec![band])
        .expect("demo planes are sized to the scene")
        .with_geo(CrsCode::Epsg4326, BoundingBox::new(-106.0, 38.0, -105.0, 39.0))
        .with_nodata(f64::NAN)
}

fn demo_pixels() -> MemoryRaster {
    let (w, h) = (600u32, 400u32);
    let n = (w * h) as usize;
    let mut band = Vec::with_capacity(n);
    for y in 0..h {
        for x in 0..w {
            let checker = ((x / 50 + y / 50) % 2) * 60;
            let ramp = x * 195 / w;
            band.push((checker + ramp) as u8);
        }
    }
    MemoryRaster::from_u8_bands("pixels", w, h, vec![band])
        .expect("demo planes are sized to the scene")
}
