//! Raster inputs: grayscale stencils and 16-bit heightmap modifiers.
//!
//! Generation never touches the filesystem directly; it asks an
//! [`AssetLoader`] handed in through the world context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Axis-aligned world-space rectangle, `min` corner plus `size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldRect {
    pub min: [f64; 2],
    pub size: [f64; 2],
}

impl WorldRect {
    pub fn new(min: [f64; 2], size: [f64; 2]) -> Self {
        Self { min, size }
    }

    pub fn validate(&self, context: &str) -> Result<()> {
        if !(self.min[0].is_finite() && self.min[1].is_finite()) {
            return Err(Error::geometry(context, "rectangle origin must be finite"));
        }
        if !(self.size[0].is_finite() && self.size[1].is_finite())
            || self.size[0] <= 0.0
            || self.size[1] <= 0.0
        {
            return Err(Error::geometry(
                context,
                format!(
                    "rectangle extents must be positive, got {} x {}",
                    self.size[0], self.size[1]
                ),
            ));
        }
        Ok(())
    }

    /// Local (u, v) of a world point; inside the rectangle both are in [0,1].
    pub fn to_local(&self, x: f64, z: f64) -> (f64, f64) {
        (
            (x - self.min[0]) / self.size[0],
            (z - self.min[1]) / self.size[1],
        )
    }

    pub fn contains(&self, x: f64, z: f64) -> bool {
        let (u, v) = self.to_local(x, z);
        (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v)
    }
}

/// A decoded grayscale raster with samples normalized to [0,1].
/// Row 0 is the raster's first row and maps to the rectangle's min z.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Raster {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::asset("raster", "raster has zero extent"));
        }
        if data.len() != width * height {
            return Err(Error::asset(
                "raster",
                format!("expected {} samples, got {}", width * height, data.len()),
            ));
        }
        let data = data
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_u16(width: usize, height: usize, samples: &[u16]) -> Result<Self> {
        let data = samples
            .iter()
            .map(|&s| s as f32 / u16::MAX as f32)
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn at(&self, x: usize, y: usize) -> f64 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.data[y * self.width + x] as f64
    }

    /// Bilinear sample at (u, v) in [0,1]; coordinates clamp at the border.
    pub fn sample(&self, u: f64, v: f64) -> f64 {
        let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.0 };
        let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let fx = u * (self.width - 1) as f64;
        let fy = v * (self.height - 1) as f64;
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;
        let ab = self.at(x0, y0) + (self.at(x0 + 1, y0) - self.at(x0, y0)) * tx;
        let cd = self.at(x0, y0 + 1) + (self.at(x0 + 1, y0 + 1) - self.at(x0, y0 + 1)) * tx;
        ab + (cd - ab) * ty
    }
}

/// Source of raster assets, addressed by the path strings used in a
/// landscape document.
pub trait AssetLoader: Send + Sync {
    fn load_raster(&self, path: &str) -> Result<Raster>;
}

/// Reads PNG/any `image`-supported grayscale files and square little-endian
/// 16-bit RAW files (`.raw`, `.r16`) relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

/// Split square little-endian 16-bit RAW data into its side length and
/// row-major samples.
pub fn raw16_samples(bytes: &[u8], asset: &str) -> Result<(usize, Vec<u16>)> {
    if bytes.len() % 2 != 0 {
        return Err(Error::asset(asset, "RAW data has an odd byte count"));
    }
    let samples: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    let side = (samples.len() as f64).sqrt().round() as usize;
    if side == 0 || side * side != samples.len() {
        return Err(Error::asset(
            asset,
            format!("RAW data of {} samples is not square", samples.len()),
        ));
    }
    Ok((side, samples))
}

pub fn decode_raw16(bytes: &[u8], asset: &str) -> Result<Raster> {
    let (side, samples) = raw16_samples(bytes, asset)?;
    Raster::from_u16(side, side, &samples).map_err(|e| Error::asset(asset, e.to_string()))
}

impl AssetLoader for FileAssetLoader {
    fn load_raster(&self, path: &str) -> Result<Raster> {
        let full = self.resolve(path);
        debug!(asset = %full.display(), "loading raster");
        let ext = full
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("raw") | Some("r16") => {
                let bytes = std::fs::read(&full).map_err(|e| Error::asset(path, e.to_string()))?;
                decode_raw16(&bytes, path)
            }
            _ => {
                let img = image::open(&full).map_err(|e| Error::asset(path, e.to_string()))?;
                let luma = img.to_luma16();
                let (w, h) = luma.dimensions();
                Raster::from_u16(w as usize, h as usize, luma.as_raw())
                    .map_err(|e| Error::asset(path, e.to_string()))
            }
        }
    }
}

/// In-memory loader for headless use and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLoader {
    rasters: HashMap<String, Raster>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, raster: Raster) {
        self.rasters.insert(path.into(), raster);
    }

    pub fn with(mut self, path: impl Into<String>, raster: Raster) -> Self {
        self.insert(path, raster);
        self
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load_raster(&self, path: &str) -> Result<Raster> {
        self.rasters
            .get(path)
            .cloned()
            .ok_or_else(|| Error::asset(path, "no such asset"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_rejects_non_positive_extents() {
        assert!(WorldRect::new([0.0, 0.0], [0.0, 5.0]).validate("r").is_err());
        assert!(WorldRect::new([0.0, 0.0], [5.0, -1.0]).validate("r").is_err());
        assert!(WorldRect::new([0.0, 0.0], [5.0, 5.0]).validate("r").is_ok());
    }

    #[test]
    fn rect_local_coordinates() {
        let r = WorldRect::new([100.0, 200.0], [50.0, 100.0]);
        assert_eq!(r.to_local(125.0, 250.0), (0.5, 0.5));
        assert!(r.contains(150.0, 300.0));
        assert!(!r.contains(151.0, 300.0));
    }

    #[test]
    fn raster_samples_bilinear_and_clamps() {
        let r = Raster::new(2, 2, vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!((r.sample(0.5, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(r.sample(2.0, 0.0), 1.0);
        assert_eq!(r.sample(-1.0, 0.0), 0.0);
    }

    #[test]
    fn raster_rejects_mismatched_length() {
        assert!(Raster::new(3, 3, vec![0.0; 4]).is_err());
    }

    #[test]
    fn raw16_decodes_square_data() {
        let bytes: Vec<u8> = [0u16, 65535, 65535, 0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let r = decode_raw16(&bytes, "t.raw").unwrap();
        assert_eq!((r.width(), r.height()), (2, 2));
        assert_eq!(r.as_slice(), &[0.0, 1.0, 1.0, 0.0]);
        assert!(decode_raw16(&bytes[..6], "t.raw").is_err());
        assert!(decode_raw16(&bytes[..5], "t.raw").is_err());
    }

    #[test]
    fn memory_loader_reports_missing_assets() {
        let loader = MemoryAssetLoader::new();
        let err = loader.load_raster("missing.png").unwrap_err();
        assert!(matches!(err, Error::AssetLoad { .. }));
    }
}
