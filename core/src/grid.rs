use crate::error::{Error, Result};

// Square row-major grid of f32 samples, `data[z * resolution + x]`.
// Used for heightmaps (normalized [0,1]), inclination maps (degrees)
// and per-texture splat weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    resolution: usize,
    data: Vec<f32>,
}

// The heightmap of one terrain tile
pub type HeightmapGrid = Grid;

// Resolution must be 2^n + 1 so tiles share their edge row/column
pub fn validate_resolution(resolution: usize, context: &str) -> Result<()> {
    if resolution < 2 || !(resolution - 1).is_power_of_two() {
        return Err(Error::config(
            context,
            format!("resolution must be 2^n+1 (e.g. 129, 257, 513), got {resolution}"),
        ));
    }
    Ok(())
}

impl Grid {
    pub fn new(resolution: usize) -> Result<Self> {
        Self::filled(resolution, 0.0)
    }

    pub fn filled(resolution: usize, value: f32) -> Result<Self> {
        validate_resolution(resolution, "grid")?;
        Ok(Self {
            resolution,
            data: vec![value; resolution * resolution],
        })
    }

    pub fn from_vec(resolution: usize, data: Vec<f32>) -> Result<Self> {
        validate_resolution(resolution, "grid")?;
        if data.len() != resolution * resolution {
            return Err(Error::config(
                "grid",
                format!(
                    "expected {} samples for resolution {resolution}, got {}",
                    resolution * resolution,
                    data.len()
                ),
            ));
        }
        Ok(Self { resolution, data })
    }

    // Caller guarantees a valid resolution and a matching buffer length
    pub(crate) fn from_parts(resolution: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), resolution * resolution);
        Self { resolution, data }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn rows(&self) -> std::slice::Chunks<'_, f32> {
        self.data.chunks(self.resolution)
    }

    // Out-of-range indices clamp to the border
    pub fn get(&self, x: usize, z: usize) -> f32 {
        let last = self.resolution - 1;
        self.data[z.min(last) * self.resolution + x.min(last)]
    }

    pub fn set(&mut self, x: usize, z: usize, value: f32) {
        let idx = z * self.resolution + x;
        self.data[idx] = value;
    }

    pub fn row(&self, z: usize) -> &[f32] {
        let start = z * self.resolution;
        &self.data[start..start + self.resolution]
    }

    pub fn column(&self, x: usize) -> Vec<f32> {
        (0..self.resolution).map(|z| self.get(x, z)).collect()
    }

    // Bilinear sample at tile-local (u, v) in [0,1]; clamps outside
    pub fn sample(&self, u: f64, v: f64) -> f64 {
        let last = (self.resolution - 1) as f64;
        let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.0 };
        let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let fx = u * last;
        let fz = v * last;
        let x0 = fx.floor() as usize;
        let z0 = fz.floor() as usize;
        let tx = fx - x0 as f64;
        let tz = fz - z0 as f64;

        let a = self.get(x0, z0) as f64;
        let b = self.get(x0 + 1, z0) as f64;
        let c = self.get(x0, z0 + 1) as f64;
        let d = self.get(x0 + 1, z0 + 1) as f64;
        let ab = a + (b - a) * tx;
        let cd = c + (d - c) * tx;
        ab + (cd - ab) * tz
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    // 16-bit export: round(h * 65535), heights clamped to [0,1]
    pub fn to_u16(&self) -> Vec<u16> {
        self.data
            .iter()
            .map(|&h| {
                let h = if h.is_finite() { h.clamp(0.0, 1.0) } else { 0.0 };
                (h * u16::MAX as f32).round() as u16
            })
            .collect()
    }

    pub fn from_u16(resolution: usize, samples: &[u16]) -> Result<Self> {
        let data = samples
            .iter()
            .map(|&s| s as f32 / u16::MAX as f32)
            .collect();
        Self::from_vec(resolution, data)
    }
}
