//! Seeded multi-octave noise over world-space (x, z).
//!
//! A [`NoiseField`] is a pure function of world coordinates: it holds only
//! immutable permutation tables, so it is `Sync` and every tile that asks for
//! the same coordinate gets the same bits back.

use serde::{Deserialize, Serialize};

use crate::NoiseGenerator;
use crate::curve::Curve;
use crate::domain_warp::DomainWarp2D;
use crate::error::{Error, Result};
use crate::perlin2::Perlin2D;
use crate::simplex2::Simplex2D;

pub const MAX_OCTAVES: u32 = 16;

// Salt separating the warp field's seed from the primary field's
const WARP_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseBasis {
    #[default]
    Perlin,
    Simplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FractalKind {
    #[default]
    Fbm,
    // 1 - |n|, squared: sharp crests
    Ridged,
    // |n|: rounded, billowy hills
    Billow,
}

/// Parameters of one noise evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub basis: NoiseBasis,
    pub fractal: FractalKind,
    /// World-space wavelength of the first octave.
    pub tile_size: f64,
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub gain: f64,
    /// Domain warp displacement, in multiples of `tile_size`.
    pub warp_amount: f64,
    /// World-space shift applied before sampling.
    pub offset: [f64; 2],
    /// Remap applied to every octave (in [0,1] space) before accumulation.
    pub octave_curve: Option<Curve>,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            basis: NoiseBasis::Perlin,
            fractal: FractalKind::Fbm,
            tile_size: 500.0,
            octaves: 5,
            lacunarity: 2.0,
            gain: 0.5,
            warp_amount: 0.0,
            offset: [0.0, 0.0],
            octave_curve: None,
        }
    }
}

impl NoiseParams {
    pub fn validate(&self, context: &str) -> Result<()> {
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(Error::config(context, "noise tile_size must be positive"));
        }
        if self.octaves == 0 || self.octaves > MAX_OCTAVES {
            return Err(Error::config(
                context,
                format!("octaves must be in 1..={MAX_OCTAVES}, got {}", self.octaves),
            ));
        }
        if !(self.lacunarity.is_finite() && self.lacunarity > 0.0) {
            return Err(Error::config(context, "lacunarity must be positive"));
        }
        if !(self.gain.is_finite() && self.gain >= 0.0) {
            return Err(Error::config(context, "gain must be non-negative"));
        }
        if !(self.warp_amount.is_finite() && self.warp_amount >= 0.0) {
            return Err(Error::config(context, "warp_amount must be non-negative"));
        }
        if !(self.offset[0].is_finite() && self.offset[1].is_finite()) {
            return Err(Error::config(context, "noise offset must be finite"));
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Basis {
    Perlin(Perlin2D),
    Simplex(Simplex2D),
}

impl Basis {
    fn new(kind: NoiseBasis, seed: u64) -> Self {
        match kind {
            NoiseBasis::Perlin => Basis::Perlin(Perlin2D::new(seed)),
            NoiseBasis::Simplex => Basis::Simplex(Simplex2D::new(seed)),
        }
    }
}

impl NoiseGenerator for Basis {
    fn get2(&self, x: f64, y: f64) -> f64 {
        match self {
            Basis::Perlin(p) => p.get2(x, y),
            Basis::Simplex(s) => s.get2(x, y),
        }
    }
}

#[derive(Clone)]
pub struct NoiseField {
    primary: Basis,
    warp: Basis,
}

impl NoiseField {
    pub fn new(seed: u64, basis: NoiseBasis) -> Self {
        Self {
            primary: Basis::new(basis, seed),
            warp: Basis::new(basis, seed ^ WARP_SEED_SALT),
        }
    }

    /// Sample the field at world (x, z). Output is in [-1, 1].
    pub fn sample(&self, x: f64, z: f64, params: &NoiseParams) -> f64 {
        let freq = 1.0 / params.tile_size;
        let mut nx = (x + params.offset[0]) * freq;
        let mut nz = (z + params.offset[1]) * freq;

        if params.warp_amount > 0.0 {
            let warp = DomainWarp2D {
                warp: &self.warp,
                octaves: params.octaves,
                lacunarity: params.lacunarity,
                gain: params.gain,
                strength: params.warp_amount,
            };
            (nx, nz) = warp.apply(nx, nz);
        }

        let v = self.fractal(nx, nz, params);
        if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
    }

    /// Sample remapped into [0, 1].
    pub fn sample01(&self, x: f64, z: f64, params: &NoiseParams) -> f64 {
        (self.sample(x, z, params) + 1.0) * 0.5
    }

    fn fractal(&self, x: f64, z: f64, params: &NoiseParams) -> f64 {
        let mut amplitude = 1.0;
        let mut freq = 1.0;
        let mut total = 0.0;
        let mut max_amp = 0.0;

        for _ in 0..params.octaves.min(MAX_OCTAVES) {
            let raw = self.primary.get2(x * freq, z * freq);
            let mut n = match params.fractal {
                FractalKind::Fbm => raw,
                FractalKind::Ridged => {
                    let r = 1.0 - raw.abs();
                    r * r * 2.0 - 1.0
                }
                FractalKind::Billow => raw.abs() * 2.0 - 1.0,
            };
            if let Some(curve) = &params.octave_curve {
                n = curve.evaluate01((n + 1.0) * 0.5) * 2.0 - 1.0;
            }
            total += n * amplitude;
            max_amp += amplitude;
            amplitude *= params.gain;
            freq *= params.lacunarity;
        }

        if max_amp > 0.0 { total / max_amp } else { 0.0 }
    }
}
