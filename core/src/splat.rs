//! Texture splatting: per-texture weight grids from height, inclination,
//! stencils and noise, normalized so every pixel's weights sum to 1.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::Backend;
use crate::compositor::mix_seed;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::mask::{Filter, Mask, MaskEngine, SampleContext, StencilMask, StencilSet, band, compile_filters};
use crate::noise_field::{NoiseField, NoiseParams};
use crate::world::World;

// Below this total weight a pixel counts as uncovered
const MIN_WEIGHT_SUM: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TexturingMode {
    #[default]
    Height,
    Inclination,
    HeightAndInclination,
    ConstantInfluence,
    Map,
}

/// Noise jitter on the height used for threshold tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureNoise {
    pub params: NoiseParams,
    /// Maximum height shift, normalized units.
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureRule {
    pub name: String,
    pub mode: TexturingMode,
    /// Normalized heights.
    pub min_height: f64,
    pub max_height: f64,
    /// Degrees.
    pub min_inclination: f64,
    pub max_inclination: f64,
    pub height_blend: f64,
    pub inclination_blend: f64,
    pub strength: f64,
    pub noise: Option<TextureNoise>,
    /// Weight source for `Map` mode.
    pub map: Option<StencilMask>,
    pub filters: Vec<Filter>,
}

impl Default for TextureRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: TexturingMode::Height,
            min_height: 0.0,
            max_height: 1.0,
            min_inclination: 0.0,
            max_inclination: 90.0,
            height_blend: 0.0,
            inclination_blend: 0.0,
            strength: 1.0,
            noise: None,
            map: None,
            filters: Vec::new(),
        }
    }
}

impl TextureRule {
    pub fn builder(name: impl Into<String>, mode: TexturingMode) -> TextureRuleBuilder {
        TextureRuleBuilder::new(name, mode)
    }

    pub fn validate(&self, context: &str) -> Result<()> {
        let values = [
            self.min_height,
            self.max_height,
            self.min_inclination,
            self.max_inclination,
            self.height_blend,
            self.inclination_blend,
            self.strength,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::config(context, "texture rule values must be finite"));
        }
        if self.min_height > self.max_height {
            return Err(Error::config(context, "min_height exceeds max_height"));
        }
        if self.min_inclination > self.max_inclination {
            return Err(Error::config(context, "min_inclination exceeds max_inclination"));
        }
        if self.strength < 0.0 || self.height_blend < 0.0 || self.inclination_blend < 0.0 {
            return Err(Error::config(context, "strength and blends must be non-negative"));
        }
        if let Some(noise) = &self.noise {
            noise.params.validate(context)?;
            if !(noise.amount.is_finite() && noise.amount >= 0.0) {
                return Err(Error::config(context, "noise amount must be non-negative"));
            }
        }
        if self.mode == TexturingMode::Map && self.map.is_none() {
            return Err(Error::config(context, "map mode needs a stencil map"));
        }
        Ok(())
    }
}

pub struct TextureRuleBuilder {
    rule: TextureRule,
}

impl TextureRuleBuilder {
    pub fn new(name: impl Into<String>, mode: TexturingMode) -> Self {
        Self {
            rule: TextureRule {
                name: name.into(),
                mode,
                ..TextureRule::default()
            },
        }
    }

    pub fn height(mut self, min: f64, max: f64) -> Self {
        self.rule.min_height = min;
        self.rule.max_height = max;
        self
    }

    pub fn inclination(mut self, min: f64, max: f64) -> Self {
        self.rule.min_inclination = min;
        self.rule.max_inclination = max;
        self
    }

    pub fn blend(mut self, height: f64, inclination: f64) -> Self {
        self.rule.height_blend = height;
        self.rule.inclination_blend = inclination;
        self
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.rule.strength = strength;
        self
    }

    pub fn noise(mut self, params: NoiseParams, amount: f64) -> Self {
        self.rule.noise = Some(TextureNoise { params, amount });
        self
    }

    pub fn map(mut self, map: StencilMask) -> Self {
        self.rule.map = Some(map);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.rule.filters.push(filter);
        self
    }

    pub fn build(self) -> Result<TextureRule> {
        let context = format!("texture '{}'", self.rule.name);
        self.rule.validate(&context)?;
        Ok(self.rule)
    }
}

/// The texturing section of a landscape document. Defaults to a single
/// `ground` texture covering everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TexturingConfig {
    pub rules: Vec<TextureRule>,
    /// Texture that takes the whole pixel when no rule contributes.
    pub fallback: usize,
}

impl Default for TexturingConfig {
    fn default() -> Self {
        Self {
            rules: vec![TextureRule {
                name: "ground".into(),
                mode: TexturingMode::ConstantInfluence,
                ..TextureRule::default()
            }],
            fallback: 0,
        }
    }
}

impl TexturingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(Error::config("texturing", "at least one texture rule is required"));
        }
        if self.fallback >= self.rules.len() {
            return Err(Error::config(
                "texturing",
                format!(
                    "fallback texture {} out of range for {} rules",
                    self.fallback,
                    self.rules.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Inclination in degrees from central differences (one-sided on borders).
/// Used for standalone grids; tiles of a layout go through
/// [`inclination_map_with`] so their borders agree.
pub fn inclination_map(
    heightmap: &Grid,
    tile_size: f64,
    terrain_height: f64,
    backend: Backend,
) -> Grid {
    let res = heightmap.resolution();
    let step = tile_size / (res - 1) as f64;
    let data = backend.fill_grid(res, |x, z| {
        let (x0, x1) = (x.saturating_sub(1), (x + 1).min(res - 1));
        let (z0, z1) = (z.saturating_sub(1), (z + 1).min(res - 1));
        let dx = (heightmap.get(x1, z) - heightmap.get(x0, z)) as f64 * terrain_height
            / ((x1 - x0) as f64 * step);
        let dz = (heightmap.get(x, z1) - heightmap.get(x, z0)) as f64 * terrain_height
            / ((z1 - z0) as f64 * step);
        slope_degrees(dx, dz)
    });
    Grid::from_parts(res, data)
}

/// Inclination in degrees from central differences everywhere. Samples one
/// step past the border come from `outside(i, j)`, with indices relative to
/// the tile (so -1 and `resolution` are valid).
pub fn inclination_map_with<F>(
    heightmap: &Grid,
    step: f64,
    terrain_height: f64,
    backend: Backend,
    outside: F,
) -> Grid
where
    F: Fn(i64, i64) -> f32 + Sync,
{
    let res = heightmap.resolution() as i64;
    let at = |i: i64, j: i64| {
        if (0..res).contains(&i) && (0..res).contains(&j) {
            heightmap.get(i as usize, j as usize)
        } else {
            outside(i, j)
        }
    };
    let span = 2.0 * step;
    let data = backend.fill_grid(res as usize, |x, z| {
        let (x, z) = (x as i64, z as i64);
        let dx = (at(x + 1, z) - at(x - 1, z)) as f64 * terrain_height / span;
        let dz = (at(x, z + 1) - at(x, z - 1)) as f64 * terrain_height / span;
        slope_degrees(dx, dz)
    });
    Grid::from_parts(res as usize, data)
}

fn slope_degrees(dx: f64, dz: f64) -> f32 {
    let slope = (dx * dx + dz * dz).sqrt().atan().to_degrees();
    if slope.is_finite() { slope as f32 } else { 0.0 }
}

/// Normalized per-texture weights for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatMap {
    resolution: usize,
    layers: Vec<Grid>,
}

impl SplatMap {
    pub fn empty(resolution: usize) -> Self {
        Self {
            resolution,
            layers: Vec::new(),
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn layers(&self) -> &[Grid] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn weight(&self, texture: usize, x: usize, z: usize) -> f32 {
        self.layers.get(texture).map_or(0.0, |g| g.get(x, z))
    }

    /// Bilinear weight at tile-local (u, v).
    pub fn sample(&self, texture: usize, u: f64, v: f64) -> f64 {
        self.layers.get(texture).map_or(0.0, |g| g.sample(u, v))
    }

    pub fn sum_at(&self, x: usize, z: usize) -> f32 {
        self.layers.iter().map(|g| g.get(x, z)).sum()
    }

    pub fn dominant(&self, x: usize, z: usize) -> Option<usize> {
        (0..self.layers.len()).max_by(|&a, &b| {
            self.weight(a, x, z)
                .total_cmp(&self.weight(b, x, z))
                .then(b.cmp(&a))
        })
    }

    /// Pack weights four textures per RGBA8 image, row-major.
    pub fn to_rgba_control_maps(&self) -> Vec<Vec<u8>> {
        let pixels = self.resolution * self.resolution;
        self.layers
            .chunks(4)
            .map(|group| {
                let mut buf = vec![0u8; pixels * 4];
                for (channel, grid) in group.iter().enumerate() {
                    for (p, &w) in grid.as_slice().iter().enumerate() {
                        buf[p * 4 + channel] = (w.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                }
                buf
            })
            .collect()
    }
}

/// Normalize raw weights per pixel. Pixels where nothing contributes go
/// entirely to `fallback`. Returns the map and the number of such pixels.
pub fn normalize(raw: Vec<Grid>, fallback: usize) -> (SplatMap, usize) {
    let Some(first) = raw.first() else {
        return (SplatMap::empty(0), 0);
    };
    let resolution = first.resolution();
    let pixels = resolution * resolution;
    let fallback = fallback.min(raw.len() - 1);
    let mut out: Vec<Vec<f32>> = vec![vec![0.0; pixels]; raw.len()];
    let mut uncovered = 0;

    for p in 0..pixels {
        let weight = |g: &Grid| {
            let w = g.as_slice()[p] as f64;
            if w.is_finite() && w > 0.0 { w } else { 0.0 }
        };
        let sum: f64 = raw.iter().map(weight).sum();
        if sum > MIN_WEIGHT_SUM {
            for (layer, g) in out.iter_mut().zip(&raw) {
                layer[p] = (weight(g) / sum) as f32;
            }
        } else {
            out[fallback][p] = 1.0;
            uncovered += 1;
        }
    }

    let layers = out
        .into_iter()
        .map(|data| Grid::from_parts(resolution, data))
        .collect();
    (SplatMap { resolution, layers }, uncovered)
}

struct CompiledRule {
    rule: TextureRule,
    noise: Option<NoiseField>,
    map: Option<Mask>,
    filter: Option<Mask>,
}

pub struct SplatWeightEngine {
    rules: Vec<CompiledRule>,
    fallback: usize,
    stencils: Arc<StencilSet>,
}

impl SplatWeightEngine {
    pub fn new(seed: u64, config: &TexturingConfig, world: &World) -> Result<Self> {
        config.validate()?;
        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, rule) in config.rules.iter().enumerate() {
            let context = format!("texture[{index}] '{}'", rule.name);
            rule.validate(&context)?;
            let map = rule.map.clone().map(Mask::Stencil);
            let filter = compile_filters(&rule.filters);
            for mask in map.iter().chain(filter.iter()) {
                mask.validate(world.stencils(), &context)?;
            }
            let noise = rule.noise.as_ref().map(|n| {
                NoiseField::new(mix_seed(seed ^ mix_seed(0x5EED_0000 + index as u64)), n.params.basis)
            });
            rules.push(CompiledRule {
                rule: rule.clone(),
                noise,
                map,
                filter,
            });
        }
        Ok(Self {
            rules,
            fallback: config.fallback,
            stencils: world.shared_stencils(),
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.rule.name.as_str())
    }

    fn weight(&self, compiled: &CompiledRule, x: f64, z: f64, height: f64, incl: f64) -> f64 {
        let rule = &compiled.rule;
        let engine = MaskEngine::new(&self.stencils);
        let ctx = SampleContext::at(x, z)
            .with_height(height)
            .with_inclination(incl);

        let jittered = match (&rule.noise, &compiled.noise) {
            (Some(n), Some(field)) => height + n.amount * field.sample(x, z, &n.params),
            _ => height,
        };
        let h = || band(jittered, rule.min_height, rule.max_height, rule.height_blend);
        let i = || band(incl, rule.min_inclination, rule.max_inclination, rule.inclination_blend);
        let base = match rule.mode {
            TexturingMode::Height => h(),
            TexturingMode::Inclination => i(),
            TexturingMode::HeightAndInclination => h() * i(),
            TexturingMode::ConstantInfluence => 1.0,
            TexturingMode::Map => compiled
                .map
                .as_ref()
                .map_or(0.0, |m| engine.evaluate(m, &ctx)),
        };
        if base <= 0.0 {
            return 0.0;
        }
        let gate = compiled
            .filter
            .as_ref()
            .map_or(1.0, |m| engine.evaluate(m, &ctx));
        let w = base * rule.strength * gate;
        if w.is_finite() { w.max(0.0) } else { 0.0 }
    }

    /// Per-rule weights before normalization, one grid per rule.
    pub fn raw_weights(
        &self,
        heightmap: &Grid,
        inclination: &Grid,
        origin: [f64; 2],
        tile_size: f64,
        backend: Backend,
    ) -> Vec<Grid> {
        let step = tile_size / (heightmap.resolution() - 1) as f64;
        self.raw_weights_with(heightmap, inclination, backend, |i, j| {
            (origin[0] + i as f64 * step, origin[1] + j as f64 * step)
        })
    }

    /// Per-rule weights with grid point (i, j) at world `position(i, j)`.
    pub fn raw_weights_with<P>(
        &self,
        heightmap: &Grid,
        inclination: &Grid,
        backend: Backend,
        position: P,
    ) -> Vec<Grid>
    where
        P: Fn(usize, usize) -> (f64, f64) + Sync,
    {
        let res = heightmap.resolution();
        backend.map(self.rules.len(), |r| {
            let compiled = &self.rules[r];
            let data = backend.fill_grid(res, |i, j| {
                let (x, z) = position(i, j);
                self.weight(
                    compiled,
                    x,
                    z,
                    heightmap.get(i, j) as f64,
                    inclination.get(i, j) as f64,
                ) as f32
            });
            Grid::from_parts(res, data)
        })
    }

    /// Normalized splat map for a standalone tile at `origin`.
    pub fn compute_weights(
        &self,
        heightmap: &Grid,
        inclination: &Grid,
        origin: [f64; 2],
        tile_size: f64,
        backend: Backend,
    ) -> SplatMap {
        let step = tile_size / (heightmap.resolution() - 1) as f64;
        self.compute_weights_with(heightmap, inclination, backend, |i, j| {
            (origin[0] + i as f64 * step, origin[1] + j as f64 * step)
        })
    }

    /// Normalized splat map with grid point (i, j) at world `position(i, j)`.
    pub fn compute_weights_with<P>(
        &self,
        heightmap: &Grid,
        inclination: &Grid,
        backend: Backend,
        position: P,
    ) -> SplatMap
    where
        P: Fn(usize, usize) -> (f64, f64) + Sync,
    {
        let raw = self.raw_weights_with(heightmap, inclination, backend, position);
        let (map, uncovered) = normalize(raw, self.fallback);
        if uncovered > 0 {
            warn!(
                pixels = uncovered,
                fallback = %self.rules[self.fallback].rule.name,
                "no texture rule matched; used fallback"
            );
        }
        map
    }
}
