//! Per-point attenuation masks and filter expressions.
//!
//! Every mask evaluates to a value in [0,1]. Filters combine fuzzily:
//! AND is the minimum, OR the maximum, NOT the complement.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assets::{Raster, WorldRect};
use crate::curve::Curve;
use crate::error::{Error, Result};

#[inline]
pub(crate) fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 1 inside `[min, max]`, fading to 0 over `blend` outside it.
/// With `blend <= 0` this is a hard indicator.
pub fn band(value: f64, min: f64, max: f64, blend: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if blend <= 0.0 {
        return if value >= min && value <= max { 1.0 } else { 0.0 };
    }
    let lo = (value - (min - blend)) / blend;
    let hi = ((max + blend) - value) / blend;
    smoothstep(lo.min(hi))
}

/// A named raster stretched over a world rectangle. Outside the
/// rectangle the stencil reads 0.
#[derive(Debug, Clone)]
pub struct Stencil {
    raster: Arc<Raster>,
    area: WorldRect,
}

impl Stencil {
    pub fn new(raster: Arc<Raster>, area: WorldRect, context: &str) -> Result<Self> {
        area.validate(context)?;
        Ok(Self { raster, area })
    }

    pub fn area(&self) -> WorldRect {
        self.area
    }

    pub fn sample(&self, x: f64, z: f64) -> f64 {
        if !self.area.contains(x, z) {
            return 0.0;
        }
        let (u, v) = self.area.to_local(x, z);
        self.raster.sample(u, v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StencilSet {
    stencils: HashMap<String, Stencil>,
}

impl StencilSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, stencil: Stencil) {
        self.stencils.insert(name.into(), stencil);
    }

    pub fn get(&self, name: &str) -> Option<&Stencil> {
        self.stencils.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stencils.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stencils.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stencils.is_empty()
    }
}

/// Normalized radial distance from `center` fed through `curve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMask {
    pub center: [f64; 2],
    pub radius: f64,
    #[serde(default = "Curve::hill")]
    pub curve: Curve,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StencilMask {
    pub stencil: String,
    #[serde(default)]
    pub invert: bool,
    /// Samples below this read as 0; the rest is rescaled to [0,1].
    #[serde(default)]
    pub tolerance: f64,
    /// Boundary smoothing applied after tolerance.
    #[serde(default)]
    pub blend: Option<Curve>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMask {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub blend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mask {
    Constant(f64),
    Distance(DistanceMask),
    Stencil(StencilMask),
    /// Normalized terrain height range.
    Height(RangeMask),
    /// Terrain inclination range, degrees.
    Inclination(RangeMask),
    And(Vec<Mask>),
    Or(Vec<Mask>),
    Not(Box<Mask>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    And,
    Or,
    /// AND NOT; as the first filter, seeds with the inverted mask.
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub mode: FilterMode,
    pub mask: Mask,
}

impl Filter {
    pub fn and(mask: Mask) -> Self {
        Self {
            mode: FilterMode::And,
            mask,
        }
    }

    pub fn or(mask: Mask) -> Self {
        Self {
            mode: FilterMode::Or,
            mask,
        }
    }

    pub fn not(mask: Mask) -> Self {
        Self {
            mode: FilterMode::Not,
            mask,
        }
    }
}

/// Fold a left-to-right filter list into one expression tree.
/// An empty list means "no restriction".
pub fn compile_filters(filters: &[Filter]) -> Option<Mask> {
    let mut iter = filters.iter();
    let first = iter.next()?;
    let seed = match first.mode {
        FilterMode::Not => Mask::Not(Box::new(first.mask.clone())),
        FilterMode::And | FilterMode::Or => first.mask.clone(),
    };
    Some(iter.fold(seed, |acc, f| match f.mode {
        FilterMode::And => Mask::And(vec![acc, f.mask.clone()]),
        FilterMode::Or => Mask::Or(vec![acc, f.mask.clone()]),
        FilterMode::Not => Mask::And(vec![acc, Mask::Not(Box::new(f.mask.clone()))]),
    }))
}

/// What is known about the terrain at the point being masked.
/// Height and inclination leaves evaluate to 1 when the value is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleContext {
    pub x: f64,
    pub z: f64,
    pub height: Option<f64>,
    pub inclination: Option<f64>,
}

impl SampleContext {
    pub fn at(x: f64, z: f64) -> Self {
        Self {
            x,
            z,
            ..Self::default()
        }
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_inclination(mut self, inclination: f64) -> Self {
        self.inclination = Some(inclination);
        self
    }
}

impl Mask {
    pub fn validate(&self, stencils: &StencilSet, context: &str) -> Result<()> {
        match self {
            Mask::Constant(v) => {
                if !v.is_finite() {
                    return Err(Error::config(context, "constant mask must be finite"));
                }
            }
            Mask::Distance(d) => {
                if !(d.radius.is_finite() && d.radius > 0.0) {
                    return Err(Error::geometry(context, "distance mask radius must be positive"));
                }
                if !(d.center[0].is_finite() && d.center[1].is_finite()) {
                    return Err(Error::geometry(context, "distance mask center must be finite"));
                }
            }
            Mask::Stencil(s) => {
                if !stencils.contains(&s.stencil) {
                    return Err(Error::config(
                        context,
                        format!("unknown stencil `{}`", s.stencil),
                    ));
                }
                if !(0.0..1.0).contains(&s.tolerance) {
                    return Err(Error::config(context, "stencil tolerance must be in [0,1)"));
                }
            }
            Mask::Height(r) | Mask::Inclination(r) => {
                if !(r.min.is_finite() && r.max.is_finite() && r.blend.is_finite()) {
                    return Err(Error::config(context, "range bounds must be finite"));
                }
                if r.min > r.max {
                    return Err(Error::config(
                        context,
                        format!("range min {} exceeds max {}", r.min, r.max),
                    ));
                }
            }
            Mask::And(children) | Mask::Or(children) => {
                for child in children {
                    child.validate(stencils, context)?;
                }
            }
            Mask::Not(inner) => inner.validate(stencils, context)?,
        }
        Ok(())
    }
}

pub struct MaskEngine<'a> {
    stencils: &'a StencilSet,
}

impl<'a> MaskEngine<'a> {
    pub fn new(stencils: &'a StencilSet) -> Self {
        Self { stencils }
    }

    /// Evaluate `mask` at `ctx`; always in [0,1].
    pub fn evaluate(&self, mask: &Mask, ctx: &SampleContext) -> f64 {
        let v = self.raw(mask, ctx);
        if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
    }

    fn raw(&self, mask: &Mask, ctx: &SampleContext) -> f64 {
        match mask {
            Mask::Constant(v) => *v,
            Mask::Distance(d) => {
                let dx = ctx.x - d.center[0];
                let dz = ctx.z - d.center[1];
                let t = ((dx * dx + dz * dz).sqrt() / d.radius).clamp(0.0, 1.0);
                d.curve.evaluate01(t)
            }
            Mask::Stencil(s) => self.stencil(s, ctx),
            Mask::Height(r) => ctx.height.map_or(1.0, |h| band(h, r.min, r.max, r.blend)),
            Mask::Inclination(r) => ctx
                .inclination
                .map_or(1.0, |i| band(i, r.min, r.max, r.blend)),
            Mask::And(children) => children
                .iter()
                .map(|c| self.evaluate(c, ctx))
                .fold(1.0, f64::min),
            Mask::Or(children) => children
                .iter()
                .map(|c| self.evaluate(c, ctx))
                .fold(0.0, f64::max),
            Mask::Not(inner) => 1.0 - self.evaluate(inner, ctx),
        }
    }

    fn stencil(&self, s: &StencilMask, ctx: &SampleContext) -> f64 {
        // References are checked by `Mask::validate` before any pass runs
        let Some(stencil) = self.stencils.get(&s.stencil) else {
            return 0.0;
        };
        let mut v = stencil.sample(ctx.x, ctx.z);
        if s.invert {
            v = 1.0 - v;
        }
        if s.tolerance > 0.0 {
            v = if v < s.tolerance {
                0.0
            } else {
                (v - s.tolerance) / (1.0 - s.tolerance)
            };
        }
        match &s.blend {
            Some(curve) => curve.evaluate01(v),
            None => v,
        }
    }
}
