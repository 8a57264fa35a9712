//! Topography layer definitions.
//!
//! A [`Layer`] is an immutable, validated record. Documents deserialize
//! straight into it; code builds it through [`LayerBuilder`].

use serde::{Deserialize, Serialize};

use crate::assets::WorldRect;
use crate::curve::Curve;
use crate::error::{Error, Result};
use crate::mask::{Filter, smoothstep};
use crate::noise_field::NoiseParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    #[default]
    Base,
    Additive,
    Subtractive,
    Image,
    Path,
}

impl LayerKind {
    pub fn default_mode(self) -> BlendMode {
        match self {
            LayerKind::Base | LayerKind::Additive => BlendMode::Add,
            LayerKind::Subtractive => BlendMode::Subtract,
            LayerKind::Image => BlendMode::Set,
            LayerKind::Path => BlendMode::Flatten { target: None },
        }
    }
}

/// How a layer's amount combines with the heights below it.
/// `w` is the layer weight at the point (coverage × area × mask).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// `acc += amount · w`
    #[default]
    Add,
    /// `acc -= amount · w`
    Subtract,
    /// `acc = lerp(acc, amount, w)`
    Set,
    /// `acc = lerp(acc, target, w)`; without a target the amount is used.
    Flatten { target: Option<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Asset path of a RAW16 or grayscale image heightmap.
    pub asset: String,
    pub area: WorldRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSource {
    /// Name of a path in the landscape document.
    pub path: String,
    /// World distance past the path edge over which the layer fades out.
    #[serde(default)]
    pub edge_blend: f64,
    /// Blend factor over normalized distance (0 at the centre line,
    /// 1 at the edge of influence).
    #[serde(default = "PathSource::default_blend_curve")]
    pub blend_curve: Curve,
    /// Target height over the arc-length parameter; when absent the path's
    /// own height divided by the terrain height is used.
    #[serde(default)]
    pub height_curve: Option<Curve>,
}

impl PathSource {
    pub fn default_blend_curve() -> Curve {
        Curve::hill()
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            edge_blend: 0.0,
            blend_curve: Self::default_blend_curve(),
            height_curve: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSource {
    Noise(NoiseParams),
    Image(ImageSource),
    Path(PathSource),
}

/// Rotated rectangle restricting where a layer applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaRect {
    pub center: [f64; 2],
    pub size: [f64; 2],
    #[serde(default)]
    pub rotation_degrees: f64,
    /// Inward distance from the border over which the layer fades in.
    #[serde(default)]
    pub blend_distance: f64,
}

impl AreaRect {
    pub fn validate(&self, context: &str) -> Result<()> {
        let finite = self.center.iter().chain(self.size.iter()).all(|v| v.is_finite())
            && self.rotation_degrees.is_finite()
            && self.blend_distance.is_finite();
        if !finite {
            return Err(Error::geometry(context, "area rectangle values must be finite"));
        }
        if self.size[0] <= 0.0 || self.size[1] <= 0.0 {
            return Err(Error::geometry(
                context,
                format!(
                    "area rectangle extents must be positive, got {} x {}",
                    self.size[0], self.size[1]
                ),
            ));
        }
        if self.blend_distance < 0.0 {
            return Err(Error::config(context, "area blend distance must be non-negative"));
        }
        Ok(())
    }

    /// 1 well inside, 0 outside, smooth over `blend_distance` at the border.
    pub fn factor(&self, x: f64, z: f64) -> f64 {
        let (sin, cos) = (-self.rotation_degrees.to_radians()).sin_cos();
        let dx = x - self.center[0];
        let dz = z - self.center[1];
        let lx = dx * cos - dz * sin;
        let lz = dx * sin + dz * cos;
        // signed distance to the border, negative inside
        let d = (lx.abs() - self.size[0] * 0.5).max(lz.abs() - self.size[1] * 0.5);
        if d > 0.0 {
            0.0
        } else if self.blend_distance <= 0.0 {
            1.0
        } else {
            smoothstep(-d / self.blend_distance)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub kind: LayerKind,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub source: LayerSource,
    /// Falls back to the kind's default mode when unset.
    #[serde(default)]
    pub mode: Option<BlendMode>,
    #[serde(default = "strength_default")]
    pub strength: f64,
    #[serde(default)]
    pub height_offset: f64,
    #[serde(default)]
    pub invert: bool,
    /// Remap of the source value before strength is applied.
    #[serde(default)]
    pub output_curve: Option<Curve>,
    /// Remap of the amount in `Add` mode.
    #[serde(default)]
    pub additive_curve: Option<Curve>,
    /// Remap of the amount in `Subtract` mode.
    #[serde(default)]
    pub subtractive_curve: Option<Curve>,
    #[serde(default)]
    pub area: Option<AreaRect>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Mixed into the landscape seed for this layer's noise.
    #[serde(default)]
    pub seed_offset: u64,
}

fn enabled_default() -> bool {
    true
}

fn strength_default() -> f64 {
    1.0
}

impl Layer {
    pub fn builder(name: impl Into<String>, kind: LayerKind, source: LayerSource) -> LayerBuilder {
        LayerBuilder::new(name, kind, source)
    }

    pub fn mode(&self) -> BlendMode {
        self.mode.unwrap_or_else(|| self.kind.default_mode())
    }

    /// Checks that need nothing but the layer itself. References to
    /// stencils, paths and assets are checked by the landscape.
    pub fn validate(&self, context: &str) -> Result<()> {
        if !self.strength.is_finite() {
            return Err(Error::config(context, "strength must be finite"));
        }
        if !self.height_offset.is_finite() {
            return Err(Error::config(context, "height_offset must be finite"));
        }
        if let BlendMode::Flatten { target: Some(t) } = self.mode() {
            if !t.is_finite() {
                return Err(Error::config(context, "flatten target must be finite"));
            }
        }
        match &self.source {
            LayerSource::Noise(params) => params.validate(context)?,
            LayerSource::Image(image) => {
                if image.asset.is_empty() {
                    return Err(Error::config(context, "image layer needs an asset path"));
                }
                image.area.validate(context)?;
            }
            LayerSource::Path(path) => {
                if path.path.is_empty() {
                    return Err(Error::config(context, "path layer needs a path name"));
                }
                if !(path.edge_blend.is_finite() && path.edge_blend >= 0.0) {
                    return Err(Error::config(context, "edge_blend must be non-negative"));
                }
            }
        }
        if let Some(area) = &self.area {
            area.validate(context)?;
        }
        Ok(())
    }
}

pub struct LayerBuilder {
    layer: Layer,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>, kind: LayerKind, source: LayerSource) -> Self {
        Self {
            layer: Layer {
                name: name.into(),
                kind,
                enabled: true,
                source,
                mode: None,
                strength: 1.0,
                height_offset: 0.0,
                invert: false,
                output_curve: None,
                additive_curve: None,
                subtractive_curve: None,
                area: None,
                filters: Vec::new(),
                seed_offset: 0,
            },
        }
    }

    pub fn perlin_base(name: impl Into<String>, params: NoiseParams) -> Self {
        Self::new(name, LayerKind::Base, LayerSource::Noise(params))
    }

    pub fn additive(name: impl Into<String>, params: NoiseParams) -> Self {
        Self::new(name, LayerKind::Additive, LayerSource::Noise(params))
    }

    pub fn subtractive(name: impl Into<String>, params: NoiseParams) -> Self {
        Self::new(name, LayerKind::Subtractive, LayerSource::Noise(params))
    }

    pub fn image(name: impl Into<String>, source: ImageSource) -> Self {
        Self::new(name, LayerKind::Image, LayerSource::Image(source))
    }

    pub fn path(name: impl Into<String>, source: PathSource) -> Self {
        Self::new(name, LayerKind::Path, LayerSource::Path(source))
    }

    pub fn mode(mut self, mode: BlendMode) -> Self {
        self.layer.mode = Some(mode);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.layer.enabled = enabled;
        self
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.layer.strength = strength;
        self
    }

    pub fn height_offset(mut self, offset: f64) -> Self {
        self.layer.height_offset = offset;
        self
    }

    pub fn invert(mut self, invert: bool) -> Self {
        self.layer.invert = invert;
        self
    }

    pub fn output_curve(mut self, curve: Curve) -> Self {
        self.layer.output_curve = Some(curve);
        self
    }

    pub fn additive_curve(mut self, curve: Curve) -> Self {
        self.layer.additive_curve = Some(curve);
        self
    }

    pub fn subtractive_curve(mut self, curve: Curve) -> Self {
        self.layer.subtractive_curve = Some(curve);
        self
    }

    pub fn area(mut self, area: AreaRect) -> Self {
        self.layer.area = Some(area);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.layer.filters.push(filter);
        self
    }

    pub fn seed_offset(mut self, offset: u64) -> Self {
        self.layer.seed_offset = offset;
        self
    }

    pub fn build(self) -> Result<Layer> {
        let context = format!("layer '{}'", self.layer.name);
        self.layer.validate(&context)?;
        Ok(self.layer)
    }
}
