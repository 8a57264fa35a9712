//! Composes an ordered layer list into one normalized height field.
//!
//! The compositor is a pure function of world coordinates plus the base
//! height under the point, which is what makes adjacent tiles agree on
//! their shared edges.

use std::sync::Arc;

use tracing::debug;

use crate::assets::{Raster, WorldRect};
use crate::backend::Backend;
use crate::curve::Curve;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::layer::{AreaRect, BlendMode, Layer, LayerSource, PathSource};
use crate::mask::{Mask, MaskEngine, SampleContext, StencilSet, compile_filters};
use crate::noise_field::{NoiseField, NoiseParams};
use crate::path::Path;
use crate::world::World;

// splitmix64 finalizer, used to derive independent seeds
pub(crate) fn mix_seed(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum Source {
    Noise {
        field: NoiseField,
        params: NoiseParams,
    },
    Image {
        raster: Arc<Raster>,
        area: WorldRect,
    },
    Path {
        path: Arc<Path>,
        source: PathSource,
    },
}

struct CompiledLayer {
    name: String,
    source: Source,
    mode: BlendMode,
    strength: f64,
    height_offset: f64,
    invert: bool,
    output_curve: Option<Curve>,
    additive_curve: Option<Curve>,
    subtractive_curve: Option<Curve>,
    area: Option<AreaRect>,
    mask: Option<Mask>,
}

pub struct LayerCompositor {
    layers: Vec<CompiledLayer>,
    stencils: Arc<StencilSet>,
    terrain_height: f64,
}

impl LayerCompositor {
    /// Compile `layers` against the world. Disabled layers are dropped;
    /// dangling stencil, raster or path references are configuration errors.
    pub fn new(seed: u64, layers: &[Layer], world: &World) -> Result<Self> {
        let mut compiled = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let context = format!("layer[{index}] '{}'", layer.name);
            layer.validate(&context)?;
            if !layer.enabled {
                debug!(layer = %layer.name, "skipping disabled layer");
                continue;
            }

            let source = match &layer.source {
                LayerSource::Noise(params) => {
                    let layer_seed = mix_seed(seed ^ mix_seed(index as u64) ^ layer.seed_offset);
                    Source::Noise {
                        field: NoiseField::new(layer_seed, params.basis),
                        params: params.clone(),
                    }
                }
                LayerSource::Image(image) => {
                    let raster = world.raster(&image.asset).ok_or_else(|| {
                        Error::config(&context, format!("image asset `{}` not loaded", image.asset))
                    })?;
                    Source::Image {
                        raster: Arc::clone(raster),
                        area: image.area,
                    }
                }
                LayerSource::Path(source) => {
                    let path = world.path(&source.path).ok_or_else(|| {
                        Error::config(&context, format!("unknown path `{}`", source.path))
                    })?;
                    Source::Path {
                        path: Arc::clone(path),
                        source: source.clone(),
                    }
                }
            };

            let mask = compile_filters(&layer.filters);
            if let Some(mask) = &mask {
                mask.validate(world.stencils(), &context)?;
            }

            compiled.push(CompiledLayer {
                name: layer.name.clone(),
                source,
                mode: layer.mode(),
                strength: layer.strength,
                height_offset: layer.height_offset,
                invert: layer.invert,
                output_curve: layer.output_curve.clone(),
                additive_curve: layer.additive_curve.clone(),
                subtractive_curve: layer.subtractive_curve.clone(),
                area: layer.area,
                mask,
            });
        }

        Ok(Self {
            layers: compiled,
            stencils: world.shared_stencils(),
            terrain_height: world.terrain_height(),
        })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name.as_str())
    }

    // (value in [0,1], coverage in [0,1])
    fn source_value(&self, source: &Source, x: f64, z: f64) -> (f64, f64) {
        match source {
            Source::Noise { field, params } => (field.sample01(x, z, params), 1.0),
            Source::Image { raster, area } => {
                if !area.contains(x, z) {
                    return (0.0, 0.0);
                }
                let (u, v) = area.to_local(x, z);
                (raster.sample(u, v), 1.0)
            }
            Source::Path { path, source } => {
                let nearest = path.nearest(x, z);
                let half = nearest.width * 0.5;
                let t = if nearest.distance <= half {
                    0.0
                } else if source.edge_blend > 0.0 && nearest.distance <= half + source.edge_blend {
                    (nearest.distance - half) / source.edge_blend
                } else {
                    return (0.0, 0.0);
                };
                let coverage = source.blend_curve.evaluate01(t);
                let target = match &source.height_curve {
                    Some(curve) => curve.evaluate01(nearest.t),
                    None if self.terrain_height > 0.0 => {
                        (nearest.height / self.terrain_height).clamp(0.0, 1.0)
                    }
                    None => 0.0,
                };
                (target, coverage)
            }
        }
    }

    /// Composited height at world (x, z) on top of `base`.
    pub fn height_at(&self, x: f64, z: f64, base: f64) -> f64 {
        let engine = MaskEngine::new(&self.stencils);
        let mut acc = base;
        for layer in &self.layers {
            let (mut value, coverage) = self.source_value(&layer.source, x, z);
            if coverage <= 0.0 {
                continue;
            }
            let area = layer.area.map_or(1.0, |a| a.factor(x, z));
            if area <= 0.0 {
                continue;
            }
            let mask = match &layer.mask {
                Some(mask) => engine.evaluate(mask, &SampleContext::at(x, z).with_height(acc)),
                None => 1.0,
            };
            let w = coverage * area * mask;
            if w <= 0.0 {
                continue;
            }

            if layer.invert {
                value = 1.0 - value;
            }
            if let Some(curve) = &layer.output_curve {
                value = curve.evaluate(value);
            }
            let amount = value * layer.strength + layer.height_offset;

            acc = match layer.mode {
                BlendMode::Add => {
                    let amount = layer
                        .additive_curve
                        .as_ref()
                        .map_or(amount, |c| c.evaluate(amount));
                    acc + amount * w
                }
                BlendMode::Subtract => {
                    let amount = layer
                        .subtractive_curve
                        .as_ref()
                        .map_or(amount, |c| c.evaluate(amount));
                    acc - amount * w
                }
                BlendMode::Set => acc + (amount - acc) * w,
                BlendMode::Flatten { target } => {
                    let target = target.unwrap_or(amount);
                    acc + (target - acc) * w
                }
            };
        }
        if acc.is_finite() { acc.clamp(0.0, 1.0) } else { 0.0 }
    }

    /// Composite over `base` with grid point (i, j) at world `position(i, j)`.
    pub fn composite_with<P>(&self, base: &Grid, backend: Backend, position: P) -> Grid
    where
        P: Fn(usize, usize) -> (f64, f64) + Sync,
    {
        if self.layers.is_empty() {
            return base.clone();
        }
        let resolution = base.resolution();
        let data = backend.fill_grid(resolution, |i, j| {
            let (x, z) = position(i, j);
            self.height_at(x, z, base.get(i, j) as f64) as f32
        });
        Grid::from_parts(resolution, data)
    }

    /// Composite over `base` covering the square tile at `origin` with side
    /// `tile_size`. An empty layer list returns `base` untouched.
    pub fn composite(&self, base: &Grid, origin: [f64; 2], tile_size: f64, backend: Backend) -> Grid {
        let step = tile_size / (base.resolution() - 1) as f64;
        self.composite_with(base, backend, |i, j| {
            (origin[0] + i as f64 * step, origin[1] + j as f64 * step)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ImageSource, LayerBuilder};
    use crate::mask::{DistanceMask, Filter, Stencil};
    use crate::noise_field::NoiseBasis;
    use glam::DVec3;

    fn flat_world() -> World {
        World::new(100.0)
    }

    fn constant_layer(name: &str, value: f64) -> LayerBuilder {
        // the output curve flattens whatever the noise produced
        LayerBuilder::perlin_base(
            name,
            NoiseParams {
                octaves: 1,
                ..NoiseParams::default()
            },
        )
        .output_curve(Curve::constant(value).unwrap())
    }

    #[test]
    fn empty_layer_list_is_identity() {
        let base = Grid::from_vec(3, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 1.5]).unwrap();
        let c = LayerCompositor::new(1, &[], &flat_world()).unwrap();
        let out = c.composite(&base, [0.0, 0.0], 10.0, Backend::Serial);
        assert_eq!(out, base);
    }

    #[test]
    fn modes_combine_in_order() {
        let world = flat_world();
        let layers = vec![
            constant_layer("a", 0.5).build().unwrap(),
            constant_layer("b", 0.25)
                .mode(BlendMode::Subtract)
                .build()
                .unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &world).unwrap();
        assert!((c.height_at(3.0, 4.0, 0.0) - 0.25).abs() < 1e-12);

        let layers = vec![
            constant_layer("a", 0.9).build().unwrap(),
            constant_layer("b", 0.2).mode(BlendMode::Set).build().unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &world).unwrap();
        assert!((c.height_at(3.0, 4.0, 0.0) - 0.2).abs() < 1e-12);

        let layers = vec![
            constant_layer("a", 0.9).build().unwrap(),
            constant_layer("b", 0.0)
                .mode(BlendMode::Flatten { target: Some(0.4) })
                .build()
                .unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &world).unwrap();
        assert!((c.height_at(3.0, 4.0, 0.0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn disabled_layers_are_skipped() {
        let layers = vec![constant_layer("off", 0.7).enabled(false).build().unwrap()];
        let c = LayerCompositor::new(1, &layers, &flat_world()).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn output_is_clamped_to_unit_range() {
        let layers = vec![
            constant_layer("a", 0.8).build().unwrap(),
            constant_layer("b", 0.8).build().unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &flat_world()).unwrap();
        assert_eq!(c.height_at(0.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn area_restriction_limits_the_layer() {
        let layers = vec![
            constant_layer("bump", 0.6)
                .area(AreaRect {
                    center: [50.0, 50.0],
                    size: [20.0, 20.0],
                    rotation_degrees: 0.0,
                    blend_distance: 0.0,
                })
                .build()
                .unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &flat_world()).unwrap();
        assert!((c.height_at(50.0, 50.0, 0.1) - 0.7).abs() < 1e-12);
        assert!((c.height_at(0.0, 0.0, 0.1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn distance_filter_attenuates() {
        let layers = vec![
            constant_layer("hill", 1.0)
                .filter(Filter::and(Mask::Distance(DistanceMask {
                    center: [0.0, 0.0],
                    radius: 100.0,
                    curve: Curve::hill(),
                })))
                .build()
                .unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &flat_world()).unwrap();
        assert_eq!(c.height_at(0.0, 0.0, 0.0), 1.0);
        assert_eq!(c.height_at(200.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn image_layer_sets_inside_its_rectangle() {
        let mut world = flat_world();
        world.insert_raster(
            "mesa.raw",
            Arc::new(Raster::new(2, 2, vec![0.8, 0.8, 0.8, 0.8]).unwrap()),
        );
        let layers = vec![
            LayerBuilder::image(
                "mesa",
                ImageSource {
                    asset: "mesa.raw".into(),
                    area: WorldRect::new([0.0, 0.0], [10.0, 10.0]),
                },
            )
            .build()
            .unwrap(),
        ];
        let c = LayerCompositor::new(1, &layers, &world).unwrap();
        assert!((c.height_at(5.0, 5.0, 0.2) - 0.8).abs() < 1e-6);
        assert!((c.height_at(50.0, 5.0, 0.2) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn path_flatten_only_inside_influence() {
        let mut world = flat_world();
        world.insert_path(
            Path::builder("road")
                .point(DVec3::new(0.0, 30.0, 50.0), 10.0)
                .point(DVec3::new(100.0, 30.0, 50.0), 10.0)
                .build()
                .unwrap(),
        );
        let mut source = PathSource::new("road");
        source.edge_blend = 10.0;
        let layers = vec![LayerBuilder::path("road_bed", source).build().unwrap()];
        let c = LayerCompositor::new(1, &layers, &world).unwrap();
        // on the road: flattened to 30 / 100
        assert!((c.height_at(50.0, 52.0, 0.9) - 0.3).abs() < 1e-12);
        // in the blend band: between
        let mid = c.height_at(50.0, 60.0, 0.9);
        assert!(mid > 0.3 && mid < 0.9);
        // beyond influence: untouched
        assert!((c.height_at(50.0, 80.0, 0.9) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn dangling_references_fail() {
        let layers = vec![LayerBuilder::path("x", PathSource::new("nowhere")).build().unwrap()];
        assert!(matches!(
            LayerCompositor::new(1, &layers, &flat_world()),
            Err(Error::Configuration { .. })
        ));

        let layers = vec![
            constant_layer("masked", 1.0)
                .filter(Filter::and(Mask::Stencil(crate::mask::StencilMask {
                    stencil: "ghost".into(),
                    invert: false,
                    tolerance: 0.0,
                    blend: None,
                })))
                .build()
                .unwrap(),
        ];
        assert!(LayerCompositor::new(1, &layers, &flat_world()).is_err());

        let mut world = flat_world();
        world.insert_stencil(
            "ghost",
            Stencil::new(
                Arc::new(Raster::new(1, 1, vec![1.0]).unwrap()),
                WorldRect::new([0.0, 0.0], [1.0, 1.0]),
                "ghost",
            )
            .unwrap(),
        );
        assert!(LayerCompositor::new(1, &layers, &world).is_ok());
    }

    #[test]
    fn noise_layers_are_deterministic() {
        let layers = vec![
            LayerBuilder::perlin_base(
                "base",
                NoiseParams {
                    basis: NoiseBasis::Simplex,
                    warp_amount: 0.2,
                    ..NoiseParams::default()
                },
            )
            .build()
            .unwrap(),
        ];
        let a = LayerCompositor::new(7, &layers, &flat_world()).unwrap();
        let b = LayerCompositor::new(7, &layers, &flat_world()).unwrap();
        for i in 0..20 {
            let x = i as f64 * 13.1;
            assert_eq!(
                a.height_at(x, -x, 0.0).to_bits(),
                b.height_at(x, -x, 0.0).to_bits()
            );
        }
    }
}
