//! Object placement: trees, grass, meshes and group members scattered over
//! a tile under height, slope, texture, path and filter constraints, or laid
//! out along a path.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use glam::{DVec2, DVec3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::compositor::mix_seed;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::mask::{Filter, Mask, MaskEngine, SampleContext, StencilSet, band, compile_filters};
use crate::noise_field::{NoiseField, NoiseParams};
use crate::path::Path;
use crate::splat::SplatMap;
use crate::world::World;
use crate::writer::TileCoord;

const SQUARE_METRES_PER_KM2: f64 = 1.0e6;
// Candidates generated per requested instance
const CANDIDATE_OVERSAMPLE: usize = 4;
const MAX_CANDIDATES: usize = 1 << 20;
/// Upper bound on area-layout instances of one rule in one tile.
pub const MAX_PLACEMENTS_PER_TILE: usize = 1 << 16;
const POISSON_ATTEMPTS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    #[default]
    Tree,
    Grass,
    Mesh,
    GroupMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateMethod {
    #[default]
    JitteredGrid,
    PoissonDisc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    #[default]
    Random,
    Alternating,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementLayout {
    /// Scatter over the tile at the rule's density.
    #[default]
    Area,
    /// One instance every `spacing` world units along a path.
    PathSpacing {
        path: String,
        spacing: f64,
        #[serde(default)]
        offset: f64,
    },
    /// Exactly `count` instances spread along a path.
    PathExactQuantity {
        path: String,
        count: usize,
        #[serde(default)]
        offset: f64,
    },
}

impl PlacementLayout {
    fn path(&self) -> Option<&str> {
        match self {
            PlacementLayout::Area => None,
            PlacementLayout::PathSpacing { path, .. }
            | PlacementLayout::PathExactQuantity { path, .. } => Some(path),
        }
    }

    fn offset(&self) -> f64 {
        match self {
            PlacementLayout::Area => 0.0,
            PlacementLayout::PathSpacing { offset, .. }
            | PlacementLayout::PathExactQuantity { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Radius around an existing placement that clustered candidates fall in.
    pub distance: f64,
    /// Probability in [0,1] that a candidate is drawn near an existing one.
    pub density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureConstraint {
    pub texture: usize,
    pub min_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementNoise {
    pub params: NoiseParams,
    /// Candidates where the [0,1] noise is below this are rejected.
    pub cutoff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
    /// One factor on every axis; otherwise width (x, z) and height vary apart.
    #[serde(default = "default_uniform")]
    pub uniform: bool,
}

fn default_uniform() -> bool {
    true
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 1.0,
            uniform: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementRule {
    pub name: String,
    pub kind: PlacementKind,
    pub prefabs: Vec<String>,
    pub selection: SelectionMethod,
    /// Instances per square kilometre.
    pub density: f64,
    pub layout: PlacementLayout,
    pub candidates: CandidateMethod,
    /// Minimum distance between instances of this rule; 0 disables it.
    pub min_proximity: f64,
    /// Normalized heights.
    pub min_height: f64,
    pub max_height: f64,
    /// Degrees.
    pub min_inclination: f64,
    pub max_inclination: f64,
    /// Keep this far from the edge of every path.
    pub path_clearance: Option<f64>,
    pub noise: Option<PlacementNoise>,
    pub texture: Option<TextureConstraint>,
    pub filters: Vec<Filter>,
    pub cluster: Option<ClusterParams>,
    pub scale: ScaleRange,
    /// Y rotation range, degrees.
    pub rotation: [f64; 2],
    pub y_offset: f64,
    /// Grass only: value of a fully covered cell in the density grid.
    pub max_patch_density: u8,
}

impl Default for PlacementRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: PlacementKind::Tree,
            prefabs: Vec::new(),
            selection: SelectionMethod::Random,
            density: 0.0,
            layout: PlacementLayout::Area,
            candidates: CandidateMethod::JitteredGrid,
            min_proximity: 0.0,
            min_height: 0.0,
            max_height: 1.0,
            min_inclination: 0.0,
            max_inclination: 90.0,
            path_clearance: None,
            noise: None,
            texture: None,
            filters: Vec::new(),
            cluster: None,
            scale: ScaleRange::default(),
            rotation: [0.0, 360.0],
            y_offset: 0.0,
            max_patch_density: 16,
        }
    }
}

fn ordered(min: f64, max: f64) -> bool {
    min.is_finite() && max.is_finite() && min <= max
}

impl PlacementRule {
    pub fn builder(name: impl Into<String>, kind: PlacementKind) -> PlacementRuleBuilder {
        PlacementRuleBuilder::new(name, kind)
    }

    pub fn validate(&self, context: &str) -> Result<()> {
        if self.prefabs.is_empty() {
            return Err(Error::config(context, "at least one prefab is required"));
        }
        if !(self.density.is_finite() && self.density >= 0.0) {
            return Err(Error::config(context, "density must be non-negative"));
        }
        if !(self.min_proximity.is_finite() && self.min_proximity >= 0.0) {
            return Err(Error::config(context, "min_proximity must be non-negative"));
        }
        if !ordered(self.min_height, self.max_height) {
            return Err(Error::config(context, "invalid height range"));
        }
        if !ordered(self.min_inclination, self.max_inclination) {
            return Err(Error::config(context, "invalid inclination range"));
        }
        if !ordered(self.rotation[0], self.rotation[1]) {
            return Err(Error::config(context, "invalid rotation range"));
        }
        if !(ordered(self.scale.min, self.scale.max) && self.scale.min > 0.0) {
            return Err(Error::config(context, "scale range must be positive and ordered"));
        }
        if !self.y_offset.is_finite() {
            return Err(Error::config(context, "y_offset must be finite"));
        }
        if let Some(clearance) = self.path_clearance {
            if !(clearance.is_finite() && clearance >= 0.0) {
                return Err(Error::config(context, "path clearance must be non-negative"));
            }
        }
        if let Some(noise) = &self.noise {
            noise.params.validate(context)?;
            if !(0.0..=1.0).contains(&noise.cutoff) {
                return Err(Error::config(context, "noise cutoff must be in [0,1]"));
            }
        }
        if let Some(texture) = &self.texture {
            if !(0.0..=1.0).contains(&texture.min_weight) {
                return Err(Error::config(context, "texture min_weight must be in [0,1]"));
            }
        }
        if let Some(cluster) = &self.cluster {
            if !(cluster.distance.is_finite() && cluster.distance > 0.0) {
                return Err(Error::geometry(context, "cluster distance must be positive"));
            }
            if !(0.0..=1.0).contains(&cluster.density) {
                return Err(Error::config(context, "cluster density must be in [0,1]"));
            }
        }
        match &self.layout {
            PlacementLayout::Area => {}
            PlacementLayout::PathSpacing { spacing, offset, .. } => {
                if !(spacing.is_finite() && *spacing > 0.0) {
                    return Err(Error::config(context, "path spacing must be positive"));
                }
                if !offset.is_finite() {
                    return Err(Error::config(context, "path offset must be finite"));
                }
            }
            PlacementLayout::PathExactQuantity { offset, .. } => {
                if !offset.is_finite() {
                    return Err(Error::config(context, "path offset must be finite"));
                }
            }
        }
        Ok(())
    }
}

pub struct PlacementRuleBuilder {
    rule: PlacementRule,
}

impl PlacementRuleBuilder {
    pub fn new(name: impl Into<String>, kind: PlacementKind) -> Self {
        Self {
            rule: PlacementRule {
                name: name.into(),
                kind,
                ..PlacementRule::default()
            },
        }
    }

    pub fn prefab(mut self, prefab: impl Into<String>) -> Self {
        self.rule.prefabs.push(prefab.into());
        self
    }

    pub fn selection(mut self, selection: SelectionMethod) -> Self {
        self.rule.selection = selection;
        self
    }

    pub fn density(mut self, per_km2: f64) -> Self {
        self.rule.density = per_km2;
        self
    }

    pub fn layout(mut self, layout: PlacementLayout) -> Self {
        self.rule.layout = layout;
        self
    }

    pub fn candidates(mut self, method: CandidateMethod) -> Self {
        self.rule.candidates = method;
        self
    }

    pub fn min_proximity(mut self, distance: f64) -> Self {
        self.rule.min_proximity = distance;
        self
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

    pub fn path_clearance(mut self, distance: f64) -> Self {
        self.rule.path_clearance = Some(distance);
        self
    }

    pub fn noise(mut self, params: NoiseParams, cutoff: f64) -> Self {
        self.rule.noise = Some(PlacementNoise { params, cutoff });
        self
    }

    pub fn texture(mut self, texture: usize, min_weight: f64) -> Self {
        self.rule.texture = Some(TextureConstraint {
            texture,
            min_weight,
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.rule.filters.push(filter);
        self
    }

    pub fn cluster(mut self, distance: f64, density: f64) -> Self {
        self.rule.cluster = Some(ClusterParams { distance, density });
        self
    }

    pub fn scale(mut self, min: f64, max: f64, uniform: bool) -> Self {
        self.rule.scale = ScaleRange { min, max, uniform };
        self
    }

    pub fn rotation(mut self, min_degrees: f64, max_degrees: f64) -> Self {
        self.rule.rotation = [min_degrees, max_degrees];
        self
    }

    pub fn y_offset(mut self, offset: f64) -> Self {
        self.rule.y_offset = offset;
        self
    }

    pub fn max_patch_density(mut self, density: u8) -> Self {
        self.rule.max_patch_density = density;
        self
    }

    pub fn build(self) -> Result<PlacementRule> {
        let context = format!("placement '{}'", self.rule.name);
        self.rule.validate(&context)?;
        Ok(self.rule)
    }
}

/// One placed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub rule: String,
    pub kind: PlacementKind,
    pub prefab: String,
    /// World position; y is terrain height plus the rule's offset.
    pub position: DVec3,
    pub rotation_y_degrees: f64,
    pub scale: DVec3,
}

/// Per-cell grass density for one tile, row-major like [`Grid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityGrid {
    pub rule: String,
    resolution: usize,
    data: Vec<u8>,
}

impl DensityGrid {
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: usize, z: usize) -> u8 {
        let x = x.min(self.resolution - 1);
        let z = z.min(self.resolution - 1);
        self.data[z * self.resolution + x]
    }
}

/// Everything placement reads about one generated tile.
#[derive(Debug, Clone, Copy)]
pub struct TileContext<'a> {
    pub coord: TileCoord,
    pub origin: [f64; 2],
    pub tile_size: f64,
    pub terrain_height: f64,
    pub heightmap: &'a Grid,
    pub inclination: &'a Grid,
    pub splatmap: &'a SplatMap,
}

impl TileContext<'_> {
    fn local(&self, p: DVec2) -> (f64, f64) {
        (
            (p.x - self.origin[0]) / self.tile_size,
            (p.y - self.origin[1]) / self.tile_size,
        )
    }

    // Half-open so a point on a shared edge belongs to exactly one tile
    fn contains(&self, p: DVec2) -> bool {
        let (u, v) = self.local(p);
        (0.0..1.0).contains(&u) && (0.0..1.0).contains(&v)
    }
}

struct SpatialHash {
    cell: f64,
    buckets: HashMap<(i64, i64), Vec<DVec2>>,
}

impl SpatialHash {
    fn new(cell: f64) -> Self {
        Self {
            cell,
            buckets: HashMap::new(),
        }
    }

    fn key(&self, p: DVec2) -> (i64, i64) {
        ((p.x / self.cell).floor() as i64, (p.y / self.cell).floor() as i64)
    }

    fn insert(&mut self, p: DVec2) {
        let key = self.key(p);
        self.buckets.entry(key).or_default().push(p);
    }

    fn any_within(&self, p: DVec2, radius: f64) -> bool {
        let (cx, cz) = self.key(p);
        let r2 = radius * radius;
        (cx - 1..=cx + 1).any(|x| {
            (cz - 1..=cz + 1).any(|z| {
                self.buckets
                    .get(&(x, z))
                    .is_some_and(|pts| pts.iter().any(|q| q.distance_squared(p) < r2))
            })
        })
    }
}

fn jittered_grid(rng: &mut ChaCha8Rng, size: f64, count: usize) -> Vec<DVec2> {
    let n = (count as f64).sqrt().ceil().max(1.0) as usize;
    let cell = size / n as f64;
    let mut points = Vec::with_capacity(n * n);
    for z in 0..n {
        for x in 0..n {
            points.push(DVec2::new(
                (x as f64 + rng.random::<f64>()) * cell,
                (z as f64 + rng.random::<f64>()) * cell,
            ));
        }
    }
    points.shuffle(rng);
    points
}

/// Bridson's Poisson-disc sampling over `[0, size)²`.
fn poisson_disc(rng: &mut ChaCha8Rng, size: f64, radius: f64, limit: usize) -> Vec<DVec2> {
    let cell = radius / std::f64::consts::SQRT_2;
    let n = (size / cell).ceil() as usize;
    if n == 0 || n.saturating_mul(n) > MAX_CANDIDATES * 4 {
        return jittered_grid(rng, size, limit);
    }
    let mut grid: Vec<Option<usize>> = vec![None; n * n];
    let index = |p: DVec2| {
        let x = ((p.x / cell) as usize).min(n - 1);
        let z = ((p.y / cell) as usize).min(n - 1);
        (x, z)
    };

    let first = DVec2::new(rng.random::<f64>() * size, rng.random::<f64>() * size);
    let mut points = vec![first];
    let mut active = vec![0usize];
    let (fx, fz) = index(first);
    grid[fz * n + fx] = Some(0);

    while !active.is_empty() && points.len() < limit {
        let slot = rng.random_range(0..active.len());
        let centre = points[active[slot]];
        let mut found = false;
        for _ in 0..POISSON_ATTEMPTS {
            let angle = rng.random::<f64>() * TAU;
            let dist = radius * (1.0 + rng.random::<f64>());
            let p = centre + DVec2::new(angle.cos(), angle.sin()) * dist;
            if !(0.0..size).contains(&p.x) || !(0.0..size).contains(&p.y) {
                continue;
            }
            let (px, pz) = index(p);
            let clear = (pz.saturating_sub(2)..=(pz + 2).min(n - 1)).all(|z| {
                (px.saturating_sub(2)..=(px + 2).min(n - 1)).all(|x| {
                    grid[z * n + x].is_none_or(|i| points[i].distance_squared(p) >= radius * radius)
                })
            });
            if clear {
                grid[pz * n + px] = Some(points.len());
                active.push(points.len());
                points.push(p);
                found = true;
                break;
            }
        }
        if !found {
            active.swap_remove(slot);
        }
    }
    points.shuffle(rng);
    points
}

struct CompiledRule {
    rule: PlacementRule,
    noise: Option<NoiseField>,
    filter: Option<Mask>,
    path: Option<Arc<Path>>,
}

pub struct PlacementEngine {
    seed: u64,
    rules: Vec<CompiledRule>,
    stencils: Arc<StencilSet>,
    paths: Vec<Arc<Path>>,
}

impl PlacementEngine {
    /// `texture_count` bounds the texture constraints of the rules.
    pub fn new(
        seed: u64,
        rules: &[PlacementRule],
        world: &World,
        texture_count: usize,
    ) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            let context = format!("placement[{index}] '{}'", rule.name);
            rule.validate(&context)?;
            if let Some(texture) = &rule.texture {
                if texture.texture >= texture_count {
                    return Err(Error::config(
                        &context,
                        format!(
                            "texture {} out of range for {texture_count} textures",
                            texture.texture
                        ),
                    ));
                }
            }
            let filter = compile_filters(&rule.filters);
            if let Some(mask) = &filter {
                mask.validate(world.stencils(), &context)?;
            }
            let path = match rule.layout.path() {
                Some(name) => Some(world.path(name).cloned().ok_or_else(|| {
                    Error::config(&context, format!("unknown path `{name}`"))
                })?),
                None => None,
            };
            let noise = rule.noise.as_ref().map(|n| {
                NoiseField::new(
                    mix_seed(seed ^ mix_seed(0xB10C_0000 + index as u64)),
                    n.params.basis,
                )
            });
            compiled.push(CompiledRule {
                rule: rule.clone(),
                noise,
                filter,
                path,
            });
        }
        Ok(Self {
            seed,
            rules: compiled,
            stencils: world.shared_stencils(),
            paths: world.paths().cloned().collect(),
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = &PlacementRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    fn rng(&self, index: usize, coord: TileCoord) -> ChaCha8Rng {
        let tile = ((coord.x as u64) << 32) | coord.z as u64;
        ChaCha8Rng::seed_from_u64(mix_seed(
            self.seed ^ mix_seed(index as u64 + 1) ^ mix_seed(tile ^ 0x7113_0000_0000_0000),
        ))
    }

    /// How strongly a point qualifies, in [0,1]. Hard constraints give 0
    /// or 1; the filter expression contributes its fuzzy value.
    fn coverage(
        &self,
        compiled: &CompiledRule,
        ctx: &TileContext<'_>,
        p: DVec2,
        height: f64,
        inclination: f64,
    ) -> f64 {
        let rule = &compiled.rule;
        if band(height, rule.min_height, rule.max_height, 0.0) <= 0.0
            || band(inclination, rule.min_inclination, rule.max_inclination, 0.0) <= 0.0
        {
            return 0.0;
        }
        if let Some(texture) = &rule.texture {
            let (u, v) = ctx.local(p);
            if ctx.splatmap.sample(texture.texture, u, v) < texture.min_weight {
                return 0.0;
            }
        }
        if let (Some(noise), Some(field)) = (&rule.noise, &compiled.noise) {
            if field.sample01(p.x, p.y, &noise.params) < noise.cutoff {
                return 0.0;
            }
        }
        if let Some(clearance) = rule.path_clearance {
            let blocked = self.paths.iter().any(|path| {
                let n = path.nearest(p.x, p.y);
                n.distance - n.width * 0.5 < clearance
            });
            if blocked {
                return 0.0;
            }
        }
        match &compiled.filter {
            Some(mask) => {
                let sample = SampleContext::at(p.x, p.y)
                    .with_height(height)
                    .with_inclination(inclination);
                MaskEngine::new(&self.stencils).evaluate(mask, &sample)
            }
            None => 1.0,
        }
    }

    fn instance(
        &self,
        rule: &PlacementRule,
        ctx: &TileContext<'_>,
        p: DVec2,
        ordinal: usize,
        rng: &mut ChaCha8Rng,
    ) -> Placement {
        let (u, v) = ctx.local(p);
        let y = ctx.heightmap.sample(u, v) * ctx.terrain_height + rule.y_offset;
        let prefab = match rule.selection {
            SelectionMethod::Alternating => ordinal % rule.prefabs.len(),
            SelectionMethod::Random => rng.random_range(0..rule.prefabs.len()),
        };
        let rotation = rng.random_range(rule.rotation[0]..=rule.rotation[1]);
        let range = rule.scale.min..=rule.scale.max;
        let scale = if rule.scale.uniform {
            DVec3::splat(rng.random_range(range))
        } else {
            let width = rng.random_range(range.clone());
            DVec3::new(width, rng.random_range(range), width)
        };
        Placement {
            rule: rule.name.clone(),
            kind: rule.kind,
            prefab: rule.prefabs[prefab].clone(),
            position: DVec3::new(p.x, y, p.y),
            rotation_y_degrees: rotation,
            scale,
        }
    }

    fn place_area(
        &self,
        compiled: &CompiledRule,
        ctx: &TileContext<'_>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Placement> {
        let rule = &compiled.rule;
        let expected = rule.density * ctx.tile_size * ctx.tile_size / SQUARE_METRES_PER_KM2;
        let mut target = expected.floor() as usize;
        if rng.random::<f64>() < expected.fract() {
            target += 1;
        }
        if target == 0 {
            return Vec::new();
        }
        if target > MAX_PLACEMENTS_PER_TILE {
            warn!(
                rule = %rule.name,
                requested = target,
                cap = MAX_PLACEMENTS_PER_TILE,
                "placement count capped"
            );
            target = MAX_PLACEMENTS_PER_TILE;
        }

        let limit = target.saturating_mul(CANDIDATE_OVERSAMPLE).min(MAX_CANDIDATES);
        let candidates = match rule.candidates {
            CandidateMethod::JitteredGrid => jittered_grid(rng, ctx.tile_size, limit),
            CandidateMethod::PoissonDisc => {
                let radius = if rule.min_proximity > 0.0 {
                    rule.min_proximity
                } else {
                    0.5 * ctx.tile_size / (limit as f64).sqrt()
                };
                poisson_disc(rng, ctx.tile_size, radius, limit)
            }
        };

        let origin = DVec2::from(ctx.origin);
        let mut hash = (rule.min_proximity > 0.0).then(|| SpatialHash::new(rule.min_proximity));
        let mut placed: Vec<Placement> = Vec::with_capacity(target);

        for candidate in candidates {
            if placed.len() >= target {
                break;
            }
            let mut p = origin + candidate;
            if let Some(cluster) = &rule.cluster {
                if !placed.is_empty() && rng.random::<f64>() < cluster.density {
                    let anchor = &placed[rng.random_range(0..placed.len())];
                    let angle = rng.random::<f64>() * TAU;
                    let dist = cluster.distance * rng.random::<f64>().sqrt();
                    p = DVec2::new(anchor.position.x, anchor.position.z)
                        + DVec2::new(angle.cos(), angle.sin()) * dist;
                    if !ctx.contains(p) {
                        continue;
                    }
                }
            }
            if hash
                .as_ref()
                .is_some_and(|h| h.any_within(p, rule.min_proximity))
            {
                continue;
            }
            let (u, v) = ctx.local(p);
            let c = self.coverage(
                compiled,
                ctx,
                p,
                ctx.heightmap.sample(u, v),
                ctx.inclination.sample(u, v),
            );
            if c <= 0.0 || (c < 1.0 && rng.random::<f64>() >= c) {
                continue;
            }
            if let Some(h) = &mut hash {
                h.insert(p);
            }
            let ordinal = placed.len();
            placed.push(self.instance(rule, ctx, p, ordinal, rng));
        }
        placed
    }

    fn place_along_path(
        &self,
        compiled: &CompiledRule,
        ctx: &TileContext<'_>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Placement> {
        let Some(path) = &compiled.path else {
            return Vec::new();
        };
        let rule = &compiled.rule;
        let samples = match &rule.layout {
            PlacementLayout::PathSpacing { spacing, .. } => path.walk_spacing(*spacing),
            PlacementLayout::PathExactQuantity { count, .. } => path.walk_count(*count),
            PlacementLayout::Area => Vec::new(),
        };
        let offset = rule.layout.offset();
        let mut placed = Vec::new();
        // Ordinals count along the whole path so alternation continues
        // across tile borders
        for (ordinal, sample) in samples.iter().enumerate() {
            let side = DVec2::new(-sample.direction.y, sample.direction.x);
            let p = DVec2::new(sample.position.x, sample.position.z) + side * offset;
            if ctx.contains(p) {
                placed.push(self.instance(rule, ctx, p, ordinal, rng));
            }
        }
        placed
    }

    /// Placements of rule `index` inside one tile. Deterministic for a
    /// given seed, rule index and tile coordinate.
    pub fn place(&self, index: usize, ctx: &TileContext<'_>) -> Vec<Placement> {
        let Some(compiled) = self.rules.get(index) else {
            return Vec::new();
        };
        let mut rng = self.rng(index, ctx.coord);
        let placed = match compiled.rule.layout {
            PlacementLayout::Area => self.place_area(compiled, ctx, &mut rng),
            _ => self.place_along_path(compiled, ctx, &mut rng),
        };
        debug!(
            rule = %compiled.rule.name,
            tile = %ctx.coord,
            count = placed.len(),
            "placed instances"
        );
        placed
    }

    /// All rules for one tile, in rule order.
    pub fn place_all(&self, ctx: &TileContext<'_>, backend: Backend) -> Vec<Placement> {
        backend
            .map(self.rules.len(), |index| self.place(index, ctx))
            .into_iter()
            .flatten()
            .collect()
    }

    /// Density grid at heightmap resolution for a grass rule scattered by
    /// area. `None` for other rules.
    pub fn grass_density(
        &self,
        index: usize,
        ctx: &TileContext<'_>,
        backend: Backend,
    ) -> Option<DensityGrid> {
        let compiled = self.rules.get(index)?;
        let rule = &compiled.rule;
        if rule.kind != PlacementKind::Grass || rule.layout != PlacementLayout::Area {
            return None;
        }
        let res = ctx.heightmap.resolution();
        let step = ctx.tile_size / (res - 1) as f64;
        let max = if rule.density > 0.0 {
            rule.max_patch_density as f64
        } else {
            0.0
        };
        let cover = backend.fill_grid(res, |i, j| {
            if max == 0.0 {
                return 0.0;
            }
            let p = DVec2::new(
                ctx.origin[0] + i as f64 * step,
                ctx.origin[1] + j as f64 * step,
            );
            self.coverage(
                compiled,
                ctx,
                p,
                ctx.heightmap.get(i, j) as f64,
                ctx.inclination.get(i, j) as f64,
            ) as f32
        });
        let data = cover
            .into_iter()
            .map(|c| (c as f64 * max).round().clamp(0.0, 255.0) as u8)
            .collect();
        Some(DensityGrid {
            rule: rule.name.clone(),
            resolution: res,
            data,
        })
    }

    /// Density grids for every grass rule, in rule order.
    pub fn grass_all(&self, ctx: &TileContext<'_>, backend: Backend) -> Vec<DensityGrid> {
        (0..self.rules.len())
            .filter_map(|index| self.grass_density(index, ctx, backend))
            .collect()
    }
}
