//! The landscape document and the generation pass that runs every stage
//! over every tile of it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assets::{AssetLoader, WorldRect};
use crate::backend::Backend;
use crate::compositor::LayerCompositor;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::layer::{Layer, LayerSource};
use crate::mask::Stencil;
use crate::path::{Path, PathConfig};
use crate::placement::{DensityGrid, Placement, PlacementEngine, PlacementRule, TileContext};
use crate::splat::{SplatMap, SplatWeightEngine, TexturingConfig, inclination_map_with};
use crate::world::World;
use crate::writer::{HeightmapWriter, TileCoord, TileLayout};

/// A named stencil raster and the world rectangle it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StencilConfig {
    pub name: String,
    pub asset: String,
    pub area: WorldRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeConfig {
    pub name: String,
    pub seed: u64,
    pub layout: TileLayout,
    /// World height of a normalized height of 1.
    pub terrain_height: f64,
    /// Normalized height every tile starts from.
    pub base_height: f64,
    pub backend: Backend,
    pub stencils: Vec<StencilConfig>,
    pub paths: Vec<PathConfig>,
    pub layers: Vec<Layer>,
    pub textures: TexturingConfig,
    pub placements: Vec<PlacementRule>,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            name: "landscape".to_string(),
            seed: 0,
            layout: TileLayout::default(),
            terrain_height: 1000.0,
            base_height: 0.0,
            backend: Backend::default(),
            stencils: Vec::new(),
            paths: Vec::new(),
            layers: Vec::new(),
            textures: TexturingConfig::default(),
            placements: Vec::new(),
        }
    }
}

fn unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::config(kind, format!("duplicate name `{name}`")));
        }
    }
    Ok(())
}

impl LandscapeConfig {
    /// Checks that need no assets. Everything else is checked while the
    /// stages are built in [`Landscape::new`].
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if !(self.terrain_height.is_finite() && self.terrain_height > 0.0) {
            return Err(Error::config("landscape", "terrain_height must be positive"));
        }
        if !(0.0..=1.0).contains(&self.base_height) {
            return Err(Error::config("landscape", "base_height must be in [0,1]"));
        }
        if self.layers.is_empty() {
            return Err(Error::config("landscape", "layer list is empty"));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            layer.validate(&format!("layer[{index}] '{}'", layer.name))?;
        }
        self.textures.validate()?;
        unique("stencils", self.stencils.iter().map(|s| s.name.as_str()))?;
        unique("paths", self.paths.iter().map(|p| p.name.as_str()))?;
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.layout.resolution = resolution;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

/// Every output of one tile.
#[derive(Debug, Clone)]
pub struct TileOutput {
    pub coord: TileCoord,
    pub origin: [f64; 2],
    pub heightmap: Grid,
    /// Degrees.
    pub inclination: Grid,
    pub splatmap: SplatMap,
    pub placements: Vec<Placement>,
    pub grass: Vec<DensityGrid>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub name: String,
    pub layout: TileLayout,
    pub terrain_height: f64,
    pub texture_names: Vec<String>,
    pub tiles: Vec<TileOutput>,
}

impl GenerationOutput {
    pub fn tile(&self, coord: TileCoord) -> Option<&TileOutput> {
        self.tiles.iter().find(|t| t.coord == coord)
    }

    pub fn placement_count(&self) -> usize {
        self.tiles.iter().map(|t| t.placements.len()).sum()
    }
}

/// A validated landscape with every stage built and every asset loaded.
pub struct Landscape {
    config: LandscapeConfig,
    world: World,
    compositor: LayerCompositor,
    splat: SplatWeightEngine,
    placement: PlacementEngine,
}

impl std::fmt::Debug for Landscape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Landscape")
            .field("name", &self.config.name)
            .field("layers", &self.compositor.len())
            .field("textures", &self.splat.rule_count())
            .field("placements", &self.placement.rule_count())
            .finish()
    }
}

impl Landscape {
    /// Validate `config` and load its assets. Fails before any grid is
    /// computed.
    pub fn new(config: LandscapeConfig, loader: &dyn AssetLoader) -> Result<Self> {
        config.validate()?;
        let mut world = World::new(config.terrain_height);

        for stencil in &config.stencils {
            let context = format!("stencil '{}'", stencil.name);
            let raster = Arc::new(loader.load_raster(&stencil.asset)?);
            world.insert_stencil(&stencil.name, Stencil::new(raster, stencil.area, &context)?);
        }
        for layer in &config.layers {
            if let LayerSource::Image(image) = &layer.source {
                if world.raster(&image.asset).is_none() {
                    let raster = loader.load_raster(&image.asset)?;
                    world.insert_raster(&image.asset, Arc::new(raster));
                }
            }
        }

        let mut paths = config
            .paths
            .iter()
            .map(Path::from_config)
            .collect::<Result<Vec<_>>>()?;
        if paths.iter().any(Path::snaps_to_terrain) {
            // Snap against the terrain as it is without any path carving
            let terrain: Vec<Layer> = config
                .layers
                .iter()
                .filter(|l| !matches!(l.source, LayerSource::Path(_)))
                .cloned()
                .collect();
            let compositor = LayerCompositor::new(config.seed, &terrain, &world)?;
            for path in paths.iter_mut().filter(|p| p.snaps_to_terrain()) {
                path.snap(|x, z| {
                    compositor.height_at(x, z, config.base_height) * config.terrain_height
                });
                debug!(path = path.name(), "snapped path to terrain");
            }
        }
        for path in paths {
            world.insert_path(path);
        }

        let compositor = LayerCompositor::new(config.seed, &config.layers, &world)?;
        let splat = SplatWeightEngine::new(config.seed, &config.textures, &world)?;
        let placement = PlacementEngine::new(
            config.seed,
            &config.placements,
            &world,
            config.textures.rules.len(),
        )?;
        info!(
            name = %config.name,
            layers = compositor.len(),
            textures = splat.rule_count(),
            placements = placement.rule_count(),
            "landscape ready"
        );
        Ok(Self {
            config,
            world,
            compositor,
            splat,
            placement,
        })
    }

    pub fn config(&self) -> &LandscapeConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn compositor(&self) -> &LayerCompositor {
        &self.compositor
    }

    pub fn splat_engine(&self) -> &SplatWeightEngine {
        &self.splat
    }

    pub fn placement_engine(&self) -> &PlacementEngine {
        &self.placement
    }

    pub fn generate_tile(&self, coord: TileCoord) -> Result<TileOutput> {
        let layout = &self.config.layout;
        let backend = self.config.backend;
        if coord.x >= layout.tiles_x || coord.z >= layout.tiles_z {
            return Err(Error::config(
                "landscape",
                format!("tile {coord} is outside the layout"),
            ));
        }
        let origin = layout.tile_origin(coord);
        let writer = HeightmapWriter::new(&self.compositor, self.config.base_height, backend);
        let heightmap = writer.write_tile(layout, coord)?;
        // Border slopes read one sample into the neighbouring tile so both
        // sides of a shared edge agree.
        let inclination = inclination_map_with(
            &heightmap,
            layout.step(),
            self.config.terrain_height,
            backend,
            |i, j| writer.sample(layout, coord, i, j),
        );
        let splatmap = self
            .splat
            .compute_weights_with(&heightmap, &inclination, backend, |i, j| {
                layout.world_position(coord, i, j)
            });
        let ctx = TileContext {
            coord,
            origin,
            tile_size: layout.tile_size,
            terrain_height: self.config.terrain_height,
            heightmap: &heightmap,
            inclination: &inclination,
            splatmap: &splatmap,
        };
        let placements = self.placement.place_all(&ctx, backend);
        let grass = self.placement.grass_all(&ctx, backend);
        debug!(tile = %coord, placements = placements.len(), "tile generated");
        Ok(TileOutput {
            coord,
            origin,
            heightmap,
            inclination,
            splatmap,
            placements,
            grass,
        })
    }

    /// Run every stage over every tile, one task per tile.
    pub fn generate(&self) -> Result<GenerationOutput> {
        let layout = &self.config.layout;
        info!(
            name = %self.config.name,
            tiles = layout.tile_count(),
            resolution = layout.resolution,
            backend = self.config.backend.name(),
            "generating landscape"
        );
        let tiles = self
            .config
            .backend
            .map(layout.tile_count(), |index| {
                self.generate_tile(layout.tile_at(index))
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let output = GenerationOutput {
            name: self.config.name.clone(),
            layout: layout.clone(),
            terrain_height: self.config.terrain_height,
            texture_names: self.splat.names().map(str::to_string).collect(),
            tiles,
        };
        info!(placements = output.placement_count(), "generation finished");
        Ok(output)
    }
}
