//! Rasterizes the composited field into per-tile heightmaps.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::compositor::LayerCompositor;
use crate::error::{Error, Result};
use crate::grid::{Grid, HeightmapGrid, validate_resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub z: u32,
}

impl TileCoord {
    pub fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.x, self.z)
    }
}

/// A `tiles_x × tiles_z` grid of square tiles sharing one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayout {
    pub origin: [f64; 2],
    pub tile_size: f64,
    pub tiles_x: u32,
    pub tiles_z: u32,
    pub resolution: usize,
}

impl Default for TileLayout {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            tile_size: 1000.0,
            tiles_x: 1,
            tiles_z: 1,
            resolution: 513,
        }
    }
}

impl TileLayout {
    pub fn validate(&self) -> Result<()> {
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(Error::geometry(
                "tile layout",
                format!("tile size must be positive, got {}", self.tile_size),
            ));
        }
        if !(self.origin[0].is_finite() && self.origin[1].is_finite()) {
            return Err(Error::geometry("tile layout", "origin must be finite"));
        }
        if self.tiles_x == 0 || self.tiles_z == 0 {
            return Err(Error::config("tile layout", "at least one tile is required"));
        }
        validate_resolution(self.resolution, "tile layout")
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_z as usize
    }

    /// Row-major over z, then x.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.tiles_z).flat_map(move |z| (0..self.tiles_x).map(move |x| TileCoord::new(x, z)))
    }

    pub fn tile_at(&self, index: usize) -> TileCoord {
        let tx = self.tiles_x as usize;
        TileCoord::new((index % tx) as u32, (index / tx) as u32)
    }

    /// World distance between neighbouring samples.
    pub fn step(&self) -> f64 {
        self.tile_size / (self.resolution - 1) as f64
    }

    // Positions come from a layout-wide sample index so the shared edge of
    // two tiles is computed from identical coordinates.
    pub fn world_position(&self, coord: TileCoord, i: usize, j: usize) -> (f64, f64) {
        self.world_position_at(coord, i as i64, j as i64)
    }

    /// Like [`world_position`](Self::world_position) but the sample index may
    /// fall outside the tile, e.g. -1 for the neighbour across the west edge.
    pub fn world_position_at(&self, coord: TileCoord, i: i64, j: i64) -> (f64, f64) {
        let span = (self.resolution - 1) as f64;
        let step = self.step();
        (
            self.origin[0] + (coord.x as f64 * span + i as f64) * step,
            self.origin[1] + (coord.z as f64 * span + j as f64) * step,
        )
    }

    pub fn tile_origin(&self, coord: TileCoord) -> [f64; 2] {
        let (x, z) = self.world_position(coord, 0, 0);
        [x, z]
    }

    /// Tile-local (u, v) in [0,1] of a world point.
    pub fn local(&self, coord: TileCoord, x: f64, z: f64) -> (f64, f64) {
        let o = self.tile_origin(coord);
        ((x - o[0]) / self.tile_size, (z - o[1]) / self.tile_size)
    }
}

pub struct HeightmapWriter<'a> {
    compositor: &'a LayerCompositor,
    base_height: f64,
    backend: Backend,
}

impl<'a> HeightmapWriter<'a> {
    pub fn new(compositor: &'a LayerCompositor, base_height: f64, backend: Backend) -> Self {
        Self {
            compositor,
            base_height,
            backend,
        }
    }

    fn base(&self, resolution: usize) -> Result<Grid> {
        Grid::filled(resolution, self.base_height as f32)
    }

    /// One tile at `tile_origin` with side `tile_size`.
    pub fn write(
        &self,
        tile_origin: [f64; 2],
        tile_size: f64,
        resolution: usize,
    ) -> Result<HeightmapGrid> {
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(Error::geometry(
                "heightmap writer",
                format!("tile size must be positive, got {tile_size}"),
            ));
        }
        validate_resolution(resolution, "heightmap writer")?;
        let base = self.base(resolution)?;
        Ok(self
            .compositor
            .composite(&base, tile_origin, tile_size, self.backend))
    }

    pub fn write_tile(&self, layout: &TileLayout, coord: TileCoord) -> Result<HeightmapGrid> {
        layout.validate()?;
        let base = self.base(layout.resolution)?;
        debug!(tile = %coord, resolution = layout.resolution, "writing heightmap");
        Ok(self
            .compositor
            .composite_with(&base, self.backend, |i, j| layout.world_position(coord, i, j)))
    }

    /// Height of a single sample addressed relative to `coord`. Matches the
    /// value `write_tile` stores for the tile that owns the sample.
    pub fn sample(&self, layout: &TileLayout, coord: TileCoord, i: i64, j: i64) -> f32 {
        let (x, z) = layout.world_position_at(coord, i, j);
        let base = self.base_height as f32 as f64;
        if self.compositor.is_empty() {
            return base as f32;
        }
        self.compositor.height_at(x, z, base) as f32
    }

    /// Every tile of the layout, one task per tile.
    pub fn write_layout(&self, layout: &TileLayout) -> Result<Vec<(TileCoord, HeightmapGrid)>> {
        layout.validate()?;
        info!(
            tiles = layout.tile_count(),
            resolution = layout.resolution,
            backend = self.backend.name(),
            "writing heightmaps"
        );
        self.backend
            .map(layout.tile_count(), |index| {
                let coord = layout.tile_at(index);
                self.write_tile(layout, coord).map(|grid| (coord, grid))
            })
            .into_iter()
            .collect()
    }
}
