//! The headless context a generation pass runs against: decoded stencils,
//! raster heightmaps and prepared paths, keyed by the names a landscape
//! document uses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::Raster;
use crate::mask::{Stencil, StencilSet};
use crate::path::Path;

#[derive(Debug, Clone)]
pub struct World {
    terrain_height: f64,
    stencils: Arc<StencilSet>,
    rasters: HashMap<String, Arc<Raster>>,
    paths: HashMap<String, Arc<Path>>,
}

impl World {
    /// `terrain_height` is the world height of a normalized height of 1.
    pub fn new(terrain_height: f64) -> Self {
        Self {
            terrain_height,
            stencils: Arc::new(StencilSet::new()),
            rasters: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    pub fn terrain_height(&self) -> f64 {
        self.terrain_height
    }

    pub fn insert_stencil(&mut self, name: impl Into<String>, stencil: Stencil) {
        Arc::make_mut(&mut self.stencils).insert(name, stencil);
    }

    pub fn insert_raster(&mut self, asset: impl Into<String>, raster: Arc<Raster>) {
        self.rasters.insert(asset.into(), raster);
    }

    pub fn insert_path(&mut self, path: Path) {
        self.paths.insert(path.name().to_string(), Arc::new(path));
    }

    pub fn stencils(&self) -> &StencilSet {
        &self.stencils
    }

    pub(crate) fn shared_stencils(&self) -> Arc<StencilSet> {
        Arc::clone(&self.stencils)
    }

    pub fn raster(&self, asset: &str) -> Option<&Arc<Raster>> {
        self.rasters.get(asset)
    }

    pub fn path(&self, name: &str) -> Option<&Arc<Path>> {
        self.paths.get(name)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Arc<Path>> {
        self.paths.values()
    }
}
