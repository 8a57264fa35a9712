use std::path::Path;

use landscape_core::{DensityGrid, Placement, TileCoord};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Ron,
    Json,
}

impl DocumentFormat {
    /// Chosen by file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("ron") => Ok(Self::Ron),
            Some("json") => Ok(Self::Json),
            _ => Err(StorageError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Placements and grass density of one tile, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementFile {
    pub tile: TileCoord,
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub grass: Vec<DensityGrid>,
}

/// Files written for one tile, relative to the store root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub coord: TileCoord,
    pub origin: [f64; 2],
    pub heightmap: String,
    pub splatmaps: Vec<String>,
    pub placements: String,
    pub placement_count: usize,
    pub min_height: f32,
    pub max_height: f32,
}

/// Index of a saved generation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub terrain_height: f64,
    pub tile_size: f64,
    pub resolution: usize,
    pub tiles_x: u32,
    pub tiles_z: u32,
    // Texture order of the splatmap channels
    pub textures: Vec<String>,
    pub tiles: Vec<TileRecord>,
    #[serde(default)]
    pub preview: Option<String>,
}
