// storage writes landscape documents and generation outputs to a local
// directory tree and reads them back

pub mod error;
pub mod models;

use std::path::{Path, PathBuf};

use image::{RgbImage, RgbaImage};
use landscape_core::assets::raw16_samples;
use landscape_core::preview::{natural_z_scale, render_layout};
use landscape_core::{
    DensityGrid, GenerationOutput, Grid, LandscapeConfig, Placement, SplatMap, TileCoord,
};
use tracing::{debug, info};

pub use crate::error::{Result, StorageError};
use crate::models::{DocumentFormat, Manifest, PlacementFile, TileRecord};

const MANIFEST: &str = "manifest.json";
const PREVIEW: &str = "preview.png";
const HEIGHTMAP_DIR: &str = "heightmaps";
const SPLAT_DIR: &str = "splatmaps";
const PLACEMENT_DIR: &str = "placements";

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a landscape document, RON or JSON by extension.
pub fn load_config(path: &Path) -> Result<LandscapeConfig> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| StorageError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let config = match format {
        DocumentFormat::Ron => ron::from_str(&text).map_err(StorageError::RonParse)?,
        DocumentFormat::Json => serde_json::from_str(&text)?,
    };
    info!(path = %path.display(), "loaded landscape document");
    Ok(config)
}

pub fn save_config(path: &Path, config: &LandscapeConfig) -> Result<()> {
    let text = match DocumentFormat::from_path(path)? {
        DocumentFormat::Ron => {
            let pretty = ron::ser::PrettyConfig::new()
                .depth_limit(6)
                .enumerate_arrays(false);
            ron::ser::to_string_pretty(config, pretty).map_err(StorageError::RonSerialize)?
        }
        DocumentFormat::Json => serde_json::to_string_pretty(config)?,
    };
    write(path, text.as_bytes())
}

/// Little-endian 16-bit RAW, row-major, no header.
pub fn encode_raw16(grid: &Grid) -> Vec<u8> {
    grid.to_u16().iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Inverse of [`encode_raw16`]; the side length is inferred from the size.
pub fn decode_raw16(bytes: &[u8], path: &Path) -> Result<Grid> {
    let (resolution, samples) =
        raw16_samples(bytes, &path.display().to_string()).map_err(|e| {
            StorageError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
    Ok(Grid::from_u16(resolution, &samples)?)
}

/// A directory holding the outputs of generation passes.
#[derive(Debug, Clone)]
pub struct TerrainStore {
    root: PathBuf,
}

impl TerrainStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub fn heightmap_path(&self, coord: TileCoord) -> PathBuf {
        self.root.join(HEIGHTMAP_DIR).join(format!("tile_{coord}.r16"))
    }

    pub fn splatmap_path(&self, coord: TileCoord, index: usize) -> PathBuf {
        self.root.join(SPLAT_DIR).join(format!("tile_{coord}_{index}.png"))
    }

    pub fn placements_path(&self, coord: TileCoord) -> PathBuf {
        self.root.join(PLACEMENT_DIR).join(format!("tile_{coord}.json"))
    }

    pub fn write_heightmap(&self, coord: TileCoord, grid: &Grid) -> Result<PathBuf> {
        let path = self.heightmap_path(coord);
        write(&path, &encode_raw16(grid))?;
        debug!(tile = %coord, path = %path.display(), "wrote heightmap");
        Ok(path)
    }

    pub fn read_heightmap(&self, coord: TileCoord) -> Result<Grid> {
        let path = self.heightmap_path(coord);
        decode_raw16(&read(&path)?, &path)
    }

    /// One RGBA PNG per four textures.
    pub fn write_splatmaps(&self, coord: TileCoord, splatmap: &SplatMap) -> Result<Vec<PathBuf>> {
        let res = splatmap.resolution() as u32;
        let mut paths = Vec::new();
        for (index, buf) in splatmap.to_rgba_control_maps().into_iter().enumerate() {
            let path = self.splatmap_path(coord, index);
            let img = RgbaImage::from_raw(res, res, buf).ok_or_else(|| StorageError::Malformed {
                path: path.clone(),
                message: "control map buffer does not match resolution".to_string(),
            })?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            img.save(&path)?;
            paths.push(path);
        }
        debug!(tile = %coord, images = paths.len(), "wrote splatmaps");
        Ok(paths)
    }

    pub fn read_splatmap(&self, coord: TileCoord, index: usize) -> Result<RgbaImage> {
        Ok(image::open(self.splatmap_path(coord, index))?.to_rgba8())
    }

    pub fn write_placements(
        &self,
        coord: TileCoord,
        placements: &[Placement],
        grass: &[DensityGrid],
    ) -> Result<PathBuf> {
        let path = self.placements_path(coord);
        let file = PlacementFile {
            tile: coord,
            placements: placements.to_vec(),
            grass: grass.to_vec(),
        };
        write(&path, serde_json::to_string(&file)?.as_bytes())?;
        debug!(tile = %coord, count = placements.len(), "wrote placements");
        Ok(path)
    }

    pub fn read_placements(&self, coord: TileCoord) -> Result<PlacementFile> {
        Ok(serde_json::from_slice(&read(&self.placements_path(coord))?)?)
    }

    pub fn write_preview(&self, img: &RgbImage) -> Result<PathBuf> {
        let path = self.root.join(PREVIEW);
        img.save(&path)?;
        Ok(path)
    }

    /// Write every tile of `output` and a manifest indexing them.
    pub fn save_output(&self, output: &GenerationOutput, preview: bool) -> Result<Manifest> {
        let mut tiles = Vec::with_capacity(output.tiles.len());
        for tile in &output.tiles {
            let heightmap = self.write_heightmap(tile.coord, &tile.heightmap)?;
            let splatmaps = self.write_splatmaps(tile.coord, &tile.splatmap)?;
            let placements = self.write_placements(tile.coord, &tile.placements, &tile.grass)?;
            let (min_height, max_height) = tile.heightmap.min_max();
            tiles.push(TileRecord {
                coord: tile.coord,
                origin: tile.origin,
                heightmap: self.relative(&heightmap),
                splatmaps: splatmaps.iter().map(|p| self.relative(p)).collect(),
                placements: self.relative(&placements),
                placement_count: tile.placements.len(),
                min_height,
                max_height,
            });
        }

        let layout = &output.layout;
        let preview = if preview {
            let z_scale = natural_z_scale(output.terrain_height, layout.tile_size, layout.resolution);
            let path = self.write_preview(&render_layout(output, z_scale))?;
            Some(self.relative(&path))
        } else {
            None
        };

        let manifest = Manifest {
            name: output.name.clone(),
            terrain_height: output.terrain_height,
            tile_size: layout.tile_size,
            resolution: layout.resolution,
            tiles_x: layout.tiles_x,
            tiles_z: layout.tiles_z,
            textures: output.texture_names.clone(),
            tiles,
            preview,
        };
        self.write_manifest(&manifest)?;
        info!(
            root = %self.root.display(),
            tiles = manifest.tiles.len(),
            placements = output.placement_count(),
            "saved generation output"
        );
        Ok(manifest)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        write(
            &self.root.join(MANIFEST),
            serde_json::to_string_pretty(manifest)?.as_bytes(),
        )
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        Ok(serde_json::from_slice(&read(&self.root.join(MANIFEST))?)?)
    }

    pub fn list_tiles(&self) -> Result<Vec<TileCoord>> {
        Ok(self.load_manifest()?.tiles.iter().map(|t| t.coord).collect())
    }

    /// Remove one tile's files and its manifest entry. Missing tiles are
    /// not an error.
    pub fn delete_tile(&self, coord: TileCoord) -> Result<()> {
        let mut manifest = self.load_manifest()?;
        let Some(index) = manifest.tiles.iter().position(|t| t.coord == coord) else {
            return Ok(());
        };
        let record = manifest.tiles.remove(index);
        let files = std::iter::once(&record.heightmap)
            .chain(&record.splatmaps)
            .chain(std::iter::once(&record.placements));
        for file in files {
            let path = self.root.join(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::Write { path, source }),
            }
        }
        self.write_manifest(&manifest)?;
        debug!(tile = %coord, "deleted tile");
        Ok(())
    }
}
