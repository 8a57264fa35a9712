// core holds the generation pipeline: noise, layer compositing, masks,
// heightmap tiles, texture splatting and object placement
pub mod assets;
pub mod backend;
pub mod compositor;
pub mod curve;
pub mod domain_warp;
pub mod error;
pub mod grid;
pub mod landscape;
pub mod layer;
pub mod mask;
pub mod noise_field;
pub mod path;
pub mod perlin2;
pub mod placement;
pub mod preview;
pub mod simplex2;
pub mod splat;
pub mod world;
pub mod writer;

pub use assets::{AssetLoader, FileAssetLoader, MemoryAssetLoader, Raster, WorldRect};
pub use backend::Backend;
pub use compositor::LayerCompositor;
pub use curve::{Curve, Interpolation, Keyframe};
pub use error::{Error, Result};
pub use grid::{Grid, HeightmapGrid};
pub use landscape::{GenerationOutput, Landscape, LandscapeConfig, StencilConfig, TileOutput};
pub use layer::{BlendMode, Layer, LayerBuilder, LayerKind, LayerSource};
pub use mask::{Filter, FilterMode, Mask, MaskEngine, SampleContext, Stencil, StencilSet};
pub use noise_field::{FractalKind, NoiseBasis, NoiseField, NoiseParams};
pub use path::{Path, PathBuilder, PathConfig};
pub use perlin2::Perlin2D;
pub use placement::{
    DensityGrid, Placement, PlacementEngine, PlacementKind, PlacementLayout, PlacementRule,
    PlacementRuleBuilder, SelectionMethod, TileContext,
};
pub use simplex2::Simplex2D;
pub use splat::{SplatMap, SplatWeightEngine, TextureRule, TextureRuleBuilder, TexturingConfig, TexturingMode};
pub use world::World;
pub use writer::{HeightmapWriter, TileCoord, TileLayout};

// A single-octave gradient noise source sampled in 2D.
// Output is in [-1, 1].
pub trait NoiseGenerator: Send + Sync {
    fn get2(&self, x: f64, y: f64) -> f64;
}
