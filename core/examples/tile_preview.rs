use landscape_core::preview::{natural_z_scale, render_layout};
use landscape_core::{
    Backend, FractalKind, Landscape, LandscapeConfig, LayerBuilder, MemoryAssetLoader, NoiseBasis,
    NoiseParams, TileLayout,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 2×2 tiles of 257×257 samples over one square kilometre
    let layout = TileLayout {
        origin: [0.0, 0.0],
        tile_size: 500.0,
        tiles_x: 2,
        tiles_z: 2,
        resolution: 257,
    };
    let config = LandscapeConfig {
        name: "preview".into(),
        seed: 2025,
        layout,
        terrain_height: 300.0,
        base_height: 0.15,
        backend: Backend::Parallel,
        layers: vec![
            LayerBuilder::perlin_base(
                "continent",
                NoiseParams {
                    tile_size: 900.0,
                    octaves: 6,
                    warp_amount: 0.4,
                    ..NoiseParams::default()
                },
            )
            .strength(0.6)
            .build()?,
            LayerBuilder::additive(
                "ridges",
                NoiseParams {
                    basis: NoiseBasis::Simplex,
                    fractal: FractalKind::Ridged,
                    tile_size: 250.0,
                    octaves: 4,
                    ..NoiseParams::default()
                },
            )
            .strength(0.25)
            .build()?,
        ],
        ..LandscapeConfig::default()
    };

    let landscape = Landscape::new(config, &MemoryAssetLoader::new())?;
    let output = landscape.generate()?;
    let layout = &output.layout;
    let z_scale = natural_z_scale(output.terrain_height, layout.tile_size, layout.resolution);
    let img = render_layout(&output, z_scale);
    img.save("tile_preview.png")?;
    println!("Saved {}×{} preview to tile_preview.png", img.width(), img.height());
    Ok(())
}
