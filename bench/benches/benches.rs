use landscape_core::placement::TileContext;
use landscape_core::splat::inclination_map;
use landscape_core::{
    Backend, FractalKind, Grid, HeightmapWriter, Layer, LayerBuilder, LayerCompositor, NoiseBasis,
    NoiseField, NoiseParams, PlacementEngine, PlacementKind, PlacementRule, SplatWeightEngine,
    TextureRule, TexturingConfig, TexturingMode, TileCoord, World,
};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const RESOLUTION: usize = 257;
const TILE_SIZE: f64 = 512.0;
const SEED: u64 = 2025;

fn layers() -> Vec<Layer> {
    vec![
        LayerBuilder::perlin_base(
            "base",
            NoiseParams {
                tile_size: 600.0,
                octaves: 6,
                warp_amount: 0.3,
                ..NoiseParams::default()
            },
        )
        .strength(0.6)
        .build()
        .unwrap(),
        LayerBuilder::additive(
            "ridges",
            NoiseParams {
                basis: NoiseBasis::Simplex,
                fractal: FractalKind::Ridged,
                tile_size: 180.0,
                octaves: 4,
                ..NoiseParams::default()
            },
        )
        .strength(0.2)
        .build()
        .unwrap(),
    ]
}

fn heightmap(backend: Backend) -> Grid {
    let compositor = LayerCompositor::new(SEED, &layers(), &World::new(200.0)).unwrap();
    HeightmapWriter::new(&compositor, 0.1, backend)
        .write([0.0, 0.0], TILE_SIZE, RESOLUTION)
        .unwrap()
}

fn bench_noise_field(c: &mut Criterion) {
    for basis in [NoiseBasis::Perlin, NoiseBasis::Simplex] {
        let field = NoiseField::new(SEED, basis);
        let params = NoiseParams {
            basis,
            octaves: 6,
            ..NoiseParams::default()
        };
        c.bench_function(&format!("NoiseField {basis:?} fbm, 6 octaves, 257²"), |b| {
            b.iter(|| {
                let mut acc = 0.0;
                for z in 0..RESOLUTION {
                    for x in 0..RESOLUTION {
                        acc += field.sample(x as f64 * 2.0, z as f64 * 2.0, &params);
                    }
                }
                black_box(acc)
            })
        });
    }
}

fn bench_heightmap_writer(c: &mut Criterion) {
    for backend in [Backend::Serial, Backend::Parallel] {
        c.bench_function(&format!("HeightmapWriter 2 layers, 257², {}", backend.name()), |b| {
            b.iter(|| black_box(heightmap(backend)))
        });
    }
}

fn bench_splat_weights(c: &mut Criterion) {
    let world = World::new(200.0);
    let grid = heightmap(Backend::Parallel);
    let inclination = inclination_map(&grid, TILE_SIZE, 200.0, Backend::Parallel);
    let config = TexturingConfig {
        rules: vec![
            TextureRule::builder("sand", TexturingMode::Height)
                .height(0.0, 0.25)
                .blend(0.05, 0.0)
                .build()
                .unwrap(),
            TextureRule::builder("grass", TexturingMode::HeightAndInclination)
                .height(0.2, 0.7)
                .inclination(0.0, 30.0)
                .blend(0.05, 5.0)
                .noise(NoiseParams::default(), 0.05)
                .build()
                .unwrap(),
            TextureRule::builder("rock", TexturingMode::Inclination)
                .inclination(25.0, 90.0)
                .blend(0.0, 5.0)
                .build()
                .unwrap(),
            TextureRule::builder("snow", TexturingMode::Height)
                .height(0.75, 1.0)
                .build()
                .unwrap(),
        ],
        fallback: 1,
    };
    let engine = SplatWeightEngine::new(SEED, &config, &world).unwrap();
    c.bench_function("SplatWeightEngine 4 rules, 257²", |b| {
        b.iter(|| {
            black_box(engine.compute_weights(
                &grid,
                &inclination,
                [0.0, 0.0],
                TILE_SIZE,
                Backend::Parallel,
            ))
        })
    });
}

fn bench_placement(c: &mut Criterion) {
    let world = World::new(200.0);
    let grid = heightmap(Backend::Parallel);
    let inclination = inclination_map(&grid, TILE_SIZE, 200.0, Backend::Parallel);
    let config = TexturingConfig {
        rules: vec![
            TextureRule::builder("ground", TexturingMode::ConstantInfluence)
                .build()
                .unwrap(),
        ],
        fallback: 0,
    };
    let splatmap = SplatWeightEngine::new(SEED, &config, &world)
        .unwrap()
        .compute_weights(&grid, &inclination, [0.0, 0.0], TILE_SIZE, Backend::Parallel);
    let rules = vec![
        PlacementRule::builder("pines", PlacementKind::Tree)
            .prefab("pine")
            .density(4_000.0)
            .min_proximity(3.0)
            .inclination(0.0, 35.0)
            .build()
            .unwrap(),
        PlacementRule::builder("groves", PlacementKind::Tree)
            .prefab("birch")
            .density(2_000.0)
            .cluster(12.0, 0.7)
            .build()
            .unwrap(),
    ];
    let engine = PlacementEngine::new(SEED, &rules, &world, 1).unwrap();
    let ctx = TileContext {
        coord: TileCoord::new(0, 0),
        origin: [0.0, 0.0],
        tile_size: TILE_SIZE,
        terrain_height: 200.0,
        heightmap: &grid,
        inclination: &inclination,
        splatmap: &splatmap,
    };
    c.bench_function("PlacementEngine 2 rules, 512 m tile", |b| {
        b.iter(|| black_box(engine.place_all(&ctx, Backend::Serial)))
    });
}

criterion_group!(
    landscape_benchmarks,
    bench_noise_field,
    bench_heightmap_writer,
    bench_splat_weights,
    bench_placement
);
criterion_main!(landscape_benchmarks);
