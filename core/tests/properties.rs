use landscape_core::mask::{DistanceMask, RangeMask};
use landscape_core::splat::inclination_map;
use landscape_core::{
    Backend, Curve, FractalKind, Grid, HeightmapWriter, Landscape, LandscapeConfig, Layer,
    LayerBuilder, LayerCompositor, Mask, MaskEngine, MemoryAssetLoader, NoiseBasis, NoiseField,
    NoiseParams, SampleContext, SplatWeightEngine, StencilSet, TextureRule, TexturingConfig,
    TexturingMode, TileCoord, TileLayout, World,
};
use proptest::prelude::*;

fn arb_mask() -> impl Strategy<Value = Mask> {
    let leaf = prop_oneof![
        (-5.0f64..5.0).prop_map(Mask::Constant),
        ((-100.0f64..100.0), (-100.0f64..100.0), (0.1f64..200.0)).prop_map(|(x, z, radius)| {
            Mask::Distance(DistanceMask {
                center: [x, z],
                radius,
                curve: Curve::hill(),
            })
        }),
        ((0.0f64..1.0), (0.0f64..1.0), (0.0f64..0.3)).prop_map(|(a, b, blend)| {
            Mask::Height(RangeMask {
                min: a.min(b),
                max: a.max(b),
                blend,
            })
        }),
        ((0.0f64..90.0), (0.0f64..90.0), (0.0f64..10.0)).prop_map(|(a, b, blend)| {
            Mask::Inclination(RangeMask {
                min: a.min(b),
                max: a.max(b),
                blend,
            })
        }),
    ];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Mask::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Mask::Or),
            inner.prop_map(|m| Mask::Not(Box::new(m))),
        ]
    })
}

fn hilly(seed_offset: u64) -> Vec<Layer> {
    vec![
        LayerBuilder::perlin_base(
            "base",
            NoiseParams {
                tile_size: 90.0,
                warp_amount: 0.2,
                ..NoiseParams::default()
            },
        )
        .seed_offset(seed_offset)
        .build()
        .unwrap(),
        LayerBuilder::subtractive(
            "valleys",
            NoiseParams {
                basis: NoiseBasis::Simplex,
                fractal: FractalKind::Ridged,
                tile_size: 35.0,
                octaves: 3,
                ..NoiseParams::default()
            },
        )
        .strength(0.3)
        .build()
        .unwrap(),
    ]
}

proptest! {
    #[test]
    fn noise_is_deterministic_and_bounded(
        seed in any::<u64>(),
        x in -1.0e5f64..1.0e5,
        z in -1.0e5f64..1.0e5,
        simplex in any::<bool>(),
        octaves in 1u32..8,
    ) {
        let basis = if simplex { NoiseBasis::Simplex } else { NoiseBasis::Perlin };
        let params = NoiseParams { basis, octaves, warp_amount: 0.5, ..NoiseParams::default() };
        let field = NoiseField::new(seed, basis);
        let a = field.sample(x, z, &params);
        let b = NoiseField::new(seed, basis).sample(x, z, &params);
        prop_assert_eq!(a.to_bits(), b.to_bits());
        prop_assert!((-1.0..=1.0).contains(&a));
    }

    #[test]
    fn masks_stay_in_unit_range(
        mask in arb_mask(),
        x in -500.0f64..500.0,
        z in -500.0f64..500.0,
        height in prop::option::of(-1.0f64..2.0),
        inclination in prop::option::of(0.0f64..90.0),
    ) {
        let stencils = StencilSet::new();
        let engine = MaskEngine::new(&stencils);
        let mut ctx = SampleContext::at(x, z);
        ctx.height = height;
        ctx.inclination = inclination;
        let v = engine.evaluate(&mask, &ctx);
        prop_assert!((0.0..=1.0).contains(&v));
    }

    #[test]
    fn empty_layer_list_is_identity(
        seed in any::<u64>(),
        value in 0.0f32..1.0,
    ) {
        let compositor = LayerCompositor::new(seed, &[], &World::new(100.0)).unwrap();
        let base = Grid::filled(9, value).unwrap();
        let out = compositor.composite(&base, [10.0, -40.0], 64.0, Backend::Parallel);
        prop_assert_eq!(out, base);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn splat_weights_sum_to_one(
        heights in prop::collection::vec(0.0f32..1.0, 81),
        bands in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0, 0.0f64..0.2), 1..5),
        fallback in 0usize..4,
    ) {
        let rules: Vec<TextureRule> = bands
            .iter()
            .enumerate()
            .map(|(i, &(a, b, blend))| {
                TextureRule::builder(format!("t{i}"), TexturingMode::HeightAndInclination)
                    .height(a.min(b), a.max(b))
                    .inclination(0.0, 40.0)
                    .blend(blend, 5.0)
                    .build()
                    .unwrap()
            })
            .collect();
        let fallback = fallback % rules.len();
        let config = TexturingConfig { rules, fallback };
        let engine = SplatWeightEngine::new(3, &config, &World::new(50.0)).unwrap();
        let grid = Grid::from_vec(9, heights).unwrap();
        let inclination = inclination_map(&grid, 80.0, 50.0, Backend::Serial);
        let map = engine.compute_weights(&grid, &inclination, [0.0, 0.0], 80.0, Backend::Parallel);
        for z in 0..9 {
            for x in 0..9 {
                prop_assert!((map.sum_at(x, z) - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn neighbouring_tiles_agree_on_shared_edges(
        seed in any::<u64>(),
        seed_offset in any::<u64>(),
        origin_x in -1.0e4f64..1.0e4,
        origin_z in -1.0e4f64..1.0e4,
    ) {
        let compositor = LayerCompositor::new(seed, &hilly(seed_offset), &World::new(100.0)).unwrap();
        let layout = TileLayout {
            origin: [origin_x, origin_z],
            tile_size: 64.0,
            tiles_x: 2,
            tiles_z: 2,
            resolution: 9,
        };
        let tiles = HeightmapWriter::new(&compositor, 0.2, Backend::Parallel)
            .write_layout(&layout)
            .unwrap();
        let find = |x, z| &tiles.iter().find(|(c, _)| *c == TileCoord::new(x, z)).unwrap().1;
        prop_assert_eq!(find(0, 0).column(8), find(1, 0).column(0));
        prop_assert_eq!(find(0, 0).row(8), find(0, 1).row(0));
        prop_assert_eq!(find(1, 0).row(8), find(1, 1).row(0));
    }
}

fn slope_split_textures(split: f64) -> TexturingConfig {
    TexturingConfig {
        rules: vec![
            TextureRule::builder("meadow", TexturingMode::Inclination)
                .inclination(0.0, split)
                .build()
                .unwrap(),
            TextureRule::builder("cliff", TexturingMode::Inclination)
                .inclination(split, 90.0)
                .blend(0.0, 4.0)
                .build()
                .unwrap(),
        ],
        fallback: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn texture_stage_agrees_on_shared_edges(
        seed in any::<u64>(),
        seed_offset in any::<u64>(),
        origin_x in -1.0e4f64..1.0e4,
        origin_z in -1.0e4f64..1.0e4,
        split in 5.0f64..60.0,
    ) {
        let config = LandscapeConfig {
            seed,
            layout: TileLayout {
                origin: [origin_x, origin_z],
                tile_size: 96.0,
                tiles_x: 2,
                tiles_z: 1,
                resolution: 33,
            },
            terrain_height: 120.0,
            layers: hilly(seed_offset),
            textures: slope_split_textures(split),
            backend: Backend::Parallel,
            ..LandscapeConfig::default()
        };
        let out = Landscape::new(config, &MemoryAssetLoader::new())
            .unwrap()
            .generate()
            .unwrap();
        let west = out.tile(TileCoord::new(0, 0)).unwrap();
        let east = out.tile(TileCoord::new(1, 0)).unwrap();
        let last = 32;
        for z in 0..=last {
            prop_assert_eq!(west.heightmap.get(last, z), east.heightmap.get(0, z));
            prop_assert_eq!(west.inclination.get(last, z), east.inclination.get(0, z));
            for t in 0..2 {
                prop_assert_eq!(west.splatmap.weight(t, last, z), east.splatmap.weight(t, 0, z));
            }
        }
    }
}

#[test]
fn flat_two_by_two_tile_is_constant() {
    let layer = LayerBuilder::perlin_base(
        "base",
        NoiseParams {
            octaves: 1,
            gain: 0.0,
            lacunarity: 2.0,
            tile_size: 100.0,
            ..NoiseParams::default()
        },
    )
    .build()
    .unwrap();
    let compositor = LayerCompositor::new(11, &[layer], &World::new(100.0)).unwrap();
    let grid = HeightmapWriter::new(&compositor, 0.0, Backend::Serial)
        .write([0.0, 0.0], 100.0, 2)
        .unwrap();
    let first = grid.get(0, 0);
    assert!(grid.as_slice().iter().all(|&h| h == first));
}

#[test]
fn constant_influence_rule_is_uniform() {
    let rule = TextureRule::builder("ground", TexturingMode::ConstantInfluence)
        .strength(1.0)
        .build()
        .unwrap();
    let config = TexturingConfig { rules: vec![rule], fallback: 0 };
    let engine = SplatWeightEngine::new(0, &config, &World::new(10.0)).unwrap();
    let grid = Grid::filled(17, 0.4).unwrap();
    let inclination = inclination_map(&grid, 10.0, 10.0, Backend::Serial);
    let raw = engine.raw_weights(&grid, &inclination, [0.0, 0.0], 10.0, Backend::Serial);
    assert!(raw[0].as_slice().iter().all(|&w| w == 1.0));
}
