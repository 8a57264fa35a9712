use landscape_core::{
    Grid, Landscape, LandscapeConfig, LayerBuilder, MemoryAssetLoader, NoiseParams, PlacementKind,
    PlacementRule, TextureRule, TexturingConfig, TexturingMode, TileCoord, TileLayout,
};
use landscape_storage::{StorageError, TerrainStore, decode_raw16, encode_raw16, load_config, save_config};

fn small_config() -> LandscapeConfig {
    LandscapeConfig {
        name: "roundtrip".into(),
        seed: 42,
        layout: TileLayout {
            origin: [0.0, 0.0],
            tile_size: 128.0,
            tiles_x: 2,
            tiles_z: 1,
            resolution: 33,
        },
        terrain_height: 80.0,
        base_height: 0.2,
        layers: vec![
            LayerBuilder::perlin_base(
                "base",
                NoiseParams {
                    tile_size: 150.0,
                    ..NoiseParams::default()
                },
            )
            .strength(0.5)
            .build()
            .unwrap(),
        ],
        textures: TexturingConfig {
            rules: (0..5)
                .map(|i| {
                    TextureRule::builder(format!("t{i}"), TexturingMode::Height)
                        .height(i as f64 * 0.2, i as f64 * 0.2 + 0.2)
                        .blend(0.05, 0.0)
                        .build()
                        .unwrap()
                })
                .collect(),
            fallback: 0,
        },
        placements: vec![
            PlacementRule::builder("pines", PlacementKind::Tree)
                .prefab("pine")
                .density(3_000.0)
                .build()
                .unwrap(),
            PlacementRule::builder("meadow", PlacementKind::Grass)
                .prefab("grass")
                .density(1.0)
                .build()
                .unwrap(),
        ],
        ..LandscapeConfig::default()
    }
}

#[test]
fn config_roundtrips_through_ron_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config();
    for name in ["landscape.ron", "landscape.json"] {
        let path = dir.path().join(name);
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("landscape.yaml");
    let err = save_config(&path, &small_config()).unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedFormat(_)));
}

#[test]
fn missing_fields_take_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minimal.ron");
    std::fs::write(&path, "(name: \"minimal\", seed: 7)").unwrap();
    let config = load_config(&path).unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.layout, TileLayout::default());
    assert!(config.layers.is_empty());
}

#[test]
fn invalid_utf8_documents_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ron");
    std::fs::write(&path, b"(name: \"caf\xE9\", seed: 7)").unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, StorageError::Malformed { .. }));
}

#[test]
fn raw16_heightmaps_roundtrip() {
    let data: Vec<f32> = (0..17 * 17).map(|i| i as f32 / (17.0 * 17.0)).collect();
    let grid = Grid::from_vec(17, data).unwrap();
    let bytes = encode_raw16(&grid);
    assert_eq!(bytes.len(), 17 * 17 * 2);
    let back = decode_raw16(&bytes, std::path::Path::new("mem.r16")).unwrap();
    for (a, b) in grid.as_slice().iter().zip(back.as_slice()) {
        assert!((a - b).abs() <= 1.0 / 65535.0);
    }
    let err = decode_raw16(&bytes[..bytes.len() - 2], std::path::Path::new("x.r16")).unwrap_err();
    assert!(matches!(err, StorageError::Malformed { .. }));
    assert!(decode_raw16(&bytes[..bytes.len() - 1], std::path::Path::new("x.r16")).is_err());
}

#[test]
fn generation_output_is_saved_and_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let store = TerrainStore::init(dir.path().join("out")).unwrap();
    let landscape = Landscape::new(small_config(), &MemoryAssetLoader::new()).unwrap();
    let output = landscape.generate().unwrap();

    let manifest = store.save_output(&output, true).unwrap();
    assert_eq!(manifest.tiles.len(), 2);
    assert_eq!(manifest.textures.len(), 5);
    assert_eq!(manifest.preview.as_deref(), Some("preview.png"));
    assert_eq!(store.load_manifest().unwrap(), manifest);

    let coord = TileCoord::new(1, 0);
    let tile = output.tile(coord).unwrap();
    let height = store.read_heightmap(coord).unwrap();
    assert_eq!(height.resolution(), 33);
    assert!((height.get(5, 7) - tile.heightmap.get(5, 7)).abs() <= 1.0 / 65535.0);

    // five textures pack into two control maps
    let record = &manifest.tiles[1];
    assert_eq!(record.splatmaps.len(), 2);
    let control = store.read_splatmap(coord, 1).unwrap();
    assert_eq!(control.dimensions(), (33, 33));

    let placements = store.read_placements(coord).unwrap();
    assert_eq!(placements.tile, coord);
    assert_eq!(placements.placements, tile.placements);
    assert_eq!(placements.grass.len(), 1);

    let preview = image::open(dir.path().join("out").join("preview.png")).unwrap();
    assert_eq!((preview.width(), preview.height()), (65, 33));
}

#[test]
fn deleting_a_tile_updates_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = TerrainStore::init(dir.path()).unwrap();
    let output = Landscape::new(small_config(), &MemoryAssetLoader::new())
        .unwrap()
        .generate()
        .unwrap();
    store.save_output(&output, false).unwrap();

    let coord = TileCoord::new(0, 0);
    store.delete_tile(coord).unwrap();
    assert_eq!(store.list_tiles().unwrap(), vec![TileCoord::new(1, 0)]);
    assert!(!store.heightmap_path(coord).exists());
    assert!(store.read_heightmap(coord).is_err());
    // deleting again is a no-op
    store.delete_tile(coord).unwrap();
}

#[test]
fn bundled_demo_document_generates() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/valley.ron");
    let config = load_config(&path).unwrap().with_resolution(33);
    assert_eq!(config.layers.len(), 4);
    assert_eq!(config.placements.len(), 4);
    let output = Landscape::new(config, &MemoryAssetLoader::new())
        .unwrap()
        .generate()
        .unwrap();
    assert_eq!(output.tiles.len(), 4);
    assert_eq!(output.texture_names, ["sand", "grass", "rock", "snow"]);
    assert!(output.placement_count() > 0);
}
