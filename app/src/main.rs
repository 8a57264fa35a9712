mod cli;
mod logging;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use landscape_core::{FileAssetLoader, Landscape};
use landscape_storage::{StorageError, TerrainStore, load_config};
use tracing::{error, info};

use crate::cli::CliArgs;
use crate::logging::init_logging;

fn run(args: &CliArgs) -> Result<(), StorageError> {
    let start = Instant::now();
    let config = args.apply_overrides(load_config(&args.config)?);
    let loader = FileAssetLoader::new(args.asset_root());
    let landscape = Landscape::new(config, &loader)?;

    let output = landscape.generate()?;
    let generated = start.elapsed();

    let store = TerrainStore::init(args.out.clone())?;
    let manifest = store.save_output(&output, args.preview)?;
    info!(
        tiles = manifest.tiles.len(),
        placements = output.placement_count(),
        generate_ms = generated.as_millis() as u64,
        total_ms = start.elapsed().as_millis() as u64,
        out = %store.root().display(),
        "landscape exported"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.log_level.as_deref());
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
