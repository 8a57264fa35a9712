//! Command-line arguments for the landscape generator.

use std::path::PathBuf;

use clap::Parser;
use landscape_core::{Backend, LandscapeConfig};

/// Generate every tile of a landscape document and export it.
///
/// CLI values override settings loaded from the document.
#[derive(Parser, Debug)]
#[command(name = "landscape-app", about = "Procedural landscape generator")]
pub struct CliArgs {
    /// Landscape document (.ron or .json).
    pub config: PathBuf,

    /// Output directory.
    #[arg(long, short, default_value = "out")]
    pub out: PathBuf,

    /// Landscape seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Samples per tile edge (2^n + 1).
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Compute backend (serial or parallel).
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Log level or filter directive (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also render a hill-shaded preview PNG.
    #[arg(long)]
    pub preview: bool,

    /// Root directory for relative asset paths; defaults to the document's directory.
    #[arg(long)]
    pub assets: Option<PathBuf>,
}

impl CliArgs {
    /// Apply CLI overrides to a loaded document.
    pub fn apply_overrides(&self, mut config: LandscapeConfig) -> LandscapeConfig {
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(resolution) = self.resolution {
            config = config.with_resolution(resolution);
        }
        if let Some(backend) = self.backend {
            config = config.with_backend(backend);
        }
        config
    }

    pub fn asset_root(&self) -> PathBuf {
        match &self.assets {
            Some(root) => root.clone(),
            None => self
                .config
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
