use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use masks::handle::HandlePolicy;
use masks::{BuildConfig, BuildContext};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = megapc(Args::parse()) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

/// Arguments to [`megapc`].
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Build the MEGA-PC photolithography masks and reticles"
)]
pub struct Args {
    /// A TOML build configuration.
    ///
    /// Flags given on the command line take precedence over the file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The version label of the build.
    #[arg(short = 'v', long = "build-version")]
    build_version: Option<String>,
    /// The source revision label written on the chip.
    #[arg(long)]
    hash: Option<String>,
    /// The directory receiving the output files.
    ///
    /// Created if necessary. Existing files are overwritten.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
    /// Skip merging DEVICE into DEVICE_REMOVE.
    #[arg(long)]
    no_merge: bool,
    /// Also write reticles mirrored across the y axis.
    #[arg(long)]
    mirror: bool,
    /// How drawn HANDLE_REMOVE shapes combine with the reconstructed handle.
    #[arg(long)]
    handle_policy: Option<HandlePolicy>,
    /// Angle resolution of curved edges, in degrees.
    #[arg(long)]
    angle_resolution: Option<f64>,
    /// Omit release holes.
    #[arg(long)]
    no_release_holes: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::from_file(path)
                .with_context(|| format!("failed to read configuration {:?}", path))?,
            None => BuildConfig::default(),
        };
        if let Some(version) = &self.build_version {
            config.version = version.clone();
        }
        if let Some(hash) = &self.hash {
            config.hash = hash.clone();
        }
        if let Some(out_dir) = &self.out_dir {
            config.out_dir = out_dir.clone();
        }
        config.no_merge |= self.no_merge;
        config.mirror |= self.mirror;
        if let Some(policy) = self.handle_policy {
            config.handle_policy = policy;
        }
        if let Some(resolution) = self.angle_resolution {
            config.angle_resolution = resolution;
        }
        if self.no_release_holes {
            config.release_holes = false;
        }
        Ok(config)
    }
}

/// Builds the masks described by `args` and writes them to disk.
pub fn megapc(args: Args) -> anyhow::Result<()> {
    let config = args.config()?;
    tracing::info!(
        version = %config.version,
        out_dir = %config.out_dir.display(),
        policy = %config.handle_policy,
        "starting build"
    );

    let mut ctx = BuildContext::mega_pc().context("failed to load the layer registry")?;
    let label = chrono::Local::now().date_naive().to_string();
    let written = masks::build::run(&mut ctx, &config, &label)
        .with_context(|| format!("build {} failed", config.version))?;

    tracing::info!(files = written.len(), "build complete");
    Ok(())
}
