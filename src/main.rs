//! Command line front end.
//!
//! ```bash
//! # filter one image with the remembered defaults
//! sted-wiener single data/cells/cell_01.tif
//!
//! # tune the filter and keep the values as new defaults
//! sted-wiener single data/cells/cell_01.tif --nsr 0.1 --sigma-sted 40 --remember
//!
//! # every image of a folder, as .npy, aborting on the first broken file
//! sted-wiener batch data/cells --format npy --policy fail-fast
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use sted_wiener::batch::{run_batch, BatchOptions};
use sted_wiener::config::{BatchPolicy, FolderLayout, OutputFormat, OutputMode, WienerSettings};
use sted_wiener::filters::filter::FILTER_REGISTRY;
use sted_wiener::io::create_folder;
use sted_wiener::processing::process_file;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_BRANCH"),
    "@",
    env!("GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a single image
    Single {
        /// Image file (tif, npy, npz, png, bmp, jpg, gif)
        file: PathBuf,

        #[command(flatten)]
        parameters: ParameterArgs,

        /// What to write next to the result
        #[arg(long, value_enum)]
        output_mode: Option<OutputMode>,

        /// Output folder (default: a fresh `<folder>_wiener` next to the input folder)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Store the resulting settings as new defaults
        #[arg(long)]
        remember: bool,
    },

    /// Filter every supported image of a folder
    Batch {
        /// Input folder
        dir: PathBuf,

        #[command(flatten)]
        parameters: ParameterArgs,

        /// Array format of the results
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Tiff)]
        format: OutputFormat,

        /// Reaction to a failing image
        #[arg(
            short,
            long,
            value_enum,
            default_value_t = BatchPolicy::ContinueOnError
        )]
        policy: BatchPolicy,

        /// Worker threads (default: one per core)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Output folder (default: a fresh `<dir>_wiener` next to the input folder)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Store the resulting settings as new defaults
        #[arg(long)]
        remember: bool,
    },

    /// Print the stored default settings as JSON
    Settings,

    /// List the filters applied to every image, in order
    Filters,
}

/// Overrides of the remembered settings.
#[derive(Args, Debug, Default)]
struct ParameterArgs {
    /// Pixel size in nm
    #[arg(long)]
    pixel_size: Option<f64>,

    /// Constant background subtracted before filtering
    #[arg(long)]
    background: Option<f64>,

    /// Weight of the STED PSF, 0..=1
    #[arg(long)]
    ratio: Option<f64>,

    /// Noise-to-signal ratio
    #[arg(long)]
    nsr: Option<f64>,

    /// FWHM of the confocal PSF in nm
    #[arg(long)]
    sigma_confocal: Option<f64>,

    /// FWHM of the STED PSF in nm
    #[arg(long)]
    sigma_sted: Option<f64>,

    /// Layer of a z-stack
    #[arg(long)]
    layer: Option<usize>,
}

impl ParameterArgs {
    fn apply(&self, settings: &mut WienerSettings) {
        if let Some(v) = self.pixel_size {
            settings.pixel_size = v;
        }
        if let Some(v) = self.background {
            settings.background_subtraction = v;
        }
        if let Some(v) = self.ratio {
            settings.ratio = v;
        }
        if let Some(v) = self.nsr {
            settings.noise_to_signal = v;
        }
        if let Some(v) = self.sigma_confocal {
            settings.sigma_confocal = v;
        }
        if let Some(v) = self.sigma_sted {
            settings.sigma_sted = v;
        }
        if let Some(v) = self.layer {
            settings.layer = v;
        }
    }
}

/// Settings of this run: the remembered defaults with the command line overrides applied.
fn prepare_settings(
    parameters: &ParameterArgs,
    output_mode: Option<OutputMode>,
    remember: bool,
) -> Result<WienerSettings> {
    let mut settings = WienerSettings::load_or_default();
    parameters.apply(&mut settings);
    if let Some(mode) = output_mode {
        settings.output_mode = mode;
    }
    settings.validate().context("invalid settings")?;
    for warning in settings.out_of_range_warnings() {
        log::warn!("{warning}");
    }
    if remember {
        match settings.remember() {
            Ok(()) => log::info!("settings stored as new defaults"),
            Err(err) => log::error!("error in saving settings: {err:?}"),
        }
    }
    Ok(settings)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Single {
            file,
            parameters,
            output_mode,
            output_dir,
            remember,
        } => {
            if !file.is_file() {
                bail!("{file:?} is not a file");
            }
            let settings = prepare_settings(&parameters, output_mode, remember)?;

            let input_dir = file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            let fresh = output_dir.is_none();
            let layout = FolderLayout::new(input_dir, output_dir);
            let output_dir = if settings.output_mode == OutputMode::DontSave {
                layout.output_dir
            } else {
                create_folder(&layout.output_dir, fresh)
                    .with_context(|| format!("creating {:?}", layout.output_dir))?
            };

            let (processed, written) = process_file(&file, &settings, &output_dir)
                .with_context(|| format!("processing {file:?}"))?;
            let max = processed.filtered.iter().cloned().fold(0.0f32, f32::max);
            log::info!(
                "{} ({}): {:?} pixels, filtered maximum {max:.3}",
                processed.name,
                processed.sample_type,
                processed.filtered.dim()
            );
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Batch {
            dir,
            parameters,
            format,
            policy,
            threads,
            output_dir,
            remember,
        } => {
            if !dir.is_dir() {
                bail!("{dir:?} is not a folder");
            }
            let settings = prepare_settings(&parameters, None, remember)?;
            let fresh = output_dir.is_none();
            let mut layout = FolderLayout::new(dir, output_dir);
            layout.output_dir = create_folder(&layout.output_dir, fresh)
                .with_context(|| format!("creating {:?}", layout.output_dir))?;

            let options = BatchOptions {
                format,
                policy,
                threads,
            };
            let report = run_batch(&layout, &settings, &options)
                .with_context(|| format!("batch over {:?}", layout.input_dir))?;
            for (path, err) in &report.failed {
                log::error!("{path:?}: {err}");
            }
            if report.skipped > 0 {
                log::warn!("{} image(s) skipped", report.skipped);
            }
            println!("{}", report.output_dir.display());
            if !report.failed.is_empty() {
                bail!(
                    "{} of {} image(s) failed",
                    report.failed.len(),
                    report.failed.len() + report.processed.len()
                );
            }
        }
        Commands::Settings => {
            let settings = WienerSettings::load_or_default();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Filters => {
            for (i, filter) in FILTER_REGISTRY.iter().enumerate() {
                let config = filter.config();
                println!("{}. {} [{:?}]", i + 1, config.name, config.domain);
                println!("   {}", config.description);
                if let Some((label, url)) = config.hyperlink {
                    match label {
                        Some(label) => println!("   {label}: {url}"),
                        None => println!("   {url}"),
                    }
                }
            }
        }
    }
    Ok(())
}
