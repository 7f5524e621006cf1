use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use reframe::crop::CropRegion;
use reframe::encode::{suggested_file_name, FfmpegPipe};
use reframe::geometry::{TARGET_HEIGHT, TARGET_WIDTH};
use reframe::pipeline::{self, CancelFlag, JobOutcome, RenderJob};
use reframe::settings::{ConversionSettings, OutputFormat, Quality};
use reframe::source::{validate_input_path, FrameReader, SourceMedia};

const GIT_HASH: &str = match option_env!("REFRAME_GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

fn long_version() -> String {
    format!("{} ({GIT_HASH})", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Parser)]
#[command(name = "reframe")]
#[command(about = "Horizontal to vertical 9:16 video converter")]
#[command(version, long_version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a video to 1080x1920 vertical using a crop region.
    Convert {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Crop region as `x,y,width,height` percentages of the source.
        #[arg(long)]
        crop: Option<CropRegion>,
        /// YAML settings file; CLI flags override its values.
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long, value_parser = OutputFormat::from_keyword)]
        format: Option<OutputFormat>,
        #[arg(long, value_parser = Quality::from_keyword)]
        quality: Option<Quality>,
        #[arg(long)]
        fps: Option<u32>,
        /// Peak bitrate cap in kbps.
        #[arg(long)]
        bitrate: Option<u32>,
        /// Ignore the crop region and center-fit the full frame.
        #[arg(long)]
        no_auto_crop: bool,
        #[arg(long)]
        watermark: bool,
    },
    /// Print a source file's dimensions and duration.
    Probe {
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            crop,
            settings,
            format,
            quality,
            fps,
            bitrate,
            no_auto_crop,
            watermark,
        } => {
            let mut resolved = match settings {
                Some(path) => ConversionSettings::load(&path)?,
                None => ConversionSettings::default(),
            };
            if let Some(format) = format {
                resolved.format = format;
            }
            if let Some(quality) = quality {
                resolved.quality = quality;
            }
            if let Some(fps) = fps {
                resolved.fps = fps;
            }
            if let Some(bitrate) = bitrate {
                resolved.bitrate_kbps = bitrate;
            }
            if no_auto_crop {
                resolved.auto_crop = false;
            }
            if watermark {
                resolved.watermark = true;
            }
            run_convert(&input, output, crop, resolved)
        }
        Commands::Probe { input } => run_probe(&input),
    }
}

fn run_probe(input: &Path) -> Result<()> {
    validate_input_path(input)?;
    let media = SourceMedia::probe(input)?;

    println!(
        "OK: {} ({}x{}, {:.2}s)",
        input.display(),
        media.width,
        media.height,
        media.duration_seconds
    );
    Ok(())
}

fn run_convert(
    input: &Path,
    output: Option<PathBuf>,
    crop: Option<CropRegion>,
    settings: ConversionSettings,
) -> Result<()> {
    settings.validate()?;
    let crop = crop.unwrap_or_default();
    crop.validate()?;
    validate_input_path(input)?;

    let media = SourceMedia::probe(input)?;
    info!(
        "source {} is {}x{}, {:.2}s",
        input.display(),
        media.width,
        media.height,
        media.duration_seconds
    );

    let output_path = output.unwrap_or_else(|| {
        let name = suggested_file_name(input, settings.format);
        input
            .parent()
            .map(|dir| dir.join(&name))
            .unwrap_or_else(|| PathBuf::from(name))
    });

    let mut job = RenderJob::new(crop, settings);
    let mut source = FrameReader::spawn(media, job.settings.fps)
        .context("failed to start decoding the source")?;
    let sink = Box::new(FfmpegPipe::spawn(&job.settings, &output_path)?);

    let cancel = CancelFlag::new();
    let outcome = pipeline::run(
        &mut job,
        &mut source,
        sink,
        TARGET_WIDTH,
        TARGET_HEIGHT,
        &cancel,
        |percent| eprintln!("progress {percent}%"),
    )?;

    match outcome {
        JobOutcome::Completed(artifact) => {
            println!(
                "Wrote {} ({} bytes)",
                artifact.path.display(),
                artifact.byte_len
            );
        }
        JobOutcome::Abandoned => {
            eprintln!("conversion cancelled");
        }
    }
    Ok(())
}
