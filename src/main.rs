//! czi-slide - inspect and extract regions from Zeiss CZI whole-slide images.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use czi_slide::config::{Cli, Command};
use czi_slide::slide::Slide;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Info { path } => run_info(path).await,
        Command::Region {
            path,
            level,
            x,
            y,
            w,
            h,
            out,
        } => run_region(path, level, x, y, w, h, out).await,
        Command::Check { path } => run_check(path).await,
    }
}

async fn run_info(path: String) -> ExitCode {
    let slide = match Slide::open(path).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open slide: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("quickhash-1: {}", slide.quickhash());
    if let Some((w, h)) = slide.dimensions() {
        println!("dimensions: {w} x {h}");
    }
    println!("levels: {}", slide.level_count());
    for level in 0..slide.level_count() {
        let info = slide.level_info(level).unwrap();
        println!(
            "  [{level}] {}x{} tile {}x{} downsample {:.1}",
            info.width, info.height, info.tile_width, info.tile_height, info.downsample
        );
    }

    let names: Vec<&str> = slide.associated_image_names().collect();
    if !names.is_empty() {
        println!("associated images: {}", names.join(", "));
    }

    println!("properties:");
    for (key, value) in slide.properties().iter() {
        println!("  {key} = {value}");
    }

    ExitCode::SUCCESS
}

#[allow(clippy::too_many_arguments)]
async fn run_region(
    path: String,
    level: usize,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    out: String,
) -> ExitCode {
    let slide = match Slide::open(path).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open slide: {e}");
            return ExitCode::FAILURE;
        }
    };

    let buffer = match slide.paint_region(level, x, y, w, h).await {
        Ok(buf) => buf,
        Err(e) => {
            error!("failed to paint region: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_ppm(&out, &buffer) {
        error!("failed to write {out}: {e}");
        return ExitCode::FAILURE;
    }

    info!("wrote {}x{} region to {out}", buffer.width, buffer.height);
    ExitCode::SUCCESS
}

async fn run_check(path: String) -> ExitCode {
    match Slide::open(path).await {
        Ok(slide) => {
            println!("OK: {} level(s), quickhash {}", slide.level_count(), slide.quickhash());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("FAIL: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Write an ARGB32 buffer out as a plain RGB PPM (dropping alpha), good
/// enough for eyeballing a decoded region without a full image codec.
fn write_ppm(path: &str, buffer: &czi_slide::codec::Argb32Buffer) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "P6\n{} {}\n255", buffer.width, buffer.height)?;
    for pixel in buffer.pixels.chunks_exact(4) {
        writer.write_all(&[pixel[0], pixel[1], pixel[2]])?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "czi_slide=debug"
    } else {
        "czi_slide=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
