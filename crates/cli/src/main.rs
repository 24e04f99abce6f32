//! covershift CLI - land-cover change detection from satellite scenes

mod config;
mod pipeline;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use covershift_core::io::GeoTiffReader;
use covershift_core::Window;
use covershift_parallel::{set_num_threads, ProcessingMode};

use crate::config::load_config;
use crate::pipeline::{spinner, Pipeline};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "covershift")]
#[command(author, version, about = "Land-cover change detection from satellite scenes", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML); defaults are used when absent
    #[arg(short, long, global = true, default_value = "covershift.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (1 = sequential)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every scene of a period has its band and QA files
    Validate {
        /// Period label, e.g. 2018
        #[arg(short, long)]
        period: String,
    },
    /// Mask clouds, shadows and cirrus in every scene of a period
    Mask {
        #[arg(short, long)]
        period: String,
    },
    /// Merge a period's masked scenes into one mosaic
    Mosaic {
        #[arg(short, long)]
        period: String,
    },
    /// Classify a period's mosaic
    Classify {
        #[arg(short, long)]
        period: String,
        /// Classify this raster instead of the period's mosaic
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Compare the two periods' classifications
    Change,
    /// Mask, mosaic and classify both periods, then analyze change
    Run,
    /// Show geometry, block layout and band statistics of a raster
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Print the band values at a map coordinate
    Sample {
        /// Input raster file
        input: PathBuf,
        /// X coordinate in the raster's CRS
        #[arg(short, allow_hyphen_values = true)]
        x: f64,
        /// Y coordinate in the raster's CRS
        #[arg(short, allow_hyphen_values = true)]
        y: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn open_raster(path: &Path) -> Result<GeoTiffReader> {
    GeoTiffReader::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn info_command(input: &Path) -> Result<()> {
    let mut reader = open_raster(input)?;
    let geometry = reader.geometry().clone();
    let (min_x, min_y, max_x, max_y) = geometry.transform.bounds(geometry.cols, geometry.rows);
    let (block_rows, block_cols) = reader.block_shape();

    println!("File: {}", input.display());
    println!(
        "Dimensions: {} x {} ({} cells), {} band(s) of {}",
        geometry.cols,
        geometry.rows,
        geometry.rows * geometry.cols,
        reader.bands(),
        reader.sample_kind()
    );
    println!(
        "Cell size: {} x {}",
        geometry.transform.pixel_width,
        geometry.transform.pixel_height.abs()
    );
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        min_x, min_y, max_x, max_y
    );
    match &geometry.crs {
        Some(crs) => println!("CRS: {}", crs),
        None => println!("CRS: none"),
    }
    if let Some(nodata) = reader.nodata() {
        println!("NoData: {}", nodata);
    }
    println!(
        "Blocks: {:?} {} x {} ({} blocks)",
        reader.layout(),
        block_cols,
        block_rows,
        reader.block_windows().block_count()
    );

    let pb = spinner("Computing statistics...");
    let mut stats = Vec::with_capacity(reader.bands());
    for band in 0..reader.bands() {
        let raster = reader.read_band::<f64>(band)?;
        stats.push(raster.statistics());
    }
    pb.finish_and_clear();

    let cells = (geometry.rows * geometry.cols) as f64;
    for (band, s) in stats.iter().enumerate() {
        println!("\nBand {}:", band + 1);
        if let Some(min) = s.min {
            println!("  Min: {:.4}", min);
        }
        if let Some(max) = s.max {
            println!("  Max: {:.4}", max);
        }
        if let Some(mean) = s.mean {
            println!("  Mean: {:.4}", mean);
        }
        println!(
            "  Valid cells: {} ({:.1}%)",
            s.valid_count,
            100.0 * s.valid_count as f64 / cells
        );
    }
    Ok(())
}

fn sample_command(input: &Path, x: f64, y: f64) -> Result<()> {
    let mut reader = open_raster(input)?;
    let (col, row) = reader.geometry().transform.geo_to_pixel(x, y);
    let (col, row) = (col.floor(), row.floor());
    if col < 0.0 || row < 0.0 || col >= reader.cols() as f64 || row >= reader.rows() as f64 {
        anyhow::bail!(
            "({}, {}) is outside {} ({} x {} cells)",
            x,
            y,
            input.display(),
            reader.cols(),
            reader.rows()
        );
    }
    let (row, col) = (row as usize, col as usize);
    let values = reader.read_window::<f64>(&Window::new(row, col, 1, 1))?;

    let (cx, cy) = reader.geometry().transform.pixel_to_geo(col, row);
    println!("Pixel: row {}, col {} (center {:.3}, {:.3})", row, col, cx, cy);
    for (band, v) in values.iter().enumerate() {
        let nodata = reader.nodata().map_or(v.is_nan(), |nd| *v == nd || v.is_nan());
        if nodata {
            println!("  Band {}: nodata", band + 1);
        } else {
            println!("  Band {}: {}", band + 1, v);
        }
    }
    Ok(())
}

fn print_validation(pipeline: &Pipeline, period: &str) -> Result<()> {
    let scenes = pipeline.validate(period)?;
    let mut incomplete = 0;
    for scene in &scenes {
        println!("Scene: {}", scene.scene);
        for (keyword, file) in &scene.files {
            match file {
                Some(path) => println!("  {:<10} {}", keyword, path.display()),
                None => println!("  {:<10} MISSING", keyword),
            }
        }
        if let Some(crs) = &scene.crs {
            println!("  CRS: {}", crs);
        }
        if let Some((x, y)) = scene.resolution {
            println!("  Resolution: {} x {}", x, y);
        }
        if !scene.is_complete() {
            incomplete += 1;
        }
    }
    if incomplete > 0 {
        anyhow::bail!("{} of {} scenes in {} are incomplete", incomplete, scenes.len(), period);
    }
    println!("{} scenes complete", scenes.len());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    if let Some(threads) = cli.threads.filter(|&n| n > 0) {
        set_num_threads(threads).context("Failed to configure thread pool")?;
    }
    let mode = ProcessingMode::from_threads(cli.threads);

    match cli.command {
        Commands::Info { input } => info_command(&input)?,
        Commands::Sample { input, x, y } => sample_command(&input, x, y)?,
        command => {
            let config = load_config(Some(cli.config.as_path()))?;
            info!(
                raw = %config.paths.raw_dir.display(),
                processed = %config.paths.processed_dir.display(),
                "loaded configuration"
            );
            let pipeline = Pipeline::new(config, mode);

            match command {
                Commands::Validate { period } => print_validation(&pipeline, &period)?,
                Commands::Mask { period } => pipeline.mask(&period)?,
                Commands::Mosaic { period } => {
                    pipeline.mosaic(&period)?;
                }
                Commands::Classify { period, input } => {
                    pipeline.classify(&period, input.as_deref())?;
                }
                Commands::Change => pipeline.change()?,
                Commands::Run => pipeline.run_all()?,
                Commands::Info { .. } | Commands::Sample { .. } => {}
            }
        }
    }

    Ok(())
}
