//! hazard-detector CLI: run the terrain hazard detector on recorded frames.

use clap::{Args, Parser, Subcommand};
use hazard_detector::{
    CalibrationMatrix, DepthFrame, DetectorConfig, HazardDetector, TraversabilityGrid,
};
use image::RgbImage;
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "hazard-detector")]
#[command(about = "Detect terrain hazards in depth frames against a flat-ground baseline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one depth frame and write the overlay, grid and summary.
    Analyze(CliAnalyzeArgs),

    /// Record a calibration baseline from an obstacle-free depth frame.
    Calibrate {
        /// Depth frame in the calibration CSV layout (metres).
        #[arg(long)]
        depth: PathBuf,

        /// Path to write the calibration CSV.
        #[arg(long)]
        out: PathBuf,
    },

    /// Print the traversability grid geometry of a configuration.
    GridInfo {
        /// Detector configuration (JSON). Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct CliAnalyzeArgs {
    /// Detector configuration (JSON). Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration baseline (CSV).
    #[arg(long)]
    calibration: PathBuf,

    /// Live depth frame in the calibration CSV layout (metres).
    #[arg(long)]
    depth: PathBuf,

    /// Visual frame to annotate. A black canvas of the depth size is used
    /// when omitted.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Path to write the annotated visual frame (PNG).
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Path to write the traversability grid as a grayscale image (PNG).
    #[arg(long)]
    grid_out: Option<PathBuf>,

    /// Path to write the scan summary (JSON).
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Calibrate { depth, out } => run_calibrate(&depth, &out),
        Commands::GridInfo { config } => run_grid_info(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<DetectorConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            DetectorConfig::from_json_file(path).map_err(|e| -> CliError {
                format!("Failed to load config {}: {}", path.display(), e).into()
            })
        }
        None => Ok(DetectorConfig::default()),
    }
}

fn load_depth(path: &Path) -> CliResult<CalibrationMatrix> {
    tracing::info!("Loading depth frame: {}", path.display());
    let depth = CalibrationMatrix::read_csv_file(path)?;
    if depth.is_empty() {
        return Err(format!("Depth frame {} is empty", path.display()).into());
    }
    tracing::info!("Depth size: {}x{}", depth.cols(), depth.rows());
    Ok(depth)
}

// ── analyze ────────────────────────────────────────────────────────────

fn run_analyze(args: &CliAnalyzeArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let mut detector = HazardDetector::new(config)?;

    if !detector.read_calibration_file(&args.calibration)? {
        return Err(format!(
            "Calibration {} does not yield a usable region of interest",
            args.calibration.display()
        )
        .into());
    }

    let depth = load_depth(&args.depth)?;
    let mut visual = match &args.image {
        Some(path) => {
            tracing::info!("Loading image: {}", path.display());
            image::open(path)
                .map_err(|e| -> CliError {
                    format!("Failed to open image {}: {}", path.display(), e).into()
                })?
                .to_rgb8()
        }
        None => RgbImage::new(depth.cols() as u32, depth.rows() as u32),
    };

    let frame = DepthFrame::new(depth.as_slice(), depth.rows(), depth.cols());
    let hazardous = detector.analyze(&frame, &mut visual);
    let summary = detector.last_scan();

    tracing::info!(
        "Scanned {} pixels: {} too close, {} too far",
        summary.pixels_considered,
        summary.too_close,
        summary.too_far,
    );
    if hazardous {
        tracing::info!(
            "Hazard: {} pixels over limit {}, {} grid cells marked",
            summary.hazard_pixels,
            detector.hazard_pixel_limit(),
            summary.hazard_cells,
        );
    } else {
        tracing::info!("No hazard");
    }

    if let Some(path) = &args.overlay_out {
        visual.save(path)?;
        tracing::info!("Overlay written to {}", path.display());
    }

    if let Some(path) = &args.grid_out {
        detector.traversability_map().to_gray_image().save(path)?;
        tracing::info!("Traversability grid written to {}", path.display());
    }

    if let Some(path) = &args.summary_out {
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(path, &json)?;
        tracing::info!("Summary written to {}", path.display());
    }

    println!("{}", if hazardous { "hazard" } else { "clear" });
    Ok(())
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(depth_path: &Path, out: &Path) -> CliResult<()> {
    let depth = load_depth(depth_path)?;
    let calibration = CalibrationMatrix::from_depth(depth.as_slice(), depth.rows(), depth.cols())?;
    let invalid = depth.rows() * depth.cols() - calibration.valid_count();
    if invalid > 0 {
        tracing::warn!("{} pixels without a valid reading stored as NaN", invalid);
    }

    calibration.write_csv_file(out)?;
    tracing::info!("Calibration written to {}", out.display());
    Ok(())
}

// ── grid-info ──────────────────────────────────────────────────────────

fn run_grid_info(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let map = &config.traversability_map;
    let grid = TraversabilityGrid::new(map);
    let [cx, cy] = grid.center();

    println!("hazard-detector traversability grid");
    println!("  physical size:  {} x {} m", map.width_m, map.height_m);
    println!("  resolution:     {} m/cell", map.resolution_m);
    println!("  cells:          {} x {}", grid.width(), grid.height());
    println!("  rover cell:     ({}, {})", cx, cy);
    println!(
        "  cell values:    hazard={} traversable={}",
        grid.hazard_value(),
        grid.traversable_value()
    );

    Ok(())
}
