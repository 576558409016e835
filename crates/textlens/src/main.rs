//! textlens: apply a filter chain and perspective correction to an image.
//!
//! Runs the same pipeline the reprocessing coordinator drives, once,
//! on an image file, and prints per-step diagnostics. Useful for:
//!
//! - Checking what a filter chain does to a photographed page
//! - Measuring per-filter durations and the effect of the tile size
//! - Producing a cleaned-up PNG to feed a text-recognition service
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin textlens -- [OPTIONS] <IMAGE_PATH>
//! textlens page.jpg --filter grayscale --filter median=5 --filter binary=140 -o page.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use textlens_pipeline::diagnostics::PipelineDiagnostics;
use textlens_pipeline::{
    Clock, DownsampleFilter, FilterChain, FilterKind, FilterParams, HomographySettings, Never,
    PipelineConfig, PixelBuffer, Point, TileExecutor,
};
use tracing_subscriber::EnvFilter;

/// Filter chain and perspective correction for photographed text.
///
/// Loads an image, optionally corrects its perspective, runs the given
/// filters in order, prints per-step timing and writes the result.
#[derive(Parser)]
#[command(name = "textlens", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Write the filtered image as PNG.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Filter to append to the chain, as `kind` or `kind=strength`.
    ///
    /// Repeat to build a chain; filters run in the order given. Kinds:
    /// binary, contrast, sharpen, median, averaging, grayscale,
    /// brightness, saturation, hue, edge-coloring.
    #[arg(short, long = "filter", value_name = "KIND[=STRENGTH]", value_parser = parse_filter)]
    filters: Vec<FilterArg>,

    /// Edge color for edge-coloring filters, as `r,g,b`.
    #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
    edge_color: Option<[u8; 3]>,

    /// Full filter chain as a JSON string; replaces `--filter`.
    #[arg(long, conflicts_with = "filters")]
    chain_json: Option<String>,

    /// Page corners in source pixels: top-left, top-right, bottom-left,
    /// bottom-right.
    #[arg(
        long,
        value_name = "X,Y,X,Y,X,Y,X,Y",
        value_parser = parse_corners,
        allow_hyphen_values = true
    )]
    corners: Option<[Point; 4]>,

    /// Tile side length for median, averaging and sharpen.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLOCK_SIZE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    block_size: u32,

    /// Longest side of the working image; larger inputs are downsized.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_DIMENSION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_dimension: u32,

    /// Resampling filter used when downsizing.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RESAMPLE)]
    resample: Resample,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, `--block-size`, `--max-dimension` and
    /// `--resample` are ignored. The JSON must be a valid
    /// `PipelineConfig` serialization; missing fields take defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// One `--filter` argument.
#[derive(Debug, Clone, Copy)]
struct FilterArg {
    kind: FilterKind,
    strength: Option<i32>,
}

/// Downsizing filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Resample {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Resample> for DownsampleFilter {
    fn from(r: Resample) -> Self {
        match r {
            Resample::Nearest => Self::Nearest,
            Resample::Triangle => Self::Triangle,
            Resample::CatmullRom => Self::CatmullRom,
            Resample::Gaussian => Self::Gaussian,
            Resample::Lanczos3 => Self::Lanczos3,
        }
    }
}

const fn resample_from_pipeline(f: DownsampleFilter) -> Resample {
    match f {
        DownsampleFilter::Nearest => Resample::Nearest,
        DownsampleFilter::Triangle => Resample::Triangle,
        DownsampleFilter::CatmullRom => Resample::CatmullRom,
        DownsampleFilter::Gaussian => Resample::Gaussian,
        DownsampleFilter::Lanczos3 => Resample::Lanczos3,
    }
}

/// Derived from [`PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER`] so the
/// two cannot silently diverge.
const CLI_DEFAULT_RESAMPLE: Resample =
    resample_from_pipeline(PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER);

fn parse_filter(s: &str) -> Result<FilterArg, String> {
    let (kind, strength) = match s.split_once('=') {
        Some((kind, strength)) => {
            let strength = strength
                .trim()
                .parse::<i32>()
                .map_err(|e| format!("invalid strength {strength:?}: {e}"))?;
            (kind, Some(strength))
        }
        None => (s, None),
    };
    let kind = kind.trim().parse::<FilterKind>().map_err(|e| e.to_string())?;
    if let Some(strength) = strength {
        kind.check_strength(strength).map_err(|e| e.to_string())?;
    }
    Ok(FilterArg { kind, strength })
}

fn parse_color(s: &str) -> Result<[u8; 3], String> {
    let channels = s
        .split(',')
        .map(|c| c.trim().parse::<u8>().map_err(|e| format!("{c:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[u8; 3]>::try_from(channels).map_err(|v| format!("expected 3 channels, got {}", v.len()))
}

fn parse_corners(s: &str) -> Result<[Point; 4], String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("{c:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [x0, y0, x1, y1, x2, y2, x3, y3] = <[f64; 8]>::try_from(coords)
        .map_err(|v| format!("expected 8 coordinates, got {}", v.len()))?;
    Ok([
        Point::new(x0, y0),
        Point::new(x1, y1),
        Point::new(x2, y2),
        Point::new(x3, y3),
    ])
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            block_size: cli.block_size,
            max_dimension: cli.max_dimension,
            downsample_filter: cli.resample.into(),
        }
    };
    config.validate().map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

/// Build the filter chain from `--chain-json` or the `--filter` list.
fn chain_from_cli(cli: &Cli) -> Result<FilterChain, String> {
    if let Some(ref json) = cli.chain_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --chain-json: {e}"));
    }

    let mut chain = FilterChain::new();
    for arg in &cli.filters {
        let params = match (arg.kind, cli.edge_color) {
            (FilterKind::EdgeColoring, Some(color)) => FilterParams::EdgeColoring { color },
            (kind, _) => FilterParams::for_kind(kind),
        };
        let strength = arg.strength.unwrap_or_else(|| arg.kind.default_strength());
        chain
            .push_with(arg.kind, strength, params)
            .map_err(|e| format!("Invalid filter {}: {e}", arg.kind))?;
    }
    Ok(chain)
}

/// Perspective settings for the working image, from source-pixel corners.
///
/// Corners are given against the original file; when the image was
/// downsized they are scaled to the working size.
fn homography_from_cli(
    corners: [Point; 4],
    original: (u32, u32),
    working: &PixelBuffer,
) -> Result<HomographySettings, String> {
    let scale = f64::from(working.width()) / f64::from(original.0.max(1));
    let [top_left, top_right, bottom_left, bottom_right] =
        corners.map(|p| Point::new(p.x * scale, p.y * scale));
    let settings = HomographySettings {
        top_left,
        top_right,
        bottom_left,
        bottom_right,
        ..HomographySettings::for_image(working, 1.0)
    };
    settings
        .validate()
        .map_err(|e| format!("Invalid --corners: {e}"))?;
    Ok(settings)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let chain = match chain_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let executor = match TileExecutor::from_config(&config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let original = match textlens_io::raster::load(&cli.image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let (source, resized) =
        textlens_pipeline::fit_within(&original, config.max_dimension, config.downsample_filter);
    tracing::debug!(
        width = source.width(),
        height = source.height(),
        resized,
        "working image ready"
    );

    let homography = match cli
        .corners
        .map(|corners| homography_from_cli(corners, original.dimensions(), &source))
        .transpose()
    {
        Ok(h) => h,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{}{})",
        cli.image_path.display(),
        original.width(),
        original.height(),
        if resized {
            format!(", working at {}x{}", source.width(), source.height())
        } else {
            String::new()
        },
    );
    eprintln!("Config: {config:#?}");
    eprintln!(
        "Chain: {}",
        chain
            .iter()
            .map(|f| format!("{}={}", f.kind().slug(), f.strength()))
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    eprintln!();

    let (result, diagnostics) = match textlens_pipeline::process_with_diagnostics(
        &source,
        homography.as_ref(),
        &chain,
        &executor,
        &Never,
        &StdClock::default(),
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Pipeline error ({}): {e}", e.code());
            return ExitCode::FAILURE;
        }
    };

    match render_diagnostics(&diagnostics, cli.json) {
        Ok(text) => println!("{text}"),
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    }

    if let Some(ref path) = cli.output {
        match textlens_io::raster::save_png(&result.filtered, path) {
            Ok(()) => eprintln!("PNG written to {}", path.display()),
            Err(e) => {
                eprintln!("Error writing PNG to {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Diagnostics as pretty JSON or as the text report.
fn render_diagnostics(diagnostics: &PipelineDiagnostics, json: bool) -> Result<String, String> {
    if json {
        serde_json::to_string_pretty(diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))
    } else {
        Ok(diagnostics.report())
    }
}

/// [`Clock`] backed by [`std::time::Instant`], measured from creation.
struct StdClock {
    origin: Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn filter_argument_with_and_without_strength() {
        let arg = parse_filter("median=5").unwrap();
        assert_eq!(arg.kind, FilterKind::Median);
        assert_eq!(arg.strength, Some(5));

        let arg = parse_filter("Edge-Coloring").unwrap();
        assert_eq!(arg.kind, FilterKind::EdgeColoring);
        assert_eq!(arg.strength, None);
    }

    #[test]
    fn filter_argument_rejects_bad_input() {
        assert!(parse_filter("emboss").is_err());
        assert!(parse_filter("median=x").is_err());
        assert!(parse_filter("median=21").is_err());
        assert!(parse_filter("contrast=259").is_err());
    }

    #[test]
    fn corners_need_eight_coordinates() {
        let corners = parse_corners("0,0, 10,0, 0,20, 10,20").unwrap();
        assert_eq!(corners[3], Point::new(10.0, 20.0));
        assert!(parse_corners("0,0,10,0").is_err());
    }

    #[test]
    fn color_needs_three_channels() {
        assert_eq!(parse_color("0,128,255").unwrap(), [0, 128, 255]);
        assert!(parse_color("0,128").is_err());
        assert!(parse_color("0,128,256").is_err());
    }

    #[test]
    fn edge_color_applies_to_edge_filters_only() {
        let cli = Cli::parse_from([
            "textlens",
            "in.png",
            "--filter",
            "grayscale",
            "--filter",
            "edge-coloring",
            "--edge-color",
            "0,255,0",
        ]);
        let chain = chain_from_cli(&cli).unwrap();
        let params: Vec<FilterParams> = chain.iter().map(|f| f.params()).collect();
        assert_eq!(
            params,
            [
                FilterParams::None,
                FilterParams::EdgeColoring { color: [0, 255, 0] }
            ]
        );
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "textlens",
            "in.png",
            "--block-size",
            "7",
            "--config-json",
            r#"{"block_size": 32}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.block_size, 32);
        assert_eq!(config.max_dimension, PipelineConfig::DEFAULT_MAX_DIMENSION);
    }

    #[test]
    fn corners_scale_to_working_image() {
        let working = PixelBuffer::new(50, 25);
        let corners = parse_corners("10,10,90,10,10,40,90,40").unwrap();
        let settings = homography_from_cli(corners, (100, 50), &working).unwrap();
        assert_eq!(settings.top_left, Point::new(5.0, 5.0));
        assert_eq!(settings.bottom_right, Point::new(45.0, 20.0));
    }

    #[test]
    fn diagnostics_render_as_report_or_json() {
        let mut chain = FilterChain::new();
        chain.push(FilterKind::Grayscale);
        let source = PixelBuffer::new(4, 3);
        let (_, diagnostics) = textlens_pipeline::process_with_diagnostics(
            &source,
            None,
            &chain,
            &TileExecutor::default(),
            &Never,
            &StdClock::default(),
        )
        .unwrap();

        let report = render_diagnostics(&diagnostics, false).unwrap();
        assert!(report.contains("Grayscale"));
        let json: serde_json::Value =
            serde_json::from_str(&render_diagnostics(&diagnostics, true).unwrap()).unwrap();
        assert_eq!(json["filters"].as_array().unwrap().len(), 1);
        assert_eq!(json["summary"]["output_width"], 4);
    }

    #[test]
    fn processing_is_single_shot() {
        assert!(Cli::try_parse_from(["textlens", "in.png", "--runs", "3"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
