use clap::{Parser, Subcommand};
use markit::config::{self, MarkitConfig, Position, TextStyleConfig, WatermarkEntry};
use markit::output;
use markit::watermark::{
    Engine, EngineError, FailurePolicy, PageDocument, RasterSurface, Report, Surface,
    SurfaceGeometry, WatermarkDescriptor, load_raster, save_raster,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG: &str = "markit.toml";

/// A watermark given on the command line. Overrides any configured ones.
#[derive(clap::Args, Clone)]
struct MarkArgs {
    /// Image to stamp (PNG, JPEG, TIFF, WebP)
    #[arg(long, conflicts_with = "text")]
    image: Option<PathBuf>,

    /// Text to stamp
    #[arg(long)]
    text: Option<String>,

    /// Percent of the watermark's own size, in (0, 100]
    #[arg(long, default_value_t = 100.0)]
    size: f64,

    /// 0.0 (invisible) to 1.0 (opaque)
    #[arg(long, default_value_t = 1.0)]
    opacity: f64,

    /// Clockwise degrees around the watermark's center
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    rotation: f64,

    /// Target pixel density for image inputs
    #[arg(long)]
    dpi: Option<f64>,

    #[arg(long, value_enum, default_value_t = Position::Center)]
    position: Position,

    /// Left edge for --position fixed
    #[arg(long, allow_hyphen_values = true)]
    x: Option<f64>,

    /// Top edge for --position fixed
    #[arg(long, allow_hyphen_values = true)]
    y: Option<f64>,

    /// Tile spacing for tiled, inset for corner positions, shift for center and fixed
    #[arg(long, num_args = 2, value_names = ["DX", "DY"], allow_hyphen_values = true)]
    adjust: Option<Vec<f64>>,

    /// Gap between tile columns for --position tiled
    #[arg(long, allow_hyphen_values = true)]
    horizontal_spacing: Option<f64>,

    /// Gap between tile rows for --position tiled
    #[arg(long, allow_hyphen_values = true)]
    vertical_spacing: Option<f64>,

    /// 0-based pages to mark, comma separated
    #[arg(long, value_delimiter = ',')]
    pages: Option<Vec<usize>>,

    /// 0-based pages to leave alone, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "pages")]
    except_pages: Option<Vec<usize>>,

    #[arg(long, default_value_t = 48.0)]
    font_size: f64,

    /// Text color, #rrggbb or #rrggbbaa
    #[arg(long, default_value = "#000000")]
    color: String,

    /// Append a trademark sign to the text
    #[arg(long)]
    trademark: bool,
}

impl MarkArgs {
    fn to_entry(&self) -> Option<WatermarkEntry> {
        if self.image.is_none() && self.text.is_none() {
            return None;
        }
        Some(WatermarkEntry {
            image: self.image.clone(),
            text: self.text.clone(),
            text_style: TextStyleConfig {
                font_size: self.font_size,
                color: self.color.clone(),
                trademark: self.trademark,
            },
            size: self.size,
            opacity: self.opacity,
            rotation: self.rotation,
            dpi: self.dpi,
            position: self.position,
            x: self.x,
            y: self.y,
            adjust: self.adjust.as_deref().map(|a| [a[0], a[1]]),
            horizontal_spacing: self.horizontal_spacing,
            vertical_spacing: self.vertical_spacing,
            pages: self.pages.as_ref().map(|p| p.iter().copied().collect()),
            except_pages: self.except_pages.as_ref().map(|p| p.iter().copied().collect()),
            enabled: true,
        })
    }
}

#[derive(Parser)]
#[command(name = "markit")]
#[command(about = "Stamp image and text watermarks onto images and paged documents")]
#[command(long_about = "\
Stamp image and text watermarks onto images and paged documents

Inputs ending in .json are page documents (a list of pages sized in points);
everything else is decoded as an image.

Watermarks come from markit.toml (see 'markit gen-config'), painted in order
with later ones on top, or from the --image/--text flags, which take the
place of the configured list.

Examples:
  markit apply photo.jpg -o out.jpg --image logo.png --size 30 --position bottom-right --adjust 20 20
  markit apply report.json -o marked.json --text DRAFT --position tiled --rotation 45 --opacity 0.2
  markit plan photo.jpg --text SAMPLE --position tiled

Set MARKIT_LOG=debug for per-surface logging.")]
#[command(version)]
struct Cli {
    /// Watermark config file (defaults to ./markit.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watermark an image or page document and write the result
    Apply {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        mark: MarkArgs,

        /// Composite pages on a worker pool
        #[arg(long)]
        parallel: bool,

        /// Stop at the first page that fails to paint
        #[arg(long, conflicts_with = "keep_going")]
        fail_fast: bool,

        /// Report paint failures and continue with the next page (the default
        /// unless the config sets on_paint_failure = "abort")
        #[arg(long)]
        keep_going: bool,

        /// Override the input image's native resolution
        #[arg(long)]
        surface_dpi: Option<f64>,
    },
    /// Show where watermarks would be placed, without painting
    Plan {
        input: PathBuf,

        #[command(flatten)]
        mark: MarkArgs,

        #[arg(long)]
        surface_dpi: Option<f64>,
    },
    /// Print a stock markit.toml with all options documented
    GenConfig,
}

enum Input {
    Raster(RasterSurface),
    Document(PageDocument),
}

impl Input {
    fn load(path: &Path, surface_dpi: Option<f64>) -> Result<Self, Box<dyn std::error::Error>> {
        if is_document(path) {
            return Ok(Input::Document(PageDocument::load(path)?));
        }
        let surface = load_raster(path)?;
        Ok(Input::Raster(match surface_dpi {
            Some(dpi) => surface.with_resolution(dpi),
            None => surface,
        }))
    }

    fn geometries(&self) -> Vec<SurfaceGeometry> {
        match self {
            Input::Raster(surface) => vec![surface.geometry()],
            Input::Document(doc) => doc.pages.iter().map(|p| p.geometry()).collect(),
        }
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Apply {
            input,
            output: output_path,
            mark,
            parallel,
            fail_fast,
            keep_going,
            surface_dpi,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let descriptors = collect_descriptors(&config, cli.config.as_deref(), &mark)?;
            init_thread_pool(&config.processing);

            let policy = if fail_fast {
                FailurePolicy::Abort
            } else if keep_going {
                FailurePolicy::Skip
            } else {
                config.processing.on_paint_failure
            };
            let engine = Engine::new().with_failure_policy(policy);
            let parallel = parallel || config.processing.parallel;

            let reports = match Input::load(&input, surface_dpi)? {
                Input::Raster(mut surface) => {
                    let reports = run(
                        &engine,
                        &descriptors,
                        std::slice::from_mut(&mut surface),
                        false,
                    )?;
                    save_raster(surface.image(), &output_path)?;
                    reports
                }
                Input::Document(mut doc) => {
                    let reports = run(&engine, &descriptors, &mut doc.pages, parallel)?;
                    doc.save(&output_path)?;
                    reports
                }
            };
            output::print_reports(&descriptors, &reports);
            info!(output = %output_path.display(), "wrote watermarked output");

            let failed = reports.iter().flat_map(|r| r.failures()).count();
            if failed > 0 {
                return Err(format!("{failed} surface(s) failed to paint").into());
            }
        }
        Command::Plan {
            input,
            mark,
            surface_dpi,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let descriptors = collect_descriptors(&config, cli.config.as_deref(), &mark)?;
            let geometries = Input::load(&input, surface_dpi)?.geometries();

            let engine = Engine::new();
            let plans = descriptors
                .iter()
                .map(|d| engine.plan_all(d, &geometries))
                .collect::<Result<Vec<_>, _>>()?;
            output::print_plan(&descriptors, &plans, &geometries);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `MARKIT_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("MARKIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit `--config` must exist; the default file is optional.
fn resolve_config(path: Option<&Path>) -> Result<MarkitConfig, config::ConfigError> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "loading config");
            config::load_config(path)
        }
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            info!(config = DEFAULT_CONFIG, "loading config");
            config::load_config(Path::new(DEFAULT_CONFIG))
        }
        None => Ok(MarkitConfig::default()),
    }
}

/// A watermark given on the command line replaces the configured list.
fn collect_descriptors(
    config: &MarkitConfig,
    config_path: Option<&Path>,
    mark: &MarkArgs,
) -> Result<Vec<WatermarkDescriptor>, Box<dyn std::error::Error>> {
    let descriptors = match mark.to_entry() {
        Some(entry) => vec![entry.to_descriptor(Path::new("."))?],
        None => {
            let config_dir = config_path
                .and_then(Path::parent)
                .unwrap_or_else(|| Path::new("."));
            config.descriptors(config_dir)?
        }
    };
    if descriptors.is_empty() {
        return Err("no watermark given: use --image/--text or a markit.toml".into());
    }
    debug!(count = descriptors.len(), "resolved watermarks");
    Ok(descriptors)
}

fn run<S: Surface + Send>(
    engine: &Engine,
    descriptors: &[WatermarkDescriptor],
    surfaces: &mut [S],
    parallel: bool,
) -> Result<Vec<Report>, EngineError> {
    if parallel {
        engine.apply_all_parallel(descriptors, surfaces)
    } else {
        engine.apply_all(descriptors, surfaces)
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
