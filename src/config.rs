//! Watermark configuration module.
//!
//! Handles loading and validating `markit.toml` files and turning each
//! `[[watermark]]` entry into a [`WatermarkDescriptor`].
//!
//! ## Configuration Options
//!
//! ```toml
//! [processing]
//! parallel = true               # Composite pages on a worker pool
//! max_threads = 4               # Omit for auto = CPU cores
//! on_paint_failure = "skip"     # skip | abort
//!
//! [[watermark]]
//! image = "logo.png"            # Relative to the config file; or `text = "..."`
//! size = 50                     # Percent of the payload's own size (0-100]
//! opacity = 0.5                 # 0.0 - 1.0
//! rotation = 45                 # Degrees, any value
//! dpi = 300                     # Raster targets only
//! position = "tiled"            # center | tiled | fixed | top-left | top-right | bottom-left | bottom-right
//! adjust = [20, 20]             # Tile spacing, corner insets, or a shift for center/fixed
//! horizontal_spacing = 30       # Tiled only; overrides adjust on that axis
//! vertical_spacing = 30
//! pages = [0, 2]                # 0-based; or `except_pages = [...]`
//! enabled = true
//!
//! [watermark.text_style]        # Only for text watermarks
//! font_size = 48
//! color = "#00000080"           # #rrggbb or #rrggbbaa
//! trademark = false
//! ```
//!
//! Range checks (size, opacity, dpi) are done when the descriptor is built,
//! so a config file and the CLI flags fail with the same messages.
//! Unknown keys are rejected to catch typos early.

use crate::watermark::{
    Corner, EngineError, FailurePolicy, PageSelection, Payload, Placement, TextMark,
    WatermarkDescriptor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to load watermark image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Watermark(#[from] EngineError),
}

/// Top-level `markit.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkitConfig {
    pub processing: ProcessingConfig,
    #[serde(rename = "watermark")]
    pub watermarks: Vec<WatermarkEntry>,
}

impl MarkitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, entry) in self.watermarks.iter().enumerate() {
            entry
                .validate()
                .map_err(|msg| ConfigError::Validation(format!("watermark[{i}]: {msg}")))?;
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// One descriptor per entry, disabled ones included. Image paths resolve against `base_dir`.
    pub fn descriptors(&self, base_dir: &Path) -> Result<Vec<WatermarkDescriptor>, ConfigError> {
        self.watermarks
            .iter()
            .map(|w| w.to_descriptor(base_dir))
            .collect()
    }
}

/// Parallel processing and failure handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Composite surfaces on the rayon pool.
    pub parallel: bool,
    /// Maximum number of worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
    pub on_paint_failure: FailurePolicy,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    Center,
    Tiled,
    Fixed,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextStyleConfig {
    pub font_size: f64,
    pub color: String,
    pub trademark: bool,
}

impl Default for TextStyleConfig {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            color: "#000000".to_string(),
            trademark: false,
        }
    }
}

/// One `[[watermark]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkEntry {
    pub image: Option<PathBuf>,
    pub text: Option<String>,
    pub text_style: TextStyleConfig,
    pub size: f64,
    pub opacity: f64,
    pub rotation: f64,
    pub dpi: Option<f64>,
    pub position: Position,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub adjust: Option<[f64; 2]>,
    pub horizontal_spacing: Option<f64>,
    pub vertical_spacing: Option<f64>,
    pub pages: Option<BTreeSet<usize>>,
    pub except_pages: Option<BTreeSet<usize>>,
    pub enabled: bool,
}

impl Default for WatermarkEntry {
    fn default() -> Self {
        Self {
            image: None,
            text: None,
            text_style: TextStyleConfig::default(),
            size: 100.0,
            opacity: 1.0,
            rotation: 0.0,
            dpi: None,
            position: Position::Center,
            x: None,
            y: None,
            adjust: None,
            horizontal_spacing: None,
            vertical_spacing: None,
            pages: None,
            except_pages: None,
            enabled: true,
        }
    }
}

impl WatermarkEntry {
    /// Structural checks that serde can't express.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.image, &self.text) {
            (Some(_), Some(_)) => return Err("set either `image` or `text`, not both".into()),
            (None, None) => return Err("one of `image` or `text` is required".into()),
            _ => {}
        }
        let has_xy = self.x.is_some() || self.y.is_some();
        match self.position {
            Position::Fixed if self.x.is_none() || self.y.is_none() => {
                return Err("position \"fixed\" needs both `x` and `y`".into());
            }
            Position::Fixed => {}
            _ if has_xy => return Err("`x`/`y` are only valid with position \"fixed\"".into()),
            _ => {}
        }
        let has_spacing = self.horizontal_spacing.is_some() || self.vertical_spacing.is_some();
        if has_spacing && self.position != Position::Tiled {
            return Err(
                "`horizontal_spacing`/`vertical_spacing` are only valid with position \"tiled\""
                    .into(),
            );
        }
        if self.pages.is_some() && self.except_pages.is_some() {
            return Err("`pages` and `except_pages` are mutually exclusive".into());
        }
        Ok(())
    }

    fn placement(&self) -> Placement {
        match self.position {
            Position::Center => Placement::Center,
            Position::Tiled => Placement::tiled(),
            Position::Fixed => Placement::Fixed {
                x: self.x.unwrap_or_default(),
                y: self.y.unwrap_or_default(),
            },
            Position::TopLeft => Placement::corner(Corner::TopLeft),
            Position::TopRight => Placement::corner(Corner::TopRight),
            Position::BottomLeft => Placement::corner(Corner::BottomLeft),
            Position::BottomRight => Placement::corner(Corner::BottomRight),
        }
    }

    fn page_selection(&self) -> PageSelection {
        match (&self.pages, &self.except_pages) {
            (Some(only), _) => PageSelection::Only(only.clone()),
            (None, Some(except)) => PageSelection::Except(except.clone()),
            (None, None) => PageSelection::All,
        }
    }

    fn payload(&self, base_dir: &Path) -> Result<Payload, ConfigError> {
        if let Some(image) = &self.image {
            let path = base_dir.join(image);
            let decoded = image::open(&path).map_err(|source| ConfigError::Image {
                path: path.clone(),
                source,
            })?;
            return Ok(Payload::raster(decoded.into_rgba8()));
        }
        let text = self.text.clone().unwrap_or_default();
        Ok(Payload::text(TextMark {
            text,
            font_size: self.text_style.font_size,
            color: parse_color(&self.text_style.color)?,
            trademark: self.text_style.trademark,
        }))
    }

    /// Decode the payload and build a validated descriptor.
    pub fn to_descriptor(&self, base_dir: &Path) -> Result<WatermarkDescriptor, ConfigError> {
        self.validate().map_err(ConfigError::Validation)?;
        let mut builder = WatermarkDescriptor::builder(self.payload(base_dir)?)
            .size(self.size)
            .opacity(self.opacity)
            .rotation(self.rotation)
            .position(self.placement())
            .pages(self.page_selection())
            .enable_if(self.enabled);
        if let Some(dpi) = self.dpi {
            builder = builder.dpi(dpi);
        }
        if let Some([dx, dy]) = self.adjust {
            builder = builder.adjust(dx, dy);
        }
        if let Some(spacing) = self.horizontal_spacing {
            builder = builder.horizontal_spacing(spacing);
        }
        if let Some(spacing) = self.vertical_spacing {
            builder = builder.vertical_spacing(spacing);
        }
        Ok(builder.build()?)
    }
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(s: &str) -> Result<[u8; 4], ConfigError> {
    let invalid = || ConfigError::Validation(format!("invalid color {s:?}, expected #rrggbb or #rrggbbaa"));
    let hex = s.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}

pub fn parse_config(content: &str) -> Result<MarkitConfig, ConfigError> {
    let config: MarkitConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<MarkitConfig, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Returns a fully-commented stock `markit.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# markit configuration
# ====================
# All settings are optional. Values shown are the defaults unless noted.

[processing]
# Composite pages/frames on a worker pool.
parallel = false
# Maximum worker threads. Omit for all CPU cores; larger values are clamped.
# max_threads = 4
# What to do when painting a surface fails: "skip" reports the failure and
# continues with the next surface, "abort" stops the whole run.
on_paint_failure = "skip"

# Repeat [[watermark]] for several marks; they are painted in order.
[[watermark]]
# Content: exactly one of `image` (path relative to this file) or `text`.
# image = "logo.png"
text = "CONFIDENTIAL"

# Percent of the watermark's own size, in (0, 100].
size = 100
# 0.0 (invisible) to 1.0 (opaque).
opacity = 1.0
# Degrees, clockwise, around the watermark's center.
rotation = 0
# Target pixel density for image outputs (scales by dpi / 72). Ignored for pages.
# dpi = 300

# center | tiled | fixed | top-left | top-right | bottom-left | bottom-right
position = "center"
# Top-left corner for position = "fixed".
# x = 100
# y = 200
# Tile spacing for "tiled", inset from the edges for corner positions, and a
# shift right/down for "center" and "fixed".
# adjust = [20, 20]
# Per-axis tile spacing for "tiled"; each overrides adjust on its own axis.
# horizontal_spacing = 20
# vertical_spacing = 20

# 0-based pages to mark. Omit for every page; use except_pages to exclude.
# pages = [0]
# except_pages = [1, 2]

# Set to false to keep the entry but skip it.
enabled = true

[watermark.text_style]
font_size = 48
# #rrggbb or #rrggbbaa
color = "#000000"
trademark = false
"##
}
