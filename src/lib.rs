//! # markit
//!
//! Places raster and text watermarks onto pixel images and paged documents.
//! One watermark description (content, size, rotation, opacity, position) is
//! resolved per target surface into concrete affine transforms, then painted.
//!
//! # Architecture: Plan, Then Paint
//!
//! ```text
//! 1. Describe   WatermarkBuilder   →  WatermarkDescriptor   (validated, immutable)
//! 2. Plan       descriptor + surface geometry  →  PlacementResult  (pure)
//! 3. Paint      PlacementResult + Surface  →  composited output
//! ```
//!
//! Every surface is planned before any surface is painted, so a configuration
//! error (bad size, degenerate tiling) leaves all surfaces untouched. Planning is
//! pure arithmetic and is what `markit plan` prints.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`watermark`] | Descriptor, normalization, placement, the [`watermark::Surface`] trait and the compositing [`watermark::Engine`] |
//! | [`config`] | `markit.toml` loading and validation, turning entries into descriptors |
//! | [`output`] | CLI output formatting for plans and paint reports |
//!
//! # Design Decisions
//!
//! ## One Coordinate Convention
//!
//! All surfaces use a top-left origin with y growing downwards, and rotation is
//! clockwise in degrees. A surface whose native format uses a different
//! convention converts when it writes itself out; the engine never branches on it.
//!
//! ## Units Are the Surface's Business
//!
//! Pixel surfaces and page surfaces differ only in their
//! [`watermark::UnitSystem`] and default resolution. The resolution hint on a
//! descriptor scales a watermark on pixel surfaces by `dpi / native dpi` and is
//! ignored on pages, where sizes are already physical.
//!
//! ## Pure-Rust Compositing
//!
//! Raster surfaces are composited with `tiny-skia` (affine warp, bilinear
//! sampling, source-over) and text is rasterized with `ab_glyph` from an
//! embedded DejaVu Sans Mono, so rotation, fractional scale and text need no
//! system libraries. Page surfaces record marks as affine matrices for
//! whatever writes the final document.

pub mod config;
pub mod output;
pub mod watermark;
