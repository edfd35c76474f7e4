//! The resolved, immutable watermark configuration.
//!
//! A [`WatermarkDescriptor`] is produced once by [`WatermarkBuilder::build`]
//! and then only ever read. It can be shared across threads and reused for
//! any number of surfaces and documents.
//!
//! ## Types
//!
//! - [`Payload`]: what gets painted: a decoded RGBA raster or a [`TextMark`].
//! - [`Placement`]: how instances are laid out on a surface.
//! - [`PageSelection`]: which surfaces (by 0-based index) receive the mark.
//! - [`WatermarkBuilder`]: collects options and validates them all at `build()`.
//!
//! ## Builder preconditions
//!
//! `build()` rejects, with [`EngineError::InvalidConfiguration`]:
//!
//! | Field | Accepted |
//! |---|---|
//! | payload | non-empty raster, or non-blank text with a positive font size |
//! | size | `0 < size <= 100` |
//! | opacity | `0.0 ..= 1.0` |
//! | rotation | any finite number (normalized to `[0, 360)`) |
//! | dpi | finite and `> 0` when set |
//! | adjust | finite; tile spacing, corner insets, or an offset for `Center`/`Fixed` |
//! | horizontal/vertical spacing | finite, and only with `Tiled` |
//!
//! `adjust` means something different per placement:
//!
//! | Placement | `adjust(dx, dy)` |
//! |---|---|
//! | `Tiled` | gap between tiles (overridden per axis by `horizontal_spacing`/`vertical_spacing`) |
//! | `Corner` | inset from the corner's two edges |
//! | `Center`, `Fixed` | shift of the placed watermark, right and down |

use super::engine::EngineError;
use super::geometry::{Size, normalize_degrees};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Horizontal advance per character, in em.
pub(crate) const TEXT_ADVANCE_EM: f64 = 0.6;
/// Line height, in em.
const TEXT_LINE_HEIGHT_EM: f64 = 1.2;
const TRADEMARK_SIGN: char = '\u{2122}';

/// A text watermark with a fixed-metric box estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMark {
    pub text: String,
    /// Font size in content units (points for pages, pixels for images).
    pub font_size: f64,
    /// RGBA.
    pub color: [u8; 4],
    /// Append a trademark sign.
    pub trademark: bool,
}

impl TextMark {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: 48.0,
            color: [0, 0, 0, 255],
            trademark: false,
        }
    }

    /// The string that is actually rendered.
    pub fn display_text(&self) -> String {
        if self.trademark {
            format!("{}{}", self.text, TRADEMARK_SIGN)
        } else {
            self.text.clone()
        }
    }

    pub fn intrinsic_size(&self) -> Size {
        let chars = self.display_text().chars().count() as f64;
        Size::new(
            chars * self.font_size * TEXT_ADVANCE_EM,
            self.font_size * TEXT_LINE_HEIGHT_EM,
        )
    }
}

/// Watermark content, already decoded.
#[derive(Debug, Clone)]
pub enum Payload {
    Raster(Arc<RgbaImage>),
    Text(TextMark),
}

impl Payload {
    pub fn raster(image: RgbaImage) -> Self {
        Payload::Raster(Arc::new(image))
    }

    pub fn text(mark: TextMark) -> Self {
        Payload::Text(mark)
    }

    /// Width and height in content-native units.
    pub fn intrinsic_size(&self) -> Size {
        match self {
            Payload::Raster(img) => Size::new(img.width() as f64, img.height() as f64),
            Payload::Text(mark) => mark.intrinsic_size(),
        }
    }

    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Raster(_) => "raster",
            Payload::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Layout policy. Coordinates and spacing are in the surface's native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Placement {
    /// Top-left corner of the watermark at `(x, y)`. Never clamped.
    Fixed { x: f64, y: f64 },
    Center,
    /// Anchored to a corner, pushed inwards by the insets.
    Corner {
        corner: Corner,
        inset_x: f64,
        inset_y: f64,
    },
    /// Row-major grid from the origin. Spacing is the gap between tiles and
    /// may be negative (overlap) as long as the step stays positive.
    Tiled { spacing_x: f64, spacing_y: f64 },
}

impl Placement {
    pub fn tiled() -> Self {
        Placement::Tiled {
            spacing_x: 0.0,
            spacing_y: 0.0,
        }
    }

    pub fn corner(corner: Corner) -> Self {
        Placement::Corner {
            corner,
            inset_x: 0.0,
            inset_y: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Placement::Fixed { .. } => "fixed",
            Placement::Center => "center",
            Placement::Corner { .. } => "corner",
            Placement::Tiled { .. } => "tiled",
        }
    }

    fn is_finite(&self) -> bool {
        match *self {
            Placement::Fixed { x, y } => x.is_finite() && y.is_finite(),
            Placement::Center => true,
            Placement::Corner {
                inset_x, inset_y, ..
            } => inset_x.is_finite() && inset_y.is_finite(),
            Placement::Tiled {
                spacing_x,
                spacing_y,
            } => spacing_x.is_finite() && spacing_y.is_finite(),
        }
    }
}

/// Surfaces that receive the watermark, by 0-based index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSelection {
    #[default]
    All,
    Only(BTreeSet<usize>),
    Except(BTreeSet<usize>),
}

impl PageSelection {
    pub fn includes(&self, index: usize) -> bool {
        match self {
            PageSelection::All => true,
            PageSelection::Only(set) => set.contains(&index),
            PageSelection::Except(set) => !set.contains(&index),
        }
    }
}

/// Immutable snapshot of one watermark's configuration.
#[derive(Debug, Clone)]
pub struct WatermarkDescriptor {
    payload: Payload,
    size_percent: f64,
    rotation_degrees: f64,
    opacity: f64,
    resolution_hint: Option<f64>,
    placement: Placement,
    offset: (f64, f64),
    pages: PageSelection,
    enabled: bool,
}

impl WatermarkDescriptor {
    pub fn builder(payload: Payload) -> WatermarkBuilder {
        WatermarkBuilder::new(payload)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// In `(0, 100]`.
    pub fn size_percent(&self) -> f64 {
        self.size_percent
    }

    /// In `[0, 360)`.
    pub fn rotation_degrees(&self) -> f64 {
        self.rotation_degrees
    }

    /// In `[0, 1]`.
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn resolution_hint(&self) -> Option<f64> {
        self.resolution_hint
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Shift added to every placed instance. Zero unless `adjust` was used
    /// with `Center` or `Fixed`.
    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    pub fn pages(&self) -> &PageSelection {
        &self.pages
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the surface at `index` should be painted at all.
    pub fn applies_to(&self, index: usize) -> bool {
        self.enabled && self.pages.includes(index)
    }
}

/// Accumulates watermark options; nothing is checked until [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct WatermarkBuilder {
    payload: Payload,
    size_percent: f64,
    rotation_degrees: f64,
    opacity: f64,
    resolution_hint: Option<f64>,
    placement: Placement,
    adjustment: Option<(f64, f64)>,
    spacing_x: Option<f64>,
    spacing_y: Option<f64>,
    pages: PageSelection,
    enabled: bool,
}

impl WatermarkBuilder {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            size_percent: 100.0,
            rotation_degrees: 0.0,
            opacity: 1.0,
            resolution_hint: None,
            placement: Placement::Center,
            adjustment: None,
            spacing_x: None,
            spacing_y: None,
            pages: PageSelection::All,
            enabled: true,
        }
    }

    /// Percentage of the payload's intrinsic size.
    pub fn size(mut self, percent: f64) -> Self {
        self.size_percent = percent;
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn rotation(mut self, degrees: f64) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    /// Target pixel density. Only raster surfaces use it.
    pub fn dpi(mut self, dpi: f64) -> Self {
        self.resolution_hint = Some(dpi);
        self
    }

    pub fn position(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Shorthand for `position(Placement::Fixed { x, y })`.
    pub fn at(self, x: f64, y: f64) -> Self {
        self.position(Placement::Fixed { x, y })
    }

    /// Tile spacing for `Tiled`, corner insets for `Corner`, and a shift of
    /// the placed watermark for `Center` and `Fixed`.
    pub fn adjust(mut self, dx: f64, dy: f64) -> Self {
        self.adjustment = Some((dx, dy));
        self
    }

    /// Gap between tile columns. Requires `Tiled`.
    pub fn horizontal_spacing(mut self, spacing: f64) -> Self {
        self.spacing_x = Some(spacing);
        self
    }

    /// Gap between tile rows. Requires `Tiled`.
    pub fn vertical_spacing(mut self, spacing: f64) -> Self {
        self.spacing_y = Some(spacing);
        self
    }

    pub fn pages(mut self, pages: PageSelection) -> Self {
        self.pages = pages;
        self
    }

    pub fn enable_if(mut self, condition: bool) -> Self {
        self.enabled = condition;
        self
    }

    pub fn build(self) -> Result<WatermarkDescriptor, EngineError> {
        validate_payload(&self.payload)?;

        if !(self.size_percent.is_finite() && self.size_percent > 0.0 && self.size_percent <= 100.0)
        {
            return Err(EngineError::invalid(format!(
                "size must be in (0, 100], got {}",
                self.size_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(EngineError::invalid(format!(
                "opacity must be in [0, 1], got {}",
                self.opacity
            )));
        }
        if !self.rotation_degrees.is_finite() {
            return Err(EngineError::invalid("rotation must be a finite number"));
        }
        if let Some(dpi) = self.resolution_hint {
            if !(dpi.is_finite() && dpi > 0.0) {
                return Err(EngineError::invalid(format!(
                    "dpi must be a positive number, got {dpi}"
                )));
            }
        }

        let (placement, offset) = resolve_adjustment(self.placement, self.adjustment);
        let placement = resolve_spacing(placement, self.spacing_x, self.spacing_y)?;
        if !placement.is_finite() {
            return Err(EngineError::invalid(format!(
                "{} placement has non-finite coordinates",
                placement.name()
            )));
        }
        if !(offset.0.is_finite() && offset.1.is_finite()) {
            return Err(EngineError::invalid("adjust must be finite"));
        }

        Ok(WatermarkDescriptor {
            payload: self.payload,
            size_percent: self.size_percent,
            rotation_degrees: normalize_degrees(self.rotation_degrees),
            opacity: self.opacity,
            resolution_hint: self.resolution_hint,
            placement,
            offset,
            pages: self.pages,
            enabled: self.enabled,
        })
    }
}

fn validate_payload(payload: &Payload) -> Result<(), EngineError> {
    match payload {
        Payload::Raster(img) if img.width() == 0 || img.height() == 0 => Err(
            EngineError::invalid("watermark image has no pixels"),
        ),
        Payload::Text(mark) if mark.text.trim().is_empty() => {
            Err(EngineError::invalid("watermark text is empty"))
        }
        Payload::Text(mark) if !(mark.font_size.is_finite() && mark.font_size > 0.0) => Err(
            EngineError::invalid(format!("font size must be positive, got {}", mark.font_size)),
        ),
        _ => Ok(()),
    }
}

/// Fold `adjust` into the placement it modifies, or into an offset.
fn resolve_adjustment(
    placement: Placement,
    adjustment: Option<(f64, f64)>,
) -> (Placement, (f64, f64)) {
    let Some((dx, dy)) = adjustment else {
        return (placement, (0.0, 0.0));
    };
    match placement {
        Placement::Tiled { .. } => (
            Placement::Tiled {
                spacing_x: dx,
                spacing_y: dy,
            },
            (0.0, 0.0),
        ),
        Placement::Corner { corner, .. } => (
            Placement::Corner {
                corner,
                inset_x: dx,
                inset_y: dy,
            },
            (0.0, 0.0),
        ),
        Placement::Fixed { .. } | Placement::Center => (placement, (dx, dy)),
    }
}

/// Per-axis spacing wins over `adjust`.
fn resolve_spacing(
    placement: Placement,
    spacing_x: Option<f64>,
    spacing_y: Option<f64>,
) -> Result<Placement, EngineError> {
    if spacing_x.is_none() && spacing_y.is_none() {
        return Ok(placement);
    }
    match placement {
        Placement::Tiled {
            spacing_x: x,
            spacing_y: y,
        } => Ok(Placement::Tiled {
            spacing_x: spacing_x.unwrap_or(x),
            spacing_y: spacing_y.unwrap_or(y),
        }),
        other => Err(EngineError::invalid(format!(
            "tile spacing has no meaning for {} placement",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn logo() -> Payload {
        Payload::raster(RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255])))
    }

    fn reason(err: EngineError) -> String {
        match err {
            EngineError::InvalidConfiguration { reason, .. } => reason,
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_full_size_centered_opaque() {
        let d = WatermarkDescriptor::builder(logo()).build().unwrap();
        assert_eq!(d.size_percent(), 100.0);
        assert_eq!(d.opacity(), 1.0);
        assert_eq!(d.rotation_degrees(), 0.0);
        assert_eq!(d.resolution_hint(), None);
        assert_eq!(*d.placement(), Placement::Center);
        assert!(d.is_enabled());
    }

    #[test]
    fn rotation_is_normalized_at_build() {
        let d = WatermarkDescriptor::builder(logo())
            .rotation(-90.0)
            .build()
            .unwrap();
        assert_eq!(d.rotation_degrees(), 270.0);
    }

    #[test]
    fn size_out_of_range_is_rejected() {
        for bad in [0.0, -5.0, 100.5, f64::NAN] {
            let err = WatermarkDescriptor::builder(logo()).size(bad).build().unwrap_err();
            assert!(reason(err).contains("size"));
        }
        assert!(WatermarkDescriptor::builder(logo()).size(100.0).build().is_ok());
    }

    #[test]
    fn opacity_out_of_range_is_rejected() {
        for bad in [-0.1, 1.01, f64::NAN] {
            let err = WatermarkDescriptor::builder(logo())
                .opacity(bad)
                .build()
                .unwrap_err();
            assert!(reason(err).contains("opacity"));
        }
    }

    #[test]
    fn non_positive_dpi_is_rejected() {
        let err = WatermarkDescriptor::builder(logo()).dpi(0.0).build().unwrap_err();
        assert!(reason(err).contains("dpi"));
    }

    #[test]
    fn empty_payloads_are_rejected() {
        let empty = Payload::raster(RgbaImage::new(0, 10));
        assert!(WatermarkDescriptor::builder(empty).build().is_err());

        let blank = Payload::text(TextMark::new("   "));
        assert!(WatermarkDescriptor::builder(blank).build().is_err());

        let mut tiny = TextMark::new("DRAFT");
        tiny.font_size = 0.0;
        assert!(WatermarkDescriptor::builder(Payload::text(tiny)).build().is_err());
    }

    #[test]
    fn adjust_sets_tile_spacing() {
        let d = WatermarkDescriptor::builder(logo())
            .position(Placement::tiled())
            .adjust(50.0, 25.0)
            .build()
            .unwrap();
        assert_eq!(
            *d.placement(),
            Placement::Tiled {
                spacing_x: 50.0,
                spacing_y: 25.0
            }
        );
    }

    #[test]
    fn adjust_sets_corner_insets() {
        let d = WatermarkDescriptor::builder(logo())
            .position(Placement::corner(Corner::BottomRight))
            .adjust(10.0, 12.0)
            .build()
            .unwrap();
        assert_eq!(
            *d.placement(),
            Placement::Corner {
                corner: Corner::BottomRight,
                inset_x: 10.0,
                inset_y: 12.0
            }
        );
    }

    #[test]
    fn adjust_offsets_center_and_fixed() {
        let d = WatermarkDescriptor::builder(logo())
            .adjust(15.0, -4.0)
            .build()
            .unwrap();
        assert_eq!(*d.placement(), Placement::Center);
        assert_eq!(d.offset(), (15.0, -4.0));

        let d = WatermarkDescriptor::builder(logo())
            .at(5.0, 5.0)
            .adjust(1.0, 2.0)
            .build()
            .unwrap();
        assert_eq!(*d.placement(), Placement::Fixed { x: 5.0, y: 5.0 });
        assert_eq!(d.offset(), (1.0, 2.0));
    }

    #[test]
    fn tiled_and_corner_adjust_leave_offset_zero() {
        let d = WatermarkDescriptor::builder(logo())
            .position(Placement::tiled())
            .adjust(8.0, 8.0)
            .build()
            .unwrap();
        assert_eq!(d.offset(), (0.0, 0.0));
    }

    #[test]
    fn non_finite_offset_is_rejected() {
        let err = WatermarkDescriptor::builder(logo())
            .adjust(f64::NAN, 0.0)
            .build()
            .unwrap_err();
        assert!(reason(err).contains("adjust"));
    }

    #[test]
    fn per_axis_spacing_sets_tile_gaps() {
        let d = WatermarkDescriptor::builder(logo())
            .position(Placement::tiled())
            .horizontal_spacing(30.0)
            .vertical_spacing(-5.0)
            .build()
            .unwrap();
        assert_eq!(
            *d.placement(),
            Placement::Tiled {
                spacing_x: 30.0,
                spacing_y: -5.0
            }
        );
    }

    #[test]
    fn per_axis_spacing_overrides_adjust_on_its_axis_only() {
        let d = WatermarkDescriptor::builder(logo())
            .position(Placement::tiled())
            .adjust(10.0, 20.0)
            .vertical_spacing(7.0)
            .build()
            .unwrap();
        assert_eq!(
            *d.placement(),
            Placement::Tiled {
                spacing_x: 10.0,
                spacing_y: 7.0
            }
        );
    }

    #[test]
    fn spacing_without_tiling_is_rejected() {
        let err = WatermarkDescriptor::builder(logo())
            .horizontal_spacing(10.0)
            .build()
            .unwrap_err();
        assert!(reason(err).contains("center"));

        let err = WatermarkDescriptor::builder(logo())
            .position(Placement::corner(Corner::TopLeft))
            .vertical_spacing(10.0)
            .build()
            .unwrap_err();
        assert!(reason(err).contains("corner"));
    }

    #[test]
    fn non_finite_fixed_position_is_rejected() {
        assert!(
            WatermarkDescriptor::builder(logo())
                .at(f64::INFINITY, 0.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn page_selection_and_enable_if() {
        let d = WatermarkDescriptor::builder(logo())
            .pages(PageSelection::Only([0, 2].into()))
            .build()
            .unwrap();
        assert!(d.applies_to(0));
        assert!(!d.applies_to(1));
        assert!(d.applies_to(2));

        let d = WatermarkDescriptor::builder(logo())
            .pages(PageSelection::Except([1].into()))
            .enable_if(false)
            .build()
            .unwrap();
        assert!(!d.applies_to(0));
    }

    #[test]
    fn text_intrinsic_size_uses_fixed_metrics() {
        // 5 chars * 10 * 0.6 = 30 wide, 10 * 1.2 = 12 tall
        let mut mark = TextMark::new("DRAFT");
        mark.font_size = 10.0;
        let size = Payload::text(mark.clone()).intrinsic_size();
        assert!((size.width - 30.0).abs() < 1e-9);
        assert!((size.height - 12.0).abs() < 1e-9);

        mark.trademark = true;
        assert_eq!(mark.display_text(), "DRAFT\u{2122}");
        assert!((mark.intrinsic_size().width - 36.0).abs() < 1e-9);
    }
}
