//! Text rasterization for pixel surfaces.
//!
//! Glyphs come from an embedded DejaVu Sans Mono and are laid on the same
//! fixed grid that [`TextMark::intrinsic_size`] measures (0.6 em per
//! character, 1.2 em line), so the rendered mark fills the box placement was
//! computed for. Each glyph is centered in its cell and the line is centered
//! vertically.
//!
//! Page surfaces never come through here: they record text marks as-is and
//! leave glyph rendering to whatever writes the final document.

use super::descriptor::{TEXT_ADVANCE_EM, TextMark};
use super::surface::PaintError;
use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};
use std::sync::OnceLock;

const FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSansMono.ttf");

/// Largest canvas a single text mark may rasterize to.
const MAX_TEXT_PIXELS: u64 = 1 << 26;

static FONT: OnceLock<Result<FontRef<'static>, InvalidFont>> = OnceLock::new();

fn font() -> Result<&'static FontRef<'static>, PaintError> {
    FONT.get_or_init(|| FontRef::try_from_slice(FONT_DATA))
        .as_ref()
        .map_err(|e| PaintError::Failed(format!("embedded font: {e}")))
}

/// Render `mark` onto a transparent canvas of its intrinsic size, rounded up.
///
/// Pixels carry the mark's color; glyph coverage scales the color's alpha.
pub fn render_text(mark: &TextMark) -> Result<RgbaImage, PaintError> {
    let intrinsic = mark.intrinsic_size();
    let width = intrinsic.width.ceil();
    let height = intrinsic.height.ceil();
    if !(width >= 1.0 && height >= 1.0) || width * height > MAX_TEXT_PIXELS as f64 {
        return Err(PaintError::Failed(format!(
            "cannot rasterize text at {width}x{height} pixels"
        )));
    }
    let (width, height) = (width as u32, height as u32);

    let font = font()?;
    let em = mark.font_size as f32;
    // PxScale is the ascent-to-descent height, not the em size
    let units_per_em = font.units_per_em().unwrap_or(2048.0);
    let scale = PxScale::from(em * font.height_unscaled() / units_per_em);
    let scaled = font.as_scaled(scale);

    let cell = em * TEXT_ADVANCE_EM as f32;
    let baseline = (height as f32 - (scaled.ascent() - scaled.descent())) / 2.0 + scaled.ascent();
    let [r, g, b, a] = mark.color;

    let mut image = RgbaImage::new(width, height);
    for (i, c) in mark.display_text().chars().enumerate() {
        let id = scaled.glyph_id(c);
        let x = i as f32 * cell + (cell - scaled.h_advance(id)) / 2.0;
        let glyph = id.with_scale_and_position(scale, point(x, baseline));
        // Whitespace has no outline
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = gx as i64 + bounds.min.x as i64;
            let py = gy as i64 + bounds.min.y as i64;
            if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * a as f32).round() as u8;
            let pixel = image.get_pixel_mut(px as u32, py as u32);
            // Neighbouring glyphs may overlap by a sliver; keep the stronger one
            if alpha > pixel[3] {
                *pixel = Rgba([r, g, b, alpha]);
            }
        });
    }
    Ok(image)
}
