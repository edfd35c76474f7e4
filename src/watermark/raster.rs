//! Raster surface backed by an in-memory RGBA buffer.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` |
//! | Text payloads | [`render_text`] (`ab_glyph`) |
//! | Warp, bilinear sampling, source-over | `tiny_skia::Pixmap::draw_pixmap` |
//! | Encode | `image::DynamicImage::save` (JPEG drops alpha first) |
//!
//! Each paint copies the destination pixels under the watermark's transformed
//! bounding box into a premultiplied `tiny_skia::Pixmap`, draws the payload
//! through the placement matrix, and writes back only the pixels that
//! changed. Pixels outside the surface are clipped here; the engine never
//! clamps placements.
//!
//! Text is rasterized at the placement's scale, so large marks stay sharp.
//! The last payload pixmap is kept, which makes tiling a single payload
//! cost one conversion per surface.

use super::descriptor::{Payload, TextMark};
use super::geometry::{Affine, Size, Transform};
use super::normalize::{DEFAULT_PIXEL_RESOLUTION, UnitSystem};
use super::surface::{PaintError, Surface};
use super::text::render_text;
use image::{
    DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage, imageops,
};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{BlendMode, ColorU8, FilterQuality, Pixmap, PixmapPaint, PremultipliedColorU8};

/// A single image as a paintable surface.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
    resolution: f64,
    cached: Option<CachedPayload>,
}

/// The most recently painted payload, already premultiplied.
#[derive(Debug, Clone)]
struct CachedPayload {
    key: PayloadKey,
    pixmap: Pixmap,
}

#[derive(Debug, Clone)]
enum PayloadKey {
    /// Holding the `Arc` keeps the address from being reused.
    Raster(Arc<RgbaImage>),
    /// Font size already multiplied by the placement scale.
    Text(TextMark),
}

impl PayloadKey {
    fn matches(&self, other: &PayloadKey) -> bool {
        match (self, other) {
            (PayloadKey::Raster(a), PayloadKey::Raster(b)) => Arc::ptr_eq(a, b),
            (PayloadKey::Text(a), PayloadKey::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl RasterSurface {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            resolution: DEFAULT_PIXEL_RESOLUTION,
            cached: None,
        }
    }

    /// Native pixel density used to interpret the descriptor's dpi hint.
    pub fn with_resolution(mut self, dpi: f64) -> Self {
        self.resolution = dpi;
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Premultiplied pixmap for `key`, built by `make` on a cache miss.
fn cached_pixmap(
    cache: &mut Option<CachedPayload>,
    key: PayloadKey,
    make: impl FnOnce() -> Result<Pixmap, PaintError>,
) -> Result<&Pixmap, PaintError> {
    let cached = match cache.take() {
        Some(cached) if cached.key.matches(&key) => cached,
        _ => CachedPayload {
            key,
            pixmap: make()?,
        },
    };
    Ok(&cache.insert(cached).pixmap)
}

impl From<DynamicImage> for RasterSurface {
    fn from(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> Size {
        Size::new(self.image.width() as f64, self.image.height() as f64)
    }

    fn unit_system(&self) -> UnitSystem {
        UnitSystem::Pixels
    }

    fn default_resolution(&self) -> f64 {
        self.resolution
    }

    fn paint(
        &mut self,
        payload: &Payload,
        transform: &Transform,
        opacity: f64,
    ) -> Result<(), PaintError> {
        let affine = transform.to_affine(payload.intrinsic_size());
        if opacity <= 0.0 {
            return Ok(());
        }
        if affine.invert().is_none() {
            return Err(PaintError::SingularTransform);
        }

        match payload {
            Payload::Raster(source) => {
                let key = PayloadKey::Raster(Arc::clone(source));
                let pixmap = cached_pixmap(&mut self.cached, key, || to_pixmap(&**source))?;
                composite(&mut self.image, pixmap, &affine, opacity)
            }
            Payload::Text(mark) => {
                // Rasterize at output resolution, then undo that scale in the matrix
                let density = transform.sx.abs().max(transform.sy.abs());
                let sharp = TextMark {
                    font_size: mark.font_size * density,
                    ..mark.clone()
                };
                let key = PayloadKey::Text(sharp.clone());
                let pixmap =
                    cached_pixmap(&mut self.cached, key, || to_pixmap(&render_text(&sharp)?))?;
                let affine = Affine::scale(1.0 / density, 1.0 / density).then(affine);
                composite(&mut self.image, pixmap, &affine, opacity)
            }
        }
    }
}

/// Source-over `source` onto `canvas` through `affine` (source pixels to
/// canvas pixels), sampled bilinearly.
fn composite(
    canvas: &mut RgbaImage,
    source: &Pixmap,
    affine: &Affine,
    opacity: f64,
) -> Result<(), PaintError> {
    let src_size = Size::new(source.width() as f64, source.height() as f64);
    let (min, max) = affine.bounds(src_size);
    // Float → u32 casts saturate, so off-canvas boxes collapse to empty ranges
    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = max.x.ceil().min(canvas.width() as f64) as u32;
    let y1 = max.y.ceil().min(canvas.height() as f64) as u32;
    if x0 >= x1 || y0 >= y1 {
        return Ok(());
    }

    let under = imageops::crop_imm(&*canvas, x0, y0, x1 - x0, y1 - y0).to_image();
    let mut region = to_pixmap(&under)?;
    let before = region.pixels().to_vec();

    let local = affine.then(Affine::translate(-(x0 as f64), -(y0 as f64)));
    let [a, b, c, d, e, f] = local.to_array().map(|v| v as f32);
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0) as f32,
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Bilinear,
    };
    region.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &paint,
        tiny_skia::Transform::from_row(a, b, c, d, e, f),
        None,
    );

    // Untouched pixels keep their exact straight-alpha values
    let width = region.width() as usize;
    for (i, (after, before)) in region.pixels().iter().zip(&before).enumerate() {
        if after != before {
            let x = x0 + (i % width) as u32;
            let y = y0 + (i / width) as u32;
            canvas.put_pixel(x, y, straight(*after));
        }
    }
    Ok(())
}

/// Premultiplied copy of `image`.
fn to_pixmap<I>(image: &I) -> Result<Pixmap, PaintError>
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| PaintError::Failed(format!("cannot allocate a {width}x{height} pixmap")))?;
    let pixels = pixmap.pixels_mut();
    for (x, y, Rgba([r, g, b, a])) in image.pixels() {
        let i = y as usize * width as usize + x as usize;
        pixels[i] = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn straight(pixel: PremultipliedColorU8) -> Rgba<u8> {
    let c = pixel.demultiply();
    Rgba([c.red(), c.green(), c.blue(), c.alpha()])
}

/// Decode an image file into a surface.
pub fn load_raster(path: &Path) -> Result<RasterSurface, PaintError> {
    let image = ImageReader::open(path)
        .map_err(|e| PaintError::Failed(format!("Failed to open {}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| PaintError::Failed(format!("Failed to read {}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| PaintError::Failed(format!("Failed to decode {}: {}", path.display(), e)))?;
    Ok(RasterSurface::from(image))
}

/// Encode to `path`, format inferred from the extension.
pub fn save_raster(image: &RgbaImage, path: &Path) -> Result<(), PaintError> {
    let format = ImageFormat::from_path(path).map_err(|e| {
        PaintError::Failed(format!("Unsupported output format {}: {}", path.display(), e))
    })?;
    let dynamic = DynamicImage::ImageRgba8(image.clone());
    let result = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(dynamic.to_rgb8()).save_with_format(path, format),
        _ => dynamic.save_with_format(path, format),
    };
    result.map_err(|e| PaintError::Failed(format!("Failed to encode {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn canvas() -> RasterSurface {
        RasterSurface::new(RgbaImage::from_pixel(10, 10, WHITE))
    }

    fn red(w: u32, h: u32) -> Payload {
        Payload::raster(RgbaImage::from_pixel(w, h, RED))
    }

    #[test]
    fn paints_exact_footprint_at_unit_scale() {
        let mut surface = canvas();
        surface
            .paint(&red(2, 2), &Transform::placed(4.0, 4.0, 1.0), 1.0)
            .unwrap();

        for (x, y) in [(4, 4), (5, 4), (4, 5), (5, 5)] {
            assert_eq!(*surface.image().get_pixel(x, y), RED, "({x},{y})");
        }
        for (x, y) in [(3, 3), (6, 6), (3, 4), (6, 5)] {
            assert_eq!(*surface.image().get_pixel(x, y), WHITE, "({x},{y})");
        }
    }

    #[test]
    fn scale_enlarges_footprint() {
        let mut surface = canvas();
        surface
            .paint(&red(2, 2), &Transform::placed(0.0, 0.0, 2.0), 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(3, 3), RED);
        assert_eq!(*surface.image().get_pixel(4, 4), WHITE);
    }

    #[test]
    fn half_opacity_blends_with_background() {
        let mut surface = canvas();
        surface
            .paint(&red(2, 2), &Transform::placed(0.0, 0.0, 1.0), 0.5)
            .unwrap();
        let px = surface.image().get_pixel(0, 0);
        assert_eq!(px[0], 255);
        assert!((120..=136).contains(&px[1]), "green was {}", px[1]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn zero_opacity_leaves_canvas_untouched() {
        let mut surface = canvas();
        let before = surface.image().clone();
        surface
            .paint(&red(2, 2), &Transform::placed(0.0, 0.0, 1.0), 0.0)
            .unwrap();
        assert_eq!(surface.image(), &before);
    }

    #[test]
    fn rotation_90_swaps_painted_axes() {
        // 4x2 at (3,4) rotated about (5,5) covers x 4..6, y 3..7
        let mut surface = canvas();
        surface
            .paint(&red(4, 2), &Transform::placed(3.0, 4.0, 1.0).rotated(90.0), 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(4, 3), RED);
        assert_eq!(*surface.image().get_pixel(5, 6), RED);
        assert_eq!(*surface.image().get_pixel(3, 4), WHITE);
        assert_eq!(*surface.image().get_pixel(6, 5), WHITE);
    }

    #[test]
    fn off_canvas_placement_is_clipped_not_an_error() {
        let mut surface = canvas();
        surface
            .paint(&red(4, 4), &Transform::placed(8.0, -2.0, 1.0), 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(9, 0), RED);
        assert_eq!(*surface.image().get_pixel(9, 2), WHITE);

        surface
            .paint(&red(4, 4), &Transform::placed(500.0, 500.0, 1.0), 1.0)
            .unwrap();
    }

    #[test]
    fn transparent_payload_pixels_are_skipped() {
        let mut surface = canvas();
        let clear = Payload::raster(RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 0])));
        surface
            .paint(&clear, &Transform::placed(0.0, 0.0, 1.0), 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(1, 1), WHITE);
    }

    #[test]
    fn zero_scale_is_singular() {
        let mut surface = canvas();
        let err = surface
            .paint(&red(2, 2), &Transform::placed(0.0, 0.0, 0.0), 1.0)
            .unwrap_err();
        assert!(matches!(err, PaintError::SingularTransform));
    }

    #[test]
    fn text_paints_in_the_mark_color_inside_its_box() {
        let mut surface = RasterSurface::new(RgbaImage::from_pixel(100, 60, WHITE));
        let mut mark = TextMark::new("HI");
        mark.font_size = 30.0;
        mark.color = [0, 0, 255, 255];
        // 2 * 30 * 0.6 = 36 wide, 36 tall, at (10, 8)
        surface
            .paint(&Payload::text(mark), &Transform::placed(10.0, 8.0, 1.0), 1.0)
            .unwrap();

        let img = surface.image();
        let inked: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != WHITE)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!inked.is_empty());
        assert!(inked.iter().all(|&(x, y)| (10..46).contains(&x) && (8..44).contains(&y)));
        assert!(img.pixels().any(|p| *p == Rgba([0, 0, 255, 255])));
        // Antialiased edges blend towards white, never towards another hue
        assert!(img.pixels().all(|p| p[0] == p[1] && p[2] >= 250));
    }

    #[test]
    fn trademark_text_paints_an_extra_cell() {
        let paint = |trademark: bool| {
            let mut surface = RasterSurface::new(RgbaImage::from_pixel(120, 30, WHITE));
            let mut mark = TextMark::new("AB");
            mark.font_size = 20.0;
            mark.trademark = trademark;
            surface
                .paint(&Payload::text(mark), &Transform::placed(0.0, 0.0, 1.0), 1.0)
                .unwrap();
            surface
                .image()
                .enumerate_pixels()
                .filter(|(x, _, p)| *x >= 24 && **p != WHITE)
                .count()
        };
        assert_eq!(paint(false), 0);
        assert!(paint(true) > 0);
    }

    #[test]
    fn scaled_text_is_rasterized_at_output_size() {
        let mut surface = RasterSurface::new(RgbaImage::from_pixel(200, 80, WHITE));
        let mut mark = TextMark::new("I");
        mark.font_size = 10.0;
        surface
            .paint(&Payload::text(mark), &Transform::placed(0.0, 0.0, 6.0), 1.0)
            .unwrap();

        // A 10px glyph blown up 6x would have no fully solid pixels left
        let solid = surface
            .image()
            .pixels()
            .filter(|p| **p == Rgba([0, 0, 0, 255]))
            .count();
        assert!(solid > 50, "only {solid} solid pixels");
    }

    #[test]
    fn repeated_payload_reuses_cached_pixmap() {
        let mut surface = RasterSurface::new(RgbaImage::from_pixel(20, 10, WHITE));
        let payload = red(2, 2);
        for x in [0.0, 4.0, 8.0] {
            surface
                .paint(&payload, &Transform::placed(x, 0.0, 1.0), 1.0)
                .unwrap();
        }
        assert!(matches!(
            surface.cached.as_ref().map(|c| &c.key),
            Some(PayloadKey::Raster(p)) if matches!(&payload, Payload::Raster(q) if Arc::ptr_eq(p, q))
        ));

        // A different payload replaces the cache and still paints
        surface
            .paint(&red(1, 1), &Transform::placed(15.0, 5.0, 1.0), 1.0)
            .unwrap();
        assert_eq!(*surface.image().get_pixel(15, 5), RED);
        assert_eq!(*surface.image().get_pixel(9, 1), RED);
    }

    #[test]
    fn translucent_canvas_pixels_outside_the_mark_are_preserved() {
        let faint = Rgba([200, 100, 50, 3]);
        let mut surface = RasterSurface::new(RgbaImage::from_pixel(10, 10, faint));
        surface
            .paint(&red(2, 2), &Transform::placed(1.5, 1.5, 1.0).rotated(30.0), 1.0)
            .unwrap();
        // (1, 1) is inside the rotated mark's bounding box but not covered by it
        assert_eq!(*surface.image().get_pixel(1, 1), faint);
        assert_eq!(*surface.image().get_pixel(2, 2), RED);
        assert_eq!(*surface.image().get_pixel(9, 9), faint);
    }

    #[test]
    fn reports_pixel_geometry() {
        let surface = canvas().with_resolution(300.0);
        let g = surface.geometry();
        assert_eq!(g.size, Size::new(10.0, 10.0));
        assert_eq!(g.unit_system, UnitSystem::Pixels);
        assert_eq!(g.default_resolution, 300.0);
    }

    #[test]
    fn save_and_load_round_trip_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.png");
        save_raster(&RgbaImage::from_pixel(7, 3, RED), &path).unwrap();

        let loaded = load_raster(&path).unwrap();
        assert_eq!(loaded.size(), Size::new(7.0, 3.0));
        assert_eq!(*loaded.image().get_pixel(0, 0), RED);
    }

    #[test]
    fn save_jpeg_drops_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.jpg");
        save_raster(&RgbaImage::from_pixel(8, 8, RED), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(load_raster(Path::new("/nonexistent/input.png")).is_err());
    }
}
