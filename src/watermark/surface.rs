//! Target surface capability trait and shared types.
//!
//! A [`Surface`] is one paintable unit: a raster image or one page of a
//! document. The engine only borrows its dimensions and calls
//! [`paint`](Surface::paint); it never owns the surface or its output buffer.
//!
//! Implementations in this crate:
//! - [`RasterSurface`](super::raster::RasterSurface): pixels, blends into an RGBA buffer.
//! - [`PageSurface`](super::page::PageSurface): page units, records a display list.

use super::descriptor::Payload;
use super::geometry::{Size, Transform};
use super::normalize::{DEFAULT_PIXEL_RESOLUTION, SurfaceGeometry, UnitSystem};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaintError {
    #[error("transform collapses the watermark to zero area")]
    SingularTransform,
    #[error("Paint failed: {0}")]
    Failed(String),
}

pub trait Surface {
    /// Width and height in native units.
    fn size(&self) -> Size;

    fn unit_system(&self) -> UnitSystem;

    /// Native pixel density. Ignored for page-unit surfaces.
    fn default_resolution(&self) -> f64 {
        DEFAULT_PIXEL_RESOLUTION
    }

    /// Paint `payload` once at `transform` (native units) with `opacity`.
    fn paint(
        &mut self,
        payload: &Payload,
        transform: &Transform,
        opacity: f64,
    ) -> Result<(), PaintError>;

    fn geometry(&self) -> SurfaceGeometry {
        SurfaceGeometry {
            size: self.size(),
            unit_system: self.unit_system(),
            default_resolution: self.default_resolution(),
        }
    }
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn size(&self) -> Size {
        (**self).size()
    }

    fn unit_system(&self) -> UnitSystem {
        (**self).unit_system()
    }

    fn default_resolution(&self) -> f64 {
        (**self).default_resolution()
    }

    fn paint(
        &mut self,
        payload: &Payload,
        transform: &Transform,
        opacity: f64,
    ) -> Result<(), PaintError> {
        (**self).paint(payload, transform, opacity)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Surface that records paint calls without touching any pixels.
    #[derive(Debug)]
    pub struct MockSurface {
        pub size: Size,
        pub unit_system: UnitSystem,
        pub resolution: f64,
        pub calls: Vec<PaintCall>,
        /// Fail the paint call with this 0-based index (counted per surface).
        pub fail_at: Option<usize>,
        attempts: usize,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct PaintCall {
        pub kind: &'static str,
        pub transform: Transform,
        pub opacity: f64,
    }

    impl MockSurface {
        pub fn pixels(width: f64, height: f64) -> Self {
            Self::new(Size::new(width, height), UnitSystem::Pixels)
        }

        pub fn page(width: f64, height: f64) -> Self {
            Self::new(Size::new(width, height), UnitSystem::PageUnits)
        }

        fn new(size: Size, unit_system: UnitSystem) -> Self {
            Self {
                size,
                unit_system,
                resolution: DEFAULT_PIXEL_RESOLUTION,
                calls: Vec::new(),
                fail_at: None,
                attempts: 0,
            }
        }

        pub fn failing_at(mut self, index: usize) -> Self {
            self.fail_at = Some(index);
            self
        }
    }

    impl Surface for MockSurface {
        fn size(&self) -> Size {
            self.size
        }

        fn unit_system(&self) -> UnitSystem {
            self.unit_system
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
            let attempt = self.attempts;
            self.attempts += 1;
            if self.fail_at == Some(attempt) {
                return Err(PaintError::Failed(format!("mock failure at {attempt}")));
            }
            self.calls.push(PaintCall {
                kind: payload.kind(),
                transform: *transform,
                opacity,
            });
            Ok(())
        }
    }

    #[test]
    fn mock_records_paint_calls() {
        let mut surface = MockSurface::pixels(100.0, 50.0);
        let payload = Payload::raster(image::RgbaImage::new(4, 4));
        surface
            .paint(&payload, &Transform::placed(1.0, 2.0, 1.0), 0.5)
            .unwrap();

        assert_eq!(surface.calls.len(), 1);
        assert_eq!(surface.calls[0].kind, "raster");
        assert_eq!(surface.calls[0].opacity, 0.5);
        assert_eq!(surface.calls[0].transform.tx, 1.0);
    }

    #[test]
    fn mock_fails_at_requested_attempt() {
        let mut surface = MockSurface::page(10.0, 10.0).failing_at(1);
        let payload = Payload::raster(image::RgbaImage::new(1, 1));
        assert!(surface.paint(&payload, &Transform::IDENTITY, 1.0).is_ok());
        assert!(surface.paint(&payload, &Transform::IDENTITY, 1.0).is_err());
        assert!(surface.paint(&payload, &Transform::IDENTITY, 1.0).is_ok());
        assert_eq!(surface.calls.len(), 2);
    }

    #[test]
    fn geometry_reflects_surface() {
        let surface = MockSurface::page(595.0, 842.0);
        let g = surface.geometry();
        assert_eq!(g.size, Size::new(595.0, 842.0));
        assert_eq!(g.unit_system, UnitSystem::PageUnits);
    }
}
