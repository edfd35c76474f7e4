//! Watermark placement and compositing engine.
//!
//! | Stage | Module |
//! |---|---|
//! | Resolved configuration | [`descriptor`] ([`WatermarkDescriptor`] + builder) |
//! | Unit mapping + effective size | [`normalize`] |
//! | Fixed / center / corner / tiled layout | [`placement`] |
//! | Rotation, opacity, paint calls | [`engine`] |
//!
//! The module is split into:
//! - **Geometry**: pure value types and matrix math ([`geometry`])
//! - **Calculations**: normalization and placement, pure and unit testable
//! - **Surfaces**: the [`Surface`] trait plus [`RasterSurface`] (with [`text`]
//!   rasterization) and [`PageSurface`]
//! - **Engine**: the compositing pass, sequential or on the rayon pool

pub mod descriptor;
pub mod engine;
pub mod geometry;
pub mod normalize;
pub mod page;
pub mod placement;
pub mod raster;
pub mod surface;
pub mod text;

pub use descriptor::{
    Corner, PageSelection, Payload, Placement, TextMark, WatermarkBuilder, WatermarkDescriptor,
};
pub use engine::{Engine, EngineError, FailurePolicy, PlacementResult, Report, SurfaceOutcome};
pub use geometry::{Affine, Point, Size, Transform, normalize_degrees};
pub use normalize::{DEFAULT_PIXEL_RESOLUTION, Normalized, SurfaceGeometry, UnitSystem};
pub use page::{PageDocument, PageSurface};
pub use placement::{DegenerateTiling, TileGrid, tile_grid};
pub use raster::{RasterSurface, load_raster, save_raster};
pub use surface::{PaintError, Surface};
pub use text::render_text;
