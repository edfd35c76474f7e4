//! Placement strategies.
//!
//! Pure functions from (effective watermark size, target size, placement) to
//! translate + scale transforms. Rotation and opacity are merged in later by
//! the compositing pass.
//!
//! No strategy clamps to the surface. Instances may sit partly or entirely
//! outside it; clipping is the paint primitive's job.

use super::descriptor::{Corner, Placement};
use super::geometry::{Size, Transform};
use thiserror::Error;

/// Upper bound on the number of tiles a single surface may produce.
pub const MAX_TILES: usize = 1_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error(
    "cannot tile the surface with step {step_x}x{step_y}: the step must be positive and yield at most one million tiles"
)]
pub struct DegenerateTiling {
    pub step_x: f64,
    pub step_y: f64,
}

/// Column/row counts and pitch of a tile grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub columns: usize,
    pub rows: usize,
    pub step_x: f64,
    pub step_y: f64,
}

impl TileGrid {
    pub fn len(&self) -> usize {
        self.columns * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Top-left corner at `(x, y)`.
pub fn fixed(x: f64, y: f64, scale: f64) -> Transform {
    Transform::placed(x, y, scale)
}

pub fn centered(effective: Size, target: Size, scale: f64) -> Transform {
    Transform::placed(
        (target.width - effective.width) / 2.0,
        (target.height - effective.height) / 2.0,
        scale,
    )
}

pub fn cornered(
    corner: Corner,
    inset_x: f64,
    inset_y: f64,
    effective: Size,
    target: Size,
    scale: f64,
) -> Transform {
    let right = target.width - effective.width - inset_x;
    let bottom = target.height - effective.height - inset_y;
    let (tx, ty) = match corner {
        Corner::TopLeft => (inset_x, inset_y),
        Corner::TopRight => (right, inset_y),
        Corner::BottomLeft => (inset_x, bottom),
        Corner::BottomRight => (right, bottom),
    };
    Transform::placed(tx, ty, scale)
}

/// Grid dimensions: `ceil(target / step)` on each axis.
///
/// # Examples
/// ```
/// # use markit::watermark::{tile_grid, Size};
/// // 50 wide tiles with a gap of 10 on a 220 wide surface → 4 columns
/// let grid = tile_grid(Size::new(50.0, 50.0), Size::new(220.0, 100.0), 10.0, 0.0).unwrap();
/// assert_eq!(grid.columns, 4);
/// assert_eq!(grid.rows, 2);
/// ```
pub fn tile_grid(
    effective: Size,
    target: Size,
    spacing_x: f64,
    spacing_y: f64,
) -> Result<TileGrid, DegenerateTiling> {
    let step_x = effective.width + spacing_x;
    let step_y = effective.height + spacing_y;
    let degenerate = DegenerateTiling { step_x, step_y };

    // Negated comparison so NaN steps are rejected too
    if !(step_x > 0.0 && step_y > 0.0) {
        return Err(degenerate);
    }

    let columns = axis_count(target.width, step_x);
    let rows = axis_count(target.height, step_y);
    match (columns, rows) {
        (Some(c), Some(r)) if c.checked_mul(r).is_some_and(|n| n <= MAX_TILES) => Ok(TileGrid {
            columns: c,
            rows: r,
            step_x,
            step_y,
        }),
        _ => Err(degenerate),
    }
}

fn axis_count(extent: f64, step: f64) -> Option<usize> {
    if extent <= 0.0 {
        return Some(0);
    }
    let n = (extent / step).ceil();
    if n.is_finite() && n <= MAX_TILES as f64 {
        Some(n as usize)
    } else {
        None
    }
}

/// Row-major tile transforms starting at the origin. Edge tiles that run
/// past the surface are still emitted.
pub fn tiled(
    effective: Size,
    target: Size,
    spacing_x: f64,
    spacing_y: f64,
    scale: f64,
) -> Result<Vec<Transform>, DegenerateTiling> {
    let grid = tile_grid(effective, target, spacing_x, spacing_y)?;
    let mut transforms = Vec::with_capacity(grid.len());
    for row in 0..grid.rows {
        for col in 0..grid.columns {
            transforms.push(Transform::placed(
                col as f64 * grid.step_x,
                row as f64 * grid.step_y,
                scale,
            ));
        }
    }
    Ok(transforms)
}

/// Dispatch on the placement variant.
pub fn layout(
    placement: &Placement,
    effective: Size,
    target: Size,
    scale: f64,
) -> Result<Vec<Transform>, DegenerateTiling> {
    match *placement {
        Placement::Fixed { x, y } => Ok(vec![fixed(x, y, scale)]),
        Placement::Center => Ok(vec![centered(effective, target, scale)]),
        Placement::Corner {
            corner,
            inset_x,
            inset_y,
        } => Ok(vec![cornered(
            corner, inset_x, inset_y, effective, target, scale,
        )]),
        Placement::Tiled {
            spacing_x,
            spacing_y,
        } => tiled(effective, target, spacing_x, spacing_y, scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    // =========================================================================
    // fixed / centered / cornered
    // =========================================================================

    #[test]
    fn fixed_is_never_clamped() {
        for target in [Size::new(10.0, 10.0), Size::new(5000.0, 5000.0)] {
            let t = &layout(&Placement::Fixed { x: 100.0, y: 200.0 }, Size::new(50.0, 50.0), target, 1.0)
                .unwrap()[0];
            assert_eq!((t.tx, t.ty), (100.0, 200.0));
        }
    }

    #[test]
    fn fixed_accepts_negative_coordinates() {
        let t = fixed(-30.0, -40.0, 1.0);
        assert_eq!((t.tx, t.ty), (-30.0, -40.0));
    }

    #[test]
    fn centered_puts_footprint_center_on_target_center() {
        let effective = Size::new(37.5, 12.25);
        let target = Size::new(595.28, 841.89);
        let t = centered(effective, target, 0.5);
        assert!((t.tx + effective.width / 2.0 - target.width / 2.0).abs() < EPS);
        assert!((t.ty + effective.height / 2.0 - target.height / 2.0).abs() < EPS);
        assert_eq!(t.sx, 0.5);
    }

    #[test]
    fn centered_larger_than_target_goes_negative() {
        let t = centered(Size::new(300.0, 300.0), Size::new(100.0, 100.0), 1.0);
        assert_eq!((t.tx, t.ty), (-100.0, -100.0));
    }

    #[test]
    fn corners_respect_insets() {
        let effective = Size::new(20.0, 10.0);
        let target = Size::new(200.0, 100.0);
        let at = |c| {
            let t = cornered(c, 5.0, 3.0, effective, target, 1.0);
            (t.tx, t.ty)
        };
        assert_eq!(at(Corner::TopLeft), (5.0, 3.0));
        assert_eq!(at(Corner::TopRight), (175.0, 3.0));
        assert_eq!(at(Corner::BottomLeft), (5.0, 87.0));
        assert_eq!(at(Corner::BottomRight), (175.0, 87.0));
    }

    // =========================================================================
    // tiled
    // =========================================================================

    #[test]
    fn tiled_column_origins() {
        // effectiveW=50, targetW=220, sx=10 → ceil(220/60) = 4 columns
        let tiles = tiled(Size::new(50.0, 50.0), Size::new(220.0, 50.0), 10.0, 0.0, 1.0).unwrap();
        let xs: Vec<f64> = tiles.iter().map(|t| t.tx).collect();
        assert_eq!(xs, vec![0.0, 60.0, 120.0, 180.0]);
    }

    #[test]
    fn tiled_is_row_major() {
        let tiles = tiled(Size::new(10.0, 10.0), Size::new(20.0, 20.0), 0.0, 0.0, 1.0).unwrap();
        let origins: Vec<(f64, f64)> = tiles.iter().map(|t| (t.tx, t.ty)).collect();
        assert_eq!(
            origins,
            vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]
        );
    }

    #[test]
    fn tiled_emits_partial_edge_tiles() {
        // 25 / 10 → 3 columns, the last one hanging 5 units off the edge
        let grid = tile_grid(Size::new(10.0, 10.0), Size::new(25.0, 10.0), 0.0, 0.0).unwrap();
        assert_eq!(grid.columns, 3);
        assert_eq!(grid.rows, 1);
    }

    #[test]
    fn tiled_exact_fit_does_not_add_extra_column() {
        let grid = tile_grid(Size::new(10.0, 10.0), Size::new(30.0, 30.0), 0.0, 0.0).unwrap();
        assert_eq!((grid.columns, grid.rows), (3, 3));
    }

    #[test]
    fn tiled_negative_spacing_overlaps() {
        let tiles = tiled(Size::new(10.0, 10.0), Size::new(16.0, 8.0), -2.0, 0.0, 1.0).unwrap();
        let xs: Vec<f64> = tiles.iter().map(|t| t.tx).collect();
        assert_eq!(xs, vec![0.0, 8.0]);
    }

    #[test]
    fn tiled_on_empty_surface_yields_nothing() {
        let tiles = tiled(Size::new(10.0, 10.0), Size::new(0.0, 100.0), 0.0, 0.0, 1.0).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn zero_step_is_degenerate() {
        let err = tiled(Size::new(0.0, 10.0), Size::new(100.0, 100.0), 0.0, 0.0, 1.0).unwrap_err();
        assert_eq!(err.step_x, 0.0);
    }

    #[test]
    fn negative_step_is_degenerate() {
        assert!(tile_grid(Size::new(10.0, 10.0), Size::new(100.0, 100.0), 0.0, -15.0).is_err());
    }

    #[test]
    fn nan_step_is_degenerate() {
        assert!(tile_grid(Size::new(10.0, 10.0), Size::new(100.0, 100.0), f64::NAN, 0.0).is_err());
    }

    #[test]
    fn excessive_tile_count_is_degenerate() {
        let err = tile_grid(Size::new(1e-3, 1e-3), Size::new(1e4, 1e4), 0.0, 0.0).unwrap_err();
        // Positive step, so the message has to cover the tile limit too
        assert!(err.to_string().contains("at most one million tiles"));
    }

    #[test]
    fn scale_is_carried_on_every_tile() {
        let tiles = tiled(Size::new(5.0, 5.0), Size::new(10.0, 10.0), 0.0, 0.0, 0.25).unwrap();
        assert!(tiles.iter().all(|t| t.sx == 0.25 && t.sy == 0.25 && t.rotation == 0.0));
    }
}
