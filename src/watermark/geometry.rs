//! Geometry value types shared by every stage of the engine.
//!
//! All functions here are pure and total: no I/O, no error conditions.
//!
//! ## Coordinate convention
//!
//! Native coordinates have their origin at the top-left corner of the surface
//! with `y` growing downwards. Positive rotation angles turn clockwise in that
//! space.
//!
//! ## Two transform representations
//!
//! - [`Transform`] is the *placement* form: translate + rotation + scale, the
//!   shape the placement strategies and paint sinks talk in.
//! - [`Affine`] is the *matrix* form (`a b c d e f`, the PDF `cm` layout). A
//!   [`Transform`] lowers to an [`Affine`] once the payload's intrinsic size
//!   is known, because the rotation pivot is the watermark's own center.

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a matrix is invertible.
const SINGULAR_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Uniformly scale both dimensions.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    pub fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// True when either side is zero or negative.
    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn is_finite(self) -> bool {
        self.width.is_finite() && self.height.is_finite()
    }
}

/// Normalize an angle in degrees to `[0, 360)`.
///
/// ```
/// # use markit::watermark::normalize_degrees;
/// assert_eq!(normalize_degrees(-90.0), 270.0);
/// assert_eq!(normalize_degrees(720.0), 0.0);
/// ```
pub fn normalize_degrees(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if r >= 360.0 { 0.0 } else { r }
}

/// Placement transform in native units.
///
/// Applied to a payload point in intrinsic coordinates as: scale by
/// `(sx, sy)`, rotate by `rotation` degrees about the center of the scaled
/// footprint, then translate so the unrotated footprint's top-left corner
/// sits at `(tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub tx: f64,
    pub ty: f64,
    /// Degrees, always in `[0, 360)` when produced by the engine.
    pub rotation: f64,
    pub sx: f64,
    pub sy: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        tx: 0.0,
        ty: 0.0,
        rotation: 0.0,
        sx: 1.0,
        sy: 1.0,
    };

    /// Translate + uniform scale, no rotation. This is what placement
    /// strategies emit.
    pub fn placed(tx: f64, ty: f64, scale: f64) -> Self {
        Self {
            tx,
            ty,
            rotation: 0.0,
            sx: scale,
            sy: scale,
        }
    }

    /// Add a rotation on top of the current one. The translate (and so the
    /// rotation pivot) is unchanged.
    pub fn rotated(self, degrees: f64) -> Self {
        Self {
            rotation: normalize_degrees(self.rotation + degrees),
            ..self
        }
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            tx: self.tx + dx,
            ty: self.ty + dy,
            ..self
        }
    }

    /// Size of the unrotated footprint for a payload of the given intrinsic size.
    pub fn footprint(&self, intrinsic: Size) -> Size {
        Size::new(intrinsic.width * self.sx, intrinsic.height * self.sy)
    }

    /// The rotation pivot in native coordinates: the footprint's center.
    pub fn pivot(&self, intrinsic: Size) -> Point {
        let c = self.footprint(intrinsic).center();
        Point::new(self.tx + c.x, self.ty + c.y)
    }

    /// Lower to a matrix: scale, rotate about the footprint center, translate.
    pub fn to_affine(&self, intrinsic: Size) -> Affine {
        let c = self.footprint(intrinsic).center();
        Affine::scale(self.sx, self.sy)
            .then(Affine::translate(-c.x, -c.y))
            .then(Affine::rotate(self.rotation))
            .then(Affine::translate(c.x + self.tx, c.y + self.ty))
    }

    /// Map a point in payload coordinates to native coordinates.
    pub fn apply(&self, point: Point, intrinsic: Size) -> Point {
        self.to_affine(intrinsic).apply(point)
    }
}

/// 2D affine matrix.
///
/// ```text
/// x' = a*x + c*y + e
/// y' = b*x + d*y + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Composition: apply `self` first, then `next`.
    pub fn then(self, next: Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// `None` when the matrix collapses the plane (zero scale).
    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return None;
        }
        Some(Affine {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    /// Axis-aligned bounds `(min, max)` of the rectangle `(0,0)..size` after
    /// transformation.
    pub fn bounds(&self, size: Size) -> (Point, Point) {
        let corners = [
            self.apply(Point::new(0.0, 0.0)),
            self.apply(Point::new(size.width, 0.0)),
            self.apply(Point::new(0.0, size.height)),
            self.apply(Point::new(size.width, size.height)),
        ];
        let mut min = corners[0];
        let mut max = corners[0];
        for p in &corners[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Coefficients in `[a, b, c, d, e, f]` order.
    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}
