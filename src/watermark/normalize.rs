//! Coordinate normalization.
//!
//! Placement strategies work in one internal unit system. Both surface kinds
//! map 1:1 onto it (pixels for raster images, page units for documents), so
//! `units_per_native` is always `1.0`. What actually differs per surface kind
//! is the watermark's footprint:
//!
//! ```text
//! effective = intrinsic × (size_percent / 100) × density_factor
//!
//! density_factor = 1                                   PAGE_UNITS
//!                = 1                                   PIXELS, no dpi hint
//!                = dpi_hint / surface_default_dpi      PIXELS, dpi hint set
//! ```
//!
//! The density factor is clamped to a small positive floor so a bad surface
//! resolution can never produce a zero or negative footprint.

use super::descriptor::WatermarkDescriptor;
use super::geometry::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resolution assumed for raster surfaces that don't report one.
pub const DEFAULT_PIXEL_RESOLUTION: f64 = 72.0;

const MIN_DENSITY_FACTOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitSystem {
    Pixels,
    PageUnits,
}

/// What the engine borrows from a surface: dimensions and unit system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    pub size: Size,
    pub unit_system: UnitSystem,
    /// Native pixel density, only consulted for [`UnitSystem::Pixels`].
    pub default_resolution: f64,
}

impl SurfaceGeometry {
    pub fn pixels(width: f64, height: f64) -> Self {
        Self {
            size: Size::new(width, height),
            unit_system: UnitSystem::Pixels,
            default_resolution: DEFAULT_PIXEL_RESOLUTION,
        }
    }

    pub fn page(width: f64, height: f64) -> Self {
        Self {
            size: Size::new(width, height),
            unit_system: UnitSystem::PageUnits,
            default_resolution: DEFAULT_PIXEL_RESOLUTION,
        }
    }

    pub fn with_resolution(mut self, dpi: f64) -> Self {
        self.default_resolution = dpi;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("surface dimensions {width}x{height} are not finite and non-negative")]
    InvalidSurface { width: f64, height: f64 },
    #[error("{kind} payload has no area")]
    EmptyPayload { kind: &'static str },
    #[error("effective watermark size is not finite")]
    NonFinite,
}

/// Result of normalizing one descriptor against one surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalized {
    pub units_per_native: f64,
    pub density_factor: f64,
    /// Uniform scale from intrinsic to native units.
    pub scale: f64,
    pub intrinsic_size: Size,
    pub effective_size: Size,
    pub target_size: Size,
}

/// Conversion factor applied to the intrinsic size for this surface kind.
pub fn density_factor(geometry: &SurfaceGeometry, resolution_hint: Option<f64>) -> f64 {
    match (geometry.unit_system, resolution_hint) {
        (UnitSystem::PageUnits, _) | (UnitSystem::Pixels, None) => 1.0,
        (UnitSystem::Pixels, Some(hint)) => {
            let native = if geometry.default_resolution.is_finite()
                && geometry.default_resolution > 0.0
            {
                geometry.default_resolution
            } else {
                DEFAULT_PIXEL_RESOLUTION
            };
            let factor = hint / native;
            if factor.is_finite() {
                factor.max(MIN_DENSITY_FACTOR)
            } else {
                MIN_DENSITY_FACTOR
            }
        }
    }
}

pub fn normalize(
    descriptor: &WatermarkDescriptor,
    geometry: &SurfaceGeometry,
) -> Result<Normalized, NormalizeError> {
    let target = geometry.size;
    if !target.is_finite() || target.width < 0.0 || target.height < 0.0 {
        return Err(NormalizeError::InvalidSurface {
            width: target.width,
            height: target.height,
        });
    }

    let payload = descriptor.payload();
    let intrinsic = payload.intrinsic_size();
    if intrinsic.is_empty() {
        return Err(NormalizeError::EmptyPayload {
            kind: payload.kind(),
        });
    }

    let density = density_factor(geometry, descriptor.resolution_hint());
    let scale = descriptor.size_percent() / 100.0 * density;
    let effective = intrinsic.scaled(scale);
    if !effective.is_finite() {
        return Err(NormalizeError::NonFinite);
    }

    Ok(Normalized {
        units_per_native: 1.0,
        density_factor: density,
        scale,
        intrinsic_size: intrinsic,
        effective_size: effective,
        target_size: target,
    })
}
