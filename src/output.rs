//! CLI output formatting for the `plan` and `apply` commands.
//!
//! Output is **watermark-centric**: each configured watermark gets a header
//! line, and the surfaces it touches are listed beneath it with their
//! positional index.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! 001 text "DRAFT" (tiled, 25%, 45°, opacity 0.50)
//!     001 600x400 px → 12 placements at scale 0.250
//!     002 skipped
//! ```
//!
//! ## Apply
//!
//! ```text
//! 001 text "DRAFT"
//!     001 painted 12/12
//!     002 skipped
//!     003 failed: Paint failed on surface 2, placement 0: ...
//!
//! Painted 12 placements on 1 surface, 1 skipped, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::watermark::{
    Payload, PlacementResult, Report, SurfaceGeometry, UnitSystem, WatermarkDescriptor,
};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 0-based surface index as a 1-based, 3-digit zero-padded label.
fn format_index(index: usize) -> String {
    format!("{:0>3}", index + 1)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn unit_label(unit: UnitSystem) -> &'static str {
    match unit {
        UnitSystem::Pixels => "px",
        UnitSystem::PageUnits => "pt",
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Short identity of a watermark: its kind and what it shows.
///
/// ```text
/// text "DRAFT"
/// image 120x40
/// ```
fn payload_label(payload: &Payload) -> String {
    match payload {
        Payload::Raster(img) => format!("image {}x{}", img.width(), img.height()),
        Payload::Text(mark) => format!("text {:?}", mark.display_text()),
    }
}

fn descriptor_header(index: usize, descriptor: &WatermarkDescriptor) -> String {
    let mut header = format!(
        "{} {}",
        format_index(index),
        payload_label(descriptor.payload())
    );
    if !descriptor.is_enabled() {
        header.push_str(" (disabled)");
    }
    header
}

// ============================================================================
// Plan output
// ============================================================================

/// Format the dry-run plan of every descriptor over every surface.
///
/// `plans[d][s]` is the plan of descriptor `d` on surface `s`.
pub fn format_plan(
    descriptors: &[WatermarkDescriptor],
    plans: &[Vec<PlacementResult>],
    geometries: &[SurfaceGeometry],
) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (descriptor, surface_plans)) in descriptors.iter().zip(plans).enumerate() {
        lines.push(format!(
            "{} ({}, {}%, {}°, opacity {:.2})",
            descriptor_header(i, descriptor),
            descriptor.placement().name(),
            descriptor.size_percent(),
            descriptor.rotation_degrees(),
            descriptor.opacity(),
        ));
        for (plan, geometry) in surface_plans.iter().zip(geometries) {
            lines.push(format_plan_line(plan, geometry));
        }
    }
    lines
}

fn format_plan_line(plan: &PlacementResult, geometry: &SurfaceGeometry) -> String {
    let label = format!("{}{}", indent(1), format_index(plan.surface));
    match &plan.normalized {
        None => format!("{label} skipped"),
        Some(n) => format!(
            "{label} {}x{} {} → {} at scale {:.3}",
            geometry.size.width,
            geometry.size.height,
            unit_label(geometry.unit_system),
            plural(plan.transforms.len(), "placement"),
            n.scale,
        ),
    }
}

pub fn print_plan(
    descriptors: &[WatermarkDescriptor],
    plans: &[Vec<PlacementResult>],
    geometries: &[SurfaceGeometry],
) {
    for line in format_plan(descriptors, plans, geometries) {
        println!("{}", line);
    }
}

// ============================================================================
// Apply output
// ============================================================================

/// Format the per-surface outcome of each descriptor, then a one-line total.
pub fn format_reports(descriptors: &[WatermarkDescriptor], reports: &[Report]) -> Vec<String> {
    let mut lines = Vec::new();
    let (mut painted, mut surfaces, mut skipped, mut failed) = (0, 0, 0, 0);

    for (i, (descriptor, report)) in descriptors.iter().zip(reports).enumerate() {
        lines.push(descriptor_header(i, descriptor));
        for outcome in &report.surfaces {
            let label = format!("{}{}", indent(1), format_index(outcome.surface));
            if let Some(failure) = &outcome.failure {
                failed += 1;
                lines.push(format!("{label} failed: {failure}"));
            } else if outcome.skipped {
                skipped += 1;
                lines.push(format!("{label} skipped"));
            } else {
                surfaces += 1;
                lines.push(format!(
                    "{label} painted {}/{}",
                    outcome.painted, outcome.planned
                ));
            }
        }
        painted += report.painted();
    }

    lines.push(String::new());
    lines.push(format!(
        "Painted {} on {}, {} skipped, {} failed",
        plural(painted, "placement"),
        plural(surfaces, "surface"),
        skipped,
        failed
    ));
    lines
}

pub fn print_reports(descriptors: &[WatermarkDescriptor], reports: &[Report]) {
    for line in format_reports(descriptors, reports) {
        println!("{}", line);
    }
}
