//! The compositing pass.
//!
//! [`Engine`] ties the pipeline together for one descriptor and a sequence of
//! surfaces:
//!
//! ```text
//! for each surface:  normalize → layout → (rotate + opacity) → paint × N
//! ```
//!
//! ## Planning before painting
//!
//! Every surface is planned before the first paint call is issued. Planning is
//! pure, so `InvalidConfiguration` and `DegenerateTiling` on *any* surface
//! abort the whole operation with no partial output.
//!
//! ## Paint failures
//!
//! A failed paint call stops the remaining placements on that surface. What
//! happens next is the engine's [`FailurePolicy`]:
//!
//! | Policy | Behavior |
//! |---|---|
//! | `Skip` (default) | record it in the [`Report`] and carry on with the next surface |
//! | `Abort` | return the failure, later surfaces are not painted |
//!
//! ## Parallelism
//!
//! [`Engine::apply_parallel`] composites surfaces on the rayon pool. Each
//! surface owns its output buffer; outcomes are collected by surface index so
//! the report (and any error) follow source order, not completion order.

use super::descriptor::WatermarkDescriptor;
use super::geometry::Transform;
use super::normalize::{Normalized, SurfaceGeometry, normalize};
use super::placement::layout;
use super::surface::{PaintError, Surface};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid watermark configuration{}: {reason}", on_surface(.surface))]
    InvalidConfiguration {
        surface: Option<usize>,
        reason: String,
    },
    #[error(
        "Cannot tile surface {surface} with step {step_x}x{step_y}: the step must be positive and yield at most one million tiles"
    )]
    DegenerateTiling {
        surface: usize,
        step_x: f64,
        step_y: f64,
    },
    #[error("Paint failed on surface {surface}, placement {placement}: {source}")]
    PaintFailure {
        surface: usize,
        placement: usize,
        #[source]
        source: PaintError,
    },
    #[error("Cancelled before surface {surface}")]
    Cancelled { surface: usize },
}

fn on_surface(surface: &Option<usize>) -> String {
    surface.map(|s| format!(" on surface {s}")).unwrap_or_default()
}

impl EngineError {
    /// Configuration error not tied to a surface.
    pub fn invalid(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            surface: None,
            reason: reason.into(),
        }
    }

    /// Surface index the error occurred at, if any.
    pub fn surface(&self) -> Option<usize> {
        match self {
            EngineError::InvalidConfiguration { surface, .. } => *surface,
            EngineError::DegenerateTiling { surface, .. }
            | EngineError::PaintFailure { surface, .. }
            | EngineError::Cancelled { surface } => Some(*surface),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record paint failures and continue with the next surface.
    #[default]
    Skip,
    /// Stop at the first paint failure.
    Abort,
}

/// Placements computed for one surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementResult {
    pub surface: usize,
    /// `None` when the descriptor does not apply to this surface.
    pub normalized: Option<Normalized>,
    /// Translate + scale only; rotation is merged in at paint time.
    pub transforms: Vec<Transform>,
}

impl PlacementResult {
    fn skipped(surface: usize) -> Self {
        Self {
            surface,
            normalized: None,
            transforms: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.normalized.is_none()
    }

    /// Final transforms with the descriptor's rotation merged in.
    pub fn composed<'a>(
        &'a self,
        descriptor: &'a WatermarkDescriptor,
    ) -> impl Iterator<Item = Transform> + 'a {
        let rotation = descriptor.rotation_degrees();
        self.transforms.iter().map(move |t| t.rotated(rotation))
    }
}

/// What happened on one surface.
#[derive(Debug)]
pub struct SurfaceOutcome {
    pub surface: usize,
    pub planned: usize,
    pub painted: usize,
    pub skipped: bool,
    pub failure: Option<EngineError>,
}

/// Per-surface outcomes of one descriptor, in surface order.
#[derive(Debug, Default)]
pub struct Report {
    pub surfaces: Vec<SurfaceOutcome>,
}

impl Report {
    pub fn painted(&self) -> usize {
        self.surfaces.iter().map(|s| s.painted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.surfaces.iter().filter(|s| s.skipped).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EngineError> {
        self.surfaces.iter().filter_map(|s| s.failure.as_ref())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Stateless apart from its policy; one engine can serve any number of
/// descriptors and documents, concurrently.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    policy: FailurePolicy,
    cancel: Option<Arc<AtomicBool>>,
}

enum Slot {
    Ran(SurfaceOutcome),
    NotStarted,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checked before each surface is started.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    fn check_cancelled(&self, surface: usize) -> Result<(), EngineError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(EngineError::Cancelled { surface }),
            _ => Ok(()),
        }
    }

    /// Compute the placements for one surface without painting.
    pub fn plan(
        &self,
        descriptor: &WatermarkDescriptor,
        surface: usize,
        geometry: &SurfaceGeometry,
    ) -> Result<PlacementResult, EngineError> {
        if !descriptor.applies_to(surface) {
            return Ok(PlacementResult::skipped(surface));
        }

        let normalized =
            normalize(descriptor, geometry).map_err(|e| EngineError::InvalidConfiguration {
                surface: Some(surface),
                reason: e.to_string(),
            })?;
        let transforms = layout(
            descriptor.placement(),
            normalized.effective_size,
            normalized.target_size,
            normalized.scale,
        )
        .map_err(|e| EngineError::DegenerateTiling {
            surface,
            step_x: e.step_x,
            step_y: e.step_y,
        })?;
        let (dx, dy) = descriptor.offset();
        let transforms: Vec<Transform> = transforms
            .into_iter()
            .map(|t| t.translated(dx, dy))
            .collect();

        debug!(
            surface,
            placement = descriptor.placement().name(),
            instances = transforms.len(),
            scale = normalized.scale,
            "planned watermark"
        );

        Ok(PlacementResult {
            surface,
            normalized: Some(normalized),
            transforms,
        })
    }

    pub fn plan_all(
        &self,
        descriptor: &WatermarkDescriptor,
        geometries: &[SurfaceGeometry],
    ) -> Result<Vec<PlacementResult>, EngineError> {
        geometries
            .iter()
            .enumerate()
            .map(|(i, g)| self.plan(descriptor, i, g))
            .collect()
    }

    /// Composite one descriptor onto every surface, in order.
    pub fn apply<S: Surface>(
        &self,
        descriptor: &WatermarkDescriptor,
        surfaces: &mut [S],
    ) -> Result<Report, EngineError> {
        let plans = self.plan_all(descriptor, &geometries(surfaces))?;
        self.paint_sequential(descriptor, &plans, surfaces)
    }

    /// Like [`apply`](Self::apply), with surfaces composited on the rayon pool.
    pub fn apply_parallel<S: Surface + Send>(
        &self,
        descriptor: &WatermarkDescriptor,
        surfaces: &mut [S],
    ) -> Result<Report, EngineError> {
        let plans = self.plan_all(descriptor, &geometries(surfaces))?;
        self.paint_parallel(descriptor, &plans, surfaces)
    }

    /// Composite several descriptors in order; later ones paint over earlier
    /// ones. All descriptors are planned before anything is painted.
    pub fn apply_all<S: Surface>(
        &self,
        descriptors: &[WatermarkDescriptor],
        surfaces: &mut [S],
    ) -> Result<Vec<Report>, EngineError> {
        let plans = self.plan_each(descriptors, surfaces)?;
        descriptors
            .iter()
            .zip(&plans)
            .map(|(d, p)| self.paint_sequential(d, p, surfaces))
            .collect()
    }

    pub fn apply_all_parallel<S: Surface + Send>(
        &self,
        descriptors: &[WatermarkDescriptor],
        surfaces: &mut [S],
    ) -> Result<Vec<Report>, EngineError> {
        let plans = self.plan_each(descriptors, surfaces)?;
        descriptors
            .iter()
            .zip(&plans)
            .map(|(d, p)| self.paint_parallel(d, p, surfaces))
            .collect()
    }

    fn plan_each<S: Surface>(
        &self,
        descriptors: &[WatermarkDescriptor],
        surfaces: &[S],
    ) -> Result<Vec<Vec<PlacementResult>>, EngineError> {
        let geometries = geometries(surfaces);
        descriptors
            .iter()
            .map(|d| self.plan_all(d, &geometries))
            .collect()
    }

    fn paint_sequential<S: Surface>(
        &self,
        descriptor: &WatermarkDescriptor,
        plans: &[PlacementResult],
        surfaces: &mut [S],
    ) -> Result<Report, EngineError> {
        let mut report = Report::default();
        for (surface, plan) in surfaces.iter_mut().zip(plans) {
            self.check_cancelled(plan.surface)?;
            let outcome = composite_surface(descriptor, plan, surface);
            self.settle(&mut report, outcome)?;
        }
        summarize(&report);
        Ok(report)
    }

    fn paint_parallel<S: Surface + Send>(
        &self,
        descriptor: &WatermarkDescriptor,
        plans: &[PlacementResult],
        surfaces: &mut [S],
    ) -> Result<Report, EngineError> {
        // Lowest surface index that failed under Abort; later surfaces are not started
        let first_failure = AtomicUsize::new(usize::MAX);
        let slots: Vec<Result<Slot, EngineError>> = surfaces
            .par_iter_mut()
            .zip(plans.par_iter())
            .map(|(surface, plan)| {
                if plan.surface > first_failure.load(Ordering::Relaxed) {
                    return Ok(Slot::NotStarted);
                }
                self.check_cancelled(plan.surface)?;
                let outcome = composite_surface(descriptor, plan, surface);
                if outcome.failure.is_some() && self.policy == FailurePolicy::Abort {
                    first_failure.fetch_min(plan.surface, Ordering::Relaxed);
                }
                Ok(Slot::Ran(outcome))
            })
            .collect();

        let mut report = Report::default();
        for slot in slots {
            match slot? {
                Slot::Ran(outcome) => self.settle(&mut report, outcome)?,
                Slot::NotStarted => {}
            }
        }
        summarize(&report);
        Ok(report)
    }

    /// Apply the failure policy to one outcome.
    fn settle(&self, report: &mut Report, mut outcome: SurfaceOutcome) -> Result<(), EngineError> {
        if let Some(failure) = outcome.failure.take() {
            match self.policy {
                FailurePolicy::Abort => return Err(failure),
                FailurePolicy::Skip => {
                    warn!(surface = outcome.surface, error = %failure, "skipping failed surface");
                    outcome.failure = Some(failure);
                }
            }
        }
        report.surfaces.push(outcome);
        Ok(())
    }
}

fn geometries<S: Surface>(surfaces: &[S]) -> Vec<SurfaceGeometry> {
    surfaces.iter().map(|s| s.geometry()).collect()
}

/// Paint every planned placement of one surface, stopping at the first failure.
fn composite_surface<S: Surface>(
    descriptor: &WatermarkDescriptor,
    plan: &PlacementResult,
    surface: &mut S,
) -> SurfaceOutcome {
    let mut outcome = SurfaceOutcome {
        surface: plan.surface,
        planned: plan.transforms.len(),
        painted: 0,
        skipped: plan.is_skipped(),
        failure: None,
    };

    for (placement, transform) in plan.composed(descriptor).enumerate() {
        if let Err(source) = surface.paint(descriptor.payload(), &transform, descriptor.opacity()) {
            outcome.failure = Some(EngineError::PaintFailure {
                surface: plan.surface,
                placement,
                source,
            });
            break;
        }
        outcome.painted += 1;
    }
    outcome
}

fn summarize(report: &Report) {
    info!(
        surfaces = report.surfaces.len(),
        painted = report.painted(),
        skipped = report.skipped(),
        "watermark composited"
    );
}
