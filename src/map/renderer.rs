use glam::DVec2;
use rayon::prelude::*;

use crate::map::projection::{project, ViewportSize, VisibleRegion};
use crate::model::PositionSample;
use crate::raster::{Canvas, Rgba};

/// Concentric circles drawn per sample
pub const PASSES: usize = 4;
/// Radius and alpha shrink by this fraction of the base per pass
pub const FALLOFF: f64 = 0.22;
/// Default radius of the outermost circle, pixels
pub const BASE_RADIUS: f64 = 40.0;
/// Default opacity of the outermost circle
pub const BASE_ALPHA: f32 = 0.15;

/// Below this many samples projection isn't worth spreading over threads
const PARALLEL_THRESHOLD: usize = 4096;

/// Visual parameters for the heat blobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityStyle {
    pub color: Rgba,
    pub base_radius: f64,
    pub base_alpha: f32,
}

impl Default for DensityStyle {
    fn default() -> Self {
        Self {
            color: Rgba::RED,
            base_radius: BASE_RADIUS,
            base_alpha: BASE_ALPHA,
        }
    }
}

/// Paints every sample as a stack of translucent circles.
///
/// Overlapping blobs look hotter only because their translucency stacks; this
/// is a visual approximation, not a density estimate. Holds no state between
/// calls, so rendering the same inputs twice gives the same picture.
#[derive(Debug, Clone, Default)]
pub struct DensityRenderer {
    pub style: DensityStyle,
}

impl DensityRenderer {
    pub fn new(style: DensityStyle) -> Self {
        Self { style }
    }

    /// (radius, alpha) for each pass, outermost first
    pub fn passes(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        (0..PASSES).map(|i| {
            let k = 1.0 - i as f64 * FALLOFF;
            (self.style.base_radius * k, self.style.base_alpha * k as f32)
        })
    }

    /// Draw all samples onto `canvas`. The canvas is not cleared first.
    /// Returns how many samples were drawn.
    pub fn render<C: Canvas>(
        &self,
        samples: &[PositionSample],
        region: Option<&VisibleRegion>,
        viewport: ViewportSize,
        canvas: &mut C,
    ) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let centers = project_all(samples, region, viewport);
        let mut drawn = 0;

        for center in centers.into_iter().flatten() {
            if !self.touches(center, viewport) {
                continue;
            }

            for (radius, alpha) in self.passes() {
                canvas.fill_circle(center, radius, self.style.color.with_alpha(alpha));
            }
            drawn += 1;
        }

        drawn
    }

    /// Whether the outermost circle at `center` overlaps the viewport
    fn touches(&self, center: DVec2, viewport: ViewportSize) -> bool {
        let r = self.style.base_radius;
        center.x + r >= 0.0
            && center.x - r <= viewport.width as f64
            && center.y + r >= 0.0
            && center.y - r <= viewport.height as f64
    }
}

fn project_all(samples: &[PositionSample], region: Option<&VisibleRegion>, viewport: ViewportSize) -> Vec<Option<DVec2>> {
    let project_one = |s: &PositionSample| project(s.coordinate(), region, viewport);
    if samples.len() >= PARALLEL_THRESHOLD {
        samples.par_iter().map(project_one).collect()
    } else {
        samples.iter().map(project_one).collect()
    }
}
