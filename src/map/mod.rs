mod geometry;
mod projection;
mod renderer;

pub use geometry::fill_circle;
pub use projection::{project, ViewportSize, VisibleRegion};
pub use renderer::{DensityRenderer, DensityStyle, BASE_ALPHA, BASE_RADIUS, FALLOFF, PASSES};
