use glam::DVec2;

use crate::geo::{clamp_lat, lon_scale, wrap_lon, KM_PER_DEGREE};
use crate::model::Coordinate;

/// Smallest span a region can zoom down to, degrees
const MIN_SPAN: f64 = 1e-5;
const MAX_LAT_SPAN: f64 = 180.0;
const MAX_LON_SPAN: f64 = 360.0;

/// Pixel size of the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportSize {
    pub width: usize,
    pub height: usize,
}

impl ViewportSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The geographic window currently on screen: a center plus angular spans
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRegion {
    pub center: Coordinate,
    /// Latitude degrees covered top to bottom
    pub lat_span: f64,
    /// Longitude degrees covered left to right
    pub lon_span: f64,
}

impl VisibleRegion {
    pub fn new(center: Coordinate, lat_span: f64, lon_span: f64) -> Self {
        Self {
            center,
            lat_span,
            lon_span,
        }
    }

    /// Region just covering a circle of `radius_km` around `center`
    pub fn from_center_and_radius(center: Coordinate, radius_km: f64) -> Self {
        let lat_span = 2.0 * radius_km / KM_PER_DEGREE;
        let lon_span = lat_span / lon_scale(center.lat);
        let mut region = Self::new(center, lat_span, lon_span);
        region.clamp_spans();
        region
    }

    /// Top-left and bottom-right corners
    pub fn bounds(&self) -> (Coordinate, Coordinate) {
        let half_lat = self.lat_span / 2.0;
        let half_lon = self.lon_span / 2.0;
        (
            Coordinate::new(self.center.lat + half_lat, self.center.lon - half_lon),
            Coordinate::new(self.center.lat - half_lat, self.center.lon + half_lon),
        )
    }

    /// Pan by a pixel delta. Positive dx moves the view east, positive dy south.
    pub fn pan(&mut self, dx: f64, dy: f64, viewport: ViewportSize) {
        if viewport.is_empty() {
            return;
        }
        self.center.lon = wrap_lon(self.center.lon + dx / viewport.width as f64 * self.lon_span);
        self.center.lat = clamp_lat(self.center.lat - dy / viewport.height as f64 * self.lat_span);
    }

    /// Zoom about the center. Factors above 1 zoom in.
    pub fn zoom(&mut self, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        self.lat_span /= factor;
        self.lon_span /= factor;
        self.clamp_spans();
    }

    /// Zoom keeping the geographic point under pixel (px, py) in place
    pub fn zoom_at(&mut self, px: f64, py: f64, factor: f64, viewport: ViewportSize) {
        // Get the geographic coordinates under the cursor
        let Some(anchor) = self.unproject(px, py, viewport) else {
            return;
        };

        self.zoom(factor);

        // Pan to bring the anchor back under the cursor
        if let Some(moved) = project(anchor, Some(self), viewport) {
            self.pan(moved.x - px, moved.y - py, viewport);
        }
    }

    /// Widen one span so a pixel covers the same ground distance on both axes
    pub fn fit_aspect(&mut self, viewport: ViewportSize) {
        if viewport.is_empty() {
            return;
        }
        let aspect = viewport.width as f64 / viewport.height as f64;
        let scale = lon_scale(self.center.lat);

        let wanted_lon = self.lat_span * aspect / scale;
        if wanted_lon >= self.lon_span {
            self.lon_span = wanted_lon;
        } else {
            self.lat_span = self.lon_span * scale / aspect;
        }
        self.clamp_spans();
    }

    /// Geographic coordinate under a pixel. Inverse of [project].
    pub fn unproject(&self, px: f64, py: f64, viewport: ViewportSize) -> Option<Coordinate> {
        if viewport.is_empty() {
            return None;
        }
        let (top_left, bottom_right) = self.bounds();
        let lon = top_left.lon + px / viewport.width as f64 * (bottom_right.lon - top_left.lon);
        let lat = top_left.lat - py / viewport.height as f64 * (top_left.lat - bottom_right.lat);
        Some(Coordinate::new(lat, lon))
    }

    fn clamp_spans(&mut self) {
        self.lat_span = self.lat_span.clamp(MIN_SPAN, MAX_LAT_SPAN);
        self.lon_span = self.lon_span.clamp(MIN_SPAN, MAX_LON_SPAN);
    }
}

/// Project a geographic coordinate to a pixel position within `viewport`.
///
/// Linear in both axes over the region's bounds, with pixel y growing
/// southward. Points outside the region land outside the viewport; nothing is
/// clamped. Returns `None` when there is no region yet, the viewport is empty,
/// or the region has zero span.
pub fn project(coordinate: Coordinate, region: Option<&VisibleRegion>, viewport: ViewportSize) -> Option<DVec2> {
    let region = region?;
    if viewport.is_empty() {
        return None;
    }

    let (top_left, bottom_right) = region.bounds();
    let lon_extent = bottom_right.lon - top_left.lon;
    let lat_extent = top_left.lat - bottom_right.lat;
    if lon_extent == 0.0 || lat_extent == 0.0 {
        return None;
    }

    let x = (coordinate.lon - top_left.lon) / lon_extent;
    let y = (top_left.lat - coordinate.lat) / lat_extent;

    let px = DVec2::new(x * viewport.width as f64, y * viewport.height as f64);
    px.is_finite().then_some(px)
}
