use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc::error::TryRecvError;

use crate::config::DEFAULT_CENTER;
use crate::geo::KM_PER_DEGREE;
use crate::map::{DensityRenderer, DensityStyle, ViewportSize, VisibleRegion};
use crate::model::PositionSample;
use crate::prelude::*;
use crate::store::SampleStore;
use crate::tracking::{PositionSource, Sampler, SamplerEvent, Subscription};

/// Radius shown around the latest sample when the view is (re)centered
const RECENTER_RADIUS_KM: f64 = 1.0;
/// Radius shown around the default center when nothing is recorded yet
const DEFAULT_RADIUS_KM: f64 = 5.0;
/// Zoom factor per key press or wheel notch
const ZOOM_STEP: f64 = 1.5;

/// Application state. Lives on the UI thread; the sampler's background task
/// only reaches it through the subscription channel.
pub struct App<P: PositionSource> {
    /// Geographic window on screen, `None` until the first load
    pub region: Option<VisibleRegion>,
    /// Heat map pixel size
    pub viewport: ViewportSize,
    /// Every sample recorded so far, oldest first
    pub samples: Vec<PositionSample>,
    pub renderer: DensityRenderer,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Most recent error, shown in the status bar
    pub last_error: Option<String>,
    sampler: Sampler<P>,
    subscription: Subscription,
    store: Arc<dyn SampleStore>,
    interval: Duration,
}

impl<P: PositionSource> App<P> {
    pub fn new(
        sampler: Sampler<P>,
        store: Arc<dyn SampleStore>,
        interval: Duration,
        style: DensityStyle,
        width: usize,
        height: usize,
    ) -> Self {
        let subscription = sampler.subscribe();
        Self {
            region: None,
            viewport: Self::heat_size(width, height),
            samples: Vec::new(),
            renderer: DensityRenderer::new(style),
            should_quit: false,
            last_mouse: None,
            last_error: None,
            sampler,
            subscription,
            store,
            interval,
        }
    }

    /// Heat map pixels for a terminal of the given size. Each cell holds two
    /// half-block pixels stacked vertically; border and status bar are excluded.
    fn heat_size(width: usize, height: usize) -> ViewportSize {
        let inner_width = width.saturating_sub(2);
        let inner_height = height.saturating_sub(3); // 2 for border + 1 for status bar
        ViewportSize::new(inner_width, inner_height * 2)
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: usize, height: usize) {
        self.viewport = Self::heat_size(width, height);
        if let Some(region) = self.region.as_mut() {
            region.fit_aspect(self.viewport);
        }
    }

    /// Replace the in-memory samples with the store's contents and recenter
    pub fn load(&mut self) -> Result {
        let all = self.store.list_all().context("Failed to load samples")?;
        info!("Loaded {} samples", all.len());
        self.samples = all;
        self.recenter();
        Ok(())
    }

    /// Center on the latest sample, or the default location if there is none
    pub fn recenter(&mut self) {
        let mut region = match self.samples.last() {
            Some(last) => VisibleRegion::from_center_and_radius(last.coordinate(), RECENTER_RADIUS_KM),
            None => VisibleRegion::from_center_and_radius(DEFAULT_CENTER, DEFAULT_RADIUS_KM),
        };
        region.fit_aspect(self.viewport);
        self.region = Some(region);
    }

    /// Delete every sample from the store and from memory
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.store.clear_all().context("Failed to clear samples")?;
        self.samples.clear();
        info!("Cleared {removed} samples");
        Ok(removed)
    }

    /// Pull everything the sampler has sent since the last call. Returns the
    /// number of new samples.
    pub fn drain_events(&mut self) -> usize {
        let mut added = 0;
        loop {
            match self.subscription.events.try_recv() {
                Ok(SamplerEvent::Sample(sample)) => {
                    self.samples.push(sample);
                    added += 1;
                }
                Ok(SamplerEvent::StoreFailed(why)) => {
                    self.last_error = Some(format!("Recording stopped: {why:#}"));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Sampler subscription closed");
                    break;
                }
            }
        }
        added
    }

    pub fn is_running(&self) -> bool {
        self.sampler.is_running()
    }

    pub fn start_sampling(&mut self) {
        self.last_error = None;
        self.sampler.start(self.interval);
    }

    pub fn stop_sampling(&mut self) {
        self.sampler.stop();
    }

    pub fn toggle_sampling(&mut self) {
        if self.is_running() {
            self.stop_sampling();
        } else {
            self.start_sampling();
        }
    }

    /// Show a failed store operation in the status bar instead of bailing
    pub fn report<T>(&mut self, res: Result<T>) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(why) => {
                error!("{why:?}");
                self.last_error = Some(format!("{why:#}"));
                None
            }
        }
    }

    /// Pan the map by a heat-pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let viewport = self.viewport;
        if let Some(region) = self.region.as_mut() {
            region.pan(dx as f64, dy as f64, viewport);
        }
    }

    pub fn zoom_in(&mut self) {
        if let Some(region) = self.region.as_mut() {
            region.zoom(ZOOM_STEP);
        }
    }

    pub fn zoom_out(&mut self) {
        if let Some(region) = self.region.as_mut() {
            region.zoom(1.0 / ZOOM_STEP);
        }
    }

    /// Convert a terminal cell to heat pixel coordinates (cell center)
    fn cell_to_pixel(col: u16, row: u16) -> (f64, f64) {
        // Account for border (1 cell offset)
        let px = col.saturating_sub(1) as f64 + 0.5;
        let py = row.saturating_sub(1) as f64 * 2.0 + 1.0;
        (px, py)
    }

    /// Zoom in towards a screen position (terminal column/row)
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        self.zoom_at(col, row, ZOOM_STEP);
    }

    /// Zoom out from a screen position (terminal column/row)
    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        self.zoom_at(col, row, 1.0 / ZOOM_STEP);
    }

    fn zoom_at(&mut self, col: u16, row: u16, factor: f64) {
        let (px, py) = Self::cell_to_pixel(col, row);
        let viewport = self.viewport;
        if let Some(region) = self.region.as_mut() {
            region.zoom_at(px, py, factor, viewport);
        }
    }

    /// Handle mouse drag, the map follows the pointer
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = last_x as i32 - x as i32;
            let dy = (last_y as i32 - y as i32) * 2;
            self.pan(dx, dy);
        }
        self.last_mouse = Some((x, y));
    }

    /// Reset drag state when mouse button released
    pub fn end_drag(&mut self) {
        self.last_mouse = None;
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        let Some(region) = &self.region else {
            return "--".into();
        };
        let c = region.center;
        format!(
            "{:.4}°{}, {:.4}°{}",
            c.lat.abs(),
            if c.lat >= 0.0 { "N" } else { "S" },
            c.lon.abs(),
            if c.lon >= 0.0 { "E" } else { "W" }
        )
    }

    /// Height of the visible window as a human readable distance
    pub fn span_label(&self) -> String {
        let Some(region) = &self.region else {
            return "--".into();
        };
        let km = region.lat_span * KM_PER_DEGREE;
        if km < 1.0 {
            format!("{:.0} m", km * 1000.0)
        } else {
            format!("{km:.1} km")
        }
    }
}

impl<P: PositionSource> Drop for App<P> {
    fn drop(&mut self) {
        self.sampler.unsubscribe(self.subscription.id);
    }
}
