use glam::DVec2;

use super::{Canvas, Rgba};
use crate::map::{fill_circle, ViewportSize};

/// RGBA raster the heat map is composited into before it goes to the terminal.
/// Starts fully transparent; the UI flattens it over its background.
pub struct RasterCanvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
}

impl RasterCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; width * height],
        }
    }

    pub fn size(&self) -> ViewportSize {
        ViewportSize::new(self.width, self.height)
    }

    /// Reset every pixel to transparent
    pub fn clear(&mut self) {
        self.pixels.fill(Rgba::TRANSPARENT);
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    /// Blend a color into one pixel, ignoring coordinates off the canvas
    #[inline(always)]
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.pixels[idx] = color.over(self.pixels[idx]);
    }

    /// Whether anything has been drawn
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| p.a == 0.0)
    }
}

impl Canvas for RasterCanvas {
    fn fill_circle(&mut self, center: DVec2, radius: f64, color: Rgba) {
        fill_circle(self, center, radius, color);
    }
}
