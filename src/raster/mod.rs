mod canvas;

pub use canvas::RasterCanvas;

use glam::DVec2;

/// Straight (non-premultiplied) RGBA color, channels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Composite `self` over `dst` (Porter-Duff source-over)
    #[inline(always)]
    pub fn over(self, dst: Rgba) -> Rgba {
        let out_a = self.a + dst.a * (1.0 - self.a);
        if out_a <= f32::EPSILON {
            return Rgba::TRANSPARENT;
        }
        let dst_w = dst.a * (1.0 - self.a);
        let mix = |s: f32, d: f32| (s * self.a + d * dst_w) / out_a;
        Rgba::new(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b), out_a)
    }

    /// Flatten onto an opaque 8-bit background
    pub fn flatten(self, background: [u8; 3]) -> [u8; 3] {
        let ch = |c: f32, bg: u8| {
            let bg = bg as f32 / 255.0;
            ((c * self.a + bg * (1.0 - self.a)) * 255.0).round().clamp(0.0, 255.0) as u8
        };
        [ch(self.r, background[0]), ch(self.g, background[1]), ch(self.b, background[2])]
    }
}

/// Drawing surface the density renderer paints on
pub trait Canvas {
    /// Fill a circle, blending `color` over what is already there
    fn fill_circle(&mut self, center: DVec2, radius: f64, color: Rgba);
}
