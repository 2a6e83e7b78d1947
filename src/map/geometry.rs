use glam::DVec2;

use crate::raster::{RasterCanvas, Rgba};

/// Fill a circle by blending `color` into every pixel whose center lies
/// within `radius` of `center`. Only the part overlapping the canvas is touched.
pub fn fill_circle(canvas: &mut RasterCanvas, center: DVec2, radius: f64, color: Rgba) {
    if !(radius > 0.0) || !center.is_finite() || color.a <= 0.0 {
        return;
    }

    let size = canvas.size();
    let min_x = ((center.x - radius).floor() as i64).max(0);
    let max_x = ((center.x + radius).ceil() as i64).min(size.width as i64 - 1);
    let min_y = ((center.y - radius).floor() as i64).max(0);
    let max_y = ((center.y + radius).ceil() as i64).min(size.height as i64 - 1);

    let r2 = radius * radius;
    for y in min_y..=max_y {
        let dy = y as f64 + 0.5 - center.y;
        for x in min_x..=max_x {
            let dx = x as f64 + 0.5 - center.x;
            if dx * dx + dy * dy <= r2 {
                canvas.blend_pixel(x, y, color);
            }
        }
    }
}
