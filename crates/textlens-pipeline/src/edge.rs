//! Sobel edge coloring.
//!
//! Computes luminance with the weights `0.2989 R + 0.5870 G + 0.1140 B`,
//! convolves the luminance plane with the 3x3 Sobel kernels and draws
//! the gradient magnitude in a solid color:
//!
//! ```text
//!       -1 0 1          -1 -2 -1
//! Gx =  -2 0 2    Gy =   0  0  0
//!       -1 0 1           1  2  1
//! ```
//!
//! The outermost ring of pixels has no full 3x3 neighbourhood and is
//! copied through from the input unchanged.

use image::Rgba;

use crate::types::PixelBuffer;

/// Edge color used when none is configured: pure red.
pub const DEFAULT_EDGE_COLOR: [u8; 3] = [255, 0, 0];

/// Luminance used for gradient estimation.
#[must_use]
pub fn luminance([r, g, b, _]: [u8; 4]) -> f64 {
    0.1140f64.mul_add(
        f64::from(b),
        0.2989f64.mul_add(f64::from(r), 0.5870 * f64::from(g)),
    )
}

/// Sobel gradient magnitude, rounded and clamped to `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn magnitude(gx: f64, gy: f64) -> u8 {
    gx.hypot(gy).round().clamp(0.0, 255.0) as u8
}

/// Draw edges of `image` in `color`.
///
/// Strength 0 returns a copy of the input; any other strength applies
/// the filter. Images narrower or shorter than 3 pixels are all border
/// and are returned unchanged.
#[must_use = "returns the edge image"]
pub fn edge_coloring(image: &PixelBuffer, strength: i32, color: [u8; 3]) -> PixelBuffer {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if strength == 0 || w < 3 || h < 3 {
        return out;
    }

    let luma: Vec<f64> = image.pixels().map(|p| luminance(p.0)).collect();
    let width = w as usize;
    let at = |x: u32, y: u32| luma[y as usize * width + x as usize];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let (l, r) = (x - 1, x + 1);
            let (t, b) = (y - 1, y + 1);
            let gx = (at(r, t) + 2.0 * at(r, y) + at(r, b)) - (at(l, t) + 2.0 * at(l, y) + at(l, b));
            let gy = (at(l, b) + 2.0 * at(x, b) + at(r, b)) - (at(l, t) + 2.0 * at(x, t) + at(r, t));
            let mag = u16::from(magnitude(gx, gy));
            let alpha = image.get_pixel(x, y).0[3];
            let [cr, cg, cb] = color.map(|c| scale(c, mag));
            out.put_pixel(x, y, Rgba([cr, cg, cb, alpha]));
        }
    }
    out
}

#[allow(clippy::cast_possible_truncation)]
const fn scale(channel: u8, magnitude: u16) -> u8 {
    // channel * magnitude <= 255 * 255, so the quotient fits in u8
    (channel as u16 * magnitude / 255) as u8
}
