//! Brightness, saturation and hue adjustments in HSV space.
//!
//! Pixels are converted with the standard hexcone model, all three
//! components in `0.0..=1.0`. A strength `s` shifts one component by
//! `s / 255`. Value and saturation clamp to `0.0..=1.0`; hue wraps, so
//! a strength of 255 is a full turn of the color wheel.

use crate::filter::map_rgb;
use crate::types::PixelBuffer;

/// Hue, saturation and value, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    /// Hue as a fraction of a full turn.
    pub h: f64,
    /// Saturation.
    pub s: f64,
    /// Value.
    pub v: f64,
}

impl Hsv {
    /// Convert an RGB triple.
    #[must_use]
    pub fn from_rgb([r, g, b]: [u8; 3]) -> Self {
        let r = f64::from(r) / 255.0;
        let g = f64::from(g) / 255.0;
        let b = f64::from(b) / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            ((g - b) / delta).rem_euclid(6.0) / 6.0
        } else if max == g {
            ((b - r) / delta + 2.0) / 6.0
        } else {
            ((r - g) / delta + 4.0) / 6.0
        };
        let s = if max == 0.0 { 0.0 } else { delta / max };

        Self { h, s, v: max }
    }

    /// Convert back to RGB, rounding each channel.
    #[must_use]
    #[allow(clippy::many_single_char_names)]
    pub fn to_rgb(self) -> [u8; 3] {
        let Self { h, s, v } = self;
        let sector = (h.rem_euclid(1.0) * 6.0).min(6.0 - f64::EPSILON);
        let f = sector.fract();
        let p = v * (1.0 - s);
        let q = v * f.mul_add(-s, 1.0);
        let t = v * (1.0 - f).mul_add(-s, 1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (r, g, b) = match sector as u8 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        [to_channel(r), to_channel(g), to_channel(b)]
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

fn delta(strength: i32) -> f64 {
    f64::from(strength) / 255.0
}

/// Rotate a hue by `delta` turns, wrapping into `0.0..1.0`.
#[must_use]
pub fn shift_hue(hue: f64, delta: f64) -> f64 {
    (hue + delta).rem_euclid(1.0)
}

/// Add `strength / 255` to the value component.
#[must_use = "returns the adjusted image"]
pub fn brightness(image: &PixelBuffer, strength: i32) -> PixelBuffer {
    let d = delta(strength);
    map_rgb(image, |rgb| {
        let mut hsv = Hsv::from_rgb(rgb);
        hsv.v = (hsv.v + d).clamp(0.0, 1.0);
        hsv.to_rgb()
    })
}

/// Add `strength / 255` to the saturation component.
#[must_use = "returns the adjusted image"]
pub fn saturation(image: &PixelBuffer, strength: i32) -> PixelBuffer {
    let d = delta(strength);
    map_rgb(image, |rgb| {
        let mut hsv = Hsv::from_rgb(rgb);
        hsv.s = (hsv.s + d).clamp(0.0, 1.0);
        hsv.to_rgb()
    })
}

/// Rotate hue by `strength / 255` of a turn.
#[must_use = "returns the adjusted image"]
pub fn hue(image: &PixelBuffer, strength: i32) -> PixelBuffer {
    let d = delta(strength);
    map_rgb(image, |rgb| {
        let mut hsv = Hsv::from_rgb(rgb);
        hsv.h = shift_hue(hsv.h, d);
        hsv.to_rgb()
    })
}
