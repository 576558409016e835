//! Weighted luma conversion.
//!
//! Uses the fixed weights `0.3 R + 0.59 G + 0.11 B`, rounded to the
//! nearest integer and replicated into all three color channels. The
//! Sobel edge filter uses a different luminance triple; see
//! [`edge`](crate::edge).

use crate::filter::map_rgb;
use crate::types::PixelBuffer;

/// Luma of one RGB triple.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn luma([r, g, b]: [u8; 3]) -> u8 {
    0.11f64
        .mul_add(
            f64::from(b),
            0.3f64.mul_add(f64::from(r), 0.59 * f64::from(g)),
        )
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Convert to gray, keeping RGBA layout and alpha.
#[must_use = "returns the converted image"]
pub fn grayscale(image: &PixelBuffer) -> PixelBuffer {
    map_rgb(image, |rgb| [luma(rgb); 3])
}
