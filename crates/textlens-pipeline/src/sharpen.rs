//! Unsharp masking with a median low-pass.
//!
//! The strength is used twice: as the median aperture that produces the
//! blurred estimate and as the amplification applied to the detail
//! `original - blurred`. Both meanings are tied to the one value.

use crate::cancel::Cancellation;
use crate::filter::FilterKind;
use crate::median::median;
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer};

/// Sharpen `image`: `out = clamp(o + (o - median_s(o)) * s, 0, 255)`.
///
/// Alpha is copied unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] if `strength` is outside
/// `1..=20`, or [`PipelineError::Cancelled`] if `cancel` fired during
/// the median pass.
pub fn sharpen<C>(
    image: &PixelBuffer,
    strength: i32,
    executor: &TileExecutor,
    cancel: &C,
) -> Result<PixelBuffer, PipelineError>
where
    C: Cancellation + ?Sized,
{
    FilterKind::Sharpen.check_strength(strength)?;
    let blurred = median(image, strength, executor, cancel)?;
    cancel.checkpoint()?;

    let mut out = image.clone();
    for (dst, low) in out.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let original = i32::from(dst.0[c]);
            let detail = original - i32::from(low.0[c]);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let value = detail
                .saturating_mul(strength)
                .saturating_add(original)
                .clamp(0, 255) as u8;
            dst.0[c] = value;
        }
    }
    Ok(out)
}
