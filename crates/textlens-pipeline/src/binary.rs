//! Per-channel binary threshold.

use crate::filter::{FilterKind, map_rgb};
use crate::types::{PipelineError, PixelBuffer};

/// Threshold every color channel independently.
///
/// A channel at or below `strength` becomes 0, anything above becomes
/// 255. Alpha is copied unchanged. Because the output only contains 0
/// and 255, applying the filter twice with the same threshold gives the
/// same result as applying it once.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] if `strength` is outside
/// `0..=255`.
pub fn binary(image: &PixelBuffer, strength: i32) -> Result<PixelBuffer, PipelineError> {
    FilterKind::Binary.check_strength(strength)?;
    let threshold = u8::try_from(strength).map_err(|_| PipelineError::InvalidStrength {
        kind: FilterKind::Binary,
        strength,
        min: 0,
        max: 255,
    })?;
    Ok(map_rgb(image, |rgb| {
        rgb.map(|c| if c <= threshold { 0 } else { 255 })
    }))
}
