//! Box blur ("averaging").
//!
//! Each output channel is the integer mean of the same channel over a
//! `(2r + 1) x (2r + 1)` window centred on the pixel, where `r` is the
//! strength. The window is clipped to the image, so pixels near the
//! border average fewer samples.

use image::Rgba;

use crate::cancel::Cancellation;
use crate::filter::FilterKind;
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer};

/// Blur `image` with a clipped box window of radius `strength`.
///
/// Runs on the tiled executor. Alpha is copied from the centre pixel.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] if `strength` is outside
/// `1..=20`, or [`PipelineError::Cancelled`] if `cancel` fired.
pub fn averaging<C>(
    image: &PixelBuffer,
    strength: i32,
    executor: &TileExecutor,
    cancel: &C,
) -> Result<PixelBuffer, PipelineError>
where
    C: Cancellation + ?Sized,
{
    FilterKind::Averaging.check_strength(strength)?;
    let radius = strength.unsigned_abs();
    let (w, h) = image.dimensions();

    executor.execute(w, h, cancel, |x, y| {
        let x_range = x.saturating_sub(radius)..=(x + radius).min(w - 1);
        let y_range = y.saturating_sub(radius)..=(y + radius).min(h - 1);
        let mut sums = [0u32; 3];
        let mut count = 0u32;
        for sy in y_range {
            for sx in x_range.clone() {
                let p = image.get_pixel(sx, sy).0;
                for (sum, &c) in sums.iter_mut().zip(&p[..3]) {
                    *sum += u32::from(c);
                }
                count += 1;
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        let [r, g, b] = sums.map(|sum| (sum / count) as u8);
        Rgba([r, g, b, image.get_pixel(x, y).0[3]])
    })
}
