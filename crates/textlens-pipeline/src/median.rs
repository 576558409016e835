//! Histogram median over a square aperture.
//!
//! For strength `s` the aperture covers `[i - s/2, i - s/2 + s)` on both
//! axes. Samples outside the image count as black `(0, 0, 0)`; they are
//! not skipped, so medians near the border are biased dark. The median
//! of a channel is the smallest bin whose cumulative count exceeds half
//! the aperture area.

use image::Rgba;

use crate::cancel::Cancellation;
use crate::filter::FilterKind;
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer};

/// Median-filter `image` with an `s x s` aperture.
///
/// Runs on the tiled executor. Alpha is copied from the centre pixel.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] if `strength` is outside
/// `1..=20`, or [`PipelineError::Cancelled`] if `cancel` fired.
pub fn median<C>(
    image: &PixelBuffer,
    strength: i32,
    executor: &TileExecutor,
    cancel: &C,
) -> Result<PixelBuffer, PipelineError>
where
    C: Cancellation + ?Sized,
{
    FilterKind::Median.check_strength(strength)?;
    let size = i64::from(strength);
    let area = u32::try_from(size * size).map_err(|_| {
        PipelineError::FilterApplicationFailed(format!("aperture {size}x{size} too large"))
    })?;
    let (w, h) = image.dimensions();

    executor.execute(w, h, cancel, |x, y| {
        let x0 = i64::from(x) - size / 2;
        let y0 = i64::from(y) - size / 2;
        let mut histograms = [[0u32; 256]; 3];
        let mut inside = 0u32;
        for sy in y0..y0 + size {
            let Ok(sy) = u32::try_from(sy) else { continue };
            if sy >= h {
                continue;
            }
            for sx in x0..x0 + size {
                let Ok(sx) = u32::try_from(sx) else { continue };
                if sx >= w {
                    continue;
                }
                let p = image.get_pixel(sx, sy).0;
                for (hist, &c) in histograms.iter_mut().zip(&p[..3]) {
                    hist[usize::from(c)] += 1;
                }
                inside += 1;
            }
        }
        for hist in &mut histograms {
            hist[0] += area - inside;
        }
        let [r, g, b] = histograms.map(|hist| median_bin(&hist, area));
        Rgba([r, g, b, image.get_pixel(x, y).0[3]])
    })
}

/// Smallest bin whose cumulative count exceeds `area / 2`.
fn median_bin(hist: &[u32; 256], area: u32) -> u8 {
    let mut cumulative = 0u32;
    for (bin, &count) in (0..=u8::MAX).zip(hist) {
        cumulative += count;
        if cumulative * 2 > area {
            return bin;
        }
    }
    u8::MAX
}
