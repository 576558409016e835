//! Contrast stretch around mid-gray.
//!
//! Uses the classic factor `259 * (s + 255) / (255 * (259 - s))`. The
//! factor has a pole at `s == 259`, which is therefore excluded from
//! the strength domain. Strengths above the pole give a negative factor
//! and invert the image around mid-gray.

use crate::filter::{FilterKind, map_rgb};
use crate::types::{PipelineError, PixelBuffer};

/// The strength at which the contrast factor divides by zero.
pub const POLE: i32 = 259;

/// Contrast factor for a strength. `None` at the pole.
#[must_use]
pub fn factor(strength: i32) -> Option<f64> {
    if strength == POLE {
        return None;
    }
    let s = f64::from(strength);
    Some(259.0 * (s + 255.0) / (255.0 * (259.0 - s)))
}

/// Apply the contrast stretch to every color channel.
///
/// `out = clamp((in - 128) * f + 128, 0, 255)`, truncated to an
/// integer. Alpha is copied unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] for `strength == 259` or
/// a strength outside `-200..=500`.
pub fn contrast(image: &PixelBuffer, strength: i32) -> Result<PixelBuffer, PipelineError> {
    FilterKind::Contrast.check_strength(strength)?;
    let domain = FilterKind::Contrast.domain();
    let f = factor(strength).ok_or(PipelineError::InvalidStrength {
        kind: FilterKind::Contrast,
        strength,
        min: *domain.start(),
        max: *domain.end(),
    })?;
    Ok(map_rgb(image, |rgb| rgb.map(|c| stretch(c, f))))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stretch(channel: u8, factor: f64) -> u8 {
    (f64::from(channel) - 128.0)
        .mul_add(factor, 128.0)
        .clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn zero_strength_is_identity() {
        assert!((factor(0).unwrap() - 1.0).abs() < 1e-12);
        let img = PixelBuffer::from_fn(8, 8, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x * 30) as u8, (y * 30) as u8, 7, 200])
        });
        assert_eq!(contrast(&img, 0).unwrap(), img);
    }

    #[test]
    fn pole_rejected() {
        assert!(factor(POLE).is_none());
        let img = PixelBuffer::new(2, 2);
        assert!(matches!(
            contrast(&img, 259),
            Err(PipelineError::InvalidStrength { strength: 259, .. })
        ));
    }

    #[test]
    fn outside_domain_rejected() {
        let img = PixelBuffer::new(1, 1);
        assert!(contrast(&img, -201).is_err());
        assert!(contrast(&img, 501).is_err());
        assert!(contrast(&img, -200).is_ok());
        assert!(contrast(&img, 500).is_ok());
    }

    #[test]
    fn positive_strength_spreads_away_from_mid_gray() {
        let img = PixelBuffer::from_pixel(1, 1, Rgba([100, 128, 160, 255]));
        let out = contrast(&img, 100).unwrap();
        let p = out.get_pixel(0, 0).0;
        assert!(p[0] < 100);
        assert_eq!(p[1], 128);
        assert!(p[2] > 160);
    }

    #[test]
    fn result_is_clamped() {
        let img = PixelBuffer::from_pixel(1, 1, Rgba([0, 255, 10, 255]));
        let out = contrast(&img, 250).unwrap();
        assert_eq!(out.get_pixel(0, 0).0[..2], [0, 255]);
    }

    #[test]
    fn above_pole_inverts() {
        let img = PixelBuffer::from_pixel(1, 1, Rgba([200, 50, 128, 255]));
        let p = contrast(&img, 300).unwrap().get_pixel(0, 0).0;
        assert!(p[0] < 128);
        assert!(p[1] > 128);
    }

    #[test]
    fn alpha_preserved() {
        let img = PixelBuffer::from_pixel(1, 1, Rgba([90, 90, 90, 13]));
        assert_eq!(contrast(&img, 50).unwrap().get_pixel(0, 0).0[3], 13);
    }
}
