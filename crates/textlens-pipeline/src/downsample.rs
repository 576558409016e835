//! Source image downsizing.
//!
//! Large photos are reduced so the longest side is at most
//! [`PipelineConfig::max_dimension`](crate::PipelineConfig::max_dimension)
//! before any filter runs. Every filter cost scales with the pixel
//! count, so this bounds the cost of a recomputation. Images already
//! within the limit are returned unchanged; smaller images are never
//! upscaled.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::PixelBuffer;

/// Resampling filter used when downsizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DownsampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Target size for fitting `width` x `height` inside a square of side
/// `max_dimension`, preserving aspect ratio. `None` if it already fits.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless
)]
pub fn fitted_size(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let long_axis = width.max(height);
    if long_axis <= max_dimension {
        return None;
    }
    let factor = f64::from(max_dimension) / f64::from(long_axis);
    let scale = |side: u32| ((f64::from(side) * factor).round() as u32).clamp(1, max_dimension);
    Some((scale(width), scale(height)))
}

/// Shrink `image` so its longest side is at most `max_dimension`.
///
/// Returns the (possibly unchanged) image and whether it was resized.
#[must_use]
pub fn fit_within(
    image: &PixelBuffer,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (PixelBuffer, bool) {
    let Some((w, h)) = fitted_size(image.width(), image.height(), max_dimension) else {
        return (image.clone(), false);
    };
    tracing::debug!(
        from_width = image.width(),
        from_height = image.height(),
        to_width = w,
        to_height = h,
        %filter,
        "downsizing source image"
    );
    (
        image::imageops::resize(image, w, h, filter.to_image_filter()),
        true,
    )
}
