//! Shared types for the textlens filter pipeline.

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;
use crate::filter::{FilterId, FilterKind};

/// Re-export `RgbaImage` so downstream crates can hold pixel data
/// without depending on `image` directly.
pub use image::RgbaImage;

/// The raster every filter reads and writes: RGBA8, row-major.
///
/// `image::ImageBuffer` already guarantees
/// `pixels.len() == width * height * 4`.
pub type PixelBuffer = RgbaImage;

/// Number of interleaved samples per pixel in a [`PixelBuffer`].
pub const CHANNELS: usize = 4;

/// A 2D point in display or image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scale both coordinates by `1 / factor`.
    #[must_use]
    pub fn unscale(self, factor: f64) -> Self {
        Self::new(self.x / factor, self.y / factor)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing buffer.
    #[must_use]
    pub fn of(image: &PixelBuffer) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Configuration for the pixel pipeline.
///
/// Fields are public for struct-update syntax; call
/// [`validate`](Self::validate) before handing a config built from
/// untrusted input to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length in pixels of the square tiles the
    /// [`TileExecutor`](crate::tile::TileExecutor) schedules.
    pub block_size: u32,

    /// Longest side a newly loaded source image is reduced to.
    pub max_dimension: u32,

    /// Resampling filter used when reducing the source image.
    pub downsample_filter: DownsampleFilter,
}

impl PipelineConfig {
    /// Default tile side length.
    pub const DEFAULT_BLOCK_SIZE: u32 = 100;

    /// Default maximum source dimension.
    pub const DEFAULT_MAX_DIMENSION: u32 = 1080;

    /// Default downsizing filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::Triangle;

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `block_size` or
    /// `max_dimension` is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "block_size must be at least 1".to_owned(),
            ));
        }
        if self.max_dimension == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_dimension must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
        }
    }
}

/// Result of one full recomputation.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Source after perspective correction, before any filter.
    ///
    /// Identical to the source when no homography is configured.
    pub corrected: PixelBuffer,
    /// Output of the last filter in the chain.
    pub filtered: PixelBuffer,
}

/// Errors that can occur while building or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A strength outside the filter's domain reached the pipeline.
    #[error("strength {strength} is outside the {kind} domain {min}..={max}")]
    InvalidStrength {
        /// The filter the strength was meant for.
        kind: FilterKind,
        /// The rejected value.
        strength: i32,
        /// Lower bound of the domain.
        min: i32,
        /// Upper bound of the domain.
        max: i32,
    },

    /// The corner configuration cannot be mapped onto a rectangle.
    #[error("invalid homography: {0}")]
    InvalidHomography(String),

    /// A filter failed for a reason other than its input.
    #[error("filter application failed: {0}")]
    FilterApplicationFailed(String),

    /// The computation was cancelled cooperatively.
    #[error("computation cancelled")]
    Cancelled,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// No chain entry carries this handle.
    #[error("no filter with id {0}")]
    UnknownFilter(FilterId),
}

impl PipelineError {
    /// Stable machine-readable code for the error variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidStrength { .. } => "invalid_strength",
            Self::InvalidHomography(_) => "invalid_homography",
            Self::FilterApplicationFailed(_) => "filter_application_failed",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::UnknownFilter(_) => "unknown_filter",
        }
    }
}
