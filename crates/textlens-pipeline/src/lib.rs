//! textlens-pipeline: pixel filters and perspective correction (sans-IO).
//!
//! Turns a source photo into a cleaned-up image for text recognition:
//! optional homography correction, then an ordered chain of filters.
//!
//! This crate has **no I/O dependencies** and no async runtime. It
//! operates on in-memory [`PixelBuffer`]s and is cancelled cooperatively
//! through the [`Cancellation`](cancel::Cancellation) seam. Loading,
//! saving and the debounced reprocessing coordinator live in
//! `textlens-io`.

pub mod binary;
pub mod blur;
pub mod cancel;
pub mod chain;
pub mod contrast;
pub mod diagnostics;
pub mod downsample;
pub mod edge;
pub mod filter;
pub mod grayscale;
pub mod homography;
pub mod hsv;
pub mod median;
pub mod sharpen;
pub mod tile;
pub mod types;

pub use cancel::{Cancellation, Never};
pub use chain::FilterChain;
pub use diagnostics::{Clock, PipelineDiagnostics, process_with_diagnostics};
pub use downsample::{DownsampleFilter, fit_within};
pub use filter::{AppliedFilter, FilterId, FilterKind, FilterParams, apply_filter};
pub use homography::{Corner, HomographySettings};
pub use tile::TileExecutor;
pub use types::{
    CHANNELS, Dimensions, PipelineConfig, PipelineError, PixelBuffer, Point, ProcessResult,
    RgbaImage,
};

/// Run the full pipeline on `source`.
///
/// # Pipeline steps
///
/// 1. Perspective correction, if `homography` is set
/// 2. Every filter of `chain`, in order
///
/// `cancel` is checked before each filter and once per tile inside
/// tiled filters. A cancelled run returns no partial output.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidHomography`] for unusable corners,
/// [`PipelineError::Cancelled`] if `cancel` fired, and any error a
/// filter reports.
pub fn process<C>(
    source: &PixelBuffer,
    homography: Option<&HomographySettings>,
    chain: &FilterChain,
    executor: &TileExecutor,
    cancel: &C,
) -> Result<ProcessResult, PipelineError>
where
    C: Cancellation + ?Sized,
{
    let corrected = match homography {
        Some(settings) => settings.apply(source)?,
        None => source.clone(),
    };
    cancel.checkpoint()?;
    let filtered = chain.apply(&corrected, executor, cancel)?;
    Ok(ProcessResult {
        corrected,
        filtered,
    })
}
