//! Filter kinds, their strength domains, typed parameters, and the
//! dispatch from an [`AppliedFilter`] to its algorithm.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer};

/// The closed set of pixel filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    /// Per-channel binary threshold.
    Binary,
    /// Contrast stretch around mid-gray.
    Contrast,
    /// Unsharp mask with a median low-pass.
    Sharpen,
    /// Histogram median over a square aperture.
    Median,
    /// Box blur with a clipped window.
    Averaging,
    /// Weighted luma replicated to all channels.
    Grayscale,
    /// Shift of the HSV value component.
    BrightnessHsv,
    /// Shift of the HSV saturation component.
    SaturationHsv,
    /// Rotation of the HSV hue component.
    HueHsv,
    /// Sobel gradient magnitude drawn in a solid color.
    EdgeColoring,
}

impl FilterKind {
    /// Every kind, in menu order.
    pub const ALL: [Self; 10] = [
        Self::Binary,
        Self::Contrast,
        Self::Sharpen,
        Self::Median,
        Self::Averaging,
        Self::Grayscale,
        Self::BrightnessHsv,
        Self::SaturationHsv,
        Self::HueHsv,
        Self::EdgeColoring,
    ];

    /// Inclusive range of accepted strengths.
    ///
    /// Contrast additionally excludes 259; see [`accepts`](Self::accepts).
    #[must_use]
    pub const fn domain(self) -> RangeInclusive<i32> {
        match self {
            Self::Binary => 0..=255,
            Self::Contrast => -200..=500,
            Self::Sharpen | Self::Median | Self::Averaging => 1..=20,
            Self::Grayscale => 0..=0,
            Self::BrightnessHsv | Self::SaturationHsv | Self::HueHsv => -255..=255,
            Self::EdgeColoring => 0..=1,
        }
    }

    /// Strength given to a newly added filter.
    #[must_use]
    pub const fn default_strength(self) -> i32 {
        match self {
            Self::Binary => 155,
            Self::Contrast | Self::BrightnessHsv | Self::SaturationHsv | Self::HueHsv => 5,
            Self::Sharpen | Self::Median => 3,
            Self::Averaging | Self::EdgeColoring => 1,
            Self::Grayscale => 0,
        }
    }

    /// Whether `strength` lies in this kind's domain.
    #[must_use]
    pub fn accepts(self, strength: i32) -> bool {
        if self == Self::Contrast && strength == crate::contrast::POLE {
            return false;
        }
        self.domain().contains(&strength)
    }

    /// Reject a strength outside the domain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStrength`] if
    /// [`accepts`](Self::accepts) is `false`.
    pub fn check_strength(self, strength: i32) -> Result<(), PipelineError> {
        if self.accepts(strength) {
            Ok(())
        } else {
            let domain = self.domain();
            Err(PipelineError::InvalidStrength {
                kind: self,
                strength,
                min: *domain.start(),
                max: *domain.end(),
            })
        }
    }

    /// Whether the filter runs on the [`TileExecutor`].
    #[must_use]
    pub const fn is_tiled(self) -> bool {
        matches!(self, Self::Sharpen | Self::Median | Self::Averaging)
    }

    /// Short lowercase name used on the command line.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Contrast => "contrast",
            Self::Sharpen => "sharpen",
            Self::Median => "median",
            Self::Averaging => "averaging",
            Self::Grayscale => "grayscale",
            Self::BrightnessHsv => "brightness",
            Self::SaturationHsv => "saturation",
            Self::HueHsv => "hue",
            Self::EdgeColoring => "edge-coloring",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("Binary"),
            Self::Contrast => f.write_str("Contrast"),
            Self::Sharpen => f.write_str("Sharpen"),
            Self::Median => f.write_str("Median"),
            Self::Averaging => f.write_str("Averaging"),
            Self::Grayscale => f.write_str("Grayscale"),
            Self::BrightnessHsv => f.write_str("Brightness"),
            Self::SaturationHsv => f.write_str("Saturation"),
            Self::HueHsv => f.write_str("Hue"),
            Self::EdgeColoring => f.write_str("Edge Coloring"),
        }
    }
}

impl FromStr for FilterKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown filter kind {s:?}")))
    }
}

/// Extra, kind-specific parameters for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterParams {
    /// The kind takes no parameters beyond its strength.
    #[default]
    None,
    /// Color the edge magnitude is drawn in.
    EdgeColoring {
        /// RGB edge color at full magnitude.
        color: [u8; 3],
    },
}

impl FilterParams {
    /// Default parameters for a kind.
    #[must_use]
    pub const fn for_kind(kind: FilterKind) -> Self {
        match kind {
            FilterKind::EdgeColoring => Self::EdgeColoring {
                color: crate::edge::DEFAULT_EDGE_COLOR,
            },
            _ => Self::None,
        }
    }

    /// Whether these parameters belong to `kind`.
    #[must_use]
    pub const fn matches(self, kind: FilterKind) -> bool {
        matches!(
            (self, kind),
            (Self::EdgeColoring { .. }, FilterKind::EdgeColoring)
                | (Self::None, FilterKind::Binary)
                | (Self::None, FilterKind::Contrast)
                | (Self::None, FilterKind::Sharpen)
                | (Self::None, FilterKind::Median)
                | (Self::None, FilterKind::Averaging)
                | (Self::None, FilterKind::Grayscale)
                | (Self::None, FilterKind::BrightnessHsv)
                | (Self::None, FilterKind::SaturationHsv)
                | (Self::None, FilterKind::HueHsv)
        )
    }
}

/// Stable handle for one entry of a [`FilterChain`](crate::chain::FilterChain).
///
/// Survives reordering and removal of other entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterId(u64);

impl FilterId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One filter in a chain, with its strength already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFilter {
    id: FilterId,
    kind: FilterKind,
    strength: i32,
    params: FilterParams,
}

impl AppliedFilter {
    /// Build a validated entry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStrength`] if `strength` is
    /// outside the kind's domain, or [`PipelineError::InvalidConfig`]
    /// if `params` belong to another kind.
    pub fn new(
        id: FilterId,
        kind: FilterKind,
        strength: i32,
        params: FilterParams,
    ) -> Result<Self, PipelineError> {
        kind.check_strength(strength)?;
        check_params(kind, params)?;
        Ok(Self {
            id,
            kind,
            strength,
            params,
        })
    }

    /// Build an entry with the kind's default strength and parameters.
    #[must_use]
    pub const fn from_defaults(id: FilterId, kind: FilterKind) -> Self {
        Self {
            id,
            kind,
            strength: kind.default_strength(),
            params: FilterParams::for_kind(kind),
        }
    }

    /// The entry's handle.
    #[must_use]
    pub const fn id(&self) -> FilterId {
        self.id
    }

    /// Which algorithm runs.
    #[must_use]
    pub const fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Current strength.
    #[must_use]
    pub const fn strength(&self) -> i32 {
        self.strength
    }

    /// Kind-specific parameters.
    #[must_use]
    pub const fn params(&self) -> FilterParams {
        self.params
    }

    /// Replace the strength after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStrength`] if `strength` is
    /// outside the kind's domain; the entry is left unchanged.
    pub fn set_strength(&mut self, strength: i32) -> Result<(), PipelineError> {
        self.kind.check_strength(strength)?;
        self.strength = strength;
        Ok(())
    }

    /// Replace the parameters after validating them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `params` belong to
    /// another kind; the entry is left unchanged.
    pub fn set_params(&mut self, params: FilterParams) -> Result<(), PipelineError> {
        check_params(self.kind, params)?;
        self.params = params;
        Ok(())
    }

    /// Run this entry's algorithm on `image`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] if a tiled filter observed
    /// cancellation, or [`PipelineError::InvalidStrength`] if the entry
    /// was deserialized with an out-of-domain strength.
    pub fn apply<C>(
        &self,
        image: &PixelBuffer,
        executor: &TileExecutor,
        cancel: &C,
    ) -> Result<PixelBuffer, PipelineError>
    where
        C: Cancellation + ?Sized,
    {
        apply_filter(
            self.kind,
            image,
            self.strength,
            self.params,
            executor,
            cancel,
        )
    }
}

/// Apply `f` to the RGB triple of every pixel, copying alpha through.
pub(crate) fn map_rgb<F>(image: &PixelBuffer, f: F) -> PixelBuffer
where
    F: Fn([u8; 3]) -> [u8; 3],
{
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let [r, g, b] = f([r, g, b]);
        pixel.0 = [r, g, b, a];
    }
    out
}

fn mismatched_params(kind: FilterKind, params: FilterParams) -> PipelineError {
    PipelineError::InvalidConfig(format!("parameters {params:?} do not belong to {kind}"))
}

fn check_params(kind: FilterKind, params: FilterParams) -> Result<(), PipelineError> {
    if params.matches(kind) {
        Ok(())
    } else {
        Err(mismatched_params(kind, params))
    }
}

/// Run one filter on `image`, producing a new buffer of the same size.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStrength`] for an out-of-domain
/// strength, [`PipelineError::InvalidConfig`] for mismatched params,
/// and [`PipelineError::Cancelled`] if a tiled filter observed
/// cancellation.
pub fn apply_filter<C>(
    kind: FilterKind,
    image: &PixelBuffer,
    strength: i32,
    params: FilterParams,
    executor: &TileExecutor,
    cancel: &C,
) -> Result<PixelBuffer, PipelineError>
where
    C: Cancellation + ?Sized,
{
    kind.check_strength(strength)?;
    match (kind, params) {
        (FilterKind::Binary, FilterParams::None) => crate::binary::binary(image, strength),
        (FilterKind::Contrast, FilterParams::None) => crate::contrast::contrast(image, strength),
        (FilterKind::Sharpen, FilterParams::None) => {
            crate::sharpen::sharpen(image, strength, executor, cancel)
        }
        (FilterKind::Median, FilterParams::None) => {
            crate::median::median(image, strength, executor, cancel)
        }
        (FilterKind::Averaging, FilterParams::None) => {
            crate::blur::averaging(image, strength, executor, cancel)
        }
        (FilterKind::Grayscale, FilterParams::None) => Ok(crate::grayscale::grayscale(image)),
        (FilterKind::BrightnessHsv, FilterParams::None) => {
            Ok(crate::hsv::brightness(image, strength))
        }
        (FilterKind::SaturationHsv, FilterParams::None) => {
            Ok(crate::hsv::saturation(image, strength))
        }
        (FilterKind::HueHsv, FilterParams::None) => Ok(crate::hsv::hue(image, strength)),
        (FilterKind::EdgeColoring, FilterParams::EdgeColoring { color }) => {
            Ok(crate::edge::edge_coloring(image, strength, color))
        }
        (kind, params) => Err(mismatched_params(kind, params)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cancel::Never;

    #[test]
    fn defaults_lie_in_domain() {
        for kind in FilterKind::ALL {
            assert!(
                kind.accepts(kind.default_strength()),
                "{kind} default {} outside its domain",
                kind.default_strength()
            );
        }
    }

    #[test]
    fn binary_domain_bounds() {
        assert!(FilterKind::Binary.accepts(0));
        assert!(FilterKind::Binary.accepts(255));
        assert!(!FilterKind::Binary.accepts(-1));
        assert!(!FilterKind::Binary.accepts(256));
    }

    #[test]
    fn contrast_excludes_pole() {
        assert!(FilterKind::Contrast.accepts(258));
        assert!(!FilterKind::Contrast.accepts(259));
        assert!(FilterKind::Contrast.accepts(260));
        assert!(matches!(
            FilterKind::Contrast.check_strength(259),
            Err(PipelineError::InvalidStrength { strength: 259, .. })
        ));
    }

    #[test]
    fn slug_round_trips_through_from_str() {
        for kind in FilterKind::ALL {
            assert_eq!(kind.slug().parse::<FilterKind>().unwrap(), kind);
        }
        assert_eq!(
            "EDGE-COLORING".parse::<FilterKind>().unwrap(),
            FilterKind::EdgeColoring
        );
        assert!(matches!(
            "emboss".parse::<FilterKind>(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn params_for_kind_match_kind() {
        for kind in FilterKind::ALL {
            assert!(FilterParams::for_kind(kind).matches(kind));
        }
        assert!(!FilterParams::None.matches(FilterKind::EdgeColoring));
        assert!(!FilterParams::EdgeColoring { color: [0, 0, 0] }.matches(FilterKind::Median));
    }

    #[test]
    fn applied_filter_rejects_bad_strength() {
        let result = AppliedFilter::new(
            FilterId::new(1),
            FilterKind::Median,
            0,
            FilterParams::None,
        );
        assert!(matches!(
            result,
            Err(PipelineError::InvalidStrength {
                kind: FilterKind::Median,
                ..
            })
        ));
    }

    #[test]
    fn applied_filter_rejects_foreign_params() {
        let result = AppliedFilter::new(
            FilterId::new(1),
            FilterKind::Binary,
            10,
            FilterParams::EdgeColoring { color: [1, 2, 3] },
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn set_strength_leaves_entry_unchanged_on_error() {
        let mut entry = AppliedFilter::new(
            FilterId::new(7),
            FilterKind::Binary,
            100,
            FilterParams::None,
        )
        .unwrap();
        assert!(entry.set_strength(300).is_err());
        assert_eq!(entry.strength(), 100);
        entry.set_strength(20).unwrap();
        assert_eq!(entry.strength(), 20);
    }

    #[test]
    fn apply_filter_rejects_out_of_domain_strength() {
        let img = PixelBuffer::new(2, 2);
        let result = apply_filter(
            FilterKind::Binary,
            &img,
            -5,
            FilterParams::None,
            &TileExecutor::default(),
            &Never,
        );
        assert!(matches!(result, Err(PipelineError::InvalidStrength { .. })));
    }

    #[test]
    fn apply_filter_rejects_params_of_another_kind() {
        let img = PixelBuffer::new(4, 4);
        for (kind, params) in [
            (FilterKind::EdgeColoring, FilterParams::None),
            (
                FilterKind::Median,
                FilterParams::EdgeColoring { color: [0, 0, 0] },
            ),
        ] {
            let result = apply_filter(
                kind,
                &img,
                kind.default_strength(),
                params,
                &TileExecutor::default(),
                &Never,
            );
            assert!(
                matches!(result, Err(PipelineError::InvalidConfig(_))),
                "{kind} accepted {params:?}"
            );
        }
    }

    #[test]
    fn every_kind_preserves_dimensions() {
        let img = PixelBuffer::from_fn(9, 6, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x * 20) as u8, (y * 30) as u8, 90, 255])
        });
        for kind in FilterKind::ALL {
            let out = apply_filter(
                kind,
                &img,
                kind.default_strength(),
                FilterParams::for_kind(kind),
                &TileExecutor::default(),
                &Never,
            )
            .unwrap();
            assert_eq!(out.dimensions(), img.dimensions(), "{kind} changed size");
        }
    }

    #[test]
    fn filter_id_display() {
        assert_eq!(FilterId::new(12).to_string(), "#12");
    }
}
