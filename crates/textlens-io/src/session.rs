//! The edit session: everything a recomputation reads.
//!
//! A [`Session`] owns the source image, the filter chain, the
//! perspective-correction settings and the reload counter. It is plain
//! synchronous data; the [`Coordinator`](crate::Coordinator) wraps it
//! in a mutex and turns every successful edit into a scheduled
//! recomputation.

use std::sync::Arc;

use textlens_pipeline::{
    Corner, Dimensions, FilterChain, FilterId, FilterKind, FilterParams, HomographySettings,
    PipelineConfig, PipelineError, PixelBuffer, Point, fit_within,
};

use crate::state::{FilterSettings, HomographyState};

/// Errors returned by edit operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The edit needs a source image and none is set.
    #[error("no source image has been set")]
    NoSourceImage,

    /// The coordinator was created outside a tokio runtime.
    #[error("no tokio runtime is available to drive recomputation")]
    NoRuntime,

    /// The pipeline rejected the edit.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl SessionError {
    /// Stable machine-readable code for the error variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoSourceImage => "no_source_image",
            Self::NoRuntime => "no_runtime",
            Self::Pipeline(err) => err.code(),
        }
    }
}

/// Immutable inputs of one recomputation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Reload counter value the snapshot was taken at.
    pub generation: u64,
    /// Source image.
    pub source: Arc<PixelBuffer>,
    /// Applied perspective correction.
    pub homography: Option<HomographySettings>,
    /// Filter chain.
    pub chain: FilterChain,
}

/// Mutable edit state.
#[derive(Debug, Default)]
pub struct Session {
    config: PipelineConfig,
    source: Option<Arc<PixelBuffer>>,
    chain: FilterChain,
    configuring: Option<FilterId>,
    applied_homography: Option<HomographySettings>,
    selecting: Option<HomographySettings>,
    reload: u64,
}

impl Session {
    /// An empty session.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current reload counter.
    #[must_use]
    pub const fn reload(&self) -> u64 {
        self.reload
    }

    /// Advance the reload counter and return the new value.
    pub const fn bump(&mut self) -> u64 {
        self.reload += 1;
        self.reload
    }

    /// The current source image.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<PixelBuffer>> {
        self.source.as_ref()
    }

    /// Replace the source, downsizing it, and drop any perspective
    /// correction.
    pub fn set_source_image(&mut self, image: PixelBuffer) -> Arc<PixelBuffer> {
        let (image, resized) =
            fit_within(&image, self.config.max_dimension, self.config.downsample_filter);
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            resized,
            "source image set"
        );
        let source = Arc::new(image);
        self.source = Some(Arc::clone(&source));
        self.applied_homography = None;
        self.selecting = None;
        source
    }

    /// Size of the current source.
    #[must_use]
    pub fn source_dimensions(&self) -> Option<Dimensions> {
        self.source.as_deref().map(Dimensions::of)
    }

    /// Append a filter with default strength and select it.
    pub fn add_filter(&mut self, kind: FilterKind) -> FilterId {
        let id = self.chain.push(kind);
        self.configuring = Some(id);
        id
    }

    /// Append a filter with explicit settings and select it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] if the entry does not validate.
    pub fn add_filter_with(
        &mut self,
        kind: FilterKind,
        strength: i32,
        params: FilterParams,
    ) -> Result<FilterId, SessionError> {
        let id = self.chain.push_with(kind, strength, params)?;
        self.configuring = Some(id);
        Ok(id)
    }

    /// Remove a filter. Clears the selection if it pointed at it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn remove_filter(&mut self, id: FilterId) -> Result<(), SessionError> {
        self.chain.remove(id)?;
        if self.configuring == Some(id) {
            self.configuring = None;
        }
        Ok(())
    }

    /// Change a filter's strength.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id or an
    /// out-of-domain strength.
    pub fn change_strength(&mut self, id: FilterId, strength: i32) -> Result<(), SessionError> {
        Ok(self.chain.set_strength(id, strength)?)
    }

    /// Change a filter's parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id or
    /// parameters of another kind.
    pub fn change_params(&mut self, id: FilterId, params: FilterParams) -> Result<(), SessionError> {
        Ok(self.chain.set_params(id, params)?)
    }

    /// Move a filter to a new position.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn move_filter(&mut self, id: FilterId, index: usize) -> Result<(), SessionError> {
        Ok(self.chain.move_to(id, index)?)
    }

    /// Select a filter for configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn select_filter_to_configure(&mut self, id: FilterId) -> Result<(), SessionError> {
        if self.chain.get(id).is_none() {
            return Err(PipelineError::UnknownFilter(id).into());
        }
        self.configuring = Some(id);
        Ok(())
    }

    /// Chain snapshot plus the selected entry.
    #[must_use]
    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            filters: self.chain.iter().copied().collect(),
            configuring: self.configuring,
        }
    }

    /// Start placing corners on the source shown at `display_scale`.
    ///
    /// The working copy starts on the image bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSourceImage`] without a source and
    /// [`SessionError::Pipeline`] for an unusable scale.
    pub fn begin_homography_selection(
        &mut self,
        display_scale: f64,
    ) -> Result<HomographySettings, SessionError> {
        let source = self.source.as_deref().ok_or(SessionError::NoSourceImage)?;
        let settings = HomographySettings::for_image(source, display_scale);
        settings.validate()?;
        self.selecting = Some(settings);
        Ok(settings)
    }

    /// Drag the nearest corner of the working copy.
    ///
    /// Returns the corner that moved; `None` when no selection is in
    /// progress or no corner is in reach.
    pub fn drag_homography_corner(&mut self, position: Point) -> Option<Corner> {
        self.selecting.as_mut()?.update_nearest(position)
    }

    /// Abandon the working copy, keeping any applied correction.
    pub fn cancel_homography_selection(&mut self) {
        self.selecting = None;
    }

    /// Apply a correction.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSourceImage`] without a source and
    /// [`SessionError::Pipeline`] if `settings` do not validate.
    pub fn apply_homography(&mut self, settings: HomographySettings) -> Result<(), SessionError> {
        if self.source.is_none() {
            return Err(SessionError::NoSourceImage);
        }
        settings.validate()?;
        self.applied_homography = Some(settings);
        self.selecting = None;
        Ok(())
    }

    /// Remove any applied correction.
    pub fn clear_homography(&mut self) {
        self.applied_homography = None;
        self.selecting = None;
    }

    /// Where the correction lifecycle stands.
    #[must_use]
    pub const fn homography_state(&self) -> HomographyState {
        match (self.selecting, self.applied_homography) {
            (Some(working), _) => HomographyState::Selecting(working),
            (None, Some(applied)) => HomographyState::Selected(applied),
            (None, None) => HomographyState::NotShown,
        }
    }

    /// Inputs for a recomputation, or `None` without a source.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot {
            generation: self.reload,
            source: Arc::clone(self.source.as_ref()?),
            homography: self.applied_homography,
            chain: self.chain.clone(),
        })
    }
}
