//! Observable state published by the coordinator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use textlens_pipeline::{AppliedFilter, FilterId, HomographySettings, PixelBuffer};

/// What the coordinator currently shows.
///
/// Exactly one value is current at a time; subscribers read it through
/// a [`tokio::sync::watch`] channel. Buffers are shared, never copied.
#[derive(Debug, Clone, Default)]
pub enum PipelineState {
    /// No source image yet.
    #[default]
    Idle,
    /// A source image was set and no result exists for it yet.
    ImageLoaded {
        /// The (downsized) source.
        source: Arc<PixelBuffer>,
    },
    /// A recomputation is running.
    Recomputing {
        /// Last image shown, for a dimmed preview.
        previous: Option<Arc<PixelBuffer>>,
    },
    /// The latest settings were applied successfully.
    Ready {
        /// Reload counter value the result was computed for.
        generation: u64,
        /// Source after perspective correction, before filters.
        corrected: Arc<PixelBuffer>,
        /// Fully filtered output.
        filtered: Arc<PixelBuffer>,
    },
    /// The latest settings could not be applied.
    Failed {
        /// Reload counter value the attempt was started for.
        generation: u64,
        /// Stable error code, see `PipelineError::code`.
        code: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl PipelineState {
    /// The image a UI would display for this state.
    #[must_use]
    pub fn display_image(&self) -> Option<Arc<PixelBuffer>> {
        match self {
            Self::Idle | Self::Failed { .. } => None,
            Self::ImageLoaded { source } => Some(Arc::clone(source)),
            Self::Recomputing { previous } => previous.clone(),
            Self::Ready { filtered, .. } => Some(Arc::clone(filtered)),
        }
    }

    /// Whether a recomputation is in flight.
    #[must_use]
    pub const fn is_recomputing(&self) -> bool {
        matches!(self, Self::Recomputing { .. })
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ImageLoaded { .. } => "image_loaded",
            Self::Recomputing { .. } => "recomputing",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Perspective-correction selection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum HomographyState {
    /// No correction configured and none being edited.
    #[default]
    NotShown,
    /// The user is placing corners; the settings are the working copy.
    Selecting(HomographySettings),
    /// A correction is applied.
    Selected(HomographySettings),
}

/// Snapshot of the chain for a filter settings panel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Entries in execution order.
    pub filters: Vec<AppliedFilter>,
    /// Entry currently selected for configuration.
    pub configuring: Option<FilterId>,
}

impl FilterSettings {
    /// The entry being configured, if it is still in the chain.
    #[must_use]
    pub fn configuring_filter(&self) -> Option<&AppliedFilter> {
        let id = self.configuring?;
        self.filters.iter().find(|f| f.id() == id)
    }
}

/// Counters describing what the coordinator has done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Edits that requested a recomputation.
    pub scheduled: u64,
    /// Recomputations actually started after debouncing.
    pub started: u64,
    /// Running attempts cancelled in favour of a newer one.
    pub superseded: u64,
    /// `Ready` states published.
    pub published: u64,
    /// `Failed` states published.
    pub failed: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use textlens_pipeline::{FilterKind, FilterParams};

    use super::*;

    #[test]
    fn display_image_follows_state() {
        let img = Arc::new(PixelBuffer::new(2, 2));
        assert!(PipelineState::Idle.display_image().is_none());
        let loaded = PipelineState::ImageLoaded {
            source: Arc::clone(&img),
        };
        assert!(Arc::ptr_eq(&loaded.display_image().unwrap(), &img));
        let recomputing = PipelineState::Recomputing { previous: None };
        assert!(recomputing.is_recomputing());
        assert!(recomputing.display_image().is_none());
    }

    #[test]
    fn configuring_filter_lookup() {
        let entry = AppliedFilter::from_defaults(FilterId::new(3), FilterKind::Median);
        let settings = FilterSettings {
            filters: vec![entry],
            configuring: Some(FilterId::new(3)),
        };
        assert_eq!(settings.configuring_filter(), Some(&entry));
        let stale = FilterSettings {
            configuring: Some(FilterId::new(9)),
            ..settings
        };
        assert!(stale.configuring_filter().is_none());
        assert_eq!(FilterParams::for_kind(FilterKind::Median), entry.params());
    }
}
