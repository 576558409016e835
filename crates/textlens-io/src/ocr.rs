//! Seam to an external text-recognition service.
//!
//! No recognition engine lives here. The surrounding application
//! implements [`Recognizer`] and hands the coordinator's filtered output
//! to it with [`recognize_ready`].

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use textlens_pipeline::PixelBuffer;

use crate::coordinator::Coordinator;
use crate::state::PipelineState;

/// Errors from recognizing the coordinator's output.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The recognizer itself failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The pipeline failed, so there was nothing to recognize.
    #[error("pipeline failed ({code}): {reason}")]
    PipelineFailed {
        /// Stable pipeline error code.
        code: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The coordinator stopped publishing.
    #[error("coordinator closed before a result was published")]
    Closed,
}

/// Turns an image into text.
pub trait Recognizer {
    /// Recognize the text in `image`.
    fn recognize(
        &self,
        image: &PixelBuffer,
    ) -> impl Future<Output = Result<String, OcrError>> + Send;
}

/// Text-recognition lifecycle as a UI would show it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum TextRecognitionState {
    /// Nothing recognized yet.
    #[default]
    Empty,
    /// A recognition call is in flight.
    Loading,
    /// Recognized text.
    Recognized(String),
    /// Error message from the last attempt.
    Failed(String),
}

impl From<&Result<String, OcrError>> for TextRecognitionState {
    fn from(result: &Result<String, OcrError>) -> Self {
        match result {
            Ok(text) => Self::Recognized(text.clone()),
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

/// Wait for the result of the settings current at call time and
/// recognize its filtered image.
///
/// Results published for older settings are skipped. If the settings
/// change again while waiting, the newer result is used instead. This
/// waits indefinitely while no source image is set; wrap it in
/// [`tokio::time::timeout`] when that matters.
///
/// # Errors
///
/// Returns [`OcrError::PipelineFailed`] if the pipeline published a
/// failure, [`OcrError::Closed`] if the coordinator shut down, and
/// whatever the recognizer returns.
pub async fn recognize_ready<R>(
    coordinator: &Coordinator,
    recognizer: &R,
) -> Result<String, OcrError>
where
    R: Recognizer,
{
    let target = coordinator.reload_counter();
    let mut states = coordinator.subscribe();
    let filtered = {
        let state = states
            .wait_for(|state| match state {
                PipelineState::Ready { generation, .. }
                | PipelineState::Failed { generation, .. } => *generation >= target,
                _ => false,
            })
            .await
            .map_err(|_| OcrError::Closed)?;
        match &*state {
            PipelineState::Ready { filtered, .. } => Arc::clone(filtered),
            PipelineState::Failed { code, reason, .. } => {
                return Err(OcrError::PipelineFailed {
                    code: *code,
                    reason: reason.clone(),
                });
            }
            _ => return Err(OcrError::Closed),
        }
    };

    tracing::debug!(
        width = filtered.width(),
        height = filtered.height(),
        "recognizing filtered image"
    );
    let result = recognizer.recognize(&filtered).await;
    if let Err(err) = &result {
        tracing::warn!(%err, "text recognition failed");
    }
    result
}
