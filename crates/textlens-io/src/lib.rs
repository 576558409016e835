//! textlens-io: image files, the reprocessing coordinator and the OCR seam.
//!
//! Wraps the sans-IO `textlens-pipeline` crate with everything that
//! needs a file system or an async runtime: decoding and encoding
//! images, the tokio-driven [`Coordinator`] that turns a stream of
//! edits into debounced, cancellable recomputations, and the
//! [`Recognizer`] trait an external text-recognition service plugs
//! into.

pub mod config;
pub mod coordinator;
pub mod ocr;
pub mod raster;
pub mod session;
pub mod state;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use ocr::{OcrError, Recognizer, TextRecognitionState, recognize_ready};
pub use raster::RasterError;
pub use session::{Session, SessionError, Snapshot};
pub use state::{CoordinatorStats, FilterSettings, HomographyState, PipelineState};
