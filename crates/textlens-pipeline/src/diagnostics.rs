//! Per-step timing for one pipeline run.
//!
//! [`process_with_diagnostics`] runs the same steps as
//! [`process`](crate::process) and records how long each one took. The
//! crate has no clock of its own: callers pass a [`Clock`], so the
//! measurements work the same under a real timer and in tests.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::chain::FilterChain;
use crate::filter::{FilterId, FilterKind};
use crate::homography::HomographySettings;
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer, ProcessResult};

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Perspective correction, when configured.
    pub homography: Option<StageDiagnostics>,
    /// One entry per filter, in execution order.
    pub filters: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this step (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Step-specific metrics.
    pub metrics: StageMetrics,
}

/// Step-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Perspective correction.
    Homography {
        /// Source width.
        from_width: u32,
        /// Source height.
        from_height: u32,
        /// Corrected width after cropping.
        to_width: u32,
        /// Corrected height after cropping.
        to_height: u32,
    },
    /// One filter of the chain.
    Filter {
        /// Chain entry handle.
        id: FilterId,
        /// Filter algorithm.
        kind: FilterKind,
        /// Strength used.
        strength: i32,
        /// Whether the filter ran on the tiled executor.
        tiled: bool,
    },
}

/// High-level summary for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output width in pixels.
    pub output_width: u32,
    /// Output height in pixels.
    pub output_height: u32,
    /// Output pixel count.
    pub pixel_count: u64,
    /// Number of filters applied.
    pub filter_count: usize,
    /// Tile side length used by tiled filters.
    pub block_size: u32,
}

/// Run the pipeline and time every step.
///
/// # Errors
///
/// Same as [`process`](crate::process).
pub fn process_with_diagnostics<C, K>(
    source: &PixelBuffer,
    homography: Option<&HomographySettings>,
    chain: &FilterChain,
    executor: &TileExecutor,
    cancel: &C,
    clock: &K,
) -> Result<(ProcessResult, PipelineDiagnostics), PipelineError>
where
    C: Cancellation + ?Sized,
    K: Clock + ?Sized,
{
    let start = clock.now();

    let (corrected, homography_diag) = match homography {
        Some(settings) => {
            let t = clock.now();
            let corrected = settings.apply(source)?;
            let diag = StageDiagnostics {
                duration: clock.now().saturating_sub(t),
                metrics: StageMetrics::Homography {
                    from_width: source.width(),
                    from_height: source.height(),
                    to_width: corrected.width(),
                    to_height: corrected.height(),
                },
            };
            (corrected, Some(diag))
        }
        None => (source.clone(), None),
    };

    cancel.checkpoint()?;
    let mut filters = Vec::with_capacity(chain.len());
    let current = chain.apply_observed(&corrected, executor, cancel, |entry, run| {
        let t = clock.now();
        let output = run()?;
        filters.push(StageDiagnostics {
            duration: clock.now().saturating_sub(t),
            metrics: StageMetrics::Filter {
                id: entry.id(),
                kind: entry.kind(),
                strength: entry.strength(),
                tiled: entry.kind().is_tiled(),
            },
        });
        Ok(output)
    })?;

    let summary = PipelineSummary {
        source_width: source.width(),
        source_height: source.height(),
        output_width: current.width(),
        output_height: current.height(),
        pixel_count: u64::from(current.width()) * u64::from(current.height()),
        filter_count: filters.len(),
        block_size: executor.block_size(),
    };
    let diagnostics = PipelineDiagnostics {
        homography: homography_diag,
        filters,
        total_duration: clock.now().saturating_sub(start),
        summary,
    };
    Ok((
        ProcessResult {
            corrected,
            filtered: current,
        },
        diagnostics,
    ))
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Source: {}x{}  ->  Output: {}x{} ({} pixels)",
            self.summary.source_width,
            self.summary.source_height,
            self.summary.output_width,
            self.summary.output_height,
            self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms  |  Block size: {}px",
            duration_ms(self.total_duration),
            self.summary.block_size,
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Step", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let steps = self
            .homography
            .iter()
            .map(|d| ("Homography".to_owned(), d))
            .chain(self.filters.iter().map(|d| (d.metrics.name(), d)));

        for (name, diag) in steps {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!("Filters applied: {}", self.summary.filter_count));

        lines.join("\n")
    }
}

impl StageMetrics {
    /// Display name of the step.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Homography { .. } => "Homography".to_owned(),
            Self::Filter { kind, .. } => kind.to_string(),
        }
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Homography {
            from_width,
            from_height,
            to_width,
            to_height,
        } => format!("{from_width}x{from_height} -> {to_width}x{to_height}"),
        StageMetrics::Filter {
            id,
            strength,
            tiled,
            ..
        } => {
            let tiled = if *tiled { " tiled" } else { "" };
            format!("{id} strength={strength}{tiled}")
        }
    }
}
