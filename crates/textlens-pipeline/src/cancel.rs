//! Cooperative cancellation seam.
//!
//! The pipeline is synchronous and has no runtime of its own, so it
//! cannot be interrupted from outside. Instead every long-running loop
//! polls a [`Cancellation`] at coarse checkpoints: once per tile in the
//! [`TileExecutor`](crate::tile::TileExecutor) and once per step in
//! [`FilterChain::apply`](crate::chain::FilterChain::apply).
//!
//! Any `Fn() -> bool` closure is a `Cancellation`, so callers can wrap
//! whatever token their runtime provides:
//!
//! ```rust
//! # use textlens_pipeline::cancel::Cancellation;
//! # use std::sync::atomic::{AtomicBool, Ordering};
//! let flag = AtomicBool::new(false);
//! let cancel = || flag.load(Ordering::Relaxed);
//! assert!(!cancel.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::PipelineError;

/// Polled by long-running pipeline loops.
///
/// Must be `Sync` because tiles poll it from worker threads.
pub trait Cancellation: Sync {
    /// Whether the caller has asked the computation to stop.
    fn is_cancelled(&self) -> bool;

    /// Return [`PipelineError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] when [`is_cancelled`](Self::is_cancelled)
    /// is `true`.
    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A cancellation that never fires, for one-shot synchronous callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Cancellation for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_is_not_cancelled() {
        assert!(!Never.is_cancelled());
        assert!(Never.checkpoint().is_ok());
    }

    #[test]
    fn closure_reflects_flag() {
        let flag = AtomicBool::new(false);
        let cancel = || flag.load(Ordering::Relaxed);
        assert!(cancel.checkpoint().is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(cancel.checkpoint(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn atomic_bool_is_a_cancellation() {
        let flag = AtomicBool::new(true);
        assert!(flag.is_cancelled());
    }
}
