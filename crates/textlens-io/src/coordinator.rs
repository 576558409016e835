//! Debounced, cancellable reprocessing.
//!
//! [`Coordinator`] owns an edit [`Session`] and a driver task on the
//! current tokio runtime. Edit methods are synchronous: they validate,
//! mutate the session under a lock, advance the reload counter and
//! notify the driver. The driver collapses bursts of notifications with
//! a debounce window, cancels whatever attempt is still running, and
//! starts one recomputation on the blocking pool from an immutable
//! [`Snapshot`] of the session.
//!
//! An attempt publishes its result only if its generation still equals
//! the reload counter when it finishes. Anything older was superseded
//! by a later edit and is dropped without a trace in the published
//! state, as are cancelled attempts.

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use textlens_pipeline::{
    Corner, Dimensions, FilterId, FilterKind, FilterParams, HomographySettings, PipelineError,
    PixelBuffer, Point, ProcessResult, TileExecutor,
};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::session::{Session, SessionError, Snapshot};
use crate::state::{CoordinatorStats, FilterSettings, HomographyState, PipelineState};

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    started: AtomicU64,
    superseded: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared between the handle and the driver task.
#[derive(Debug)]
struct Shared {
    session: Mutex<Session>,
    state: watch::Sender<PipelineState>,
    counters: Counters,
}

/// Handle to a running reprocessing coordinator.
///
/// Dropping the handle stops the driver once it notices the request
/// channel closed; call [`shutdown`](Self::shutdown) to stop it and
/// wait for any running attempt.
#[derive(Debug)]
pub struct Coordinator {
    shared: Arc<Shared>,
    requests: mpsc::UnboundedSender<u64>,
    shutdown: CancellationToken,
    driver: JoinHandle<()>,
}

impl Coordinator {
    /// Start a coordinator on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] if `config` does not validate
    /// and [`SessionError::NoRuntime`] outside a tokio runtime.
    pub fn spawn(config: CoordinatorConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let executor = TileExecutor::from_config(&config.pipeline)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let (state, _) = watch::channel(PipelineState::Idle);
        let shared = Arc::new(Shared {
            session: Mutex::new(Session::new(config.pipeline)),
            state,
            counters: Counters::default(),
        });
        let (requests, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let driver = Driver {
            shared: Arc::clone(&shared),
            config,
            executor,
            shutdown: shutdown.clone(),
        };
        let driver = runtime.spawn(driver.run(rx));
        tracing::debug!(?config, "coordinator started");

        Ok(Self {
            shared,
            requests,
            shutdown,
            driver,
        })
    }

    /// Subscribe to published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.shared.state.subscribe()
    }

    /// The currently published state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.shared.state.borrow().clone()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.shared.counters.snapshot()
    }

    /// Current reload counter.
    #[must_use]
    pub fn reload_counter(&self) -> u64 {
        self.shared.session.lock().reload()
    }

    /// Chain snapshot plus the entry selected for configuration.
    #[must_use]
    pub fn filter_settings(&self) -> FilterSettings {
        self.shared.session.lock().filter_settings()
    }

    /// Where the perspective-correction lifecycle stands.
    #[must_use]
    pub fn homography_state(&self) -> HomographyState {
        self.shared.session.lock().homography_state()
    }

    /// Replace the source image.
    ///
    /// The image is downsized to the configured maximum dimension, any
    /// perspective correction is dropped, `ImageLoaded` is published
    /// and a recomputation is scheduled. Returns the stored size.
    pub fn set_source_image(&self, image: PixelBuffer) -> Dimensions {
        let (generation, dimensions) = {
            let mut session = self.shared.session.lock();
            let source = session.set_source_image(image);
            let dimensions = Dimensions::of(&source);
            self.shared
                .state
                .send_replace(PipelineState::ImageLoaded { source });
            (session.bump(), dimensions)
        };
        self.notify(generation);
        dimensions
    }

    /// Append a filter with its default strength and select it.
    pub fn add_filter(&self, kind: FilterKind) -> FilterId {
        let (generation, id) = {
            let mut session = self.shared.session.lock();
            let id = session.add_filter(kind);
            (session.bump(), id)
        };
        self.notify(generation);
        id
    }

    /// Append a filter with explicit settings and select it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] if the entry does not validate.
    pub fn add_filter_with(
        &self,
        kind: FilterKind,
        strength: i32,
        params: FilterParams,
    ) -> Result<FilterId, SessionError> {
        self.edit(|s| s.add_filter_with(kind, strength, params))
    }

    /// Remove a filter.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn remove_filter(&self, id: FilterId) -> Result<(), SessionError> {
        self.edit(|s| s.remove_filter(id))
    }

    /// Change a filter's strength.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id or an
    /// out-of-domain strength. Nothing is scheduled on error.
    pub fn change_strength(&self, id: FilterId, strength: i32) -> Result<(), SessionError> {
        self.edit(|s| s.change_strength(id, strength))
    }

    /// Change a filter's parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id or
    /// parameters of another kind.
    pub fn change_params(&self, id: FilterId, params: FilterParams) -> Result<(), SessionError> {
        self.edit(|s| s.change_params(id, params))
    }

    /// Move a filter to `index` in the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn move_filter(&self, id: FilterId, index: usize) -> Result<(), SessionError> {
        self.edit(|s| s.move_filter(id, index))
    }

    /// Select a filter for configuration. Does not recompute.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for an unknown id.
    pub fn select_filter_to_configure(&self, id: FilterId) -> Result<(), SessionError> {
        self.shared.session.lock().select_filter_to_configure(id)
    }

    /// Start placing corners. Does not recompute.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSourceImage`] without a source.
    pub fn begin_homography_selection(
        &self,
        display_scale: f64,
    ) -> Result<HomographySettings, SessionError> {
        self.shared
            .session
            .lock()
            .begin_homography_selection(display_scale)
    }

    /// Drag the nearest corner of the selection in progress.
    pub fn drag_homography_corner(&self, position: Point) -> Option<Corner> {
        self.shared.session.lock().drag_homography_corner(position)
    }

    /// Abandon the selection in progress. Does not recompute.
    pub fn cancel_homography_selection(&self) {
        self.shared.session.lock().cancel_homography_selection();
    }

    /// Apply a perspective correction and schedule a recomputation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSourceImage`] without a source and
    /// [`SessionError::Pipeline`] if `settings` do not validate.
    pub fn apply_homography(&self, settings: HomographySettings) -> Result<(), SessionError> {
        self.edit(|s| s.apply_homography(settings))
    }

    /// Remove any perspective correction and schedule a recomputation.
    pub fn clear_homography(&self) {
        let generation = {
            let mut session = self.shared.session.lock();
            session.clear_homography();
            session.bump()
        };
        self.notify(generation);
    }

    /// Stop the driver, cancelling any running attempt, and wait for it.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.driver.await {
            tracing::warn!(%err, "coordinator driver ended abnormally");
        }
    }

    fn edit<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let (generation, value) = {
            let mut session = self.shared.session.lock();
            let value = f(&mut session)?;
            (session.bump(), value)
        };
        self.notify(generation);
        Ok(value)
    }

    fn notify(&self, generation: u64) {
        bump(&self.shared.counters.scheduled);
        tracing::trace!(generation, "recomputation requested");
        if self.requests.send(generation).is_err() {
            tracing::warn!(generation, "coordinator driver has stopped; edit not scheduled");
        }
    }
}

type Outcome = Result<ProcessResult, PipelineError>;

/// One recomputation running on the blocking pool.
struct Attempt {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<Outcome>,
}

impl Attempt {
    /// Request cancellation and wait until the task has stopped.
    async fn stop(self) {
        self.cancel.cancel();
        // The outcome is stale by construction.
        let _ = self.handle.await;
    }
}

enum Event {
    Shutdown,
    Request(Option<u64>),
    Fire,
    Finished(Result<Outcome, JoinError>),
}

struct Driver {
    shared: Arc<Shared>,
    config: CoordinatorConfig,
    executor: TileExecutor,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(self, mut requests: mpsc::UnboundedReceiver<u64>) {
        let mut deadline: Option<Instant> = None;
        let mut running: Option<Attempt> = None;

        loop {
            let event = tokio::select! {
                () = self.shutdown.cancelled() => Event::Shutdown,
                request = requests.recv() => Event::Request(request),
                () = fire_at(deadline) => Event::Fire,
                outcome = join_running(&mut running) => Event::Finished(outcome),
            };

            match event {
                Event::Shutdown | Event::Request(None) => break,
                Event::Request(Some(generation)) => {
                    let delay = if running.is_some() {
                        self.config.busy_debounce()
                    } else {
                        self.config.idle_debounce()
                    };
                    tracing::trace!(generation, ?delay, "debouncing");
                    deadline = Some(Instant::now() + delay);
                }
                Event::Fire => {
                    deadline = None;
                    let current = self.shared.session.lock().reload();
                    if running.as_ref().is_some_and(|a| a.generation == current) {
                        // The snapshot was taken after the edit that scheduled this.
                        tracing::trace!(generation = current, "running attempt is current");
                        continue;
                    }
                    if let Some(attempt) = running.take() {
                        tracing::debug!(generation = attempt.generation, "superseding attempt");
                        bump(&self.shared.counters.superseded);
                        attempt.stop().await;
                    }
                    running = self.start();
                }
                Event::Finished(outcome) => {
                    if let Some(attempt) = running.take() {
                        self.finish(attempt.generation, outcome);
                    }
                }
            }
        }

        if let Some(attempt) = running.take() {
            attempt.stop().await;
        }
        tracing::debug!("coordinator stopped");
    }

    /// Snapshot the session and launch a recomputation.
    fn start(&self) -> Option<Attempt> {
        let snapshot = {
            let session = self.shared.session.lock();
            let snapshot = session.snapshot()?;
            let previous = self.shared.state.borrow().display_image();
            self.shared
                .state
                .send_replace(PipelineState::Recomputing { previous });
            snapshot
        };
        bump(&self.shared.counters.started);
        tracing::debug!(
            generation = snapshot.generation,
            filters = snapshot.chain.len(),
            homography = snapshot.homography.is_some(),
            "recomputation started"
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let executor = self.executor;
        let generation = snapshot.generation;
        let handle = tokio::task::spawn_blocking(move || compute(&snapshot, &executor, &token));
        Some(Attempt {
            generation,
            cancel,
            handle,
        })
    }

    /// Publish a finished attempt if nothing newer was requested.
    fn finish(&self, generation: u64, outcome: Result<Outcome, JoinError>) {
        let outcome = outcome.unwrap_or_else(|err| {
            Err(PipelineError::FilterApplicationFailed(format!(
                "recomputation task failed: {err}"
            )))
        });

        let session = self.shared.session.lock();
        if generation != session.reload() {
            tracing::debug!(generation, current = session.reload(), "discarding stale result");
            return;
        }
        match outcome {
            Ok(result) => {
                tracing::info!(
                    generation,
                    width = result.filtered.width(),
                    height = result.filtered.height(),
                    "recomputation published"
                );
                bump(&self.shared.counters.published);
                self.shared.state.send_replace(PipelineState::Ready {
                    generation,
                    corrected: Arc::new(result.corrected),
                    filtered: Arc::new(result.filtered),
                });
            }
            Err(PipelineError::Cancelled) => {
                tracing::debug!(generation, "recomputation cancelled");
            }
            Err(err) => {
                tracing::warn!(generation, code = err.code(), %err, "recomputation failed");
                bump(&self.shared.counters.failed);
                self.shared.state.send_replace(PipelineState::Failed {
                    generation,
                    code: err.code(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn compute(snapshot: &Snapshot, executor: &TileExecutor, token: &CancellationToken) -> Outcome {
    let cancel = || token.is_cancelled();
    textlens_pipeline::process(
        &snapshot.source,
        snapshot.homography.as_ref(),
        &snapshot.chain,
        executor,
        &cancel,
    )
}

async fn fire_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn join_running(running: &mut Option<Attempt>) -> Result<Outcome, JoinError> {
    match running {
        Some(attempt) => (&mut attempt.handle).await,
        None => future::pending().await,
    }
}
