//! Playback controller: the session state machine
//!
//! Sequences segment playback through the dispatcher and guards every
//! asynchronous resumption with a generation id: `stop()` and a fresh
//! `speak()` both bump the generation before doing anything else, which
//! atomically invalidates all in-flight callbacks from the previous session.
//! Stale completions, estimator ticks, and boundary events are discarded,
//! never applied.

use crate::dispatch::{dispatch_segment, BackendRegistry, DispatchError};
use crate::session::PlaybackSession;
use novelvox_foundation::{
    real_clock, FoundationError, PlatformResources, PlaybackState, ResourceCoordinator,
    SharedClock, StateManager,
};
use novelvox_tts::{
    chunk, updated_calibration, CalibrationStore, MemoryCalibrationStore, PlaybackConfig,
    PositionEstimator, Segment, SegmentOutcome, SpeechBackend, SpeechParams, WordCallback,
    WordSchedule,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Invoked exactly once when a session reaches natural end-of-text; the
/// hosting UI uses it to auto-advance to the next chapter.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Invoked with the utterance-global character offset of the word currently
/// being spoken; the hosting UI uses it for word highlighting.
pub type PositionCallback = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No speech backend is available on this platform")]
    NoBackendAvailable,

    #[error(transparent)]
    Resource(#[from] FoundationError),
}

/// Counters in the style of the pipeline metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct PlaybackMetrics {
    pub sessions_started: u64,
    pub segments_spoken: u64,
    pub fallbacks_taken: u64,
    pub fatal_errors: u64,
    pub completions: u64,
}

struct ControllerInner {
    registry: BackendRegistry,
    resources: ResourceCoordinator,
    state: StateManager,
    calibration_store: Arc<dyn CalibrationStore>,
    clock: SharedClock,
    config: PlaybackConfig,
    /// The live session's id; bumped before any other effect of
    /// `speak`/`stop`/non-pausable `pause`
    generation: AtomicU64,
    /// Per-attempt epoch used to cancel estimator tick loops
    attempt_seq: AtomicU64,
    session: Mutex<Option<PlaybackSession>>,
    active_backend: Mutex<Option<Arc<dyn SpeechBackend>>>,
    on_complete: Mutex<Option<CompletionCallback>>,
    on_position: Mutex<Option<PositionCallback>>,
    metrics: RwLock<PlaybackMetrics>,
    last_error: Mutex<Option<String>>,
}

pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

impl PlaybackController {
    pub fn new(registry: BackendRegistry, resources: Arc<dyn PlatformResources>) -> Self {
        Self::with_parts(
            registry,
            resources,
            Arc::new(MemoryCalibrationStore::new()),
            real_clock(),
            PlaybackConfig::default(),
        )
    }

    pub fn with_parts(
        registry: BackendRegistry,
        resources: Arc<dyn PlatformResources>,
        calibration_store: Arc<dyn CalibrationStore>,
        clock: SharedClock,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                registry,
                resources: ResourceCoordinator::new(resources),
                state: StateManager::new(),
                calibration_store,
                clock,
                config,
                generation: AtomicU64::new(0),
                attempt_seq: AtomicU64::new(0),
                session: Mutex::new(None),
                active_backend: Mutex::new(None),
                on_complete: Mutex::new(None),
                on_position: Mutex::new(None),
                metrics: RwLock::new(PlaybackMetrics::default()),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn set_on_complete(&self, callback: CompletionCallback) {
        *self.inner.on_complete.lock() = Some(callback);
    }

    pub fn set_on_position(&self, callback: PositionCallback) {
        *self.inner.on_position.lock() = Some(callback);
    }

    /// Synchronous part of the gesture handler: unlock the audio output
    /// path before any asynchronous backend work can need it.
    pub fn warm_up_for_gesture(&self) {
        self.inner.resources.warm_up_for_gesture();
    }

    pub async fn speak(&self, text: &str, params: SpeechParams) -> Result<(), PlaybackError> {
        self.speak_from_index(text, 0, params).await
    }

    /// Start speaking from `char_offset`. Seeking is by truncation before
    /// chunking: segment-granularity, not sample-accurate.
    pub async fn speak_from_index(
        &self,
        text: &str,
        char_offset: usize,
        params: SpeechParams,
    ) -> Result<(), PlaybackError> {
        let inner = &self.inner;

        // Invalidate the previous session before anything else.
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.attempt_seq.fetch_add(1, Ordering::SeqCst);
        inner.resources.warm_up_for_gesture();
        inner.registry.stop_all().await;

        let available = inner.registry.first_available().await;

        // The awaits above are suspension points: a newer speak() may have
        // bumped the generation while this call slept on an availability
        // probe. A stale call must not install a session over the live one.
        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!(
                target: "playback",
                "speak superseded before session {} could start, discarding",
                generation
            );
            return Ok(());
        }

        let Some(backend) = available else {
            let message = "No speech backend is available on this platform".to_string();
            *inner.last_error.lock() = Some(message.clone());
            let _ = inner.state.transition(PlaybackState::Errored { message });
            return Err(PlaybackError::NoBackendAvailable);
        };

        // Segment size follows whichever backend is active at chunk time.
        let max_chars = inner
            .config
            .max_segment_chars
            .unwrap_or(backend.info().max_segment_chars);
        let tail: String = text.chars().skip(char_offset).collect();
        let mut segments = chunk(&tail, max_chars);
        for segment in &mut segments {
            segment.offset += char_offset;
        }

        if segments.is_empty() {
            debug!(target: "playback", "nothing to speak, completing immediately");
            *inner.session.lock() = None;
            inner.resources.finish();
            if inner.state.current() != PlaybackState::Idle {
                let _ = inner.state.transition(PlaybackState::Idle);
            }
            let callback = inner.on_complete.lock().clone();
            if let Some(callback) = callback {
                callback();
            }
            return Ok(());
        }

        info!(
            target: "playback",
            "session {} starting: {} segments via '{}' (offset {})",
            generation,
            segments.len(),
            backend.info().id,
            char_offset
        );
        inner.resources.start()?;
        let _ = inner.state.transition(PlaybackState::Speaking);
        *inner.session.lock() = Some(PlaybackSession::new(generation, segments, params));
        inner.metrics.write().sessions_started += 1;

        let inner = inner.clone();
        tokio::spawn(async move {
            drive(inner, generation).await;
        });
        Ok(())
    }

    /// Pause playback. Backends with true pause keep their position;
    /// the rest are stopped and will replay the current segment from its
    /// start on resume (an accepted approximation).
    pub async fn pause(&self) {
        let inner = &self.inner;
        if inner.state.current() != PlaybackState::Speaking {
            return;
        }

        // The estimator must stop stepping while paused.
        inner.attempt_seq.fetch_add(1, Ordering::SeqCst);

        let backend = inner.active_backend.lock().clone();
        let true_pause = backend
            .as_ref()
            .map(|b| b.info().supports_pause)
            .unwrap_or(false);

        if true_pause {
            if let Some(backend) = &backend {
                if let Err(e) = backend.pause().await {
                    warn!(target: "playback", "backend pause failed: {}", e);
                }
            }
            if let Some(session) = inner.session.lock().as_mut() {
                session.paused = true;
            }
        } else {
            // Stop-and-replay: supersede the in-flight segment, then stop
            // the engine. Its late outcome is discarded by generation.
            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(backend) = &backend {
                backend.stop().await;
            }
            if let Some(session) = inner.session.lock().as_mut() {
                session.paused = true;
                session.needs_drive = true;
                session.generation = generation;
            }
        }

        inner.resources.finish();
        let _ = inner.state.transition(PlaybackState::Paused);
        debug!(target: "playback", "paused (true_pause={})", true_pause);
    }

    pub async fn resume(&self) {
        let inner = &self.inner;
        if inner.state.current() != PlaybackState::Paused {
            return;
        }
        if let Err(e) = inner.resources.start() {
            warn!(target: "playback", "resource reacquisition failed: {}", e);
        }

        let (generation, needs_drive, current_segment, rate) = {
            let mut guard = inner.session.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            session.paused = false;
            let needs_drive = std::mem::take(&mut session.needs_drive);
            (
                session.generation,
                needs_drive,
                session.current_segment().cloned(),
                session.params.rate,
            )
        };
        let _ = inner.state.transition(PlaybackState::Speaking);

        if needs_drive {
            // Either a non-pausable backend was stopped mid-segment, or the
            // driving task ended while we were paused.
            let inner = inner.clone();
            tokio::spawn(async move {
                drive(inner, generation).await;
            });
        } else {
            let backend = inner.active_backend.lock().clone();
            if let Some(backend) = backend {
                if let Err(e) = backend.resume().await {
                    warn!(target: "playback", "backend resume failed: {}", e);
                }
                // Boundary-less backends get a fresh estimator; it restarts
                // from the segment start, which overstates progress briefly.
                if !backend.info().emits_word_boundaries {
                    if let Some(segment) = current_segment {
                        start_estimator(inner.clone(), generation, segment, rate);
                    }
                }
            }
        }
        debug!(target: "playback", "resumed session {}", generation);
    }

    /// Stop playback and release all device resources. Safe to call at any
    /// time, in any state, repeatedly.
    pub async fn stop(&self) {
        let inner = &self.inner;

        // Generation first: every in-flight callback is now stale.
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.attempt_seq.fetch_add(1, Ordering::SeqCst);
        inner.registry.stop_all().await;
        *inner.session.lock() = None;
        *inner.active_backend.lock() = None;
        inner.resources.finish();
        if inner.state.current() != PlaybackState::Idle {
            let _ = inner.state.transition(PlaybackState::Idle);
        }
        debug!(target: "playback", "stopped");
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.state.current() == PlaybackState::Speaking
    }

    pub fn metrics(&self) -> PlaybackMetrics {
        self.inner.metrics.read().clone()
    }

    /// The user-facing message of the last fatal failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Fraction of the current session's characters already spoken; 1.0
    /// after natural completion.
    pub fn progress(&self) -> f32 {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(PlaybackSession::progress)
            .unwrap_or(0.0)
    }

    /// Snapshot of the live session's segments (empty when idle).
    pub fn segments(&self) -> Vec<Segment> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.segments.clone())
            .unwrap_or_default()
    }
}

/// Drive segments of session `generation` sequentially until end-of-text,
/// pause, supersession, or fatal dispatch failure. Segment N+1 never starts
/// before segment N's outcome is observed.
async fn drive(inner: Arc<ControllerInner>, generation: u64) {
    loop {
        let (segment, next_text, params) = {
            let mut guard = inner.session.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            if session.generation != generation {
                return;
            }
            if session.paused {
                session.needs_drive = true;
                return;
            }
            let next_text = session.segments.get(session.current + 1).map(|s| s.text.clone());
            match session.current_segment() {
                Some(segment) => (segment.clone(), next_text, session.params.clone()),
                None => break,
            }
        };

        let started = inner.clock.now();
        let result = speak_one(&inner, generation, &segment, next_text, &params).await;
        // Every estimator for this segment is now stale.
        inner.attempt_seq.fetch_add(1, Ordering::SeqCst);

        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!(target: "playback", "discarding stale outcome of session {}", generation);
            return;
        }

        match result {
            Ok(SegmentOutcome::Completed) => {
                inner.metrics.write().segments_spoken += 1;

                let elapsed = inner.clock.now().saturating_duration_since(started);
                let calibration = inner.calibration_store.load().unwrap_or_default();
                if let Some(updated) =
                    updated_calibration(calibration, segment.char_len(), elapsed, params.rate)
                {
                    inner.calibration_store.save(updated);
                }

                let mut guard = inner.session.lock();
                let Some(session) = guard.as_mut() else {
                    return;
                };
                if session.generation != generation {
                    return;
                }
                session.current += 1;
                if session.paused {
                    session.needs_drive = true;
                    return;
                }
            }
            Ok(SegmentOutcome::Canceled) => {
                // Intentional stop or pause of the live session; state was
                // already handled by whoever canceled.
                debug!(target: "playback", "segment canceled in session {}", generation);
                return;
            }
            Err(DispatchError::Exhausted { reasons }) => {
                fail_session(&inner, generation, reasons);
                return;
            }
        }
    }

    // Natural end of text. The session is kept (fully advanced) so progress
    // reads 1.0 until the next speak/stop.
    {
        let guard = inner.session.lock();
        match guard.as_ref() {
            Some(session) if session.generation == generation => {}
            _ => return,
        }
    }
    inner.resources.finish();
    let _ = inner.state.transition(PlaybackState::Idle);
    inner.metrics.write().completions += 1;
    info!(target: "playback", "session {} completed", generation);

    let callback = inner.on_complete.lock().clone();
    if let Some(callback) = callback {
        callback();
    }
}

/// Dispatch one segment, wiring either real boundary events or the
/// estimator into the position callback depending on the attempted backend.
async fn speak_one(
    inner: &Arc<ControllerInner>,
    generation: u64,
    segment: &Segment,
    next_text: Option<String>,
    params: &SpeechParams,
) -> Result<SegmentOutcome, DispatchError> {
    let on_position = inner.on_position.lock().clone();

    let word_callback: Option<WordCallback> = on_position.map(|callback| {
        let inner = inner.clone();
        let base = segment.offset;
        Arc::new(move |offset: usize| {
            if inner.generation.load(Ordering::SeqCst) == generation {
                callback(base + offset);
            }
        }) as WordCallback
    });

    let backends = inner.registry.backends().to_vec();
    let mut attempts = 0u32;
    let result = dispatch_segment(&backends, &segment.text, params, word_callback, |backend| {
        attempts += 1;
        if attempts > 1 {
            inner.metrics.write().fallbacks_taken += 1;
        }
        *inner.active_backend.lock() = Some(backend.clone());
        if backend.info().emits_word_boundaries {
            // Real events take priority; make sure no estimator competes.
            inner.attempt_seq.fetch_add(1, Ordering::SeqCst);
        } else {
            start_estimator(inner.clone(), generation, segment.clone(), params.rate);
        }
        // Warm the next segment while this one plays; data only, never
        // audible output.
        if let Some(next) = next_text.clone() {
            let backend = backend.clone();
            let params = params.clone();
            tokio::spawn(async move {
                backend.prefetch_segment(&next, &params).await;
            });
        }
    })
    .await;

    result.map(|r| r.outcome)
}

/// Spawn an estimator tick loop for one segment attempt. The loop dies when
/// the session is superseded or the attempt epoch moves on (segment done,
/// next attempt, pause, stop).
fn start_estimator(inner: Arc<ControllerInner>, generation: u64, segment: Segment, rate: f32) {
    let Some(on_position) = inner.on_position.lock().clone() else {
        return;
    };
    let calibration = inner.calibration_store.load().unwrap_or_default();
    let schedule = WordSchedule::build(&segment, calibration, rate);
    if schedule.is_empty() {
        return;
    }
    let attempt = inner.attempt_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let tick = Duration::from_millis(inner.config.tick_interval_ms.max(1));

    tokio::spawn(async move {
        let mut estimator = PositionEstimator::start(schedule, inner.clock.clone());
        loop {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if inner.attempt_seq.load(Ordering::SeqCst) != attempt {
                return;
            }
            if let Some(offset) = estimator.tick() {
                on_position(offset);
            }
            tokio::time::sleep(tick).await;
        }
    });
}

/// Fatal exhaustion: surface a descriptive, user-facing message and park the
/// controller in the error state. The completion callback is not invoked.
fn fail_session(inner: &Arc<ControllerInner>, generation: u64, reasons: String) {
    {
        let mut guard = inner.session.lock();
        match guard.as_ref() {
            Some(session) if session.generation == generation => *guard = None,
            _ => return,
        }
    }
    error!(target: "playback", "session {} failed: {}", generation, reasons);
    *inner.last_error.lock() = Some(reasons.clone());
    inner.metrics.write().fatal_errors += 1;
    inner.resources.finish();
    let _ = inner
        .state
        .transition(PlaybackState::Errored { message: reasons });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockBackendConfig};
    use novelvox_foundation::NoopResources;
    use std::sync::atomic::AtomicUsize;

    fn controller(backend: Arc<MockBackend>) -> PlaybackController {
        let mut registry = BackendRegistry::new();
        registry.register(backend);
        PlaybackController::new(registry, Arc::new(NoopResources))
    }

    #[tokio::test]
    async fn test_empty_text_completes_without_touching_backend() {
        let backend = Arc::new(MockBackend::new(MockBackendConfig::default()));
        let controller = controller(backend.clone());
        let fired = Arc::new(AtomicUsize::new(0));
        let counted = fired.clone();
        controller.set_on_complete(Arc::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        controller.speak("", SpeechParams::default()).await.unwrap();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(backend.spoken_texts().is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_controller_reports_no_progress_or_error() {
        let backend = Arc::new(MockBackend::new(MockBackendConfig::default()));
        let controller = controller(backend);
        assert_eq!(controller.progress(), 0.0);
        assert!(controller.last_error().is_none());
        assert!(!controller.is_speaking());
    }
}
