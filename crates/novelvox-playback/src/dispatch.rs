//! Fallback dispatch across synthesis backends
//!
//! Backends are tried in registration order (native, then in-process, then
//! cloud). A structurally unavailable backend is skipped, not attempted; a
//! failed attempt escalates to the next backend; a canceled attempt
//! short-circuits the whole dispatch, because cancellation means the session
//! was stopped or superseded on purpose. Only when every backend has been
//! skipped or has failed does the dispatcher report exhaustion.

use novelvox_tts::{SegmentOutcome, SpeechBackend, SpeechParams, WordCallback};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every backend was skipped or failed; carries the per-backend reasons
    /// as the user-facing message.
    #[error("All speech backends failed: {reasons}")]
    Exhausted { reasons: String },
}

/// Which backend spoke the segment, and how the attempt ended.
pub struct DispatchResult {
    pub backend: Arc<dyn SpeechBackend>,
    pub outcome: SegmentOutcome,
}

impl std::fmt::Debug for DispatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchResult")
            .field("backend", &self.backend.info().id)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Ordered set of backends, registration order is priority order.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn SpeechBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn SpeechBackend>) {
        self.backends.push(backend);
    }

    pub fn backends(&self) -> &[Arc<dyn SpeechBackend>] {
        &self.backends
    }

    /// The highest-priority backend that is usable right now; its segment
    /// ceiling drives chunking for the session.
    pub async fn first_available(&self) -> Option<Arc<dyn SpeechBackend>> {
        for backend in &self.backends {
            if backend.is_available().await {
                return Some(backend.clone());
            }
        }
        None
    }

    /// Best-effort stop on every backend; in-flight segments resolve to
    /// `Canceled`.
    pub async fn stop_all(&self) {
        for backend in &self.backends {
            backend.stop().await;
        }
    }
}

/// Try one segment against the backends in order.
///
/// `on_attempt` fires just before each attempt so the caller can track the
/// active backend and start or cancel its position estimator.
pub async fn dispatch_segment(
    backends: &[Arc<dyn SpeechBackend>],
    text: &str,
    params: &SpeechParams,
    on_word: Option<WordCallback>,
    mut on_attempt: impl FnMut(&Arc<dyn SpeechBackend>) + Send,
) -> Result<DispatchResult, DispatchError> {
    let segment_chars = text.chars().count();
    let mut reasons: Vec<String> = Vec::new();

    for backend in backends {
        let info = backend.info();
        if !backend.is_available().await {
            debug!(target: "playback", "backend '{}' unavailable, skipping", info.id);
            continue;
        }
        // A segment chunked for a larger backend can exceed a fallback's
        // request ceiling; such a backend cannot take this segment at all.
        if segment_chars > info.max_segment_chars {
            debug!(
                target: "playback",
                "segment of {} chars exceeds '{}' ceiling of {}, skipping",
                segment_chars, info.id, info.max_segment_chars
            );
            continue;
        }

        on_attempt(backend);
        match backend.speak_segment(text, params, on_word.clone()).await {
            Ok(outcome) => {
                return Ok(DispatchResult {
                    backend: backend.clone(),
                    outcome,
                })
            }
            Err(e) => {
                warn!(target: "playback", "backend '{}' failed, escalating: {}", info.id, e);
                reasons.push(format!("{}: {}", info.id, e));
            }
        }
    }

    let reasons = if reasons.is_empty() {
        "no usable speech backend on this platform".to_string()
    } else {
        reasons.join("; ")
    };
    Err(DispatchError::Exhausted { reasons })
}
