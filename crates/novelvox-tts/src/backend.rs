//! The uniform per-segment backend contract

use crate::error::TtsResult;
use crate::types::{SpeechParams, VoiceInfo};
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked with the character offset (within the spoken segment) of
/// the word currently being voiced. Only adapters with real boundary events
/// call this; for the rest the controller runs the position estimator.
pub type WordCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// How a single segment attempt ended.
///
/// `Canceled` covers intentional stop and supersession by a newer session.
/// It is an expected, silent condition and must never be treated as a
/// dispatch failure; genuine failures are `Err(TtsError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    Completed,
    Canceled,
}

/// Static capabilities of a backend, queried once by the dispatcher.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Unique identifier ("native", "web", "cloud")
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Whether synthesis needs a network round-trip
    pub requires_network: bool,
    /// Largest segment this backend accepts in one request
    pub max_segment_chars: usize,
    /// Whether the backend supports true pause/resume mid-segment
    pub supports_pause: bool,
    /// Whether the backend emits real word-boundary events
    pub emits_word_boundaries: bool,
}

/// One interchangeable synthesis strategy.
///
/// Engine-specific quirks (language resolution, catalog waits, pre-fetch)
/// stay inside the adapter; the dispatcher's fallback loop only sees this
/// contract.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn info(&self) -> BackendInfo;

    /// Whether the backend is structurally usable on this platform right
    /// now. Unavailable backends are skipped by the dispatcher, not tried.
    async fn is_available(&self) -> bool;

    /// Speak one segment to completion, cancellation, or failure.
    async fn speak_segment(
        &self,
        text: &str,
        params: &SpeechParams,
        on_word: Option<WordCallback>,
    ) -> TtsResult<SegmentOutcome>;

    /// Prepare a segment's data ahead of playback without starting audible
    /// output. Default is a no-op; the cloud adapter caches fetched audio so
    /// segment transitions have no gap.
    async fn prefetch_segment(&self, _text: &str, _params: &SpeechParams) {}

    /// Best-effort stop of any in-flight synthesis. The in-flight
    /// `speak_segment` call resolves to `Canceled`.
    async fn stop(&self);

    /// True pause, where supported. Callers consult
    /// `info().supports_pause` first; the default refuses.
    async fn pause(&self) -> TtsResult<()> {
        Err(crate::error::TtsError::Unsupported("pause"))
    }

    async fn resume(&self) -> TtsResult<()> {
        Err(crate::error::TtsError::Unsupported("resume"))
    }

    /// The backend's normalized voice catalog.
    async fn list_voices(&self) -> TtsResult<Vec<VoiceInfo>>;
}
