//! In-process browser-engine synthesis adapter for NovelVox
//!
//! Wraps the client runtime's built-in synthesis facility. Its two quirks
//! live here: the voice catalog loads asynchronously (first use must wait
//! for it, with an upper bound), and the engine reports an "interrupted"
//! signal when a newer session cancels the current utterance, which is an
//! expected silent condition rather than an error.

use async_trait::async_trait;
use novelvox_tts::{
    normalize_voices, BackendInfo, SegmentOutcome, SpeechBackend, SpeechParams, TtsError,
    TtsResult, VoiceInfo, WordCallback, SYSTEM_DEFAULT_VOICE_ID,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};


/// Browser engines choke on long utterances; keep requests small.
const WEB_MAX_SEGMENT_CHARS: usize = 180;

/// Upper bound on waiting for the voice catalog to populate. After this the
/// adapter proceeds anyway and lets the engine pick its default voice.
const VOICE_CATALOG_WAIT: Duration = Duration::from_millis(1500);

/// Terminal signal of one in-process utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSpeakSignal {
    /// The utterance played to its end
    Ended,
    /// The utterance was cut short by cancel/stop (not an error)
    Interrupted,
    /// A genuine engine error
    Error(String),
}

/// Bridge to the runtime's built-in synthesis facility.
#[async_trait]
pub trait WebSpeechBridge: Send + Sync {
    /// Whether the runtime has a synthesis facility at all. When false the
    /// backend is structurally unavailable and the dispatcher skips it.
    fn is_supported(&self) -> bool;

    /// Current voice catalog; may be empty until the engine has loaded it.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Receiver bumped whenever the engine announces a catalog change.
    fn voices_changed(&self) -> watch::Receiver<u64>;

    /// Speak one utterance to a terminal signal. Real word-boundary events
    /// are forwarded through `on_word` with the character offset of each
    /// word as it is voiced.
    async fn speak(
        &self,
        text: &str,
        voice_id: Option<&str>,
        rate: f32,
        pitch: f32,
        on_word: Option<WordCallback>,
    ) -> TtsResult<WebSpeakSignal>;

    fn pause(&self);
    fn resume(&self);
    fn cancel(&self);
}

pub struct WebBackend {
    bridge: Arc<dyn WebSpeechBridge>,
    catalog_wait: Duration,
}

impl WebBackend {
    pub fn new(bridge: Arc<dyn WebSpeechBridge>) -> Self {
        Self {
            bridge,
            catalog_wait: VOICE_CATALOG_WAIT,
        }
    }

    pub fn with_catalog_wait(bridge: Arc<dyn WebSpeechBridge>, catalog_wait: Duration) -> Self {
        Self {
            bridge,
            catalog_wait,
        }
    }

    /// Wait for the voice catalog to be non-empty: return as soon as a
    /// voices-changed signal delivers voices, or after the wait bound.
    async fn wait_for_voice_catalog(&self) {
        if !self.bridge.voices().is_empty() {
            return;
        }
        let mut rx = self.bridge.voices_changed();
        let populated = tokio::time::timeout(self.catalog_wait, async {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                if !self.bridge.voices().is_empty() {
                    break;
                }
            }
        })
        .await;
        if populated.is_err() {
            debug!(
                target: "tts",
                "voice catalog still empty after {:?}, proceeding with engine default",
                self.catalog_wait
            );
        }
    }

    fn resolve_voice(&self, requested: Option<&str>) -> Option<String> {
        let id = requested?;
        if id == SYSTEM_DEFAULT_VOICE_ID {
            return None;
        }
        if self.bridge.voices().iter().any(|v| v.id == id) {
            Some(id.to_string())
        } else {
            warn!(target: "tts", "voice '{}' not in catalog, using engine default", id);
            None
        }
    }
}

#[async_trait]
impl SpeechBackend for WebBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            id: "web",
            name: "In-process engine",
            requires_network: false,
            max_segment_chars: WEB_MAX_SEGMENT_CHARS,
            supports_pause: true,
            emits_word_boundaries: true,
        }
    }

    async fn is_available(&self) -> bool {
        self.bridge.is_supported()
    }

    async fn speak_segment(
        &self,
        text: &str,
        params: &SpeechParams,
        on_word: Option<WordCallback>,
    ) -> TtsResult<SegmentOutcome> {
        if text.trim().is_empty() {
            return Err(TtsError::InvalidInput("empty segment".to_string()));
        }

        self.wait_for_voice_catalog().await;
        let voice_id = self.resolve_voice(params.voice_id.as_deref());

        let signal = self
            .bridge
            .speak(text, voice_id.as_deref(), params.rate, params.pitch, on_word)
            .await?;
        match signal {
            WebSpeakSignal::Ended => Ok(SegmentOutcome::Completed),
            WebSpeakSignal::Interrupted => {
                debug!(target: "tts", "utterance interrupted (expected when superseded)");
                Ok(SegmentOutcome::Canceled)
            }
            WebSpeakSignal::Error(message) => Err(TtsError::Synthesis(message)),
        }
    }

    async fn stop(&self) {
        self.bridge.cancel();
    }

    async fn pause(&self) -> TtsResult<()> {
        self.bridge.pause();
        Ok(())
    }

    async fn resume(&self) -> TtsResult<()> {
        self.bridge.resume();
        Ok(())
    }

    async fn list_voices(&self) -> TtsResult<Vec<VoiceInfo>> {
        self.wait_for_voice_catalog().await;
        Ok(normalize_voices(self.bridge.voices()))
    }
}
