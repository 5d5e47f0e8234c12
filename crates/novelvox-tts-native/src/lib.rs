//! Native device synthesis adapter for NovelVox
//!
//! Delegates to the platform's on-device synthesis service through the
//! [`NativeSynthBridge`] trait. The adapter owns the platform quirks:
//! resolving the requested language to one the device actually speaks,
//! resolving voices by stable id (never by list position), prompting for
//! engine installation at most once per process, and bounding every call
//! with a timeout so a hung engine cannot hang the session.

use async_trait::async_trait;
use novelvox_tts::{
    normalize_voices, BackendInfo, SegmentOutcome, SpeechBackend, SpeechParams, TtsError,
    TtsResult, VoiceInfo, WordCallback, SYSTEM_DEFAULT_VOICE_ID,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

mod tests;

/// Request ceiling of the platform synthesis service, minus headroom.
const NATIVE_MAX_SEGMENT_CHARS: usize = 3900;

/// Bound on the language-relaxation ladder; prevents infinite retry loops.
const MAX_LANGUAGE_ATTEMPTS: usize = 5;

const DEFAULT_SEGMENT_TIMEOUT: Duration = Duration::from_secs(15);

/// The install prompt fires at most once per process, no matter how many
/// segments fail on a device without an engine.
static INSTALL_PROMPT_SHOWN: AtomicBool = AtomicBool::new(false);

/// Bridge to the platform's on-device synthesis service.
#[async_trait]
pub trait NativeSynthBridge: Send + Sync {
    /// Whether a synthesis engine is installed at all.
    async fn engine_installed(&self) -> bool;

    /// Open the platform's engine installation/configuration flow.
    async fn prompt_engine_install(&self);

    /// Platform language-support check for one tag.
    async fn is_language_available(&self, tag: &str) -> bool;

    /// The device's configured locale tag.
    fn device_locale(&self) -> String;

    /// Raw platform voice catalog.
    async fn voices(&self) -> Vec<VoiceInfo>;

    /// Speak one segment to completion or cancellation. The platform error
    /// for an unsupported language must map to
    /// `TtsError::LanguageNotSupported` so the adapter can relax and retry.
    async fn speak(
        &self,
        text: &str,
        voice_id: Option<&str>,
        language: &str,
        rate: f32,
        pitch: f32,
    ) -> TtsResult<SegmentOutcome>;

    /// Best-effort stop of the in-flight request.
    async fn stop(&self);
}

pub struct NativeBackend {
    bridge: Arc<dyn NativeSynthBridge>,
    timeout: Duration,
}

impl NativeBackend {
    pub fn new(bridge: Arc<dyn NativeSynthBridge>) -> Self {
        Self {
            bridge,
            timeout: DEFAULT_SEGMENT_TIMEOUT,
        }
    }

    pub fn with_timeout(bridge: Arc<dyn NativeSynthBridge>, timeout: Duration) -> Self {
        Self { bridge, timeout }
    }

    /// Candidate languages in relaxation order: exact tag, base language,
    /// device locale, then the hard-coded last resorts.
    fn language_ladder(&self, requested: Option<&str>) -> Vec<String> {
        let mut ladder = Vec::new();
        if let Some(tag) = requested {
            if !tag.is_empty() {
                ladder.push(tag.to_string());
                if let Some(base) = tag.split(['-', '_']).next() {
                    ladder.push(base.to_string());
                }
            }
        }
        ladder.push(self.bridge.device_locale());
        ladder.push("en-US".to_string());
        ladder.push("en".to_string());

        let mut seen = Vec::new();
        ladder.retain(|tag| {
            let new = !tag.is_empty() && !seen.contains(tag);
            if new {
                seen.push(tag.clone());
            }
            new
        });
        ladder.truncate(MAX_LANGUAGE_ATTEMPTS);
        ladder
    }

    /// Resolve the requested voice to a known id. Matching is by the stable
    /// identifier string only; an unknown id falls back to the engine
    /// default rather than failing the segment.
    async fn resolve_voice(&self, requested: Option<&str>) -> Option<String> {
        let id = requested?;
        if id == SYSTEM_DEFAULT_VOICE_ID {
            return None;
        }
        let catalog = self.bridge.voices().await;
        if catalog.iter().any(|v| v.id == id) {
            Some(id.to_string())
        } else {
            warn!(target: "tts", "voice '{}' not in native catalog, using engine default", id);
            None
        }
    }
}

#[async_trait]
impl SpeechBackend for NativeBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            id: "native",
            name: "Native device engine",
            requires_network: false,
            max_segment_chars: NATIVE_MAX_SEGMENT_CHARS,
            supports_pause: false,
            emits_word_boundaries: false,
        }
    }

    async fn is_available(&self) -> bool {
        self.bridge.engine_installed().await
    }

    async fn speak_segment(
        &self,
        text: &str,
        params: &SpeechParams,
        _on_word: Option<WordCallback>,
    ) -> TtsResult<SegmentOutcome> {
        if text.trim().is_empty() {
            return Err(TtsError::InvalidInput("empty segment".to_string()));
        }

        if !self.bridge.engine_installed().await {
            if !INSTALL_PROMPT_SHOWN.swap(true, Ordering::SeqCst) {
                warn!(target: "tts", "no native speech engine installed, prompting once");
                self.bridge.prompt_engine_install().await;
            }
            return Err(TtsError::EngineNotInstalled(
                "no speech engine installed on this device".to_string(),
            ));
        }

        let voice_id = self.resolve_voice(params.voice_id.as_deref()).await;
        let ladder = self.language_ladder(params.language.as_deref());
        let mut attempted = 0;

        for (i, language) in ladder.iter().enumerate() {
            // The platform support check prunes the ladder, but the final
            // rung is attempted regardless: the check itself lies on some
            // devices.
            let last_rung = i + 1 == ladder.len();
            if !last_rung && !self.bridge.is_language_available(language).await {
                debug!(target: "tts", "language '{}' unavailable, relaxing", language);
                continue;
            }

            attempted += 1;
            let attempt = self.bridge.speak(
                text,
                voice_id.as_deref(),
                language,
                params.rate,
                params.pitch,
            );
            match tokio::time::timeout(self.timeout, attempt).await {
                Err(_) => {
                    warn!(target: "tts", "native synthesis timed out after {:?}", self.timeout);
                    self.bridge.stop().await;
                    return Err(TtsError::Timeout(self.timeout));
                }
                Ok(Err(TtsError::LanguageNotSupported(tag))) => {
                    debug!(target: "tts", "engine rejected language '{}', relaxing", tag);
                    continue;
                }
                Ok(result) => return result,
            }
        }

        debug!(target: "tts", "language ladder exhausted after {} attempts", attempted);
        Err(TtsError::LanguageNotSupported(
            params.language.clone().unwrap_or_else(|| "device locale".to_string()),
        ))
    }

    async fn stop(&self) {
        self.bridge.stop().await;
    }

    async fn list_voices(&self) -> TtsResult<Vec<VoiceInfo>> {
        Ok(normalize_voices(self.bridge.voices().await))
    }
}
