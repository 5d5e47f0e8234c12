//! Remote cloud synthesis adapter for NovelVox
//!
//! Sends segment text to a remote synthesis endpoint (opaque text-in /
//! MP3-bytes-out contract, at most 5000 characters per request) and plays
//! the returned audio through an [`AudioSink`] bridge. While segment *N*
//! plays, segment *N+1*'s audio may be pre-fetched into a bounded cache so
//! there is no audible gap between segments; pre-fetch never starts audible
//! playback early.

use async_trait::async_trait;
use novelvox_tts::{
    normalize_voices, BackendInfo, SegmentOutcome, SpeechBackend, SpeechParams, TtsError,
    TtsResult, VoiceInfo, WordCallback,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

mod tests;

/// Hard input limit of the synthesis endpoint.
pub const CLOUD_MAX_REQUEST_CHARS: usize = 5000;

/// Segment ceiling handed to the chunker; leaves headroom under the
/// endpoint's request limit.
const CLOUD_MAX_SEGMENT_CHARS: usize = 4500;

/// Cached pre-fetched responses; oldest evicted first.
const PREFETCH_CAPACITY: usize = 4;

/// One round-trip to the synthesis endpoint.
#[async_trait]
pub trait SynthFetch: Send + Sync {
    async fn fetch(&self, text: &str, params: &SpeechParams) -> TtsResult<Vec<u8>>;
}

/// Plays MP3 bytes on the already-unlocked audio output path. The unlock
/// itself (the near-silent warm-up clip) is the resource coordinator's job
/// and happens inside the originating user gesture.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> TtsResult<SegmentOutcome>;
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
}

/// `reqwest`-backed fetcher for the synthesis endpoint.
pub struct HttpSynthFetch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthFetch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SynthFetch for HttpSynthFetch {
    async fn fetch(&self, text: &str, params: &SpeechParams) -> TtsResult<Vec<u8>> {
        let mut query: Vec<(&str, String)> = vec![
            ("rate", params.rate.to_string()),
            ("pitch", params.pitch.to_string()),
        ];
        if let Some(voice) = &params.voice_id {
            query.push(("voice", voice.clone()));
        }
        if let Some(language) = &params.language {
            query.push(("lang", language.clone()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(text.to_string())
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TtsError::Synthesis(format!(
                "synthesis endpoint returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Default)]
struct PrefetchCache {
    entries: VecDeque<(String, Vec<u8>)>,
}

impl PrefetchCache {
    fn contains(&self, text: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == text)
    }

    fn take(&mut self, text: &str) -> Option<Vec<u8>> {
        let index = self.entries.iter().position(|(t, _)| t == text)?;
        self.entries.remove(index).map(|(_, audio)| audio)
    }

    fn put(&mut self, text: String, audio: Vec<u8>) {
        if self.entries.iter().any(|(t, _)| *t == text) {
            return;
        }
        while self.entries.len() >= PREFETCH_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((text, audio));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct CloudBackend {
    fetch: Arc<dyn SynthFetch>,
    sink: Arc<dyn AudioSink>,
    cache: Mutex<PrefetchCache>,
    voices: Vec<VoiceInfo>,
}

impl CloudBackend {
    pub fn new(fetch: Arc<dyn SynthFetch>, sink: Arc<dyn AudioSink>) -> Self {
        Self::with_voices(fetch, sink, Vec::new())
    }

    /// The cloud voice catalog is static configuration, not a runtime query.
    pub fn with_voices(
        fetch: Arc<dyn SynthFetch>,
        sink: Arc<dyn AudioSink>,
        voices: Vec<VoiceInfo>,
    ) -> Self {
        Self {
            fetch,
            sink,
            cache: Mutex::new(PrefetchCache::default()),
            voices,
        }
    }

    /// Fetch a segment's audio ahead of playback. Failures are silent: the
    /// playback path re-fetches on demand and reports errors properly.
    pub async fn prefetch(&self, text: &str, params: &SpeechParams) {
        if text.chars().count() > CLOUD_MAX_REQUEST_CHARS {
            return;
        }
        if self.cache.lock().contains(text) {
            return;
        }
        match self.fetch.fetch(text, params).await {
            Ok(audio) => {
                debug!(target: "tts", "prefetched {} bytes for upcoming segment", audio.len());
                self.cache.lock().put(text.to_string(), audio);
            }
            Err(e) => {
                debug!(target: "tts", "prefetch failed (will fetch on demand): {}", e);
            }
        }
    }

    #[cfg(test)]
    fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl SpeechBackend for CloudBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            id: "cloud",
            name: "Cloud synthesis",
            requires_network: true,
            max_segment_chars: CLOUD_MAX_SEGMENT_CHARS,
            supports_pause: true,
            emits_word_boundaries: false,
        }
    }

    async fn is_available(&self) -> bool {
        // Structurally always present; network failures surface per segment
        // and escalate through the dispatcher.
        true
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
        if text.chars().count() > CLOUD_MAX_REQUEST_CHARS {
            return Err(TtsError::InvalidInput(format!(
                "segment exceeds the {CLOUD_MAX_REQUEST_CHARS}-character request limit"
            )));
        }

        // Drop the cache guard before any await.
        let cached = self.cache.lock().take(text);
        let audio = match cached {
            Some(audio) => audio,
            None => match self.fetch.fetch(text, params).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(target: "tts", "cloud synthesis fetch failed: {}", e);
                    return Err(e);
                }
            },
        };

        self.sink.play(audio).await
    }

    async fn prefetch_segment(&self, text: &str, params: &SpeechParams) {
        self.prefetch(text, params).await;
    }

    async fn stop(&self) {
        self.sink.stop();
    }

    async fn pause(&self) -> TtsResult<()> {
        self.sink.pause();
        Ok(())
    }

    async fn resume(&self) -> TtsResult<()> {
        self.sink.resume();
        Ok(())
    }

    async fn list_voices(&self) -> TtsResult<Vec<VoiceInfo>> {
        Ok(normalize_voices(self.voices.clone()))
    }
}
