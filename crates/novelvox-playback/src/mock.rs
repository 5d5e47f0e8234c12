//! Scripted speech backend for tests
//!
//! Configurable the way real adapters fail: per-call scripted outcomes,
//! artificial speaking delay, and capability flags. Used by this crate's
//! dispatcher and scenario tests and available to downstream consumers.

use async_trait::async_trait;
use novelvox_tts::{
    BackendInfo, SegmentOutcome, SpeechBackend, SpeechParams, TtsError, TtsResult, VoiceInfo,
    WordCallback,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Outcome of one scripted `speak_segment` call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Complete,
    Cancel,
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct MockBackendConfig {
    pub id: &'static str,
    pub available: bool,
    pub max_segment_chars: usize,
    pub supports_pause: bool,
    pub emits_word_boundaries: bool,
    /// Simulated speaking time per segment
    pub delay: Duration,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            id: "mock",
            available: true,
            max_segment_chars: 4000,
            supports_pause: false,
            emits_word_boundaries: false,
            delay: Duration::ZERO,
        }
    }
}

pub struct MockBackend {
    config: MockBackendConfig,
    /// Outcomes consumed front-to-back; an exhausted script completes.
    script: Mutex<VecDeque<ScriptedOutcome>>,
    spoken: Mutex<Vec<String>>,
    prefetched: Mutex<Vec<String>>,
    stops: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl MockBackend {
    pub fn new(config: MockBackendConfig) -> Self {
        Self::with_script(config, Vec::new())
    }

    pub fn with_script(config: MockBackendConfig, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            config,
            script: Mutex::new(script.into()),
            spoken: Mutex::new(Vec::new()),
            prefetched: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    /// A backend whose every attempt fails with the given message.
    pub fn always_failing(id: &'static str, message: &str) -> Self {
        let message = message.to_string();
        let backend = Self::new(MockBackendConfig {
            id,
            ..Default::default()
        });
        *backend.script.lock() = std::iter::repeat_with(|| ScriptedOutcome::Fail(message.clone()))
            .take(64)
            .collect();
        backend
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn prefetched_texts(&self) -> Vec<String> {
        self.prefetched.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            id: self.config.id,
            name: "Mock backend",
            requires_network: false,
            max_segment_chars: self.config.max_segment_chars,
            supports_pause: self.config.supports_pause,
            emits_word_boundaries: self.config.emits_word_boundaries,
        }
    }

    async fn is_available(&self) -> bool {
        self.config.available
    }

    async fn speak_segment(
        &self,
        text: &str,
        _params: &SpeechParams,
        _on_word: Option<WordCallback>,
    ) -> TtsResult<SegmentOutcome> {
        self.spoken.lock().push(text.to_string());
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedOutcome::Complete);
        match outcome {
            ScriptedOutcome::Complete => Ok(SegmentOutcome::Completed),
            ScriptedOutcome::Cancel => Ok(SegmentOutcome::Canceled),
            ScriptedOutcome::Fail(message) => Err(TtsError::Synthesis(message)),
        }
    }

    async fn prefetch_segment(&self, text: &str, _params: &SpeechParams) {
        self.prefetched.lock().push(text.to_string());
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn pause(&self) -> TtsResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> TtsResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_voices(&self) -> TtsResult<Vec<VoiceInfo>> {
        Ok(novelvox_tts::normalize_voices(Vec::new()))
    }
}
