//! Error types for speech synthesis

use std::time::Duration;
use thiserror::Error;

/// Errors an adapter can report for a single segment attempt.
///
/// Intentional cancellation is *not* represented here: a stopped or
/// superseded segment resolves to `SegmentOutcome::Canceled`, never to an
/// error, so the dispatcher cannot mistake it for a backend failure.
#[derive(Error, Debug)]
pub enum TtsError {
    /// No synthesis engine is installed on the device
    #[error("Speech engine not installed: {0}")]
    EngineNotInstalled(String),

    /// The requested language is not supported, even after relaxation
    #[error("Language not supported: {0}")]
    LanguageNotSupported(String),

    /// Requested voice id does not resolve to any known voice
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// The adapter call exceeded its bound; the session must not hang
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),

    /// The engine accepted the request but failed to produce speech
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Network failure talking to the cloud endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid segment input (empty text, over the request limit)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation the backend does not implement (e.g. pause on native)
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Result type for synthesis operations
pub type TtsResult<T> = Result<T, TtsError>;
