//! Speech-synthesis abstraction layer for NovelVox
//!
//! This crate provides the foundational types and traits for the playback
//! engine: the uniform backend contract, the text chunker, the word-position
//! estimator with its calibration model, and the error taxonomy shared by
//! every adapter.

pub mod backend;
pub mod chunk;
pub mod error;
pub mod timing;
pub mod types;

pub use backend::{BackendInfo, SegmentOutcome, SpeechBackend, WordCallback};
pub use chunk::{chunk, word_index, Segment, WordIndexEntry};
pub use error::{TtsError, TtsResult};
pub use timing::{
    updated_calibration, Calibration, CalibrationStore, FileCalibrationStore,
    MemoryCalibrationStore, PositionEstimator, WordSchedule,
};
pub use types::{normalize_voices, PlaybackConfig, SpeechParams, VoiceInfo, SYSTEM_DEFAULT_VOICE_ID};
