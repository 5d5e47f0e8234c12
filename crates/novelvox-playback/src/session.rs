//! One `speak`/`speak_from_index` invocation

use novelvox_tts::{Segment, SpeechParams};

/// State owned by a single playback session.
///
/// Exactly one session may be live at a time. A session is identified by its
/// generation id; a newer generation supersedes it immediately, even while
/// backend calls it issued are still in flight.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub generation: u64,
    pub segments: Vec<Segment>,
    /// Index of the segment currently playing (or next to play)
    pub current: usize,
    pub params: SpeechParams,
    pub paused: bool,
    /// Set when the driving task ended while paused; `resume` must spawn a
    /// fresh one instead of resuming the backend
    pub needs_drive: bool,
    total_chars: usize,
}

impl PlaybackSession {
    pub fn new(generation: u64, segments: Vec<Segment>, params: SpeechParams) -> Self {
        let total_chars = segments.iter().map(Segment::char_len).sum();
        Self {
            generation,
            segments,
            current: 0,
            params,
            paused: false,
            needs_drive: false,
            total_chars,
        }
    }

    pub fn current_segment(&self) -> Option<&Segment> {
        self.segments.get(self.current)
    }

    /// Fraction of the utterance's characters whose segments have finished.
    pub fn progress(&self) -> f32 {
        if self.total_chars == 0 || self.current >= self.segments.len() {
            return 1.0;
        }
        let done: usize = self.segments[..self.current]
            .iter()
            .map(Segment::char_len)
            .sum();
        done as f32 / self.total_chars as f32
    }
}
