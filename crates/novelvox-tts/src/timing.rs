//! Word-position estimation and speech-rate calibration
//!
//! Two of the three backends give no timing signal while a segment plays.
//! The estimator interpolates the currently-spoken word from a calibrated
//! characters-per-second model: each word's character offset maps to a time
//! fraction of the segment's estimated duration, and a periodic tick reports
//! the latest word whose fraction has passed. Observed segment durations
//! feed back into the calibration by exponential smoothing.

use crate::chunk::{word_index, Segment};
use novelvox_foundation::clock::SharedClock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rate changes do not translate 1:1 into speed changes on real engines;
/// this sub-linear exponent approximates the observed behavior.
pub const RATE_EXPONENT: f32 = 0.85;

/// Weight of a fresh measurement in the exponential blend. Gentle
/// adaptation, resistant to one-off outliers.
const CALIBRATION_BLEND: f32 = 0.3;

/// Starting chars/second before any measurement exists.
pub const DEFAULT_CHARS_PER_SECOND: f32 = 15.0;

/// Segments that finish faster than this were not actually spoken
/// (engine start latency dominates); their duration is unmeasurable.
const MIN_MEASURABLE_ELAPSED: Duration = Duration::from_millis(500);

const SANE_CPS_MIN: f32 = 1.0;
const SANE_CPS_MAX: f32 = 80.0;

/// The persisted speech-rate model: a chars-per-second figure and the
/// playback rate it was measured at. Process-wide and deliberately not
/// partitioned by voice or language.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Calibration {
    pub chars_per_second: f32,
    pub rate: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            chars_per_second: DEFAULT_CHARS_PER_SECOND,
            rate: 1.0,
        }
    }
}

impl Calibration {
    /// Chars/second expected at `rate`, scaling the stored figure by a
    /// sub-linear power law on the rate ratio.
    pub fn effective_cps(&self, rate: f32) -> f32 {
        if self.rate <= 0.0 || rate <= 0.0 {
            return self.chars_per_second;
        }
        self.chars_per_second * (rate / self.rate).powf(RATE_EXPONENT)
    }
}

/// External persistence for the calibration pair: two float values under two
/// independent keys, no schema versioning (the values are self-correcting).
pub trait CalibrationStore: Send + Sync {
    fn load(&self) -> Option<Calibration>;
    fn save(&self, calibration: Calibration);
}

/// In-memory store for tests and hosts without persistence.
#[derive(Default)]
pub struct MemoryCalibrationStore {
    inner: parking_lot::Mutex<Option<Calibration>>,
}

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&self) -> Option<Calibration> {
        *self.inner.lock()
    }

    fn save(&self, calibration: Calibration) {
        *self.inner.lock() = Some(calibration);
    }
}

/// File-backed store: the calibration pair as a small JSON document.
///
/// Load and save failures degrade to the in-memory defaults; a corrupt or
/// missing file is never fatal because the values are self-correcting.
pub struct FileCalibrationStore {
    path: std::path::PathBuf,
}

impl FileCalibrationStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn load(&self) -> Option<Calibration> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save(&self, calibration: Calibration) {
        match serde_json::to_string(&calibration) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    debug!(target: "timing", "calibration save failed: {}", e);
                }
            }
            Err(e) => {
                debug!(target: "timing", "calibration serialize failed: {}", e);
            }
        }
    }
}

/// Blend a finished segment's measured duration into the calibration.
///
/// Returns `None` when the measurement is implausible: suspiciously short
/// elapsed time or a resulting rate outside sane speech bounds.
pub fn updated_calibration(
    current: Calibration,
    segment_chars: usize,
    elapsed: Duration,
    rate: f32,
) -> Option<Calibration> {
    if segment_chars == 0 || elapsed < MIN_MEASURABLE_ELAPSED {
        return None;
    }
    let actual_cps = segment_chars as f32 / elapsed.as_secs_f32();
    if !(SANE_CPS_MIN..=SANE_CPS_MAX).contains(&actual_cps) {
        return None;
    }

    let blended =
        CALIBRATION_BLEND * actual_cps + (1.0 - CALIBRATION_BLEND) * current.effective_cps(rate);
    debug!(
        target: "timing",
        "calibration update: measured {:.1} cps at rate {:.2}, blended to {:.1}",
        actual_cps, rate, blended
    );
    Some(Calibration {
        chars_per_second: blended,
        rate,
    })
}

/// Precomputed timing plan for one segment: each word's utterance-global
/// character offset paired with the fraction of the segment's estimated
/// duration at which it should light up.
#[derive(Debug, Clone)]
pub struct WordSchedule {
    entries: Vec<(usize, f32)>,
    duration: Duration,
}

impl WordSchedule {
    pub fn build(segment: &Segment, calibration: Calibration, rate: f32) -> Self {
        let char_len = segment.char_len();
        let entries = word_index(&segment.text)
            .into_iter()
            .map(|entry| {
                let fraction = if char_len == 0 {
                    0.0
                } else {
                    entry.offset as f32 / char_len as f32
                };
                (segment.offset + entry.offset, fraction)
            })
            .collect();

        let cps = calibration.effective_cps(rate).max(SANE_CPS_MIN);
        let duration = Duration::from_secs_f32(char_len as f32 / cps);
        Self { entries, duration }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Steps through a `WordSchedule` against a clock, emitting each word's
/// global offset at most once and never moving backward.
///
/// The owner must stop ticking when the segment ends, the session pauses or
/// is superseded, or the backend turns out to emit real boundary events
/// (real events always win; two signals must not fight over the highlight).
pub struct PositionEstimator {
    schedule: WordSchedule,
    clock: SharedClock,
    started: Instant,
    last_index: Option<usize>,
}

impl PositionEstimator {
    pub fn start(schedule: WordSchedule, clock: SharedClock) -> Self {
        let started = clock.now();
        Self {
            schedule,
            clock,
            started,
            last_index: None,
        }
    }

    /// The global offset of the newly-reached word, if the highlight moved
    /// since the previous tick.
    pub fn tick(&mut self) -> Option<usize> {
        if self.schedule.is_empty() {
            return None;
        }

        let elapsed = self.clock.now().saturating_duration_since(self.started);
        let fraction = if self.schedule.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.schedule.duration.as_secs_f32()).min(1.0)
        };

        // Last word whose fraction has passed; clamped to the final word so
        // the highlight holds there until the segment ends.
        let mut index = 0;
        for (i, (_, word_fraction)) in self.schedule.entries.iter().enumerate() {
            if *word_fraction <= fraction {
                index = i;
            } else {
                break;
            }
        }

        match self.last_index {
            Some(previous) if index <= previous => None,
            _ => {
                self.last_index = Some(index);
                Some(self.schedule.entries[index].0)
            }
        }
    }
}
