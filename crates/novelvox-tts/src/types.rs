//! Core types for the speech-playback engine

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Stable id of the synthetic "system default" voice entry.
pub const SYSTEM_DEFAULT_VOICE_ID: &str = "system-default";

/// A normalized voice descriptor.
///
/// `id` is the stable identifier used to resolve the voice inside an
/// adapter; selection by list position is forbidden because real voice
/// catalogs reorder between loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Unique voice identifier, stable across catalog reloads
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Language tag (e.g. "en-US", "ja")
    pub language: String,
    /// Whether synthesis runs on-device (no network round-trip)
    pub is_on_device: bool,
}

impl VoiceInfo {
    /// The synthetic entry that keeps the selection UI non-empty before any
    /// real catalog has loaded.
    pub fn system_default() -> Self {
        Self {
            id: SYSTEM_DEFAULT_VOICE_ID.to_string(),
            name: "System default".to_string(),
            language: String::new(),
            is_on_device: true,
        }
    }
}

/// Per-request synthesis preferences supplied by the hosting UI.
#[derive(Debug, Clone)]
pub struct SpeechParams {
    /// Requested voice id; `None` means the engine default
    pub voice_id: Option<String>,
    /// Requested language tag; `None` means the device locale
    pub language: Option<String>,
    /// Playback rate multiplier (1.0 is normal)
    pub rate: f32,
    /// Voice pitch multiplier (1.0 is normal)
    pub pitch: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            voice_id: None,
            language: None,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Segment size ceiling override; `None` uses the active backend's limit
    pub max_segment_chars: Option<usize>,
    /// Interval between estimator position ticks
    pub tick_interval_ms: u64,
    /// Bound on a single native-adapter synthesis call
    pub segment_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_segment_chars: None,
            tick_interval_ms: 50,
            segment_timeout_secs: 15,
        }
    }
}

/// Normalize a raw voice catalog for presentation and stable selection.
///
/// Guarantees: every entry has a non-empty name, display names are unique
/// (duplicates are suffixed with their language tag), ordering is
/// deterministic (language, then name), and the synthetic system-default
/// entry is always first so the selection UI is never empty.
pub fn normalize_voices(raw: Vec<VoiceInfo>) -> Vec<VoiceInfo> {
    let mut voices: Vec<VoiceInfo> = raw
        .into_iter()
        .filter(|v| !v.id.is_empty())
        .map(|mut v| {
            if v.name.trim().is_empty() {
                v.name = v.id.clone();
            }
            v
        })
        .collect();

    voices.sort_by(|a, b| (a.language.as_str(), a.name.as_str()).cmp(&(b.language.as_str(), b.name.as_str())));

    // Ids can recur apart after sorting, so adjacency-based dedup is not
    // enough; keep the first occurrence of each id in sort order.
    let mut seen_ids = HashSet::new();
    voices.retain(|v| seen_ids.insert(v.id.clone()));

    // Disambiguate duplicated display names with the language tag. The
    // duplicate set is computed before any renaming so every member of a
    // duplicated name gets the suffix, not just the later ones.
    let mut name_counts: HashMap<String, usize> = HashMap::new();
    for v in &voices {
        *name_counts.entry(v.name.clone()).or_insert(0) += 1;
    }
    for v in &mut voices {
        let duplicated = name_counts.get(&v.name).copied().unwrap_or(0) > 1;
        if duplicated && !v.language.is_empty() {
            v.name = format!("{} ({})", v.name, v.language);
        }
    }

    let mut out = Vec::with_capacity(voices.len() + 1);
    out.push(VoiceInfo::system_default());
    out.extend(voices.into_iter().filter(|v| v.id != SYSTEM_DEFAULT_VOICE_ID));
    out
}
