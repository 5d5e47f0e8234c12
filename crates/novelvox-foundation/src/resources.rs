//! Device power and lifecycle resource coordination.
//!
//! Playback must survive screen-off and backgrounding, so the controller
//! holds a wake-lock and (where the platform requires one) a foreground
//! execution grant for exactly as long as a session is audible. Both grants
//! are process-wide singletons guarded by boolean held-flags: acquiring a
//! grant that is already held and releasing one that was never acquired are
//! both no-ops.

use crate::error::FoundationError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bridge to the platform's power/lifecycle facilities.
///
/// All methods are synchronous: grants are quick bookkeeping calls on every
/// platform this engine targets, and the audio warm-up *must* be synchronous
/// so it runs inside the user's tap (autoplay policy attributes audio starts
/// to the originating gesture).
pub trait PlatformResources: Send + Sync {
    fn acquire_wake_lock(&self) -> Result<(), FoundationError>;
    fn release_wake_lock(&self);

    /// Start the platform's foreground-execution grant (persistent
    /// notification on platforms that require one for background playback).
    fn enter_foreground(&self) -> Result<(), FoundationError>;
    fn exit_foreground(&self);

    /// Play a near-silent clip to unlock the audio output path.
    fn warm_up_audio(&self);
}

/// A bridge for hosts with no platform power integration (tests, desktop).
#[derive(Debug, Default)]
pub struct NoopResources;

impl PlatformResources for NoopResources {
    fn acquire_wake_lock(&self) -> Result<(), FoundationError> {
        Ok(())
    }
    fn release_wake_lock(&self) {}
    fn enter_foreground(&self) -> Result<(), FoundationError> {
        Ok(())
    }
    fn exit_foreground(&self) {}
    fn warm_up_audio(&self) {}
}

#[derive(Debug, Default)]
struct Held {
    wake_lock: bool,
    foreground: bool,
}

pub struct ResourceCoordinator {
    bridge: Arc<dyn PlatformResources>,
    held: Mutex<Held>,
    audio_unlocked: Mutex<bool>,
}

impl ResourceCoordinator {
    pub fn new(bridge: Arc<dyn PlatformResources>) -> Self {
        Self {
            bridge,
            held: Mutex::new(Held::default()),
            audio_unlocked: Mutex::new(false),
        }
    }

    /// Acquire the wake-lock, then the foreground grant. Idempotent.
    ///
    /// A wake-lock failure is surfaced; a foreground-grant failure is only
    /// logged, since playback can usually continue in the foreground without
    /// it.
    pub fn start(&self) -> Result<(), FoundationError> {
        let mut held = self.held.lock();
        if !held.wake_lock {
            self.bridge.acquire_wake_lock()?;
            held.wake_lock = true;
            debug!(target: "resources", "wake-lock acquired");
        }
        if !held.foreground {
            match self.bridge.enter_foreground() {
                Ok(()) => {
                    held.foreground = true;
                    debug!(target: "resources", "foreground grant acquired");
                }
                Err(e) => {
                    warn!(target: "resources", "foreground grant unavailable: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Release everything that is held. Safe to call at any time, including
    /// when nothing was acquired.
    pub fn finish(&self) {
        let mut held = self.held.lock();
        if held.foreground {
            self.bridge.exit_foreground();
            held.foreground = false;
            debug!(target: "resources", "foreground grant released");
        }
        if held.wake_lock {
            self.bridge.release_wake_lock();
            held.wake_lock = false;
            debug!(target: "resources", "wake-lock released");
        }
    }

    /// One-time audio output unlock, called synchronously from the user's
    /// tap before any asynchronous backend work. Subsequent calls are no-ops:
    /// once the output path is unlocked it stays unlocked for the process.
    pub fn warm_up_for_gesture(&self) {
        let mut unlocked = self.audio_unlocked.lock();
        if !*unlocked {
            self.bridge.warm_up_audio();
            *unlocked = true;
            debug!(target: "resources", "audio output path unlocked");
        }
    }

    pub fn is_holding_wake_lock(&self) -> bool {
        self.held.lock().wake_lock
    }
}

impl Drop for ResourceCoordinator {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBridge {
        acquires: AtomicUsize,
        releases: AtomicUsize,
        warm_ups: AtomicUsize,
    }

    impl PlatformResources for CountingBridge {
        fn acquire_wake_lock(&self) -> Result<(), FoundationError> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn release_wake_lock(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        fn enter_foreground(&self) -> Result<(), FoundationError> {
            Ok(())
        }
        fn exit_foreground(&self) {}
        fn warm_up_audio(&self) {
            self.warm_ups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_acquire_and_release_are_idempotent() {
        let bridge = Arc::new(CountingBridge::default());
        let coordinator = ResourceCoordinator::new(bridge.clone());

        coordinator.start().unwrap();
        coordinator.start().unwrap();
        assert_eq!(bridge.acquires.load(Ordering::SeqCst), 1);

        coordinator.finish();
        coordinator.finish();
        assert_eq!(bridge.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_without_acquire_is_noop() {
        let bridge = Arc::new(CountingBridge::default());
        let coordinator = ResourceCoordinator::new(bridge.clone());
        coordinator.finish();
        assert_eq!(bridge.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_warm_up_happens_once_per_process() {
        let bridge = Arc::new(CountingBridge::default());
        let coordinator = ResourceCoordinator::new(bridge.clone());
        coordinator.warm_up_for_gesture();
        coordinator.warm_up_for_gesture();
        assert_eq!(bridge.warm_ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_held_resources() {
        let bridge = Arc::new(CountingBridge::default());
        {
            let coordinator = ResourceCoordinator::new(bridge.clone());
            coordinator.start().unwrap();
        }
        assert_eq!(bridge.releases.load(Ordering::SeqCst), 1);
    }
}
