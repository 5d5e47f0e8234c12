use crate::error::FoundationError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Playback state as seen by the hosting UI.
///
/// `Errored` carries the user-facing message produced when every backend
/// failed; it is a terminal state for the session but not for the controller,
/// which may start a fresh session from it.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Idle,
    Speaking,
    Paused,
    Errored { message: String },
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Speaking | PlaybackState::Paused)
    }
}

pub struct StateManager {
    state: Arc<RwLock<PlaybackState>>,
    state_tx: Sender<PlaybackState>,
    state_rx: Receiver<PlaybackState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(PlaybackState::Idle)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: PlaybackState) -> Result<(), FoundationError> {
        let mut current = self.state.write();

        // Validate state transitions
        let valid = matches!(
            (&*current, &new_state),
            (PlaybackState::Idle, PlaybackState::Speaking)
                | (PlaybackState::Idle, PlaybackState::Errored { .. })
                | (PlaybackState::Speaking, PlaybackState::Paused)
                | (PlaybackState::Speaking, PlaybackState::Idle)
                | (PlaybackState::Speaking, PlaybackState::Errored { .. })
                | (PlaybackState::Speaking, PlaybackState::Speaking)
                | (PlaybackState::Paused, PlaybackState::Speaking)
                | (PlaybackState::Paused, PlaybackState::Idle)
                | (PlaybackState::Paused, PlaybackState::Errored { .. })
                | (PlaybackState::Errored { .. }, PlaybackState::Speaking)
                | (PlaybackState::Errored { .. }, PlaybackState::Idle)
                | (PlaybackState::Errored { .. }, PlaybackState::Errored { .. })
        );

        if !valid {
            return Err(FoundationError::InvalidTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", new_state),
            });
        }

        tracing::debug!(target: "playback", "State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> PlaybackState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<PlaybackState> {
        self.state_rx.clone()
    }
}
