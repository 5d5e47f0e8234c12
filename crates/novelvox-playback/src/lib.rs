//! Playback engine for NovelVox
//!
//! Sequences segment playback across the available synthesis backends:
//! the dispatcher tries adapters in priority order and escalates failures,
//! the controller owns the session state machine, the generation-counter
//! invalidation of stale async work, and the device resource lifecycle.

pub mod controller;
pub mod dispatch;
pub mod mock;
pub mod session;

pub use controller::{
    CompletionCallback, PlaybackController, PlaybackError, PlaybackMetrics, PositionCallback,
};
pub use dispatch::{dispatch_segment, BackendRegistry, DispatchError, DispatchResult};
pub use session::PlaybackSession;
