use thiserror::Error;

#[derive(Error, Debug)]
pub enum FoundationError {
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Platform resource failure: {0}")]
    Resource(String),
}
