//! Scene orchestration
//!
//! Sequences narration playback, microphone prompts with a countdown, and the
//! fallback nudge-and-retry loop over a linear dialogue script.

pub mod controller;
pub mod state;

pub use controller::{SceneController, SceneExit, SceneHandle, SceneIntent, SceneNotification};
pub use state::{ScenePhase, SceneSnapshot, SceneStateMachine};

use crate::audio::AudioError;
use crate::recording::RecordingError;

/// Errors surfaced by the scene
///
/// None of these end a scene. A rejected intent leaves the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("Microphone permission was denied")]
    PermissionDenied,

    #[error("'{intent}' is not valid while {phase}")]
    InvalidTransition { intent: &'static str, phase: String },

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("Scene controller has shut down")]
    Closed,
}
