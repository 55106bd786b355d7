//! Microphone capture sessions
//!
//! A recording session gates on microphone permission, opens the capture
//! device and runs a countdown. Each session ends in exactly one terminal
//! outcome, and the microphone is released on every exit path.

pub mod capture;
pub mod session;

pub use capture::CpalMicrophone;
pub use session::RecordingSession;

use serde::{Deserialize, Serialize};
use std::future::Future;

/// A source of microphone audio
///
/// Dropping the stream returned by `open` must release the device.
pub trait CaptureDevice: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Ask for (or probe) permission to use the microphone
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    /// Acquire the microphone
    fn open(&self) -> impl Future<Output = Result<Self::Stream, RecordingError>> + Send;
}

/// Result of the one-time permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self == PermissionState::Granted
    }
}

impl From<bool> for PermissionState {
    fn from(granted: bool) -> Self {
        if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingOutcome {
    /// The user finished speaking before the countdown ran out
    Captured,
    /// The countdown reached zero
    TimedOut,
}

/// Events emitted by a running session, tagged with its id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingEvent {
    Tick { session: u64, seconds_remaining: u32 },
    Finished { session: u64, outcome: RecordingOutcome },
}

impl RecordingEvent {
    pub fn session(&self) -> u64 {
        match self {
            RecordingEvent::Tick { session, .. } | RecordingEvent::Finished { session, .. } => {
                *session
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordingError {
    #[error("Microphone permission was denied")]
    PermissionDenied,

    #[error("No recording is active")]
    NotActive,

    #[error("Microphone error: {0}")]
    Device(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_from_bool() {
        assert!(PermissionState::from(true).is_granted());
        assert!(!PermissionState::from(false).is_granted());
    }

    #[test]
    fn test_event_session() {
        let tick = RecordingEvent::Tick {
            session: 3,
            seconds_remaining: 4,
        };
        let done = RecordingEvent::Finished {
            session: 7,
            outcome: RecordingOutcome::TimedOut,
        };
        assert_eq!(tick.session(), 3);
        assert_eq!(done.session(), 7);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&RecordingOutcome::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
