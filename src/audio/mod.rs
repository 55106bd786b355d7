//! Audio subsystem for Reflex
//!
//! Narration playback: fetching clips by URI, decoding them, resampling to the
//! output device and playing them with last-request-wins semantics.

pub mod decode;
pub mod device;
pub mod format;
pub mod output;
pub mod player;
pub mod preload;
pub mod source;

pub use output::{AudioOutput, CpalOutput};
pub use player::{AudioPlaybackState, AudioPlayer, PlaybackStatus};
pub use preload::{preload_clips, PreloadReport};
pub use source::SourceFetcher;

use std::sync::Arc;
use std::time::Duration;

/// A decoded, ready-to-play mono clip
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl AudioClip {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples: samples.into(),
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Errors raised by narration loading and playback
///
/// None of these are fatal to a scene: they are logged and the playback
/// status falls back to idle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    #[error("Failed to load audio {uri}: {reason}")]
    Load { uri: String, reason: String },

    #[error("Playback of {uri} failed: {reason}")]
    Playback { uri: String, reason: String },

    #[error("Audio request for {uri} was superseded")]
    Interrupted { uri: String },

    #[error("No audio clip is loaded")]
    NothingLoaded,
}

impl AudioError {
    pub(crate) fn load(uri: &str, reason: impl ToString) -> Self {
        Self::Load {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn playback(uri: &str, reason: impl ToString) -> Self {
        Self::Playback {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the request simply lost to a newer one
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
