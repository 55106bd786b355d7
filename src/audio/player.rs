//! Single-channel narration player
//!
//! Wraps one [`AudioOutput`] and guarantees that at most one logical playback
//! is outstanding. Every `load` starts a new request: it bumps the request
//! generation, halts whatever was loading or playing, and only the request
//! that still owns the current generation may touch the shared status.
//!
//! A superseded request settles with [`AudioError::Interrupted`] and never
//! publishes anything, so a slow load that resolves after a newer one has
//! started cannot resurrect stale state.

use super::{AudioClip, AudioError, AudioOutput};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Playback status, as shown to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Errored,
}

/// Observable player state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPlaybackState {
    pub active_ref: Option<String>,
    pub status: PlaybackStatus,
}

impl AudioPlaybackState {
    fn new(uri: &str, status: PlaybackStatus) -> Self {
        Self {
            active_ref: Some(uri.to_string()),
            status,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }
}

/// A clip that finished loading and is waiting for `play`
struct Cued {
    generation: u64,
    uri: String,
    clip: AudioClip,
}

struct Inner {
    generation: u64,
    cued: Option<Cued>,
}

struct Shared<O> {
    output: O,
    inner: Mutex<Inner>,
    generation: watch::Sender<u64>,
    state: watch::Sender<AudioPlaybackState>,
}

/// Last-request-wins audio player
pub struct AudioPlayer<O> {
    shared: Arc<Shared<O>>,
}

impl<O> Clone for AudioPlayer<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<O: AudioOutput> AudioPlayer<O> {
    pub fn new(output: O) -> Self {
        let (generation, _) = watch::channel(0);
        let (state, _) = watch::channel(AudioPlaybackState::default());
        Self {
            shared: Arc::new(Shared {
                output,
                inner: Mutex::new(Inner {
                    generation: 0,
                    cued: None,
                }),
                generation,
                state,
            }),
        }
    }

    pub fn output(&self) -> &O {
        &self.shared.output
    }

    /// Current status snapshot
    pub fn state(&self) -> AudioPlaybackState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<AudioPlaybackState> {
        self.shared.state.subscribe()
    }

    /// Cancel any in-flight load or playback and return to idle
    ///
    /// Idempotent and infallible.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        self.supersede(&mut inner);
        self.shared.state.send_if_modified(|state| {
            let idle = AudioPlaybackState::default();
            if *state == idle {
                return false;
            }
            *state = idle;
            true
        });
    }

    /// Load `uri`, superseding any earlier request
    ///
    /// Resolves once the clip is ready to play.
    pub async fn load(&self, uri: &str) -> Result<(), AudioError> {
        let generation = self.begin(uri);
        self.load_request(generation, uri).await
    }

    /// Play the clip cued by the last `load`
    ///
    /// Resolves when playback ends naturally.
    pub async fn play(&self) -> Result<(), AudioError> {
        let generation = self.shared.inner.lock().generation;
        self.play_request(generation).await
    }

    /// Load and play `uri` to the end
    ///
    /// The request takes over the player as soon as this is called, before
    /// the returned future is first polled, so a `stop` issued afterwards
    /// always wins. A load or playback failure leaves the player idle again
    /// once it has been reported.
    pub fn play_ref(
        &self,
        uri: &str,
    ) -> impl Future<Output = Result<(), AudioError>> + Send + 'static {
        let generation = self.begin(uri);
        let player = self.clone();
        let uri = uri.to_string();

        async move {
            let result = match player.load_request(generation, &uri).await {
                // The clip was cued for this request; if it is gone, we lost it
                Ok(()) => match player.play_request(generation).await {
                    Err(AudioError::NothingLoaded) => Err(interrupted(&uri)),
                    other => other,
                },
                Err(e) => Err(e),
            };

            if let Err(ref e) = result {
                if !e.is_interrupted() {
                    player.clear_error(&uri);
                }
            }
            result
        }
    }

    /// Claim the player for a new request and report it as loading
    fn begin(&self, uri: &str) -> u64 {
        let mut inner = self.shared.inner.lock();
        let generation = self.supersede(&mut inner);
        self.shared
            .state
            .send_replace(AudioPlaybackState::new(uri, PlaybackStatus::Loading));
        tracing::debug!("Loading audio (request {}): {}", generation, uri);
        generation
    }

    async fn load_request(&self, generation: u64, uri: &str) -> Result<(), AudioError> {
        let result = self
            .until_superseded(generation, self.shared.output.load(uri))
            .await
            .ok_or_else(|| interrupted(uri))?;

        let mut inner = self.shared.inner.lock();
        if inner.generation != generation {
            return Err(interrupted(uri));
        }

        match result {
            Ok(clip) => {
                inner.cued = Some(Cued {
                    generation,
                    uri: uri.to_string(),
                    clip,
                });
                self.shared
                    .state
                    .send_replace(AudioPlaybackState::new(uri, PlaybackStatus::Idle));
                Ok(())
            }
            Err(e) => {
                self.shared
                    .state
                    .send_replace(AudioPlaybackState::new(uri, PlaybackStatus::Errored));
                Err(e)
            }
        }
    }

    async fn play_request(&self, generation: u64) -> Result<(), AudioError> {
        let (uri, clip) = {
            let mut inner = self.shared.inner.lock();
            let cued = inner
                .cued
                .take()
                .filter(|c| c.generation == generation)
                .ok_or(AudioError::NothingLoaded)?;
            self.shared
                .state
                .send_replace(AudioPlaybackState::new(&cued.uri, PlaybackStatus::Playing));
            (cued.uri, cued.clip)
        };
        tracing::debug!("Playing audio (request {}): {}", generation, uri);

        let result = self
            .until_superseded(generation, self.shared.output.play(&uri, clip))
            .await
            .ok_or_else(|| interrupted(&uri))?;

        let inner = self.shared.inner.lock();
        if inner.generation != generation {
            return Err(interrupted(&uri));
        }

        match result {
            Ok(()) => {
                self.shared.state.send_replace(AudioPlaybackState::default());
                Ok(())
            }
            Err(e) => {
                self.shared
                    .state
                    .send_replace(AudioPlaybackState::new(&uri, PlaybackStatus::Errored));
                Err(e)
            }
        }
    }

    /// Reset an errored status back to idle, unless a newer request took over
    fn clear_error(&self, uri: &str) {
        let _inner = self.shared.inner.lock();
        self.shared.state.send_if_modified(|state| {
            let ours = state.status == PlaybackStatus::Errored
                && state.active_ref.as_deref() == Some(uri);
            if ours {
                *state = AudioPlaybackState::default();
            }
            ours
        });
    }

    /// Start a new request generation, halting the previous holder
    fn supersede(&self, inner: &mut Inner) -> u64 {
        inner.generation += 1;
        inner.cued = None;
        self.shared.generation.send_replace(inner.generation);
        self.shared.output.halt();
        inner.generation
    }

    /// Run `fut` unless the request generation moves on first
    async fn until_superseded<F: Future>(&self, generation: u64, fut: F) -> Option<F::Output> {
        let mut rx = self.shared.generation.subscribe();
        let superseded = async move {
            let _ = rx.wait_for(|current| *current != generation).await;
        };

        tokio::select! {
            biased;
            _ = superseded => None,
            out = fut => Some(out),
        }
    }
}

fn interrupted(uri: &str) -> AudioError {
    AudioError::Interrupted {
        uri: uri.to_string(),
    }
}
