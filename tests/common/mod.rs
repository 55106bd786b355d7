//! Shared fixtures for scene integration tests: in-memory audio output and
//! microphone backends plus a harness that records every notification.

#![allow(dead_code)]

use parking_lot::Mutex;
use reflex_lib::audio::{AudioClip, AudioError, AudioOutput, AudioPlayer};
use reflex_lib::config::Config;
use reflex_lib::recording::{CaptureDevice, RecordingError, RecordingSession};
use reflex_lib::scene::{
    SceneController, SceneError, SceneExit, SceneHandle, SceneNotification, ScenePhase,
};
use reflex_lib::script::{Cast, DialogueScript, DialogueStep, Speaker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long the mock output takes to load any clip
pub const LOAD_TIME: Duration = Duration::from_millis(10);

/// How long every mock clip plays for
pub const CLIP_LENGTH: Duration = Duration::from_secs(2);

// =============================================================================
// Mock audio output
// =============================================================================

/// Audio output that records which clips actually reached the speaker
#[derive(Clone, Default)]
pub struct MockOutput {
    pub played: Arc<Mutex<Vec<String>>>,
}

impl AudioOutput for MockOutput {
    async fn load(&self, uri: &str) -> Result<AudioClip, AudioError> {
        tokio::time::sleep(LOAD_TIME).await;
        if uri.contains("missing") {
            return Err(AudioError::Load {
                uri: uri.to_string(),
                reason: "404".to_string(),
            });
        }
        let rate = 1000;
        let frames = (CLIP_LENGTH.as_secs_f64() * rate as f64) as usize;
        Ok(AudioClip::new(rate, vec![0.0; frames]))
    }

    async fn play(&self, uri: &str, clip: AudioClip) -> Result<(), AudioError> {
        self.played.lock().push(uri.to_string());
        tokio::time::sleep(clip.duration()).await;
        Ok(())
    }

    fn halt(&self) {}
}

// =============================================================================
// Mock microphone
// =============================================================================

#[derive(Default)]
pub struct MicCounters {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

pub struct MockStream(Arc<MicCounters>);

impl Drop for MockStream {
    fn drop(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockMicrophone {
    pub granted: bool,
    /// Permission is granted but every open fails, like a device held elsewhere
    pub busy: bool,
    pub counters: Arc<MicCounters>,
}

impl MockMicrophone {
    pub fn new(granted: bool) -> Arc<Self> {
        Arc::new(Self {
            granted,
            busy: false,
            counters: Arc::default(),
        })
    }

    pub fn busy() -> Arc<Self> {
        Arc::new(Self {
            granted: true,
            busy: true,
            counters: Arc::default(),
        })
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for MockMicrophone {
    type Stream = MockStream;

    async fn request_permission(&self) -> bool {
        self.granted
    }

    async fn open(&self) -> Result<MockStream, RecordingError> {
        if self.busy {
            return Err(RecordingError::Device("device busy".to_string()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockStream(self.counters.clone()))
    }
}

// =============================================================================
// Scripts
// =============================================================================

pub fn narrator(id: u32, audio: &str) -> DialogueStep {
    DialogueStep {
        id,
        speaker: Speaker::Narrator,
        text: format!("Narrator line {id}"),
        audio_ref: Some(audio.to_string()),
        user_prompt: None,
        fallback_text: None,
        fallback_audio_ref: None,
    }
}

pub fn user(id: u32, fallback_audio: &str) -> DialogueStep {
    DialogueStep {
        id,
        speaker: Speaker::User,
        text: "Ask where the exit is:".to_string(),
        audio_ref: None,
        user_prompt: Some("Excusez-moi, je cherche la sortie.".to_string()),
        fallback_text: Some("What are you waiting for? Ask him!".to_string()),
        fallback_audio_ref: Some(fallback_audio.to_string()),
    }
}

pub fn script_of(steps: Vec<DialogueStep>) -> Arc<DialogueScript> {
    Arc::new(
        DialogueScript::new("Airport", Cast::default(), steps, vec![])
            .expect("test script is valid"),
    )
}

/// `[narrator, user, narrator]`
pub fn three_step_script() -> Arc<DialogueScript> {
    script_of(vec![
        narrator(1, "intro.mp3"),
        user(2, "nudge.mp3"),
        narrator(3, "outro.mp3"),
    ])
}

// =============================================================================
// Harness
// =============================================================================

/// A running scene plus everything it has reported so far
pub struct Scene {
    pub handle: SceneHandle,
    pub task: JoinHandle<SceneExit>,
    pub played: Arc<Mutex<Vec<String>>>,
    pub mic: Arc<MockMicrophone>,
    pub seen: Vec<SceneNotification>,
    notifications: mpsc::UnboundedReceiver<SceneNotification>,
}

impl Scene {
    pub async fn start(script: Arc<DialogueScript>, microphone_granted: bool) -> Self {
        Self::start_with(script, microphone_granted, Config::default()).await
    }

    pub async fn start_with(
        script: Arc<DialogueScript>,
        microphone_granted: bool,
        config: Config,
    ) -> Self {
        Self::start_on(script, MockMicrophone::new(microphone_granted), config).await
    }

    pub async fn start_on(
        script: Arc<DialogueScript>,
        mic: Arc<MockMicrophone>,
        config: Config,
    ) -> Self {
        let output = MockOutput::default();
        let played = output.played.clone();
        let player = AudioPlayer::new(output);

        let recorder =
            RecordingSession::initialize(mic.clone(), config.timing.countdown_seconds).await;

        let (controller, handle, notifications) =
            SceneController::new(script, &config, player, recorder);
        let task = tokio::spawn(controller.run());

        let mut scene = Self {
            handle,
            task,
            played,
            mic,
            seen: Vec::new(),
            notifications,
        };
        scene.wait(Duration::from_millis(1)).await;
        scene
    }

    /// Let virtual time pass, then collect notifications
    pub async fn wait(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.drain();
    }

    /// Give the controller a moment to handle what was just sent
    pub async fn settle(&mut self) {
        self.wait(Duration::from_millis(5)).await;
    }

    pub fn drain(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.seen.push(notification);
        }
    }

    /// Every phase reported, in order
    pub fn phases(&self) -> Vec<ScenePhase> {
        self.seen
            .iter()
            .filter_map(|n| match n {
                SceneNotification::StateChanged(snapshot) => Some(snapshot.phase),
                _ => None,
            })
            .collect()
    }

    /// The most recently reported phase
    pub fn phase(&self) -> ScenePhase {
        *self.phases().last().expect("no state reported yet")
    }

    pub fn rejections(&self) -> Vec<SceneError> {
        self.seen
            .iter()
            .filter_map(|n| match n {
                SceneNotification::IntentRejected { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> bool {
        self.seen
            .iter()
            .any(|n| matches!(n, SceneNotification::SceneCompleted))
    }

    /// Every audio status reported, as `playing` flags
    pub fn audio_statuses(&self) -> Vec<bool> {
        self.seen
            .iter()
            .filter_map(|n| match n {
                SceneNotification::AudioStatusChanged { playing, .. } => Some(*playing),
                _ => None,
            })
            .collect()
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }
}
