//! Scene controller
//!
//! An actor that owns the state machine, the audio player and the recording
//! session for one played scene. Presentation intents, recording events,
//! timer expiries and player status changes arrive on channels and are
//! handled one at a time, so every state mutation happens on a single turn.
//!
//! Timers and recording sessions are tagged (epoch and session id); a result
//! carrying a stale tag is dropped without touching the state.

use super::state::{AudioSource, Effect, SceneEvent, SceneSnapshot, SceneStateMachine, TimerKind};
use super::SceneError;
use crate::audio::{AudioOutput, AudioPlaybackState, AudioPlayer};
use crate::config::Config;
use crate::recording::{CaptureDevice, RecordingEvent, RecordingOutcome, RecordingSession};
use crate::script::{DialogueScript, Speaker};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Requests from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneIntent {
    Continue,
    StartRecording,
    CompleteRecording,
    ReplayAudio { uri: String },
    ReplayStep,
    /// Navigate away; tears the scene down without completing it
    Leave,
}

impl SceneIntent {
    fn into_event(self) -> Option<SceneEvent> {
        match self {
            SceneIntent::Continue => Some(SceneEvent::Continue),
            SceneIntent::StartRecording => Some(SceneEvent::StartRecording),
            SceneIntent::CompleteRecording => Some(SceneEvent::CompleteRecording),
            SceneIntent::ReplayAudio { uri } => Some(SceneEvent::ReplayAudio { uri }),
            SceneIntent::ReplayStep => Some(SceneEvent::ReplayStep),
            SceneIntent::Leave => None,
        }
    }
}

/// Events for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNotification {
    StateChanged(SceneSnapshot),
    AudioStatusChanged {
        playing: bool,
        speaker: Option<Speaker>,
        speaker_name: Option<String>,
    },
    IntentRejected {
        intent: &'static str,
        error: SceneError,
    },
    SceneCompleted,
}

/// How the controller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneExit {
    Completed,
    Left,
    /// Every handle was dropped
    Disconnected,
}

/// Sends intents to a running controller
#[derive(Debug, Clone)]
pub struct SceneHandle {
    intents: mpsc::UnboundedSender<SceneIntent>,
}

impl SceneHandle {
    pub fn send(&self, intent: SceneIntent) -> Result<(), SceneError> {
        self.intents.send(intent).map_err(|_| SceneError::Closed)
    }

    pub fn continue_scene(&self) -> Result<(), SceneError> {
        self.send(SceneIntent::Continue)
    }

    pub fn start_recording(&self) -> Result<(), SceneError> {
        self.send(SceneIntent::StartRecording)
    }

    pub fn complete_recording(&self) -> Result<(), SceneError> {
        self.send(SceneIntent::CompleteRecording)
    }

    pub fn replay_audio(&self, uri: impl Into<String>) -> Result<(), SceneError> {
        self.send(SceneIntent::ReplayAudio { uri: uri.into() })
    }

    pub fn replay_step(&self) -> Result<(), SceneError> {
        self.send(SceneIntent::ReplayStep)
    }

    pub fn leave(&self) -> Result<(), SceneError> {
        self.send(SceneIntent::Leave)
    }
}

#[derive(Debug)]
struct TimerFired {
    epoch: u64,
    timer: TimerKind,
}

/// Everything the controller mutates; the receivers live beside it in `run`
struct Core<O, D: CaptureDevice> {
    machine: SceneStateMachine,
    player: AudioPlayer<O>,
    recorder: RecordingSession<D>,
    narration_enabled: bool,
    notifications: mpsc::UnboundedSender<SceneNotification>,
    recording_events: mpsc::UnboundedSender<RecordingEvent>,
    timers: mpsc::UnboundedSender<TimerFired>,
    timer_epoch: u64,
    timer_tasks: Vec<JoinHandle<()>>,
    session: Option<u64>,
    /// Speaker of the most recent playback request
    speaker: Option<Speaker>,
    last_audio_status: Option<(bool, Option<Speaker>)>,
    last_snapshot: Option<SceneSnapshot>,
}

/// Drives one scene from its first step to completion
pub struct SceneController<O, D: CaptureDevice> {
    core: Core<O, D>,
    intents: mpsc::UnboundedReceiver<SceneIntent>,
    recording_events: mpsc::UnboundedReceiver<RecordingEvent>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
}

impl<O: AudioOutput, D: CaptureDevice> SceneController<O, D> {
    /// Build a controller for `script`
    ///
    /// Returns the controller, a handle for sending intents and the
    /// notification stream. Nothing happens until `run` is awaited.
    pub fn new(
        script: Arc<DialogueScript>,
        config: &Config,
        player: AudioPlayer<O>,
        recorder: RecordingSession<D>,
    ) -> (
        Self,
        SceneHandle,
        mpsc::UnboundedReceiver<SceneNotification>,
    ) {
        let mut timing = config.timing;
        timing.countdown_seconds = recorder.countdown_seconds();

        let machine = SceneStateMachine::new(
            script,
            timing,
            recorder.permission(),
            config.recording.skip_without_microphone,
        );

        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (recording_tx, recording_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let controller = Self {
            core: Core {
                machine,
                player,
                recorder,
                narration_enabled: config.audio.narration_enabled,
                notifications: notify_tx,
                recording_events: recording_tx,
                timers: timer_tx,
                timer_epoch: 0,
                timer_tasks: Vec::new(),
                session: None,
                speaker: None,
                last_audio_status: None,
                last_snapshot: None,
            },
            intents: intent_rx,
            recording_events: recording_rx,
            timers: timer_rx,
        };

        (controller, SceneHandle { intents: intent_tx }, notify_rx)
    }

    /// Run the scene until it completes, is left, or loses every handle
    pub async fn run(self) -> SceneExit {
        let SceneController {
            mut core,
            mut intents,
            mut recording_events,
            mut timers,
        } = self;
        let mut audio_status = core.player.subscribe();

        tracing::info!(
            "Scene '{}' started ({} steps)",
            core.machine.script().title(),
            core.machine.script().len()
        );
        core.enter().await;

        loop {
            if core.machine.phase().is_completed() {
                core.shutdown();
                core.notify(SceneNotification::SceneCompleted);
                tracing::info!("Scene completed");
                return SceneExit::Completed;
            }

            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(SceneIntent::Leave) => {
                        core.shutdown();
                        tracing::info!("Scene left at {}", core.machine.phase().description());
                        return SceneExit::Left;
                    }
                    Some(intent) => core.handle_intent(intent).await,
                    None => {
                        core.shutdown();
                        tracing::info!("Scene handles dropped, stopping");
                        return SceneExit::Disconnected;
                    }
                },
                Some(event) = recording_events.recv() => core.handle_recording_event(event).await,
                Some(fired) = timers.recv() => core.handle_timer(fired).await,
                Ok(()) = audio_status.changed() => {
                    let state = audio_status.borrow_and_update().clone();
                    core.publish_audio_status(&state);
                }
            }
        }
    }
}

impl<O: AudioOutput, D: CaptureDevice> Core<O, D> {
    async fn enter(&mut self) {
        for effect in self.machine.entry_effects() {
            if let Err(e) = self.apply(effect).await {
                tracing::warn!("Scene entry effect failed: {}", e);
            }
        }
        self.publish_snapshot();
    }

    async fn handle_intent(&mut self, intent: SceneIntent) {
        let Some(event) = intent.into_event() else {
            return;
        };
        let name = event.name();

        if let Err(error) = self.dispatch(event).await {
            tracing::warn!("Rejected '{}': {}", name, error);
            self.notify(SceneNotification::IntentRejected {
                intent: name,
                error,
            });
        }
    }

    async fn handle_recording_event(&mut self, event: RecordingEvent) {
        if self.session != Some(event.session()) {
            tracing::debug!("Ignoring event from stale recording session: {:?}", event);
            return;
        }

        let scene_event = match event {
            RecordingEvent::Tick {
                seconds_remaining, ..
            } => SceneEvent::Tick { seconds_remaining },
            RecordingEvent::Finished { outcome, .. } => {
                self.session = None;
                match outcome {
                    RecordingOutcome::Captured => SceneEvent::Captured,
                    RecordingOutcome::TimedOut => SceneEvent::TimedOut,
                }
            }
        };

        if let Err(e) = self.dispatch(scene_event).await {
            tracing::debug!("Recording event not applicable: {}", e);
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        if fired.epoch != self.timer_epoch {
            tracing::debug!("Ignoring cancelled {:?} timer", fired.timer);
            return;
        }
        if let Err(e) = self.dispatch(fired.timer.event()).await {
            tracing::debug!("Timer event not applicable: {}", e);
        }
    }

    /// Feed an event through the machine and run its effects
    ///
    /// A microphone that fails to open produces a `CaptureFailed` follow-up,
    /// processed on the same turn; the open error is still returned so the
    /// caller can report it.
    async fn dispatch(&mut self, event: SceneEvent) -> Result<(), SceneError> {
        let mut pending = VecDeque::from([event]);
        let mut outcome = Ok(());
        let mut first = true;

        while let Some(event) = pending.pop_front() {
            let result = match self.machine.process_event(event) {
                Ok(result) => result,
                Err(e) if first => return Err(e),
                Err(e) => {
                    tracing::debug!("Follow-up event dropped: {}", e);
                    continue;
                }
            };
            first = false;

            for effect in result.effects {
                let starts_capture = matches!(effect, Effect::StartCapture);
                if let Err(e) = self.apply(effect).await {
                    if starts_capture {
                        pending.push_back(SceneEvent::CaptureFailed {
                            message: e.to_string(),
                        });
                    }
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.publish_snapshot();
        outcome
    }

    async fn apply(&mut self, effect: Effect) -> Result<(), SceneError> {
        match effect {
            Effect::PlayAudio {
                uri,
                speaker,
                source,
            } => self.play(uri, speaker, source),
            Effect::StopAudio => self.player.stop(),
            Effect::StartCapture => {
                match self.recorder.start(self.recording_events.clone()).await {
                    Ok(id) => self.session = Some(id),
                    Err(e) => {
                        tracing::warn!("Could not start recording: {}", e);
                        return Err(e.into());
                    }
                }
            }
            Effect::FinishCapture => self.recorder.complete()?,
            Effect::StopCapture => {
                self.recorder.stop();
                self.session = None;
            }
            Effect::Schedule { timer, after } => self.schedule(timer, after),
            Effect::CancelTimers => self.cancel_timers(),
        }
        Ok(())
    }

    fn play(&mut self, uri: String, speaker: Option<Speaker>, source: AudioSource) {
        if source != AudioSource::Replay && !self.narration_enabled {
            tracing::debug!("Narration disabled, not playing {}", uri);
            return;
        }

        self.speaker = speaker;
        let request = self.player.play_ref(&uri);
        tokio::spawn(async move {
            match request.await {
                Ok(()) => tracing::debug!("Finished {:?} audio: {}", source, uri),
                Err(e) if e.is_interrupted() => tracing::debug!("{}", e),
                Err(e) => tracing::warn!("{:?} audio failed: {}", source, e),
            }
        });
    }

    fn schedule(&mut self, timer: TimerKind, after: Duration) {
        self.timer_tasks.retain(|task| !task.is_finished());

        let epoch = self.timer_epoch;
        let timers = self.timers.clone();
        self.timer_tasks.push(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = timers.send(TimerFired { epoch, timer });
        }));
    }

    fn cancel_timers(&mut self) {
        self.timer_epoch += 1;
        for task in self.timer_tasks.drain(..) {
            task.abort();
        }
    }

    /// Release every resource the scene holds
    fn shutdown(&mut self) {
        self.cancel_timers();
        self.player.stop();
        self.recorder.stop();
        self.session = None;
        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.machine.snapshot();
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        self.last_snapshot = Some(snapshot.clone());
        self.notify(SceneNotification::StateChanged(snapshot));
    }

    fn publish_audio_status(&mut self, state: &AudioPlaybackState) {
        let playing = state.is_playing();
        let speaker = if playing { self.speaker } else { None };
        if self.last_audio_status == Some((playing, speaker)) {
            return;
        }
        self.last_audio_status = Some((playing, speaker));

        let cast = self.machine.script().cast();
        let speaker_name = speaker.map(|s| cast.display_name(s).to_string());
        self.notify(SceneNotification::AudioStatusChanged {
            playing,
            speaker,
            speaker_name,
        });
    }

    fn notify(&self, notification: SceneNotification) {
        let _ = self.notifications.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leave_has_no_scene_event() {
        assert_eq!(SceneIntent::Leave.into_event(), None);
        assert_eq!(
            SceneIntent::ReplayAudio {
                uri: "a.mp3".to_string()
            }
            .into_event(),
            Some(SceneEvent::ReplayAudio {
                uri: "a.mp3".to_string()
            })
        );
    }

    #[test]
    fn test_handle_reports_closed_controller() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SceneHandle { intents: tx };
        drop(rx);
        assert_eq!(handle.continue_scene(), Err(SceneError::Closed));
    }
}
