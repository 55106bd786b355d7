//! Scene state machine
//!
//! Pure transition logic: events in, a new phase plus a list of effects out.
//! The controller owns the side effects (audio, microphone, timers); this
//! module never touches a device or a clock.

use super::SceneError;
use crate::config::TimingConfig;
use crate::recording::PermissionState;
use crate::script::{DialogueScript, Speaker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where the scene is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ScenePhase {
    /// A narrator or guide line is shown; waits for an explicit continue
    Narrating { step: usize },
    /// A user prompt is shown; waits for the user to start recording
    AwaitingUser { step: usize },
    /// The microphone is open and counting down
    Recording { step: usize, seconds_remaining: u32 },
    /// Capture succeeded; holding briefly before moving on
    Confirming { step: usize },
    /// The countdown ran out; nudging before another attempt
    Fallback { step: usize },
    Completed,
}

impl ScenePhase {
    /// Step index, if the scene is still running
    pub fn step(&self) -> Option<usize> {
        match *self {
            ScenePhase::Narrating { step }
            | ScenePhase::AwaitingUser { step }
            | ScenePhase::Recording { step, .. }
            | ScenePhase::Confirming { step }
            | ScenePhase::Fallback { step } => Some(step),
            ScenePhase::Completed => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ScenePhase::Completed)
    }

    pub fn description(&self) -> String {
        match self {
            ScenePhase::Narrating { step } => format!("narrating step {step}"),
            ScenePhase::AwaitingUser { step } => format!("awaiting the user at step {step}"),
            ScenePhase::Recording {
                step,
                seconds_remaining,
            } => format!("recording step {step} ({seconds_remaining}s left)"),
            ScenePhase::Confirming { step } => format!("confirming step {step}"),
            ScenePhase::Fallback { step } => format!("in fallback at step {step}"),
            ScenePhase::Completed => "completed".to_string(),
        }
    }
}

/// Inputs to the machine: presentation intents and internal completions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    Continue,
    StartRecording,
    CompleteRecording,
    ReplayAudio { uri: String },
    ReplayStep,
    /// Countdown tick from the running session
    Tick { seconds_remaining: u32 },
    Captured,
    TimedOut,
    /// The microphone could not be opened
    CaptureFailed { message: String },
    FallbackAudioDue,
    DwellElapsed,
    SettleElapsed,
}

impl SceneEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SceneEvent::Continue => "continue",
            SceneEvent::StartRecording => "start_recording",
            SceneEvent::CompleteRecording => "complete_recording",
            SceneEvent::ReplayAudio { .. } => "replay_audio",
            SceneEvent::ReplayStep => "replay_step",
            SceneEvent::Tick { .. } => "tick",
            SceneEvent::Captured => "captured",
            SceneEvent::TimedOut => "timed_out",
            SceneEvent::CaptureFailed { .. } => "capture_failed",
            SceneEvent::FallbackAudioDue => "fallback_audio_due",
            SceneEvent::DwellElapsed => "dwell_elapsed",
            SceneEvent::SettleElapsed => "settle_elapsed",
        }
    }
}

/// Why a clip is being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    Narration,
    Fallback,
    Replay,
}

/// Delayed internal events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Settle,
    FallbackAudio,
    Dwell,
}

impl TimerKind {
    pub fn event(self) -> SceneEvent {
        match self {
            TimerKind::Settle => SceneEvent::SettleElapsed,
            TimerKind::FallbackAudio => SceneEvent::FallbackAudioDue,
            TimerKind::Dwell => SceneEvent::DwellElapsed,
        }
    }
}

/// Side effects requested by a transition, run in order by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PlayAudio {
        uri: String,
        speaker: Option<Speaker>,
        source: AudioSource,
    },
    StopAudio,
    /// Open the microphone and start the countdown
    StartCapture,
    /// End the running capture with a captured outcome
    FinishCapture,
    /// Release the microphone without an outcome
    StopCapture,
    Schedule {
        timer: TimerKind,
        after: Duration,
    },
    /// Drop every pending timer
    CancelTimers,
}

/// Reason for entering a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    UserContinue,
    /// Continue past a prompt when no microphone is available
    SkippedWithoutMicrophone,
    RecordingStarted,
    CaptureRequested,
    CountdownTick,
    Captured,
    Timeout,
    CaptureFailed { message: String },
    FallbackNudge,
    RetryAfterFallback,
    Settled,
    Replay,
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub previous: ScenePhase,
    pub phase: ScenePhase,
    pub reason: TransitionReason,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn changed_phase(&self) -> bool {
        self.previous != self.phase
    }
}

/// Observable scene state for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub current_index: usize,
    pub phase: ScenePhase,
    pub fallback_active: bool,
    pub recording_seconds_remaining: u32,
    pub completed: bool,
    /// Fraction of the script reached, in (0, 1]
    pub progress: f32,
    pub microphone_available: bool,
}

/// Scene state machine
///
/// Owned by the scene controller; every mutation goes through `process_event`.
pub struct SceneStateMachine {
    script: Arc<DialogueScript>,
    timing: TimingConfig,
    permission: PermissionState,
    skip_without_microphone: bool,
    phase: ScenePhase,
    index: usize,
}

impl SceneStateMachine {
    pub fn new(
        script: Arc<DialogueScript>,
        timing: TimingConfig,
        permission: PermissionState,
        skip_without_microphone: bool,
    ) -> Self {
        let phase = match script.step(0) {
            Some(step) if step.is_user() => ScenePhase::AwaitingUser { step: 0 },
            _ => ScenePhase::Narrating { step: 0 },
        };
        Self {
            script,
            timing,
            permission,
            skip_without_microphone,
            phase,
            index: 0,
        }
    }

    pub fn phase(&self) -> ScenePhase {
        self.phase
    }

    pub fn script(&self) -> &DialogueScript {
        &self.script
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Effects for entering the initial phase
    pub fn entry_effects(&self) -> Vec<Effect> {
        self.narration_for(self.index).into_iter().collect()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let completed = self.phase.is_completed();
        let progress = if completed {
            1.0
        } else {
            (self.index + 1) as f32 / self.script.len() as f32
        };
        let recording_seconds_remaining = match self.phase {
            ScenePhase::Recording {
                seconds_remaining, ..
            } => seconds_remaining,
            _ => 0,
        };

        SceneSnapshot {
            current_index: self.index,
            phase: self.phase,
            fallback_active: matches!(self.phase, ScenePhase::Fallback { .. }),
            recording_seconds_remaining,
            completed,
            progress,
            microphone_available: self.permission.is_granted(),
        }
    }

    /// Process an event and return the transition it caused
    ///
    /// Events that are not valid in the current phase are rejected with no
    /// state change.
    pub fn process_event(&mut self, event: SceneEvent) -> Result<TransitionResult, SceneError> {
        let intent = event.name();
        let previous = self.phase;
        let countdown = self.timing.countdown_seconds;

        let (phase, reason, effects) = match (previous, event) {
            (ScenePhase::Narrating { step }, SceneEvent::Continue) => {
                self.advance(step, TransitionReason::UserContinue)
            }
            (ScenePhase::AwaitingUser { step }, SceneEvent::Continue)
                if !self.permission.is_granted() && self.skip_without_microphone =>
            {
                self.advance(step, TransitionReason::SkippedWithoutMicrophone)
            }

            (ScenePhase::AwaitingUser { step }, SceneEvent::StartRecording) => {
                if !self.permission.is_granted() {
                    return Err(SceneError::PermissionDenied);
                }
                (
                    ScenePhase::Recording {
                        step,
                        seconds_remaining: countdown,
                    },
                    TransitionReason::RecordingStarted,
                    vec![Effect::StopAudio, Effect::StartCapture],
                )
            }

            (
                ScenePhase::Recording {
                    seconds_remaining, ..
                },
                SceneEvent::CompleteRecording,
            ) if seconds_remaining > 0 => (
                previous,
                TransitionReason::CaptureRequested,
                vec![Effect::FinishCapture],
            ),
            (ScenePhase::Recording { step, .. }, SceneEvent::Tick { seconds_remaining }) => (
                ScenePhase::Recording {
                    step,
                    seconds_remaining,
                },
                TransitionReason::CountdownTick,
                vec![],
            ),
            (ScenePhase::Recording { step, .. }, SceneEvent::Captured) => (
                ScenePhase::Confirming { step },
                TransitionReason::Captured,
                vec![Effect::Schedule {
                    timer: TimerKind::Settle,
                    after: self.timing.settle_delay(),
                }],
            ),
            (ScenePhase::Recording { step, .. }, SceneEvent::TimedOut) => {
                let mut effects = vec![Effect::StopAudio];
                let has_nudge = self
                    .script
                    .step(step)
                    .is_some_and(|s| s.fallback_audio_ref.is_some());
                if has_nudge {
                    effects.push(Effect::Schedule {
                        timer: TimerKind::FallbackAudio,
                        after: self.timing.fallback_audio_delay(),
                    });
                }
                effects.push(Effect::Schedule {
                    timer: TimerKind::Dwell,
                    after: self.timing.fallback_dwell(),
                });
                (
                    ScenePhase::Fallback { step },
                    TransitionReason::Timeout,
                    effects,
                )
            }
            (ScenePhase::Recording { step, .. }, SceneEvent::CaptureFailed { message }) => (
                ScenePhase::AwaitingUser { step },
                TransitionReason::CaptureFailed { message },
                vec![Effect::StopCapture],
            ),

            (ScenePhase::Fallback { step }, SceneEvent::FallbackAudioDue) => {
                let effects = self
                    .script
                    .step(step)
                    .and_then(|s| s.fallback_audio_ref.clone())
                    .map(|uri| Effect::PlayAudio {
                        uri,
                        speaker: Some(Speaker::Narrator),
                        source: AudioSource::Fallback,
                    })
                    .into_iter()
                    .collect();
                (previous, TransitionReason::FallbackNudge, effects)
            }
            (ScenePhase::Fallback { step }, SceneEvent::DwellElapsed) => (
                ScenePhase::Recording {
                    step,
                    seconds_remaining: countdown,
                },
                TransitionReason::RetryAfterFallback,
                vec![Effect::CancelTimers, Effect::StopAudio, Effect::StartCapture],
            ),

            (ScenePhase::Confirming { step }, SceneEvent::SettleElapsed) => {
                self.advance(step, TransitionReason::Settled)
            }

            (phase, SceneEvent::ReplayAudio { uri }) if !phase.is_completed() => (
                phase,
                TransitionReason::Replay,
                vec![Effect::PlayAudio {
                    uri,
                    speaker: None,
                    source: AudioSource::Replay,
                }],
            ),
            (phase, SceneEvent::ReplayStep) if !phase.is_completed() => {
                let effects = self.replay_for(phase).into_iter().collect();
                (phase, TransitionReason::Replay, effects)
            }

            _ => {
                return Err(SceneError::InvalidTransition {
                    intent,
                    phase: previous.description(),
                })
            }
        };

        let result = TransitionResult {
            previous,
            phase,
            reason,
            effects,
        };
        self.apply_transition(&result);
        Ok(result)
    }

    /// Move past `step`: to the next step, or to the end of the scene
    fn advance(
        &self,
        step: usize,
        reason: TransitionReason,
    ) -> (ScenePhase, TransitionReason, Vec<Effect>) {
        let mut effects = vec![Effect::CancelTimers, Effect::StopAudio];
        let next = step + 1;

        let phase = match self.script.step(next) {
            None => ScenePhase::Completed,
            Some(s) if s.is_user() => ScenePhase::AwaitingUser { step: next },
            Some(_) => {
                effects.extend(self.narration_for(next));
                ScenePhase::Narrating { step: next }
            }
        };
        (phase, reason, effects)
    }

    fn narration_for(&self, index: usize) -> Option<Effect> {
        let step = self.script.step(index)?;
        if step.is_user() {
            return None;
        }
        step.audio_ref.clone().map(|uri| Effect::PlayAudio {
            uri,
            speaker: Some(step.speaker),
            source: AudioSource::Narration,
        })
    }

    fn replay_for(&self, phase: ScenePhase) -> Option<Effect> {
        let step = self.script.step(phase.step()?)?;
        let (uri, speaker) = match phase {
            ScenePhase::Fallback { .. } => (step.fallback_audio_ref.clone()?, Speaker::Narrator),
            _ => (step.audio_ref.clone()?, step.speaker),
        };
        Some(Effect::PlayAudio {
            uri,
            speaker: Some(speaker),
            source: AudioSource::Replay,
        })
    }

    fn apply_transition(&mut self, result: &TransitionResult) {
        self.phase = result.phase;
        if let Some(step) = result.phase.step() {
            self.index = step;
        }

        if result.reason == TransitionReason::CountdownTick {
            tracing::debug!("Scene countdown: {}", result.phase.description());
        } else if result.changed_phase() {
            tracing::info!(
                "Scene transition: {:?} -> {:?} (reason: {:?})",
                result.previous,
                result.phase,
                result.reason
            );
        }
    }
}
