//! Terminal front end
//!
//! Plays a scene with the real speaker and microphone, reading one-letter
//! commands from stdin and printing the scene as it changes.

use crate::audio::{preload_clips, AudioPlayer, CpalOutput, SourceFetcher};
use crate::config::Config;
use crate::recording::{CpalMicrophone, RecordingSession};
use crate::scene::{
    SceneController, SceneError, SceneExit, SceneHandle, SceneNotification, ScenePhase,
    SceneSnapshot,
};
use crate::script::{DialogueScript, Speaker};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// A parsed stdin command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Continue,
    Record,
    Say,
    Replay,
    Guide,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "c" | "continue" => Some(Command::Continue),
            "r" | "record" => Some(Command::Record),
            "s" | "say" | "done" => Some(Command::Say),
            "p" | "replay" => Some(Command::Replay),
            "g" | "guide" => Some(Command::Guide),
            "h" | "help" | "?" => Some(Command::Help),
            "q" | "quit" | "leave" => Some(Command::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "\
Commands:
  c, <enter>  continue to the next line
  r           start recording your answer
  s           finish speaking
  p           replay the current line
  g           show the pronunciation guide for the current prompt
  q           leave the scene";

/// Play `script` in the terminal until it completes or the user leaves
pub async fn run_terminal(
    script: Arc<DialogueScript>,
    config: Config,
) -> anyhow::Result<SceneExit> {
    let fetcher = SourceFetcher::new(config.audio.asset_dir.clone());
    let output = CpalOutput::new(
        fetcher,
        config.audio.output_device_id.clone(),
        config.audio.volume,
    );

    if config.audio.preload && config.audio.narration_enabled {
        let refs = script.audio_refs();
        println!("Loading narration...");
        let report = preload_clips(&output, &refs, |done, total| {
            eprint!("\r  {done}/{total} clips");
        })
        .await;
        eprintln!();
        if !report.is_ready() {
            println!(
                "{} clip(s) could not be loaded and will be retried when needed.",
                report.failed.len()
            );
        }
    }

    let player = AudioPlayer::new(output);
    let microphone = Arc::new(CpalMicrophone::new(config.recording.input_device_id.clone()));
    let recorder = RecordingSession::initialize(microphone, config.timing.countdown_seconds).await;
    if !recorder.permission().is_granted() {
        println!("No microphone available. Speaking prompts are disabled.");
    }

    let (controller, handle, mut notifications) =
        SceneController::new(script.clone(), &config, player, recorder);
    let mut scene = tokio::spawn(controller.run());

    println!("\n=== {} ===\n{}\n", script.title(), HELP);

    let mut view = TerminalView::new(script);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let exit = loop {
        tokio::select! {
            exit = &mut scene => break exit.context("Scene task failed")?,
            Some(notification) = notifications.recv() => view.render(&notification),
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => view.handle_line(&line, &handle),
                    None => {
                        stdin_open = false;
                        let _ = handle.leave();
                    }
                }
            }
        }
    };

    while let Ok(notification) = notifications.try_recv() {
        view.render(&notification);
    }
    Ok(exit)
}

/// Prints scene changes and maps commands onto intents
struct TerminalView {
    script: Arc<DialogueScript>,
    last: Option<SceneSnapshot>,
}

impl TerminalView {
    fn new(script: Arc<DialogueScript>) -> Self {
        Self { script, last: None }
    }

    fn handle_line(&self, line: &str, handle: &SceneHandle) {
        let Some(command) = Command::parse(line) else {
            println!("Unknown command '{}'. Type h for help.", line.trim());
            return;
        };

        let sent = match command {
            Command::Continue => handle.continue_scene(),
            Command::Record => handle.start_recording(),
            Command::Say => handle.complete_recording(),
            Command::Replay => handle.replay_step(),
            Command::Guide => self.show_guide(handle),
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => handle.leave(),
        };

        if let Err(e) = sent {
            tracing::debug!("Command not delivered: {}", e);
        }
    }

    fn show_guide(&self, handle: &SceneHandle) -> Result<(), SceneError> {
        let index = self.last.as_ref().map_or(0, |s| s.current_index);
        let guide = self
            .script
            .step(index)
            .and_then(|step| step.user_prompt.as_deref())
            .and_then(|prompt| self.script.pronunciation(prompt));

        match guide {
            Some(guide) => {
                println!(
                    "  {}\n  [{}]\n  {}",
                    guide.phrase, guide.phonetic, guide.translation
                );
                match &guide.audio_ref {
                    Some(uri) => handle.replay_audio(uri.clone()),
                    None => Ok(()),
                }
            }
            None => {
                println!("  No pronunciation guide for this line.");
                Ok(())
            }
        }
    }

    fn render(&mut self, notification: &SceneNotification) {
        match notification {
            SceneNotification::StateChanged(snapshot) => {
                self.render_snapshot(snapshot);
                self.last = Some(snapshot.clone());
            }
            SceneNotification::AudioStatusChanged {
                playing: true,
                speaker_name: Some(name),
                ..
            } => println!("  ({} is speaking)", name),
            SceneNotification::AudioStatusChanged { .. } => {}
            SceneNotification::IntentRejected { error, .. } => match error {
                SceneError::PermissionDenied => {
                    println!("  Microphone access is unavailable; press c to skip this prompt.")
                }
                other => println!("  {}", other),
            },
            SceneNotification::SceneCompleted => println!("\n*** Scene complete. Bien joué! ***"),
        }
    }

    fn render_snapshot(&self, snapshot: &SceneSnapshot) {
        let previous = self.last.as_ref().map(|s| s.phase);
        let index = snapshot.current_index;
        let Some(step) = self.script.step(index) else {
            return;
        };

        match snapshot.phase {
            ScenePhase::Narrating { .. } => {
                if previous != Some(snapshot.phase) {
                    let name = self.script.cast().display_name(step.speaker);
                    println!("\n[{}/{}] {}: {}", index + 1, self.script.len(), name, step.text);
                }
            }
            ScenePhase::AwaitingUser { .. } => {
                if previous != Some(ScenePhase::AwaitingUser { step: index }) {
                    println!("\n[{}/{}] {}", index + 1, self.script.len(), step.text);
                    if let Some(prompt) = &step.user_prompt {
                        println!("  Say: \"{}\"", prompt);
                    }
                    if snapshot.microphone_available {
                        println!("  Press r to start recording.");
                    }
                }
            }
            ScenePhase::Recording {
                seconds_remaining, ..
            } => {
                if matches!(previous, Some(ScenePhase::Recording { .. })) {
                    println!("  {}...", seconds_remaining);
                } else {
                    println!(
                        "  Recording! Speak now, then press s. ({}s)",
                        seconds_remaining
                    );
                }
            }
            ScenePhase::Confirming { .. } => println!("  Got it."),
            ScenePhase::Fallback { .. } => {
                let name = self.script.cast().display_name(Speaker::Narrator);
                match &step.fallback_text {
                    Some(text) => println!("  {}: {}", name, text),
                    None => println!("  Time's up. Let's try again."),
                }
            }
            ScenePhase::Completed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(""), Some(Command::Continue));
        assert_eq!(Command::parse(" R \n"), Some(Command::Record));
        assert_eq!(Command::parse("say"), Some(Command::Say));
        assert_eq!(Command::parse("g"), Some(Command::Guide));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("xyzzy"), None);
    }
}
