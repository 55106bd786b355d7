//! Dialogue scripts
//!
//! A script is the fixed, linear list of steps a scene walks through. It is
//! loaded once (from JSON or the built-in scene), validated, and never mutated
//! afterwards; the scene controller only ever reads from it.

pub mod builtin;
pub mod pronunciation;

pub use pronunciation::{PronunciationGuide, PronunciationGuides};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Who speaks a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The mission handler who frames the scene and coaches the user
    Narrator,
    /// The in-scene character the user talks to
    Guide,
    /// The learner; these steps are answered by speaking
    User,
}

/// One entry in a dialogue script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueStep {
    pub id: u32,
    pub speaker: Speaker,
    pub text: String,
    /// Narration clip for non-user steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Expected utterance for user steps (display only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    /// Nudge shown when the user lets the countdown run out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
    /// Spoken version of the nudge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_audio_ref: Option<String>,
}

impl DialogueStep {
    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Display names for the voiced speakers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cast {
    pub narrator: String,
    pub guide: String,
}

impl Default for Cast {
    fn default() -> Self {
        Self {
            narrator: "Narrator".to_string(),
            guide: "Guide".to_string(),
        }
    }
}

impl Cast {
    pub fn display_name(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Narrator => &self.narrator,
            Speaker::Guide => &self.guide,
            Speaker::User => "You",
        }
    }
}

/// Errors raised while building or loading a script
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Dialogue script has no steps")]
    Empty,

    #[error("User step {id} has no prompt")]
    MissingUserPrompt { id: u32 },

    #[error("Failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk shape of a script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptFile {
    #[serde(default)]
    title: String,
    #[serde(default)]
    cast: Cast,
    steps: Vec<DialogueStep>,
    #[serde(default)]
    pronunciation: Vec<PronunciationGuide>,
}

/// Validated, immutable dialogue script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ScriptFile", into = "ScriptFile")]
pub struct DialogueScript {
    title: String,
    cast: Cast,
    steps: Vec<DialogueStep>,
    guides: PronunciationGuides,
}

impl DialogueScript {
    /// Build a script, checking that every user step carries a prompt
    pub fn new(
        title: impl Into<String>,
        cast: Cast,
        steps: Vec<DialogueStep>,
        guides: Vec<PronunciationGuide>,
    ) -> Result<Self, ScriptError> {
        if steps.is_empty() {
            return Err(ScriptError::Empty);
        }

        for step in &steps {
            match step.speaker {
                Speaker::User => {
                    let has_prompt = step
                        .user_prompt
                        .as_deref()
                        .is_some_and(|p| !p.trim().is_empty());
                    if !has_prompt {
                        return Err(ScriptError::MissingUserPrompt { id: step.id });
                    }
                }
                _ if step.audio_ref.is_none() => {
                    tracing::debug!("Step {} has no narration clip, playback suppressed", step.id);
                }
                _ => {}
            }
        }

        Ok(Self {
            title: title.into(),
            cast,
            steps,
            guides: PronunciationGuides::new(guides),
        })
    }

    /// Parse and validate a JSON script
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let file: ScriptFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    /// Read a JSON script from disk
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let script = Self::from_json(&contents)?;
        tracing::info!(
            "Loaded script '{}' with {} steps from {}",
            script.title,
            script.len(),
            path.display()
        );
        Ok(script)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cast(&self) -> &Cast {
        &self.cast
    }

    pub fn steps(&self) -> &[DialogueStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&DialogueStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a validated script; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up the pronunciation guide for a prompt
    pub fn pronunciation(&self, phrase: &str) -> Option<&PronunciationGuide> {
        self.guides.lookup(phrase)
    }

    /// Every distinct clip the scene may play, in first-use order
    pub fn audio_refs(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let step_refs = self
            .steps
            .iter()
            .flat_map(|s| [s.audio_ref.as_ref(), s.fallback_audio_ref.as_ref()]);
        let guide_refs = self.guides.iter().map(|g| g.audio_ref.as_ref());

        step_refs
            .chain(guide_refs)
            .flatten()
            .filter(|uri| seen.insert(*uri))
            .cloned()
            .collect()
    }
}

impl TryFrom<ScriptFile> for DialogueScript {
    type Error = ScriptError;

    fn try_from(file: ScriptFile) -> Result<Self, Self::Error> {
        Self::new(file.title, file.cast, file.steps, file.pronunciation)
    }
}

impl From<DialogueScript> for ScriptFile {
    fn from(script: DialogueScript) -> Self {
        Self {
            title: script.title,
            cast: script.cast,
            steps: script.steps,
            pronunciation: script.guides.into_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrator(id: u32, audio: Option<&str>) -> DialogueStep {
        DialogueStep {
            id,
            speaker: Speaker::Narrator,
            text: format!("line {id}"),
            audio_ref: audio.map(str::to_string),
            user_prompt: None,
            fallback_text: None,
            fallback_audio_ref: None,
        }
    }

    fn user(id: u32, prompt: &str) -> DialogueStep {
        DialogueStep {
            id,
            speaker: Speaker::User,
            text: "Say it".to_string(),
            audio_ref: None,
            user_prompt: Some(prompt.to_string()),
            fallback_text: Some("Go on".to_string()),
            fallback_audio_ref: Some("nudge.mp3".to_string()),
        }
    }

    #[test]
    fn test_empty_script_rejected() {
        let result = DialogueScript::new("t", Cast::default(), vec![], vec![]);
        assert!(matches!(result, Err(ScriptError::Empty)));
    }

    #[test]
    fn test_user_step_requires_prompt() {
        let result = DialogueScript::new("t", Cast::default(), vec![user(1, "  ")], vec![]);
        assert!(matches!(
            result,
            Err(ScriptError::MissingUserPrompt { id: 1 })
        ));
    }

    #[test]
    fn test_narration_without_audio_is_allowed() {
        let script =
            DialogueScript::new("t", Cast::default(), vec![narrator(1, None)], vec![]).unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.audio_refs(), Vec::<String>::new());
    }

    #[test]
    fn test_from_json_camel_case() {
        let json = r#"{
            "title": "Test",
            "cast": {"narrator": "Lenoir"},
            "steps": [
                {"id": 1, "speaker": "narrator", "text": "Hi", "audioRef": "a.mp3"},
                {"id": 2, "speaker": "user", "text": "Answer", "userPrompt": "Bonjour",
                 "fallbackText": "Allez", "fallbackAudioRef": "b.mp3"}
            ]
        }"#;
        let script = DialogueScript::from_json(json).unwrap();

        assert_eq!(script.title(), "Test");
        assert_eq!(script.cast().display_name(Speaker::Narrator), "Lenoir");
        assert_eq!(script.cast().display_name(Speaker::Guide), "Guide");
        assert_eq!(script.step(1).unwrap().user_prompt.as_deref(), Some("Bonjour"));
        assert_eq!(script.audio_refs(), vec!["a.mp3", "b.mp3"]);
    }

    #[test]
    fn test_from_json_validates() {
        let json = r#"{"steps": [{"id": 4, "speaker": "user", "text": "Answer"}]}"#;
        let result = DialogueScript::from_json(json);
        assert!(matches!(
            result,
            Err(ScriptError::MissingUserPrompt { id: 4 })
        ));
    }

    #[test]
    fn test_audio_refs_deduplicated() {
        let steps = vec![
            narrator(1, Some("same.mp3")),
            user(2, "Oui"),
            narrator(3, Some("same.mp3")),
        ];
        let script = DialogueScript::new("t", Cast::default(), steps, vec![]).unwrap();
        assert_eq!(script.audio_refs(), vec!["same.mp3", "nudge.mp3"]);
    }

    #[test]
    fn test_load_missing_file() {
        let result = DialogueScript::load(Path::new("/nonexistent/scene.json"));
        assert!(matches!(result, Err(ScriptError::Io { .. })));
    }
}
