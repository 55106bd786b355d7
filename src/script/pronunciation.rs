//! Pronunciation guides for user prompts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to say a prompt, with an optional reference recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationGuide {
    pub phrase: String,
    pub phonetic: String,
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

/// Guides keyed by their phrase
#[derive(Debug, Clone, Default)]
pub struct PronunciationGuides {
    by_phrase: HashMap<String, PronunciationGuide>,
}

impl PronunciationGuides {
    pub fn new(guides: Vec<PronunciationGuide>) -> Self {
        let by_phrase = guides
            .into_iter()
            .map(|g| (normalise(&g.phrase), g))
            .collect();
        Self { by_phrase }
    }

    /// Find the guide for a phrase, ignoring surrounding whitespace and case
    pub fn lookup(&self, phrase: &str) -> Option<&PronunciationGuide> {
        self.by_phrase.get(&normalise(phrase))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PronunciationGuide> {
        self.by_phrase.values()
    }

    pub fn len(&self) -> usize {
        self.by_phrase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_phrase.is_empty()
    }

    pub fn into_vec(self) -> Vec<PronunciationGuide> {
        let mut guides: Vec<_> = self.by_phrase.into_values().collect();
        guides.sort_by(|a, b| a.phrase.cmp(&b.phrase));
        guides
    }
}

fn normalise(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}
