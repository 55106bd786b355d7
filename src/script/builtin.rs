//! The built-in airport arrival scene
//!
//! Played when no script path is configured. Narration is hosted on static
//! blob storage; pronunciation clips are resolved against the asset directory.

use super::{Cast, DialogueScript, DialogueStep, PronunciationGuide, ScriptError, Speaker};

const BLOB_BASE: &str = "https://hebbkx1anhila5yf.public.blob.vercel-storage.com";

fn blob(name: &str) -> Option<String> {
    Some(format!("{BLOB_BASE}/{name}"))
}

fn narrator(id: u32, text: &str, audio: &str) -> DialogueStep {
    DialogueStep {
        id,
        speaker: Speaker::Narrator,
        text: text.to_string(),
        audio_ref: blob(audio),
        user_prompt: None,
        fallback_text: None,
        fallback_audio_ref: None,
    }
}

fn guide(id: u32, text: &str, audio: &str) -> DialogueStep {
    DialogueStep {
        speaker: Speaker::Guide,
        ..narrator(id, text, audio)
    }
}

fn user(id: u32, text: &str, prompt: &str, fallback: &str, fallback_audio: &str) -> DialogueStep {
    DialogueStep {
        id,
        speaker: Speaker::User,
        text: text.to_string(),
        audio_ref: None,
        user_prompt: Some(prompt.to_string()),
        fallback_text: Some(fallback.to_string()),
        fallback_audio_ref: blob(fallback_audio),
    }
}

fn pronunciation(phrase: &str, phonetic: &str, translation: &str, audio: &str) -> PronunciationGuide {
    PronunciationGuide {
        phrase: phrase.to_string(),
        phonetic: phonetic.to_string(),
        translation: translation.to_string(),
        audio_ref: Some(format!("audio/pronunciation/{audio}")),
    }
}

/// Kotoka International Airport: find the exit with Kouassi
pub fn airport_scene() -> Result<DialogueScript, ScriptError> {
    let steps = vec![
        narrator(
            1,
            "Très bien, we're on Ghanaian soil, Agent Touré. But now we need to find the airport exit, la sortie. Hey, voilà! That's Kouassi, who sat next to us on the plane in aisle C. Let's ask him where the exit is. Say to him: 'Excusez-moi, je cherche la sortie.'",
            "Lenoir%20Line%201-ie4rCbCKrBo8UFDTCNcaG0i76mYzqF.mp3",
        ),
        user(
            2,
            "Ask Kouassi where the exit is:",
            "Excusez-moi, je cherche la sortie.",
            "Vous attendez quoi? What are you waiting for, Touré? Ask Kouassi where the exit is!",
            "Lenoir%20Line%202-cnkpjjbakQXOpmqfJplir4KIGK38nW.mp3",
        ),
        guide(
            3,
            "Oh, c'est Touré! Vous cherchez la sortie? Viens, je t'y conduis.",
            "Kouassi%20Line%201-Q3aH0V9uAB7Cy1jcvMykrmUEZx47Mz.mp3",
        ),
        narrator(
            4,
            "Parfait. He's taking us to the exit. Hmm… he seems young, almost like a student. Ask him if he's also going to the University of Ghana at Legon. Remember: 'Est-ce que vous allez aussi à UG Legon ?' Allez-y.",
            "Lenoir%20Line%203-ZEYY754ZIfDo5IQNg6kHR0qm1u542u.mp3",
        ),
        user(
            5,
            "Ask if Kouassi is going to UG Legon too:",
            "Est-ce que vous allez aussi à UG Legon ?",
            "Ce n'est pas compliqué, Touré. Ask if he's going to UG Legon!",
            "Lenoir%20Line%204-QzuMwDyRO0vyahPVI5WoRjZYUeFcbG.mp3",
        ),
        guide(
            6,
            "Oui, je vais à UG. Je suis étudiant là-bas, étudiant de droit, de troisième année. Toi aussi, non? T'inquiète, je vais te faire voir le campus.",
            "Kouassi%20Line%202-OqehkGP0buOdLzyBE2e6oi3tbfwbE8.mp3",
        ),
        narrator(
            7,
            "Fantastique. A guide on campus, perfect for our mission. Thank him with: 'Merci beaucoup, c'est ma première fois au Ghana.'",
            "Lenoir%20Line%205-1ThUk6t0nWUUaibuez5xW7uY4sD3mG.mp3",
        ),
        user(
            8,
            "Thank him:",
            "Merci beaucoup, c'est ma première fois au Ghana.",
            "Pas le moment de rester muet, agent. Thank him!",
            "Lenoir%20Line%206-WMtDn6pKv5FlQ4peMTb1WJUJtxzOwO.mp3",
        ),
        guide(
            9,
            "Pas de problème! Maintenant, commandons un Bolt, je crois que j'ai encore une réduction dont je n'ai pas encore profité.",
            "Kouassi%20Line%203-tiZ9yWSEf8PzJ8aJVfFxvYolsZn1Is.mp3",
        ),
    ];

    let guides = vec![
        pronunciation(
            "Excusez-moi, je cherche la sortie.",
            "eks-kü-ZAY mwah, zhuh SHERSH lah sor-TEE",
            "Excuse me, I'm looking for the exit.",
            "excusez-moi-sortie.mp3",
        ),
        pronunciation(
            "Est-ce que vous allez aussi à UG Legon ?",
            "es-kuh voo zah-LAY oh-SEE ah ü-zhay luh-GOHN",
            "Are you also going to UG Legon?",
            "ug-legon-question.mp3",
        ),
        pronunciation(
            "Merci beaucoup, c'est ma première fois au Ghana.",
            "mer-SEE boh-KOO, say mah pruh-mee-YAIR fwah oh gah-NAH",
            "Thank you very much, it's my first time in Ghana.",
            "merci-premiere-fois.mp3",
        ),
    ];

    let cast = Cast {
        narrator: "Commandant Lenoir".to_string(),
        guide: "Kouassi".to_string(),
    };

    DialogueScript::new("Kotoka International Airport", cast, steps, guides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airport_scene_is_valid() {
        let script = airport_scene().unwrap();
        assert_eq!(script.len(), 9);
        assert_eq!(script.cast().display_name(Speaker::Guide), "Kouassi");
    }

    #[test]
    fn test_every_prompt_has_a_guide() {
        let script = airport_scene().unwrap();
        for step in script.steps().iter().filter(|s| s.is_user()) {
            let prompt = step.user_prompt.as_deref().unwrap();
            assert!(
                script.pronunciation(prompt).is_some(),
                "missing guide for {prompt}"
            );
        }
    }

    #[test]
    fn test_user_steps_alternate_with_narration() {
        let script = airport_scene().unwrap();
        let speakers: Vec<_> = script.steps().iter().map(|s| s.speaker).collect();
        assert_eq!(speakers[0], Speaker::Narrator);
        assert_eq!(speakers[1], Speaker::User);
        assert_eq!(speakers[8], Speaker::Guide);
        // 9 step clips minus 3 user steps, plus 3 fallbacks and 3 pronunciation clips
        assert_eq!(script.audio_refs().len(), 12);
    }
}
