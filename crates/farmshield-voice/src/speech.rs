//! Speech output: language choice, utterances, and the synthesizer seam.

use crate::error::VoiceResult;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

pub const HINDI_INDIA: &str = "hi-IN";
pub const ENGLISH_INDIA: &str = "en-IN";

/// Any Devanagari character selects the Hindi voice; otherwise Indian English.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        HINDI_INDIA
    } else {
        ENGLISH_INDIA
    }
}

/// How an utterance's language is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguagePolicy {
    /// Sniff the script of the text.
    #[default]
    Detect,
    /// Always use this BCP-47 tag (e.g. from the `speech_locale` setting).
    Fixed(String),
}

impl LanguagePolicy {
    /// `Fixed` for a configured locale, `Detect` when unset or blank.
    pub fn from_setting(locale: Option<&str>) -> Self {
        match locale.map(str::trim) {
            Some(tag) if !tag.is_empty() => LanguagePolicy::Fixed(tag.to_string()),
            _ => LanguagePolicy::Detect,
        }
    }

    pub fn language_for(&self, text: &str) -> String {
        match self {
            LanguagePolicy::Detect => detect_language(text).to_string(),
            LanguagePolicy::Fixed(tag) => tag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub language: String,
}

/// A started utterance. `finished` resolves `Ok(())` on natural end; the
/// sender is dropped when the utterance is cancelled.
#[derive(Debug)]
pub struct UtteranceHandle {
    pub id: u64,
    pub finished: oneshot::Receiver<()>,
}

/// Text-to-speech output device.
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking. Must not block until the utterance ends.
    fn speak(&self, utterance: &Utterance) -> VoiceResult<UtteranceHandle>;

    /// Silence every utterance this synthesizer has started.
    fn cancel_all(&self);
}

/// Synthesizer for hosts without audio output: every utterance ends at once.
#[derive(Debug, Default)]
pub struct PlaceholderSpeech;

impl SpeechSynthesizer for PlaceholderSpeech {
    fn speak(&self, utterance: &Utterance) -> VoiceResult<UtteranceHandle> {
        debug!(
            target: "farmshield::speech",
            id = utterance.id,
            language = %utterance.language,
            "no speech output, skipping utterance"
        );
        let (tx, finished) = oneshot::channel();
        let _ = tx.send(());
        Ok(UtteranceHandle {
            id: utterance.id,
            finished,
        })
    }

    fn cancel_all(&self) {}
}
