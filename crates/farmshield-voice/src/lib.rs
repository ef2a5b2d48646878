//! # FarmShield Voice
//!
//! One reusable voice session for both spoken assistants (chat and pest
//! helpline). Only the backend endpoint and the reply wording differ.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VoiceSession                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │  Microphone  │ → │ CaptureGuard │ → │ VoiceBackend │  │
//! │  │ (cpal/fake)  │   │ (release!)   │   │ (/api/...)   │  │
//! │  └──────────────┘   └──────────────┘   └──────────────┘  │
//! │                                               ↓          │
//! │  ┌────────────────────┐   cancel-all   ┌──────────────┐  │
//! │  │ SpeechSynthesizer  │ ←───────────── │  resultText  │  │
//! │  │ (rodio/placeholder)│                └──────────────┘  │
//! │  └────────────────────┘                                  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod backend;
pub mod error;
pub mod session;
pub mod speech;
#[cfg(feature = "native-audio")]
pub mod voice_output;

pub use audio::{
    pcm_f32_to_wav, CaptureGuard, CapturedAudio, Microphone, MicrophoneStream,
    UnavailableMicrophone,
};
#[cfg(feature = "native-audio")]
pub use audio::CpalMicrophone;
pub use backend::{HttpVoiceBackend, VoiceBackend, VoiceFeature};
pub use error::{VoiceError, VoiceResult};
pub use session::{Phase, Playback, VoiceEvent, VoiceSession};
pub use speech::{
    detect_language, LanguagePolicy, PlaceholderSpeech, SpeechSynthesizer, Utterance,
    UtteranceHandle, ENGLISH_INDIA, HINDI_INDIA,
};
#[cfg(feature = "native-audio")]
pub use voice_output::{HttpTts, SinkSpeech, TtsBackend};
