//! Error types for FarmShield voice sessions

use farmshield_core::{Capability, FarmError};
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while capturing, submitting, or speaking
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied")]
    MicrophonePermissionDenied,

    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Incomplete response: {0}")]
    IncompleteResponse(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FarmError> for VoiceError {
    fn from(err: FarmError) -> Self {
        match err {
            FarmError::PermissionDenied(Capability::Microphone) => VoiceError::MicrophonePermissionDenied,
            FarmError::PermissionDenied(other) => VoiceError::Config(format!("permission denied: {}", other)),
            FarmError::Unsupported(Capability::SpeechSynthesis) => {
                VoiceError::Speech("speech synthesis not supported".to_string())
            }
            FarmError::Unsupported(other) => VoiceError::MicrophoneUnavailable(other.to_string()),
            FarmError::Network(msg) => VoiceError::Backend(msg),
            FarmError::IncompleteResponse(msg) => VoiceError::IncompleteResponse(msg),
            FarmError::Config(msg) => VoiceError::Config(msg),
        }
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::MicrophoneUnavailable(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                VoiceError::MicrophoneUnavailable(err.to_string())
            }
            other => VoiceError::AudioStream(other.to_string()),
        }
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}
