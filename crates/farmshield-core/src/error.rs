//! Error types for the FarmShield client core

use std::fmt;
use thiserror::Error;

/// Result type alias for core operations
pub type FarmResult<T> = Result<T, FarmError>;

/// Device capability a permission or support failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Geolocation,
    Microphone,
    SpeechSynthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Geolocation => "geolocation",
            Capability::Microphone => "microphone",
            Capability::SpeechSynthesis => "speech synthesis",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while talking to the device or the backend.
///
/// None of these are fatal: the cache and the views turn each one into a
/// sentinel value (placeholder label, `denied` status, inline message).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FarmError {
    #[error("Permission denied: {0}")]
    PermissionDenied(Capability),

    #[error("Not supported on this device: {0}")]
    Unsupported(Capability),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Incomplete response: {0}")]
    IncompleteResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FarmError {
    /// True for failures that a later attempt could plausibly fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FarmError::Network(_))
    }
}

impl From<reqwest::Error> for FarmError {
    fn from(err: reqwest::Error) -> Self {
        FarmError::Network(err.to_string())
    }
}

impl From<config::ConfigError> for FarmError {
    fn from(err: config::ConfigError) -> Self {
        FarmError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(FarmError::Network("down".into()).is_retryable());
        assert!(!FarmError::IncompleteResponse("no crops".into()).is_retryable());
        assert!(!FarmError::PermissionDenied(Capability::Geolocation).is_retryable());
    }

    #[test]
    fn messages_name_the_capability() {
        let err = FarmError::Unsupported(Capability::Microphone);
        assert_eq!(err.to_string(), "Not supported on this device: microphone");
    }
}
