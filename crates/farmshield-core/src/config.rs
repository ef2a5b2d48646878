//! Client configuration loaded from TOML and environment.
//!
//! Precedence: env `FARMSHIELD__*` > file named by `FARMSHIELD_CONFIG`
//! (default `config/farmshield.toml`, optional) > built-in defaults.

use crate::context::Coordinates;
use crate::error::FarmResult;
use config::builder::{ConfigBuilder, DefaultState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_STATE: &str = "Madhya Pradesh";

/// Client configuration.
///
/// | Key | Env | Default |
/// |-----|-----|---------|
/// | backend_url | FARMSHIELD__BACKEND_URL | http://127.0.0.1:8000 |
/// | geocoder_url | FARMSHIELD__GEOCODER_URL | https://nominatim.openstreetmap.org |
/// | user_agent | FARMSHIELD__USER_AGENT | FarmShield/0.1 |
/// | request_timeout_secs | FARMSHIELD__REQUEST_TIMEOUT_SECS | 0 (no timeout) |
/// | locale | FARMSHIELD__LOCALE | en |
/// | speech_locale | FARMSHIELD__SPEECH_LOCALE | unset (detect from script) |
/// | default_state | FARMSHIELD__DEFAULT_STATE | Madhya Pradesh |
/// | latitude / longitude | FARMSHIELD__LATITUDE / FARMSHIELD__LONGITUDE | unset |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    pub backend_url: String,
    pub geocoder_url: String,
    pub user_agent: String,
    /// Zero disables the per-request timeout.
    #[serde(default)]
    pub request_timeout_secs: u64,
    pub locale: String,
    /// Fixed voice for speech output (e.g. "hi-IN"). Unset means pick by script.
    #[serde(default)]
    pub speech_locale: Option<String>,
    pub default_state: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: default_user_agent(),
            request_timeout_secs: 0,
            locale: "en".to_string(),
            speech_locale: None,
            default_state: DEFAULT_STATE.to_string(),
            latitude: None,
            longitude: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("FarmShield/{}", env!("CARGO_PKG_VERSION"))
}

impl FarmConfig {
    /// Load config from file and environment.
    pub fn load() -> FarmResult<Self> {
        let config_path =
            std::env::var("FARMSHIELD_CONFIG").unwrap_or_else(|_| "config/farmshield".to_string());
        let built = Self::defaults()?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("FARMSHIELD").separator("__"))
            .build()?;

        let loaded: Self = built.try_deserialize()?;
        tracing::debug!(
            target: "farmshield::config",
            backend = %loaded.backend_url,
            locale = %loaded.locale,
            "configuration loaded"
        );
        Ok(loaded)
    }

    /// Parse a TOML document on top of the defaults (used by tests and embedders).
    pub fn from_toml_str(raw: &str) -> FarmResult<Self> {
        let built = Self::defaults()?
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        Ok(built.try_deserialize()?)
    }

    fn defaults() -> FarmResult<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder()
            .set_default("backend_url", DEFAULT_BACKEND_URL)?
            .set_default("geocoder_url", DEFAULT_GEOCODER_URL)?
            .set_default("user_agent", default_user_agent())?
            .set_default("request_timeout_secs", 0_i64)?
            .set_default("locale", "en")?
            .set_default("default_state", DEFAULT_STATE)?)
    }

    /// Per-request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Device position for hosts without a real location sensor.
    pub fn device_position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let cfg = FarmConfig::default();
        assert_eq!(cfg.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(cfg.request_timeout(), None);
        assert!(cfg.device_position().is_none());
        assert!(cfg.user_agent.starts_with("FarmShield/"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = FarmConfig::from_toml_str(
            r#"
            backend_url = "http://10.0.0.2:8000"
            request_timeout_secs = 15
            speech_locale = "hi-IN"
            latitude = 23.1
            longitude = 77.4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend_url, "http://10.0.0.2:8000");
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(cfg.speech_locale.as_deref(), Some("hi-IN"));
        assert_eq!(cfg.locale, "en");
        let pos = cfg.device_position().unwrap();
        assert!((pos.latitude - 23.1).abs() < 1e-9);
    }

    #[test]
    fn half_a_position_is_no_position() {
        let cfg = FarmConfig {
            latitude: Some(23.1),
            ..Default::default()
        };
        assert!(cfg.device_position().is_none());
    }
}
