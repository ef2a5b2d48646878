//! HTTP client for the FarmShield backend.
//!
//! Every endpoint answers JSON. A non-2xx status or a body carrying `error`
//! is a [`FarmError::Network`]; a body that parses but lacks the fields we
//! need is a [`FarmError::IncompleteResponse`].

use crate::config::FarmConfig;
use crate::context::{Coordinates, WeatherSource};
use crate::error::{FarmError, FarmResult};
use crate::market::MandiRate;
use crate::weather::WeatherReport;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Body of `POST /api/recommend`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RecommendQuery {
    At(Coordinates),
    Named { location_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSuggestion {
    pub name: String,
    #[serde(default)]
    pub water_need: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub soil_type: String,
    #[serde(default)]
    pub soil_characteristics: String,
    pub crops: Vec<CropSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestDiagnosis {
    pub diagnosis: String,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub remedy: Vec<String>,
}

/// A file sent as the multipart `file` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl Upload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    language: &'a str,
}

#[derive(Serialize)]
struct PestQueryRequest<'a> {
    query: &'a str,
    language: &'a str,
}

/// Voice upload for the chat assistant; the reply is in `reply`.
pub const CHAT_VOICE_PATH: &str = "/api/chat-voice";
/// Spoken pest question; the answer is in `solution`.
pub const PEST_QUERY_VOICE_PATH: &str = "/api/pest-query-voice";

/// Client for the `/api/*` endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &FarmConfig) -> FarmResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FarmError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn recommend(&self, query: &RecommendQuery) -> FarmResult<CropRecommendation> {
        let value = self.post_json("/api/recommend", query).await?;
        decode(value, "recommend")
    }

    pub async fn weather(&self, coordinates: Coordinates) -> FarmResult<WeatherReport> {
        let value = self.post_json("/api/weather", &coordinates).await?;
        decode(value, "weather")
    }

    pub async fn chat(&self, message: &str, language: &str) -> FarmResult<String> {
        let value = self
            .post_json("/api/chat", &ChatRequest { message, language })
            .await?;
        text_field(&value, "reply")
    }

    pub async fn chat_voice(&self, audio: Upload) -> FarmResult<String> {
        self.submit_audio(CHAT_VOICE_PATH, "reply", audio).await
    }

    pub async fn pest_scan(&self, image: Upload) -> FarmResult<PestDiagnosis> {
        let value = self.post_file("/api/pest-scan", image).await?;
        decode(value, "pest-scan")
    }

    pub async fn pest_query(&self, query: &str, language: &str) -> FarmResult<String> {
        let value = self
            .post_json("/api/pest-query", &PestQueryRequest { query, language })
            .await?;
        text_field(&value, "solution")
    }

    pub async fn pest_query_voice(&self, audio: Upload) -> FarmResult<String> {
        self.submit_audio(PEST_QUERY_VOICE_PATH, "solution", audio).await
    }

    pub async fn mandi(&self, state: &str) -> FarmResult<Vec<MandiRate>> {
        debug!(target: "farmshield::api", state, "GET /api/mandi");
        let response = self
            .client
            .get(self.url("/api/mandi"))
            .query(&[("state", state)])
            .send()
            .await?;
        let value = read_body(response, "mandi").await?;
        decode(value, "mandi")
    }

    /// Upload recorded audio and pull the string in `field` out of the reply.
    pub async fn submit_audio(&self, path: &str, field: &str, audio: Upload) -> FarmResult<String> {
        let value = self.post_file(path, audio).await?;
        text_field(&value, field)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> FarmResult<Value> {
        debug!(target: "farmshield::api", path, "POST json");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_body(response, path).await
    }

    async fn post_file(&self, path: &str, upload: Upload) -> FarmResult<Value> {
        debug!(
            target: "farmshield::api",
            path,
            bytes = upload.bytes.len(),
            file = %upload.file_name,
            "POST multipart"
        );
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| FarmError::Config(format!("mime type: {}", e)))?;
        let form = Form::new().part("file", part);
        let response = self.client.post(self.url(path)).multipart(form).send().await?;
        read_body(response, path).await
    }
}

#[async_trait]
impl WeatherSource for BackendClient {
    async fn weather_code(&self, coordinates: Coordinates) -> FarmResult<i32> {
        let value = self.post_json("/api/weather", &coordinates).await?;
        code_field(&value)
    }
}

async fn read_body(response: reqwest::Response, what: &str) -> FarmResult<Value> {
    let status = response.status();
    let raw = response.text().await?;
    if !status.is_success() {
        warn!(target: "farmshield::api", what, %status, "backend returned an error status");
        return Err(FarmError::Network(format!("{}: HTTP {}", what, status)));
    }
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| FarmError::IncompleteResponse(format!("{}: unparsable body: {}", what, e)))?;
    check_error(value, what)
}

/// Turn an `{"error": ...}` payload into a network error.
pub(crate) fn check_error(value: Value, what: &str) -> FarmResult<Value> {
    match value.get("error") {
        Some(err) if !err.is_null() => {
            let message = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            warn!(target: "farmshield::api", what, error = %message, "backend reported an error");
            Err(FarmError::Network(format!("{}: {}", what, message)))
        }
        _ => Ok(value),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> FarmResult<T> {
    serde_json::from_value(value).map_err(|e| FarmError::IncompleteResponse(format!("{}: {}", what, e)))
}

pub(crate) fn text_field(value: &Value, field: &str) -> FarmResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FarmError::IncompleteResponse(format!("missing `{}`", field)))
}

/// Current `weather_code` only; the forecast arrays are not looked at.
pub(crate) fn code_field(value: &Value) -> FarmResult<i32> {
    value
        .get("weather_code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| FarmError::IncompleteResponse("weather: missing `weather_code`".into()))
}
