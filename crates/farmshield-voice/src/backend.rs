//! Where recorded audio goes: one [`VoiceFeature`] per assistant, one
//! [`VoiceBackend`] to submit it.

use crate::audio::CapturedAudio;
use crate::error::VoiceResult;
use async_trait::async_trait;
use farmshield_core::{BackendClient, Upload, CHAT_VOICE_PATH, PEST_QUERY_VOICE_PATH};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The only things that differ between the voice assistants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceFeature {
    pub name: String,
    pub endpoint: String,
    /// JSON field holding the reply text.
    pub reply_field: String,
    pub upload_name: String,
    /// Shown (and speakable) when the submission fails.
    pub fallback_message: String,
}

impl VoiceFeature {
    /// Sahayak chat assistant.
    pub fn chat_assistant() -> Self {
        Self {
            name: "chat".to_string(),
            endpoint: CHAT_VOICE_PATH.to_string(),
            reply_field: "reply".to_string(),
            upload_name: "voice.mp3".to_string(),
            fallback_message: "Error analyzing voice. Try again.".to_string(),
        }
    }

    /// Spoken pest question on the scanner panel.
    pub fn pest_helpline() -> Self {
        Self {
            name: "pest".to_string(),
            endpoint: PEST_QUERY_VOICE_PATH.to_string(),
            reply_field: "solution".to_string(),
            upload_name: "query.mp3".to_string(),
            fallback_message: "Sorry, I couldn't connect to the server.".to_string(),
        }
    }
}

/// Turns a recording into reply text.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn submit(&self, feature: &VoiceFeature, audio: CapturedAudio) -> VoiceResult<String>;
}

/// Multipart upload to the FarmShield backend.
#[derive(Debug, Clone)]
pub struct HttpVoiceBackend {
    client: BackendClient,
}

impl HttpVoiceBackend {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VoiceBackend for HttpVoiceBackend {
    async fn submit(&self, feature: &VoiceFeature, audio: CapturedAudio) -> VoiceResult<String> {
        info!(
            target: "farmshield::voice",
            feature = %feature.name,
            bytes = audio.len(),
            "📤 submitting recording"
        );
        let upload = Upload::new(audio.bytes, feature.upload_name.clone(), audio.mime_type);
        let reply = match feature.endpoint.as_str() {
            CHAT_VOICE_PATH => self.client.chat_voice(upload).await?,
            PEST_QUERY_VOICE_PATH => self.client.pest_query_voice(upload).await?,
            other => {
                self.client
                    .submit_audio(other, &feature.reply_field, upload)
                    .await?
            }
        };
        Ok(reply)
    }
}
