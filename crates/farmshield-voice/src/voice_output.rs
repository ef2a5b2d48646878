//! **SinkSpeech**: real speech output.
//!
//! Text is synthesized by an OpenAI-compatible `/audio/speech` endpoint and
//! played through a `rodio::Sink`. The output stream is not `Send`, so a
//! dedicated playback thread owns it and takes commands over a channel.
//! Cancelling drops the sink and builds a fresh one so nothing queued survives.

use crate::error::{VoiceError, VoiceResult};
use crate::speech::{SpeechSynthesizer, Utterance, UtteranceHandle, HINDI_INDIA};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Turns text into encoded audio (WAV/MP3). Empty output means "nothing to play".
pub trait TtsBackend: Send + Sync {
    fn synthesize(&self, text: &str, language: &str) -> VoiceResult<Vec<u8>>;
}

/// OpenAI-compatible TTS. Reads `TTS_API_URL` (default https://api.openai.com/v1),
/// `TTS_API_KEY`, `TTS_MODEL` (default tts-1), and optionally `TTS_VOICE` and
/// `TTS_VOICE_HI` for the Hindi voice.
#[derive(Debug, Clone)]
pub struct HttpTts {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    /// Voice used for `hi-IN` utterances.
    pub hindi_voice: String,
    client: reqwest::blocking::Client,
}

impl HttpTts {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .map_err(|_| VoiceError::Config("speech output requires TTS_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let mut tts = Self::new(base_url, api_key, model)?;
        if let Ok(voice) = std::env::var("TTS_VOICE") {
            tts.voice = voice;
        }
        if let Ok(voice) = std::env::var("TTS_VOICE_HI") {
            tts.hindi_voice = voice;
        }
        Ok(tts)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Speech(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: "alloy".to_string(),
            hindi_voice: "shimmer".to_string(),
            client,
        })
    }

    fn voice_for(&self, language: &str) -> &str {
        if language.eq_ignore_ascii_case(HINDI_INDIA) {
            &self.hindi_voice
        } else {
            &self.voice
        }
    }
}

impl TtsBackend for HttpTts {
    fn synthesize(&self, text: &str, language: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice_for(language),
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Speech(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Speech(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Speech(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

enum Command {
    Speak {
        utterance: Utterance,
        done: oneshot::Sender<()>,
    },
    CancelAll,
}

/// Speech synthesizer backed by a TTS service and the default output device.
pub struct SinkSpeech {
    commands: Mutex<mpsc::Sender<Command>>,
}

impl SinkSpeech {
    /// Open the default output device on a new playback thread.
    pub fn new(tts: Arc<dyn TtsBackend>) -> VoiceResult<Self> {
        let (tx, rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();

        std::thread::Builder::new()
            .name("farmshield-speech".to_string())
            .spawn(move || playback_loop(tts, rx, ready_tx))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("playback thread exited".to_string()))??;
        info!(target: "farmshield::speech", "🔊 speech output ready");
        Ok(Self {
            commands: Mutex::new(tx),
        })
    }

    fn send(&self, command: Command) -> VoiceResult<()> {
        let tx = self
            .commands
            .lock()
            .map_err(|_| VoiceError::Playback("command channel poisoned".to_string()))?;
        tx.send(command)
            .map_err(|_| VoiceError::Playback("playback thread stopped".to_string()))
    }
}

impl SpeechSynthesizer for SinkSpeech {
    fn speak(&self, utterance: &Utterance) -> VoiceResult<UtteranceHandle> {
        let (done, finished) = oneshot::channel();
        self.send(Command::Speak {
            utterance: utterance.clone(),
            done,
        })?;
        Ok(UtteranceHandle {
            id: utterance.id,
            finished,
        })
    }

    fn cancel_all(&self) {
        if let Err(e) = self.send(Command::CancelAll) {
            warn!(target: "farmshield::speech", error = %e, "cancel not delivered");
        }
    }
}

fn new_sink(handle: &OutputStreamHandle) -> VoiceResult<Sink> {
    Sink::try_new(handle).map_err(|e| VoiceError::Playback(e.to_string()))
}

fn playback_loop(
    tts: Arc<dyn TtsBackend>,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::Sender<VoiceResult<()>>,
) {
    let opened = OutputStream::try_default()
        .map_err(|e| VoiceError::Playback(e.to_string()))
        .and_then(|(stream, handle)| new_sink(&handle).map(|sink| (stream, handle, sink)));
    let (_stream, handle, mut sink) = match opened {
        Ok(parts) => {
            let _ = ready.send(Ok(()));
            parts
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Completion sender for whatever is in the sink right now.
    let mut playing: Option<oneshot::Sender<()>> = None;

    loop {
        match commands.recv_timeout(Duration::from_millis(50)) {
            Ok(Command::Speak { utterance, done }) => {
                if playing.take().is_some() {
                    sink.stop();
                    sink = match new_sink(&handle) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(target: "farmshield::speech", error = %e, "sink lost");
                            return;
                        }
                    };
                }
                match tts.synthesize(&utterance.text, &utterance.language) {
                    Ok(bytes) if bytes.is_empty() => {
                        let _ = done.send(());
                    }
                    Ok(bytes) => match rodio::Decoder::new(Cursor::new(bytes)) {
                        Ok(source) => {
                            sink.append(source.convert_samples::<f32>());
                            playing = Some(done);
                        }
                        Err(e) => {
                            warn!(target: "farmshield::speech", id = utterance.id, "Decode failed: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!(target: "farmshield::speech", id = utterance.id, error = %e, "synthesis failed");
                    }
                }
            }
            Ok(Command::CancelAll) => {
                if playing.take().is_some() {
                    sink.stop();
                    sink = match new_sink(&handle) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(target: "farmshield::speech", error = %e, "sink lost");
                            return;
                        }
                    };
                    info!(target: "farmshield::speech", "⏹️ speech cancelled");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if playing.is_some() && sink.empty() {
                    if let Some(done) = playing.take() {
                        let _ = done.send(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hindi_utterances_use_the_hindi_voice() {
        let mut tts = HttpTts::new("http://localhost:9", "key", "tts-1").unwrap();
        tts.hindi_voice = "nova".to_string();
        assert_eq!(tts.voice_for("hi-IN"), "nova");
        assert_eq!(tts.voice_for("en-IN"), "alloy");
    }

    #[test]
    fn empty_text_skips_the_request() {
        let tts = HttpTts::new("http://localhost:9", "key", "tts-1").unwrap();
        assert!(tts.synthesize("   ", "en-IN").unwrap().is_empty());
    }
}
