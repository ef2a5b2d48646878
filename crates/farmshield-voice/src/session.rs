//! The record → analyze → respond → speak state machine.
//!
//! ```text
//!   idle ──start()──▶ recording ──stop()──▶ processing ──▶ result
//!    ▲                                           └──────▶ error
//!    └────────────── start() from result/error resets ──────┘
//!
//!   playback: silent ◀──toggle / natural end── speaking
//! ```
//!
//! Capture and playback are independent sub-machines sharing only the
//! result text. The session is owned by one view; two sessions never share
//! a microphone or a synthesizer lock.

use crate::audio::{CaptureGuard, CapturedAudio, Microphone};
use crate::backend::{VoiceBackend, VoiceFeature};
use crate::error::VoiceResult;
use crate::speech::{LanguagePolicy, SpeechSynthesizer, Utterance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Recording,
    Processing,
    Result,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playback {
    Silent,
    Speaking,
}

/// Emitted on every observable change of a session.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    PhaseChanged {
        phase: Phase,
        timestamp: DateTime<Utc>,
    },
    /// The microphone could not be acquired; the session stayed idle.
    CaptureRefused {
        reason: String,
    },
    ReplyReady {
        text: String,
    },
    /// Submission failed; `message` is the feature's fallback text.
    Failed {
        message: String,
        reason: String,
    },
    SpeechStarted {
        id: u64,
        language: String,
    },
    SpeechEnded {
        id: u64,
        cancelled: bool,
    },
}

struct ActiveUtterance {
    id: u64,
    text: String,
    finished: oneshot::Receiver<()>,
}

pub struct VoiceSession {
    feature: VoiceFeature,
    microphone: Arc<dyn Microphone>,
    backend: Arc<dyn VoiceBackend>,
    speech: Arc<dyn SpeechSynthesizer>,
    language: LanguagePolicy,

    phase: Phase,
    capture: Option<CaptureGuard>,
    captured: Option<CapturedAudio>,
    result_text: Option<String>,
    active: Option<ActiveUtterance>,
    next_utterance: u64,

    event_tx: mpsc::UnboundedSender<VoiceEvent>,
}

impl VoiceSession {
    /// Create an idle session and the receiver for its events.
    pub fn new(
        feature: VoiceFeature,
        microphone: Arc<dyn Microphone>,
        backend: Arc<dyn VoiceBackend>,
        speech: Arc<dyn SpeechSynthesizer>,
        language: LanguagePolicy,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            feature,
            microphone,
            backend,
            speech,
            language,
            phase: Phase::Idle,
            capture: None,
            captured: None,
            result_text: None,
            active: None,
            next_utterance: 1,
            event_tx,
        };
        (session, event_rx)
    }

    pub fn feature(&self) -> &VoiceFeature {
        &self.feature
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Reply text after `result`, or the fallback message after `error`.
    pub fn result_text(&self) -> Option<&str> {
        self.result_text.as_deref()
    }

    /// The last recording submitted.
    pub fn captured_audio(&self) -> Option<&CapturedAudio> {
        self.captured.as_ref()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(CaptureGuard::is_active)
    }

    /// Playback as last observed. Call [`sync_playback`](Self::sync_playback)
    /// first to pick up utterances that ended on their own.
    pub fn playback(&self) -> Playback {
        if self.active.is_some() {
            Playback::Speaking
        } else {
            Playback::Silent
        }
    }

    /// Begin recording. A no-op while already recording; from `result` or
    /// `error` the previous reply is discarded first. If the microphone is
    /// refused the session stays idle and the error is returned.
    pub async fn start(&mut self) -> VoiceResult<()> {
        match self.phase {
            Phase::Recording | Phase::Processing => {
                debug!(target: "farmshield::voice", feature = %self.feature.name, phase = ?self.phase, "start ignored");
                return Ok(());
            }
            Phase::Result | Phase::Error => self.reset(),
            Phase::Idle => {}
        }

        match self.microphone.acquire().await {
            Ok(stream) => {
                self.capture = Some(CaptureGuard::new(stream));
                info!(target: "farmshield::voice", feature = %self.feature.name, "🎙️ recording");
                self.set_phase(Phase::Recording);
                Ok(())
            }
            Err(e) => {
                warn!(target: "farmshield::voice", feature = %self.feature.name, error = %e, "microphone refused");
                self.emit(VoiceEvent::CaptureRefused {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Finish recording, release the microphone, and submit the audio.
    /// Only meaningful while recording; otherwise returns the current phase.
    pub async fn stop(&mut self) -> Phase {
        if self.phase != Phase::Recording {
            debug!(target: "farmshield::voice", feature = %self.feature.name, phase = ?self.phase, "stop ignored");
            return self.phase;
        }

        let audio = match self.capture.take() {
            Some(guard) => guard.finish(),
            None => Err(crate::error::VoiceError::AudioStream(
                "recording without a capture".to_string(),
            )),
        };
        self.set_phase(Phase::Processing);

        let outcome = match audio {
            Ok(audio) => {
                self.captured = Some(audio.clone());
                self.backend.submit(&self.feature, audio).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => {
                info!(target: "farmshield::voice", feature = %self.feature.name, chars = text.len(), "✅ reply received");
                self.result_text = Some(text.clone());
                self.emit(VoiceEvent::ReplyReady { text });
                self.set_phase(Phase::Result);
            }
            Err(e) => {
                warn!(target: "farmshield::voice", feature = %self.feature.name, error = %e, "voice submission failed");
                let message = self.feature.fallback_message.clone();
                self.result_text = Some(message.clone());
                self.emit(VoiceEvent::Failed {
                    message,
                    reason: e.to_string(),
                });
                self.set_phase(Phase::Error);
            }
        }
        self.phase
    }

    /// Speak `text`. Speaking the text that is already playing stops it;
    /// anything else cancels all current speech before starting.
    pub fn speak(&mut self, text: &str) -> VoiceResult<Playback> {
        self.sync_playback();

        if self.active.as_ref().is_some_and(|a| a.text == text) {
            self.cancel_speech();
            return Ok(Playback::Silent);
        }

        self.cancel_speech();
        if text.trim().is_empty() {
            return Ok(Playback::Silent);
        }

        let utterance = Utterance {
            id: self.next_utterance,
            text: text.to_string(),
            language: self.language.language_for(text),
        };
        self.next_utterance += 1;

        let handle = self.speech.speak(&utterance)?;
        debug!(target: "farmshield::speech", id = utterance.id, language = %utterance.language, "🔊 speaking");
        self.emit(VoiceEvent::SpeechStarted {
            id: utterance.id,
            language: utterance.language,
        });
        self.active = Some(ActiveUtterance {
            id: handle.id,
            text: utterance.text,
            finished: handle.finished,
        });
        Ok(Playback::Speaking)
    }

    /// Speak or stop the current result text.
    pub fn toggle_playback(&mut self) -> VoiceResult<Playback> {
        match self.result_text.clone() {
            Some(text) => self.speak(&text),
            None => {
                self.sync_playback();
                Ok(self.playback())
            }
        }
    }

    /// Notice an utterance that ended by itself.
    pub fn sync_playback(&mut self) -> Playback {
        let ended = match self.active.as_mut() {
            Some(active) => match active.finished.try_recv() {
                Ok(()) => Some(false),
                Err(oneshot::error::TryRecvError::Closed) => Some(true),
                Err(oneshot::error::TryRecvError::Empty) => None,
            },
            None => None,
        };
        if let Some(cancelled) = ended {
            self.finish_utterance(cancelled);
        }
        self.playback()
    }

    /// Wait for the current utterance, if any, to end.
    pub async fn wait_for_playback_end(&mut self) -> Playback {
        if let Some(active) = self.active.as_mut() {
            let cancelled = (&mut active.finished).await.is_err();
            self.finish_utterance(cancelled);
        }
        Playback::Silent
    }

    /// Back to idle: stop speech, release the microphone, forget the reply.
    pub fn reset(&mut self) {
        self.cancel_speech();
        if let Some(mut guard) = self.capture.take() {
            guard.release();
        }
        self.captured = None;
        self.result_text = None;
        if self.phase != Phase::Idle {
            self.set_phase(Phase::Idle);
        }
    }

    /// Tear down before the owning view goes away.
    pub fn close(&mut self) {
        debug!(target: "farmshield::voice", feature = %self.feature.name, "session closed");
        self.reset();
    }

    fn cancel_speech(&mut self) {
        self.speech.cancel_all();
        if self.active.is_some() {
            self.finish_utterance(true);
        }
    }

    fn finish_utterance(&mut self, cancelled: bool) {
        if let Some(active) = self.active.take() {
            debug!(target: "farmshield::speech", id = active.id, cancelled, "utterance ended");
            self.emit(VoiceEvent::SpeechEnded {
                id: active.id,
                cancelled,
            });
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.emit(VoiceEvent::PhaseChanged {
            phase,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: VoiceEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.speech.cancel_all();
        }
        if let Some(mut guard) = self.capture.take() {
            guard.release();
        }
    }
}
