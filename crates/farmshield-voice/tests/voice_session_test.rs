//! Integration tests for the voice session state machine.
//!
//! Microphone, backend, and speech output are in-process fakes, so these run
//! without audio hardware or a backend.

use async_trait::async_trait;
use farmshield_voice::{
    CapturedAudio, LanguagePolicy, Microphone, MicrophoneStream, Phase, Playback,
    SpeechSynthesizer, Utterance, UtteranceHandle, VoiceBackend, VoiceError, VoiceEvent,
    VoiceFeature, VoiceResult, VoiceSession, HINDI_INDIA,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_test::{assert_err, assert_ok};

#[derive(Default)]
struct FakeMicrophone {
    refuse: bool,
    /// Streams lose the device before `finish`.
    unplug: bool,
    acquisitions: AtomicUsize,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn acquire(&self) -> VoiceResult<Box<dyn MicrophoneStream>> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(VoiceError::MicrophonePermissionDenied);
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            active: self.active.clone(),
            released: false,
            unplugged: self.unplug,
        }))
    }
}

struct FakeStream {
    active: Arc<AtomicUsize>,
    released: bool,
    unplugged: bool,
}

impl MicrophoneStream for FakeStream {
    fn finish(&mut self) -> VoiceResult<CapturedAudio> {
        if self.unplugged {
            return Err(VoiceError::AudioStream("device unplugged".to_string()));
        }
        Ok(CapturedAudio::from_chunks(
            vec![b"chunk-1".to_vec(), b"chunk-2".to_vec()],
            "audio/webm",
        ))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct FakeBackend {
    reply: Result<String, String>,
    submissions: Mutex<Vec<(String, usize)>>,
}

impl FakeBackend {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err("connection refused".to_string()),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    async fn submit(&self, feature: &VoiceFeature, audio: CapturedAudio) -> VoiceResult<String> {
        self.submissions
            .lock()
            .unwrap()
            .push((feature.endpoint.clone(), audio.len()));
        self.reply.clone().map_err(VoiceError::Backend)
    }
}

/// Keeps every started utterance alive until cancelled or finished by the test.
#[derive(Default)]
struct FakeSpeech {
    live: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    max_live: AtomicUsize,
    log: Mutex<Vec<String>>,
    languages: Mutex<Vec<String>>,
}

impl FakeSpeech {
    fn finish_naturally(&self, id: u64) {
        if let Some(done) = self.live.lock().unwrap().remove(&id) {
            let _ = done.send(());
        }
    }

    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SpeechSynthesizer for FakeSpeech {
    fn speak(&self, utterance: &Utterance) -> VoiceResult<UtteranceHandle> {
        let (done, finished) = oneshot::channel();
        let mut live = self.live.lock().unwrap();
        live.insert(utterance.id, done);
        self.max_live.fetch_max(live.len(), Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("speak:{}", utterance.text));
        self.languages.lock().unwrap().push(utterance.language.clone());
        Ok(UtteranceHandle {
            id: utterance.id,
            finished,
        })
    }

    fn cancel_all(&self) {
        self.live.lock().unwrap().clear();
        self.log.lock().unwrap().push("cancel_all".to_string());
    }
}

struct Harness {
    session: VoiceSession,
    events: mpsc::UnboundedReceiver<VoiceEvent>,
    microphone: Arc<FakeMicrophone>,
    backend: Arc<FakeBackend>,
    speech: Arc<FakeSpeech>,
}

fn harness(feature: VoiceFeature, microphone: FakeMicrophone, backend: FakeBackend) -> Harness {
    let microphone = Arc::new(microphone);
    let backend = Arc::new(backend);
    let speech = Arc::new(FakeSpeech::default());
    let (session, events) = VoiceSession::new(
        feature,
        microphone.clone(),
        backend.clone(),
        speech.clone(),
        LanguagePolicy::Detect,
    );
    Harness {
        session,
        events,
        microphone,
        backend,
        speech,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<VoiceEvent>) -> Vec<VoiceEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn second_start_is_a_no_op() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("ok"),
    );
    assert_ok!(h.session.start().await);
    assert_ok!(h.session.start().await);

    assert_eq!(h.session.phase(), Phase::Recording);
    assert_eq!(h.microphone.acquisitions.load(Ordering::SeqCst), 1);
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 1);
    assert!(h.session.is_capturing());
}

#[tokio::test]
async fn reply_lands_in_result_with_microphone_released() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("farmshield=debug")
        .with_test_writer()
        .try_init();

    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("Irrigate in the evening."),
    );
    h.session.start().await.unwrap();
    let phase = h.session.stop().await;

    assert_eq!(phase, Phase::Result);
    assert_eq!(h.session.result_text(), Some("Irrigate in the evening."));
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.backend.submissions.lock().unwrap().as_slice(),
        &[("/api/chat-voice".to_string(), 14)]
    );
    assert_eq!(h.session.captured_audio().map(CapturedAudio::len), Some(14));

    let phases: Vec<Phase> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            VoiceEvent::PhaseChanged { phase, .. } => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![Phase::Recording, Phase::Processing, Phase::Result]);
}

#[tokio::test]
async fn lost_device_during_recording_goes_to_error_without_submitting() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone {
            unplug: true,
            ..Default::default()
        },
        FakeBackend::replying("never sent"),
    );
    h.session.start().await.unwrap();
    assert_eq!(h.session.stop().await, Phase::Error);

    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 0);
    assert!(!h.session.is_capturing());
    assert!(h.session.captured_audio().is_none());
    assert!(h.backend.submissions.lock().unwrap().is_empty());
    assert_eq!(
        h.session.result_text(),
        Some(VoiceFeature::chat_assistant().fallback_message.as_str())
    );
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, VoiceEvent::Failed { reason, .. } if reason.contains("unplugged"))));
}

#[tokio::test]
async fn failed_backend_goes_to_error_and_releases_microphone() {
    let mut h = harness(
        VoiceFeature::pest_helpline(),
        FakeMicrophone::default(),
        FakeBackend::failing(),
    );
    h.session.start().await.unwrap();
    assert_eq!(h.session.stop().await, Phase::Error);

    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.session.result_text(),
        Some(VoiceFeature::pest_helpline().fallback_message.as_str())
    );
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, VoiceEvent::Failed { reason, .. } if reason.contains("connection refused"))));

    // Next start needs only a fresh acquisition.
    h.session.start().await.unwrap();
    assert_eq!(h.session.phase(), Phase::Recording);
    assert_eq!(h.microphone.acquisitions.load(Ordering::SeqCst), 2);
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refused_microphone_surfaces_and_stays_idle() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone {
            refuse: true,
            ..Default::default()
        },
        FakeBackend::replying("unused"),
    );
    let err = assert_err!(h.session.start().await);
    assert!(matches!(err, VoiceError::MicrophonePermissionDenied));
    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.stop().await, Phase::Idle);
    assert!(h.backend.submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn new_utterance_cancels_the_running_one_first() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("unused"),
    );
    assert_eq!(h.session.speak("first answer").unwrap(), Playback::Speaking);
    assert_eq!(h.session.speak("second answer").unwrap(), Playback::Speaking);

    assert_eq!(
        h.speech.log(),
        vec![
            "cancel_all".to_string(),
            "speak:first answer".to_string(),
            "cancel_all".to_string(),
            "speak:second answer".to_string(),
        ]
    );
    assert_eq!(h.speech.max_live.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.live_count(), 1);

    // Same text again toggles off.
    assert_eq!(h.session.speak("second answer").unwrap(), Playback::Silent);
    assert_eq!(h.speech.live_count(), 0);
    assert_eq!(h.session.playback(), Playback::Silent);
}

#[tokio::test]
async fn toggle_playback_speaks_and_silences_the_result() {
    let mut h = harness(
        VoiceFeature::pest_helpline(),
        FakeMicrophone::default(),
        FakeBackend::replying("नीम का तेल छिड़कें"),
    );
    h.session.start().await.unwrap();
    h.session.stop().await;

    assert_eq!(h.session.toggle_playback().unwrap(), Playback::Speaking);
    assert_eq!(h.speech.languages.lock().unwrap().as_slice(), &[HINDI_INDIA.to_string()]);
    assert_eq!(h.session.toggle_playback().unwrap(), Playback::Silent);
    assert_eq!(h.speech.live_count(), 0);
}

#[tokio::test]
async fn natural_end_returns_to_silent() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("unused"),
    );
    h.session.speak("Spray neem oil at dusk.").unwrap();
    assert_eq!(h.session.sync_playback(), Playback::Speaking);

    h.speech.finish_naturally(1);
    assert_eq!(h.session.sync_playback(), Playback::Silent);
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, VoiceEvent::SpeechEnded { id: 1, cancelled: false })));

    h.session.speak("Check again tomorrow.").unwrap();
    h.speech.finish_naturally(2);
    assert_eq!(h.session.wait_for_playback_end().await, Playback::Silent);
    assert_eq!(h.session.playback(), Playback::Silent);
}

#[tokio::test]
async fn restarting_from_result_discards_reply_and_speech() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("Sow soybean after the first rains."),
    );
    h.session.start().await.unwrap();
    h.session.stop().await;
    h.session.toggle_playback().unwrap();
    assert_eq!(h.speech.live_count(), 1);

    h.session.start().await.unwrap();
    assert_eq!(h.session.phase(), Phase::Recording);
    assert!(h.session.result_text().is_none());
    assert_eq!(h.session.playback(), Playback::Silent);
    assert_eq!(h.speech.live_count(), 0);
}

#[tokio::test]
async fn close_and_drop_release_everything() {
    let mut h = harness(
        VoiceFeature::chat_assistant(),
        FakeMicrophone::default(),
        FakeBackend::replying("unused"),
    );
    h.session.start().await.unwrap();
    h.session.speak("still talking").unwrap();
    h.session.close();

    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 0);
    assert_eq!(h.speech.live_count(), 0);

    h.session.start().await.unwrap();
    assert_eq!(h.microphone.active.load(Ordering::SeqCst), 1);
    let microphone = h.microphone.clone();
    drop(h);
    assert_eq!(microphone.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sessions_hold_independent_microphones() {
    let microphone = Arc::new(FakeMicrophone::default());
    let speech = Arc::new(FakeSpeech::default());
    let (mut chat, _chat_events) = VoiceSession::new(
        VoiceFeature::chat_assistant(),
        microphone.clone(),
        Arc::new(FakeBackend::replying("chat")),
        speech.clone(),
        LanguagePolicy::Detect,
    );
    let (mut pest, _pest_events) = VoiceSession::new(
        VoiceFeature::pest_helpline(),
        microphone.clone(),
        Arc::new(FakeBackend::replying("pest")),
        speech.clone(),
        LanguagePolicy::Fixed("en-IN".to_string()),
    );

    chat.start().await.unwrap();
    pest.start().await.unwrap();
    assert_eq!(microphone.active.load(Ordering::SeqCst), 2);

    assert_eq!(pest.stop().await, Phase::Result);
    assert_eq!(chat.phase(), Phase::Recording);
    assert_eq!(microphone.active.load(Ordering::SeqCst), 1);
}
