//! Microphone capture.
//!
//! A [`Microphone`] hands out one exclusive [`MicrophoneStream`] per
//! acquisition. The session wraps it in a [`CaptureGuard`] so the device is
//! released on every way out of recording: finish, reset, or drop.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Audio recorded between `start()` and `stop()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedAudio {
    /// Concatenate captured chunks into one buffer.
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: chunks.concat(),
            mime_type: mime_type.into(),
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of exclusive microphone streams.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Acquire the device. Refusal is `MicrophonePermissionDenied`.
    async fn acquire(&self) -> VoiceResult<Box<dyn MicrophoneStream>>;
}

/// A live capture.
pub trait MicrophoneStream: Send {
    /// Stop capturing and return everything recorded so far.
    fn finish(&mut self) -> VoiceResult<CapturedAudio>;

    /// Stop the device tracks. Must be safe to call more than once.
    fn release(&mut self);
}

/// Owns a stream while recording and releases it exactly once.
pub struct CaptureGuard {
    stream: Option<Box<dyn MicrophoneStream>>,
}

impl CaptureGuard {
    pub fn new(stream: Box<dyn MicrophoneStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Collect the recording. The stream is released whether or not this succeeds.
    pub fn finish(mut self) -> VoiceResult<CapturedAudio> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| VoiceError::AudioStream("capture already finished".to_string()))?;
        let audio = stream.finish();
        stream.release();
        debug!(target: "farmshield::voice", ok = audio.is_ok(), "microphone released after finish");
        audio
    }

    /// Drop the recording and release the device.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            debug!(target: "farmshield::voice", "microphone released");
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stand-in for hosts built without an audio backend.
#[derive(Debug, Default)]
pub struct UnavailableMicrophone;

#[async_trait]
impl Microphone for UnavailableMicrophone {
    async fn acquire(&self) -> VoiceResult<Box<dyn MicrophoneStream>> {
        Err(VoiceError::MicrophoneUnavailable(
            "built without the native-audio feature".to_string(),
        ))
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

#[cfg(feature = "native-audio")]
pub use native::CpalMicrophone;

#[cfg(feature = "native-audio")]
mod native {
    use super::{pcm_f32_to_wav, CapturedAudio, Microphone, MicrophoneStream};
    use crate::error::{VoiceError, VoiceResult};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread::JoinHandle;
    use tokio::sync::oneshot;
    use tracing::{info, warn};

    /// Default input device via cpal. The cpal stream is not `Send`, so each
    /// acquisition owns a dedicated thread that keeps it alive until release.
    #[derive(Debug, Default)]
    pub struct CpalMicrophone;

    #[async_trait]
    impl Microphone for CpalMicrophone {
        async fn acquire(&self) -> VoiceResult<Box<dyn MicrophoneStream>> {
            let samples = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&samples);
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<u32>>();

            let worker = std::thread::Builder::new()
                .name("farmshield-mic".to_string())
                .spawn(move || {
                    let stream = match open_input(sink) {
                        Ok((stream, rate)) => {
                            let _ = ready_tx.send(Ok(rate));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    // Blocks until release() sends or drops the stop handle.
                    let _ = stop_rx.recv();
                    drop(stream);
                })?;

            let sample_rate = ready_rx
                .await
                .map_err(|_| VoiceError::AudioStream("capture thread exited".to_string()))??;
            info!(target: "farmshield::voice", sample_rate, "🎤 microphone acquired");

            Ok(Box::new(CpalStream {
                samples,
                sample_rate,
                stop: Some(stop_tx),
                worker: Some(worker),
            }))
        }
    }

    fn open_input(sink: Arc<Mutex<Vec<f32>>>) -> VoiceResult<(cpal::Stream, u32)> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::MicrophoneUnavailable("No input device available".to_string()))?;
        let supported = device.default_input_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels()).max(1);
        let config: cpal::StreamConfig = supported.into();

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = sink.lock() {
                    // Downmix to mono.
                    for frame in data.chunks(channels) {
                        buf.push(frame.iter().sum::<f32>() / frame.len() as f32);
                    }
                }
            },
            move |err| {
                warn!(target: "farmshield::voice", "Audio stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;
        Ok((stream, sample_rate))
    }

    struct CpalStream {
        samples: Arc<Mutex<Vec<f32>>>,
        sample_rate: u32,
        stop: Option<mpsc::Sender<()>>,
        worker: Option<JoinHandle<()>>,
    }

    impl MicrophoneStream for CpalStream {
        fn finish(&mut self) -> VoiceResult<CapturedAudio> {
            self.release();
            let samples = self
                .samples
                .lock()
                .map(|mut buf| std::mem::take(&mut *buf))
                .map_err(|_| VoiceError::AudioStream("sample buffer poisoned".to_string()))?;
            Ok(CapturedAudio::from_chunks(
                vec![pcm_f32_to_wav(&samples, self.sample_rate)],
                "audio/wav",
            ))
        }

        fn release(&mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    warn!(target: "farmshield::voice", "capture thread panicked");
                }
            }
        }
    }

    impl Drop for CpalStream {
        fn drop(&mut self) {
            self.release();
        }
    }
}
