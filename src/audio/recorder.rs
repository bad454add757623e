use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        mpsc::{self, Sender},
        Arc, Mutex as StdMutex,
    },
    thread,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, Stream,
};
use hound::{WavSpec, WavWriter};
use log::{debug, info, warn};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use super::RecordingError;
use crate::models::RecordingHandle;

/// Microphone capture as seen by a [`RecorderSession`].
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Fails with `PermissionDenied` when the platform refuses microphone
    /// access. Backends without a permission model accept.
    async fn check_permission(&self) -> Result<(), RecordingError> {
        Ok(())
    }

    /// Opens the device and starts capturing into `path`.
    async fn begin(&self, path: &Path) -> Result<(), RecordingError>;

    /// Stops capturing and finalizes the file passed to `begin`.
    async fn finish(&self) -> Result<(), RecordingError>;

    /// Latest normalized RMS level in `[0, 1]`; zero while idle.
    fn amplitude(&self) -> f32;
}

enum SessionState {
    Idle,
    Starting,
    Recording {
        path: PathBuf,
        started_at: DateTime<Utc>,
    },
}

/// One microphone session at a time, writing into `directory`.
///
/// A start that is still pending counts as active, so a second start during
/// that window is refused rather than racing the first.
pub struct RecorderSession {
    backend: Arc<dyn CaptureBackend>,
    directory: PathBuf,
    state: Mutex<SessionState>,
}

impl RecorderSession {
    pub fn new(backend: Arc<dyn CaptureBackend>, directory: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            directory: directory.into(),
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub async fn start_recording(&self) -> Result<(), RecordingError> {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, SessionState::Idle) {
                return Err(RecordingError::AlreadyRecording);
            }
            *state = SessionState::Starting;
        }

        let path = self.directory.join(format!("{}.wav", Uuid::new_v4()));
        let opened = self.open(&path).await;

        let mut state = self.state.lock().await;
        match opened {
            Ok(()) => {
                info!("recording started: {}", path.display());
                *state = SessionState::Recording {
                    path,
                    started_at: Utc::now(),
                };
                Ok(())
            }
            Err(err) => {
                warn!("recording failed to start: {err}");
                *state = SessionState::Idle;
                Err(err)
            }
        }
    }

    pub async fn stop_recording(&self) -> Result<RecordingHandle, RecordingError> {
        let mut state = self.state.lock().await;
        let (path, started_at) = match &*state {
            SessionState::Recording { path, started_at } => (path.clone(), *started_at),
            _ => return Err(RecordingError::NoActiveRecording),
        };

        let finished = self.backend.finish().await;
        *state = SessionState::Idle;
        finished?;

        info!("recording stopped: {}", path.display());
        Ok(RecordingHandle::new(path, started_at))
    }

    /// Stops any active recording and deletes its file.
    pub async fn discard(&self) {
        match self.stop_recording().await {
            Ok(handle) => {
                if let Err(err) = std::fs::remove_file(handle.path()) {
                    debug!("discarded recording not removed: {err}");
                }
            }
            Err(RecordingError::NoActiveRecording) => {}
            Err(err) => warn!("discarding recording failed: {err}"),
        }
    }

    pub async fn is_recording(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Recording { .. })
    }

    /// True while recording or while a start is pending.
    pub async fn is_busy(&self) -> bool {
        !matches!(*self.state.lock().await, SessionState::Idle)
    }

    pub fn amplitude(&self) -> f32 {
        self.backend.amplitude()
    }

    async fn open(&self, path: &Path) -> Result<(), RecordingError> {
        self.backend.check_permission().await?;
        std::fs::create_dir_all(&self.directory)
            .map_err(|e| RecordingError::DeviceError(format!("recordings directory: {e}")))?;
        self.backend.begin(path).await
    }
}

/// Scales an RMS value so ordinary speech lands mid-range.
pub(crate) fn normalized_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();
    (rms * 6.0).min(1.0)
}

pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("Failed to write WAV sample")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    debug!("wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

type Reply = oneshot::Sender<Result<(), RecordingError>>;

enum CaptureCommand {
    Begin { path: PathBuf, reply: Reply },
    Finish { reply: Reply },
}

struct ActiveCapture {
    _stream: Stream,
    path: PathBuf,
    samples: Arc<StdMutex<Vec<i16>>>,
    sample_rate: u32,
    channels: u16,
}

/// Default input device through cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// receives commands over a channel.
pub struct CpalCapture {
    tx: StdMutex<Option<Sender<CaptureCommand>>>,
    amplitude: Arc<AtomicU32>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            tx: StdMutex::new(None),
            amplitude: Arc::new(AtomicU32::new(0)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<CaptureCommand>, RecordingError> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|e| RecordingError::DeviceError(e.to_string()))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<CaptureCommand>();
        let amplitude = Arc::clone(&self.amplitude);

        thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let mut active: Option<ActiveCapture> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        CaptureCommand::Begin { path, reply } => {
                            let result = if active.is_some() {
                                Err(RecordingError::AlreadyRecording)
                            } else {
                                open_input(path, Arc::clone(&amplitude)).map(|capture| {
                                    active = Some(capture);
                                })
                            };
                            let _ = reply.send(result);
                        }
                        CaptureCommand::Finish { reply } => {
                            let result = match active.take() {
                                Some(capture) => finish_capture(capture),
                                None => Err(RecordingError::NoActiveRecording),
                            };
                            amplitude.store(0, Ordering::Relaxed);
                            let _ = reply.send(result);
                        }
                    }
                }
            })
            .map_err(|e| RecordingError::DeviceError(e.to_string()))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    async fn request(
        &self,
        make: impl FnOnce(Reply) -> CaptureCommand,
    ) -> Result<(), RecordingError> {
        let tx = self.ensure_thread()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(make(reply_tx))
            .map_err(|_| RecordingError::DeviceError("capture thread stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| RecordingError::DeviceError("capture thread dropped reply".to_string()))?
    }
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for CpalCapture {
    async fn begin(&self, path: &Path) -> Result<(), RecordingError> {
        let path = path.to_path_buf();
        self.request(|reply| CaptureCommand::Begin { path, reply })
            .await
    }

    async fn finish(&self) -> Result<(), RecordingError> {
        self.request(|reply| CaptureCommand::Finish { reply }).await
    }

    fn amplitude(&self) -> f32 {
        f32::from_bits(self.amplitude.load(Ordering::Relaxed))
    }
}

fn device_error(err: impl std::fmt::Display) -> RecordingError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        RecordingError::PermissionDenied
    } else {
        RecordingError::DeviceError(message)
    }
}

fn open_input(path: PathBuf, amplitude: Arc<AtomicU32>) -> Result<ActiveCapture, RecordingError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RecordingError::DeviceError("no input device".to_string()))?;
    let config = device.default_input_config().map_err(device_error)?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();
    let samples = Arc::new(StdMutex::new(Vec::<i16>::new()));

    let on_error = |err: cpal::StreamError| log::error!("capture stream error: {err}");
    let stream = match config.sample_format() {
        SampleFormat::F32 => {
            let samples = Arc::clone(&samples);
            device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    amplitude.store(normalized_rms(data).to_bits(), Ordering::Relaxed);
                    if let Ok(mut buffer) = samples.lock() {
                        buffer.extend(
                            data.iter()
                                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                on_error,
                None,
            )
        }
        SampleFormat::I16 => {
            let samples = Arc::clone(&samples);
            device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let as_f32: Vec<f32> =
                        data.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                    amplitude.store(normalized_rms(&as_f32).to_bits(), Ordering::Relaxed);
                    if let Ok(mut buffer) = samples.lock() {
                        buffer.extend_from_slice(data);
                    }
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(RecordingError::DeviceError(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(device_error)?;

    stream.play().map_err(device_error)?;

    Ok(ActiveCapture {
        _stream: stream,
        path,
        samples,
        sample_rate,
        channels,
    })
}

fn finish_capture(capture: ActiveCapture) -> Result<(), RecordingError> {
    let ActiveCapture {
        _stream,
        path,
        samples,
        sample_rate,
        channels,
    } = capture;
    drop(_stream);

    let samples = samples
        .lock()
        .map(|mut buffer| std::mem::take(&mut *buffer))
        .map_err(|e| RecordingError::DeviceError(e.to_string()))?;
    write_wav(&path, &samples, sample_rate, channels)
        .map_err(|e| RecordingError::DeviceError(format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeCapture;

    fn session(dir: &Path, backend: Arc<FakeCapture>) -> RecorderSession {
        RecorderSession::new(backend, dir.join("recordings"))
    }

    #[tokio::test]
    async fn stop_produces_a_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = session(dir.path(), Arc::new(FakeCapture::new()));

        recorder.start_recording().await.unwrap();
        assert!(recorder.is_recording().await);
        let handle = recorder.stop_recording().await.unwrap();

        assert!(handle.path().exists());
        assert_eq!(handle.path().extension().unwrap(), "wav");
        assert!(hound::WavReader::open(handle.path()).is_ok());
        assert!(!recorder.is_busy().await);
    }

    #[tokio::test]
    async fn second_start_is_rejected_and_first_session_survives() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeCapture::new());
        let recorder = session(dir.path(), backend.clone());

        recorder.start_recording().await.unwrap();
        assert!(matches!(
            recorder.start_recording().await,
            Err(RecordingError::AlreadyRecording)
        ));
        assert_eq!(backend.begin_count(), 1);
        assert!(recorder.stop_recording().await.is_ok());
    }

    #[tokio::test]
    async fn stop_without_start_leaves_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = session(dir.path(), Arc::new(FakeCapture::new()));
        assert!(matches!(
            recorder.stop_recording().await,
            Err(RecordingError::NoActiveRecording)
        ));
        assert!(!recorder.is_busy().await);
    }

    #[tokio::test]
    async fn denied_permission_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeCapture::new());
        backend.deny_permission(true);
        let recorder = session(dir.path(), backend.clone());

        assert!(matches!(
            recorder.start_recording().await,
            Err(RecordingError::PermissionDenied)
        ));
        assert!(!recorder.is_busy().await);

        backend.deny_permission(false);
        assert!(recorder.start_recording().await.is_ok());
    }

    #[tokio::test]
    async fn device_failure_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeCapture::new());
        backend.fail_device(true);
        let recorder = session(dir.path(), backend);

        assert!(matches!(
            recorder.start_recording().await,
            Err(RecordingError::DeviceError(_))
        ));
        assert!(!recorder.is_busy().await);
    }

    #[tokio::test]
    async fn discard_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = session(dir.path(), Arc::new(FakeCapture::new()));
        recorder.start_recording().await.unwrap();
        recorder.discard().await;

        let leftover = std::fs::read_dir(dir.path().join("recordings"))
            .unwrap()
            .count();
        assert_eq!(leftover, 0);
        assert!(!recorder.is_recording().await);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(normalized_rms(&[]), 0.0);
        assert_eq!(normalized_rms(&[0.0; 64]), 0.0);
        assert!(normalized_rms(&[0.5; 64]) > 0.9);
    }
}
