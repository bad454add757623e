//! In-memory stand-ins for the microphone and speaker, used by tests and by
//! headless embeddings.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;

use super::{
    playback::{AudioOutput, FinishedCallback},
    recorder::{write_wav, CaptureBackend},
    PlaybackError, RecordingError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

const FAKE_SAMPLE_RATE: u32 = 16_000;

#[derive(Default)]
struct CaptureState {
    path: Option<PathBuf>,
    deny_permission: bool,
    fail_device: bool,
    begins: usize,
}

/// Capture backend that writes a short silent WAV on finish.
#[derive(Default)]
pub struct FakeCapture {
    state: Mutex<CaptureState>,
    amplitude: AtomicU32,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_permission(&self, deny: bool) {
        lock(&self.state).deny_permission = deny;
    }

    pub fn fail_device(&self, fail: bool) {
        lock(&self.state).fail_device = fail;
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude.store(amplitude.to_bits(), Ordering::Relaxed);
    }

    pub fn begin_count(&self) -> usize {
        lock(&self.state).begins
    }
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn check_permission(&self) -> Result<(), RecordingError> {
        if lock(&self.state).deny_permission {
            return Err(RecordingError::PermissionDenied);
        }
        Ok(())
    }

    async fn begin(&self, path: &Path) -> Result<(), RecordingError> {
        let mut state = lock(&self.state);
        if state.fail_device {
            return Err(RecordingError::DeviceError("fake device unavailable".to_string()));
        }
        if state.path.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        state.path = Some(path.to_path_buf());
        state.begins += 1;
        Ok(())
    }

    async fn finish(&self) -> Result<(), RecordingError> {
        let path = lock(&self.state)
            .path
            .take()
            .ok_or(RecordingError::NoActiveRecording)?;
        let silence = vec![0i16; (FAKE_SAMPLE_RATE / 10) as usize];
        write_wav(&path, &silence, FAKE_SAMPLE_RATE, 1)
            .map_err(|e| RecordingError::DeviceError(format!("{e:#}")))
    }

    fn amplitude(&self) -> f32 {
        if lock(&self.state).path.is_some() {
            f32::from_bits(self.amplitude.load(Ordering::Relaxed))
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct OutputState {
    loaded: Option<PathBuf>,
    on_finished: Option<FinishedCallback>,
    playing: bool,
    fail_load: bool,
    loads: usize,
    stops: usize,
    volume: Option<f32>,
}

/// Output that never makes a sound; `finish()` simulates reaching the end.
#[derive(Default)]
pub struct FakeOutput {
    state: Mutex<OutputState>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_load(&self, fail: bool) {
        lock(&self.state).fail_load = fail;
    }

    /// Runs the pending finished callback, if any.
    pub fn finish(&self) {
        let callback = {
            let mut state = lock(&self.state);
            state.playing = false;
            state.on_finished.take()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn take_finished(&self) -> Option<FinishedCallback> {
        lock(&self.state).on_finished.take()
    }

    pub fn loaded(&self) -> Option<PathBuf> {
        lock(&self.state).loaded.clone()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn load_count(&self) -> usize {
        lock(&self.state).loads
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn volume(&self) -> Option<f32> {
        lock(&self.state).volume
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn load(&self, path: &Path, on_finished: FinishedCallback) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.fail_load {
            return Err(PlaybackError::LoadError(format!(
                "{}: unsupported",
                path.display()
            )));
        }
        state.loaded = Some(path.to_path_buf());
        state.on_finished = Some(on_finished);
        state.playing = false;
        state.loads += 1;
        Ok(())
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.loaded.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        state.playing = true;
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        if state.loaded.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        state.playing = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlaybackError> {
        let mut state = lock(&self.state);
        state.loaded = None;
        state.on_finished = None;
        state.playing = false;
        state.stops += 1;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        lock(&self.state).volume = Some(volume);
        Ok(())
    }
}
