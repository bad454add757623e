use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use super::{PlaybackError, PlaybackSession, RecorderSession, RecordingError};
use crate::models::RecordingHandle;

/// App-wide owner of the microphone and speaker.
///
/// Recording and playback never overlap: starting one stops the other first.
pub struct AudioFocus {
    recorder: Arc<RecorderSession>,
    playback: Arc<PlaybackSession>,
    gate: Mutex<()>,
}

impl AudioFocus {
    pub fn new(recorder: Arc<RecorderSession>, playback: Arc<PlaybackSession>) -> Self {
        Self {
            recorder,
            playback,
            gate: Mutex::new(()),
        }
    }

    pub fn recorder(&self) -> &Arc<RecorderSession> {
        &self.recorder
    }

    pub fn playback(&self) -> &Arc<PlaybackSession> {
        &self.playback
    }

    pub async fn start_recording(&self) -> Result<(), RecordingError> {
        let _gate = self.gate.lock().await;
        if let Err(err) = self.playback.stop().await {
            warn!("could not stop playback before recording: {err}");
        }
        self.recorder.start_recording().await
    }

    pub async fn stop_recording(&self) -> Result<RecordingHandle, RecordingError> {
        let _gate = self.gate.lock().await;
        self.recorder.stop_recording().await
    }

    /// Plays `handle`, stopping an active recording first. The interrupted
    /// recording's handle is returned so it is not lost.
    pub async fn play(
        &self,
        handle: &RecordingHandle,
    ) -> Result<Option<RecordingHandle>, PlaybackError> {
        let _gate = self.gate.lock().await;
        let interrupted = if self.recorder.is_recording().await {
            match self.recorder.stop_recording().await {
                Ok(handle) => {
                    info!("recording interrupted by playback");
                    Some(handle)
                }
                Err(err) => {
                    warn!("could not stop recording before playback: {err}");
                    None
                }
            }
        } else {
            None
        };
        self.playback.play(handle).await?;
        Ok(interrupted)
    }

    pub async fn pause_playback(&self) -> Result<(), PlaybackError> {
        self.playback.pause().await
    }

    pub async fn stop_playback(&self) -> Result<(), PlaybackError> {
        let _gate = self.gate.lock().await;
        self.playback.stop().await
    }

    /// Stops playback and drops any in-progress recording.
    pub async fn release(&self) {
        let _gate = self.gate.lock().await;
        if let Err(err) = self.playback.stop().await {
            warn!("playback release failed: {err}");
        }
        self.recorder.discard().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{FakeCapture, FakeOutput},
        timer::channel_sink,
    };

    fn focus(dir: &std::path::Path) -> (AudioFocus, Arc<FakeOutput>) {
        let output = Arc::new(FakeOutput::new());
        let (sink, _rx) = channel_sink();
        let recorder = Arc::new(RecorderSession::new(
            Arc::new(FakeCapture::new()),
            dir.join("recordings"),
        ));
        let playback = Arc::new(PlaybackSession::new(output.clone(), sink));
        (AudioFocus::new(recorder, playback), output)
    }

    #[tokio::test]
    async fn recording_stops_playback() {
        let dir = tempfile::tempdir().unwrap();
        let (focus, output) = focus(dir.path());

        focus.start_recording().await.unwrap();
        let take = focus.stop_recording().await.unwrap();
        focus.play(&take).await.unwrap();
        assert!(focus.playback().is_playing());

        focus.start_recording().await.unwrap();
        assert!(!focus.playback().is_playing());
        assert_eq!(output.stop_count(), 1);
    }

    #[tokio::test]
    async fn playback_interrupts_recording_and_keeps_the_take() {
        let dir = tempfile::tempdir().unwrap();
        let (focus, _output) = focus(dir.path());

        focus.start_recording().await.unwrap();
        let first = focus.stop_recording().await.unwrap();
        focus.start_recording().await.unwrap();

        let interrupted = focus.play(&first).await.unwrap();
        assert!(interrupted.is_some_and(|handle| handle.path().exists()));
        assert!(!focus.recorder().is_recording().await);
    }

    #[tokio::test]
    async fn release_leaves_nothing_active() {
        let dir = tempfile::tempdir().unwrap();
        let (focus, _output) = focus(dir.path());
        focus.start_recording().await.unwrap();
        focus.release().await;

        assert!(!focus.recorder().is_busy().await);
        assert!(!focus.playback().is_playing());
    }
}
