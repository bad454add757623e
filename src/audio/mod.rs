pub mod focus;
pub mod meter;
pub mod playback;
pub mod recorder;
pub mod testing;

use thiserror::Error;

pub use focus::AudioFocus;
pub use meter::{LevelMeter, LevelReading, LevelSource, VoiceStatus};
pub use playback::{AudioOutput, PlaybackEvent, PlaybackSession, RodioOutput};
pub use recorder::{CaptureBackend, CpalCapture, RecorderSession};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("microphone permission was not granted")]
    PermissionDenied,
    #[error("capture device error: {0}")]
    DeviceError(String),
    #[error("no recording is in progress")]
    NoActiveRecording,
    #[error("a recording is already in progress")]
    AlreadyRecording,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("could not load recording: {0}")]
    LoadError(String),
    #[error("output device error: {0}")]
    DeviceError(String),
    #[error("nothing is loaded")]
    NothingLoaded,
}
