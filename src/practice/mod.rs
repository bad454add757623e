//! Practice screens: a full round walking a format's sections, and the
//! impromptu speaking drill.

pub mod drill;
pub mod round;

use std::sync::Arc;

use thiserror::Error;

use crate::{
    audio::{
        meter::{CaptureLevels, SimulatedLevels},
        AudioFocus, LevelSource, PlaybackError, RecordingError,
    },
    review::ReviewError,
    settings::{MeterSettings, MeterSource},
    timer::SequenceError,
};

pub use drill::{DrillEvent, DrillStep, ImpromptuDrill};
pub use round::{PracticeRound, RoundEvent, RoundOptions};

/// Seconds removed by the "-10s" control.
pub const SHAVE_SECONDS: u32 = 10;

#[derive(Debug, Error)]
pub enum PracticeError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("there is no recording to play")]
    NoRecording,
    #[error("drill is at {actual:?}, expected {expected:?}")]
    WrongStep { expected: DrillStep, actual: DrillStep },
}

/// Level source picked by the meter settings, or `None` when the meter is
/// switched off.
pub fn level_source(settings: &MeterSettings, focus: &AudioFocus) -> Option<Arc<dyn LevelSource>> {
    if !settings.enabled {
        return None;
    }
    let source: Arc<dyn LevelSource> = match settings.source {
        MeterSource::Simulated => Arc::new(SimulatedLevels::new()),
        MeterSource::Microphone => Arc::new(CaptureLevels::new(focus.recorder().clone())),
    };
    Some(source)
}
