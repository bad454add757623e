use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use super::{
    controller::{channel_sink, EventSink, TimerController},
    ClockEvent, SequenceError, TimerState,
};

/// A single countdown, e.g. the prep timer.
pub struct Clock {
    controller: TimerController<TimerState>,
}

impl Clock {
    pub fn new(sink: EventSink<ClockEvent>) -> Self {
        Self {
            controller: TimerController::new(TimerState::default(), sink),
        }
    }

    /// A clock plus the receiving end of its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClockEvent>) {
        let (sink, rx) = channel_sink();
        (Self::new(sink), rx)
    }

    /// A stopped clock already loaded with `duration_seconds`.
    pub fn loaded(duration_seconds: u32, sink: EventSink<ClockEvent>) -> Self {
        Self {
            controller: TimerController::new(TimerState::new(duration_seconds), sink),
        }
    }

    pub fn with_tick_interval(self, tick_interval: Duration) -> Self {
        Self {
            controller: self.controller.with_tick_interval(tick_interval),
        }
    }

    /// Starts a fresh countdown. Returns `false` when the clock was already
    /// running, in which case nothing changes.
    pub async fn start(&self, duration_seconds: u32) -> Result<bool, SequenceError> {
        if duration_seconds == 0 {
            return Err(SequenceError::ZeroDuration);
        }
        let started = self
            .controller
            .apply(|state| (state.start(duration_seconds), Vec::new()))
            .await;
        if started {
            debug!("clock started for {duration_seconds}s");
        }
        Ok(started)
    }

    pub async fn resume(&self) -> bool {
        self.controller
            .apply(|state| (state.resume(), Vec::new()))
            .await
    }

    /// Pauses; the remaining time is kept.
    pub async fn stop(&self) -> bool {
        self.controller.apply(|state| (state.stop(), Vec::new())).await
    }

    pub async fn reset(&self, duration_seconds: u32) {
        self.controller
            .apply(|state| (state.reset(duration_seconds), Vec::new()))
            .await
    }

    pub async fn shave(&self, seconds: u32) {
        self.controller
            .apply(|state| ((), state.shave(seconds)))
            .await
    }

    pub async fn state(&self) -> TimerState {
        self.controller.snapshot().await
    }

    pub async fn remaining_seconds(&self) -> u32 {
        self.controller.read(|state| state.remaining_seconds).await
    }

    pub async fn is_running(&self) -> bool {
        self.controller.read(|state| state.running).await
    }

    /// Stops the clock and its ticking task without emitting anything.
    pub async fn shutdown(&self) {
        self.controller.apply(|state| (state.stop(), Vec::new())).await;
        self.controller.halt().await;
    }

    pub async fn is_ticking(&self) -> bool {
        self.controller.is_ticking().await
    }
}
