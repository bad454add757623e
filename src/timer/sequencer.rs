use std::{sync::Arc, time::Duration};

use log::info;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{
    controller::{channel_sink, EventSink, TickMachine, TimerController},
    ClockEvent, TimerState,
};
use crate::models::Section;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("a round needs at least one section")]
    EmptySequence,
    #[error("durations must be greater than zero")]
    ZeroDuration,
    #[error("section {index} does not exist (round has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SequencerEvent {
    Tick {
        index: usize,
        remaining_seconds: u32,
    },
    SectionChanged {
        index: usize,
        label: String,
        remaining_seconds: u32,
    },
    SequenceComplete,
}

/// Ordered sections with a cursor and the countdown of the current one.
///
/// After any index change `timer.remaining_seconds` equals the new section's
/// full duration.
#[derive(Debug, Clone)]
pub struct SequencerState {
    sections: Arc<[Section]>,
    current_index: usize,
    timer: TimerState,
}

impl SequencerState {
    pub fn new(sections: Vec<Section>) -> Result<Self, SequenceError> {
        let first = sections.first().ok_or(SequenceError::EmptySequence)?;
        if sections.iter().any(|section| section.duration_seconds() == 0) {
            return Err(SequenceError::ZeroDuration);
        }
        let timer = TimerState::new(first.duration_seconds());
        Ok(Self {
            sections: sections.into(),
            current_index: 0,
            timer,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn current(&self) -> &Section {
        &self.sections[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn timer(&self) -> TimerState {
        self.timer
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 == self.sections.len()
    }

    /// Runs the current section. A finished section is reloaded first.
    pub fn start(&mut self) -> bool {
        if self.timer.remaining_seconds == 0 {
            return self.timer.start(self.current().duration_seconds());
        }
        self.timer.resume()
    }

    pub fn stop(&mut self) -> bool {
        self.timer.stop()
    }

    /// Moves to the next section and keeps it running; on the last section
    /// the sequence stops and reports completion instead.
    pub fn advance(&mut self) -> Vec<SequencerEvent> {
        self.advance_with(true)
    }

    /// Like `advance`, but the next section only runs if this one was running.
    pub fn skip(&mut self) -> Vec<SequencerEvent> {
        let keep_running = self.timer.running;
        self.advance_with(keep_running)
    }

    pub fn reset(&mut self) -> Vec<SequencerEvent> {
        let changed = self.current_index != 0;
        self.current_index = 0;
        self.timer.reset(self.current().duration_seconds());
        if changed {
            vec![self.section_changed()]
        } else {
            Vec::new()
        }
    }

    /// Reloads only the current section, stopped.
    pub fn reset_section(&mut self) {
        self.timer.reset(self.current().duration_seconds());
    }

    pub fn jump_to(&mut self, index: usize) -> Result<Vec<SequencerEvent>, SequenceError> {
        if index >= self.sections.len() {
            return Err(SequenceError::IndexOutOfRange {
                index,
                len: self.sections.len(),
            });
        }
        self.current_index = index;
        self.timer.reset(self.current().duration_seconds());
        Ok(vec![self.section_changed()])
    }

    pub fn shave(&mut self, seconds: u32) -> Vec<SequencerEvent> {
        let clock_events = self.timer.shave(seconds);
        self.translate(clock_events)
    }

    fn advance_with(&mut self, run_next: bool) -> Vec<SequencerEvent> {
        if self.is_last() {
            self.timer.stop();
            return vec![SequencerEvent::SequenceComplete];
        }
        self.current_index += 1;
        self.timer.reset(self.current().duration_seconds());
        if run_next {
            self.timer.resume();
        }
        vec![self.section_changed()]
    }

    fn section_changed(&self) -> SequencerEvent {
        SequencerEvent::SectionChanged {
            index: self.current_index,
            label: self.current().label().to_string(),
            remaining_seconds: self.timer.remaining_seconds,
        }
    }

    fn translate(&mut self, clock_events: Vec<ClockEvent>) -> Vec<SequencerEvent> {
        let mut events = Vec::with_capacity(clock_events.len() + 1);
        for event in clock_events {
            match event {
                ClockEvent::Tick { remaining_seconds } => events.push(SequencerEvent::Tick {
                    index: self.current_index,
                    remaining_seconds,
                }),
                ClockEvent::Expired => events.extend(self.advance()),
            }
        }
        events
    }
}

impl TickMachine for SequencerState {
    type Event = SequencerEvent;

    fn is_running(&self) -> bool {
        self.timer.running
    }

    fn on_tick(&mut self) -> Vec<SequencerEvent> {
        let clock_events = self.timer.tick();
        self.translate(clock_events)
    }
}

/// Walks a format's sections on a live clock.
pub struct Sequencer {
    controller: TimerController<SequencerState>,
}

impl Sequencer {
    pub fn new(sections: Vec<Section>, sink: EventSink<SequencerEvent>) -> Result<Self, SequenceError> {
        let state = SequencerState::new(sections)?;
        Ok(Self {
            controller: TimerController::new(state, sink),
        })
    }

    pub fn channel(
        sections: Vec<Section>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SequencerEvent>), SequenceError> {
        let (sink, rx) = channel_sink();
        Ok((Self::new(sections, sink)?, rx))
    }

    pub fn with_tick_interval(self, tick_interval: Duration) -> Self {
        Self {
            controller: self.controller.with_tick_interval(tick_interval),
        }
    }

    pub async fn start(&self) -> bool {
        let started = self
            .controller
            .apply(|state| (state.start(), Vec::new()))
            .await;
        if started {
            let (index, label) = self
                .controller
                .read(|state| (state.current_index(), state.current().label().to_string()))
                .await;
            info!("section {index} ({label}) running");
        }
        started
    }

    pub async fn stop(&self) -> bool {
        self.controller.apply(|state| (state.stop(), Vec::new())).await
    }

    pub async fn advance(&self) {
        self.controller.apply(|state| ((), state.advance())).await
    }

    pub async fn skip(&self) {
        self.controller.apply(|state| ((), state.skip())).await
    }

    pub async fn reset(&self) {
        self.controller.apply(|state| ((), state.reset())).await
    }

    pub async fn reset_section(&self) {
        self.controller
            .apply(|state| (state.reset_section(), Vec::new()))
            .await
    }

    pub async fn jump_to(&self, index: usize) -> Result<(), SequenceError> {
        self.controller
            .apply(|state| match state.jump_to(index) {
                Ok(events) => (Ok(()), events),
                Err(err) => (Err(err), Vec::new()),
            })
            .await
    }

    pub async fn shave(&self, seconds: u32) {
        self.controller.apply(|state| ((), state.shave(seconds))).await
    }

    pub async fn current(&self) -> Section {
        self.controller.read(|state| state.current().clone()).await
    }

    pub async fn current_index(&self) -> usize {
        self.controller.read(|state| state.current_index()).await
    }

    pub async fn timer(&self) -> TimerState {
        self.controller.read(|state| state.timer()).await
    }

    pub async fn snapshot(&self) -> SequencerState {
        self.controller.snapshot().await
    }

    pub async fn shutdown(&self) {
        self.controller.apply(|state| (state.stop(), Vec::new())).await;
        self.controller.halt().await;
    }

    pub async fn is_ticking(&self) -> bool {
        self.controller.is_ticking().await
    }
}
