use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ClockEvent {
    Tick { remaining_seconds: u32 },
    Expired,
}

/// Countdown value of one independent timer.
///
/// `remaining_seconds` never underflows; reaching zero while running yields a
/// single `Expired` and clears `running`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub running: bool,
}

impl TimerState {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            remaining_seconds: duration_seconds,
            running: false,
        }
    }

    /// Begins a fresh countdown. Ignored while already running.
    pub fn start(&mut self, duration_seconds: u32) -> bool {
        if self.running || duration_seconds == 0 {
            return false;
        }
        self.remaining_seconds = duration_seconds;
        self.running = true;
        true
    }

    /// Continues from the frozen value left by `stop`.
    pub fn resume(&mut self) -> bool {
        if self.running || self.remaining_seconds == 0 {
            return false;
        }
        self.running = true;
        true
    }

    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    pub fn reset(&mut self, duration_seconds: u32) {
        self.remaining_seconds = duration_seconds;
        self.running = false;
    }

    /// Takes `seconds` off the countdown without waiting for ticks.
    pub fn shave(&mut self, seconds: u32) -> Vec<ClockEvent> {
        if self.remaining_seconds == 0 {
            return Vec::new();
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(seconds);
        let mut events = vec![ClockEvent::Tick {
            remaining_seconds: self.remaining_seconds,
        }];
        if self.remaining_seconds == 0 && self.stop() {
            events.push(ClockEvent::Expired);
        }
        events
    }

    pub fn tick(&mut self) -> Vec<ClockEvent> {
        if !self.running {
            return Vec::new();
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        let mut events = vec![ClockEvent::Tick {
            remaining_seconds: self.remaining_seconds,
        }];
        if self.remaining_seconds == 0 {
            self.running = false;
            events.push(ClockEvent::Expired);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_down_to_zero_then_expires_once() {
        let mut state = TimerState::default();
        assert!(state.start(3));

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.extend(state.tick());
        }

        assert_eq!(
            seen,
            vec![
                ClockEvent::Tick { remaining_seconds: 2 },
                ClockEvent::Tick { remaining_seconds: 1 },
                ClockEvent::Tick { remaining_seconds: 0 },
                ClockEvent::Expired,
            ]
        );
        assert!(!state.running);
    }

    #[test]
    fn stop_freezes_and_resume_continues() {
        let mut state = TimerState::default();
        state.start(10);
        state.tick();
        assert!(state.stop());
        assert!(state.tick().is_empty());
        assert_eq!(state.remaining_seconds, 9);

        assert!(state.resume());
        state.tick();
        assert_eq!(state.remaining_seconds, 8);
    }

    #[test]
    fn start_while_running_is_ignored() {
        let mut state = TimerState::default();
        state.start(10);
        state.tick();
        assert!(!state.start(60));
        assert_eq!(state.remaining_seconds, 9);
    }

    #[test]
    fn start_after_expiry_restarts_fresh() {
        let mut state = TimerState::default();
        state.start(1);
        state.tick();
        assert!(state.start(5));
        assert_eq!(state.remaining_seconds, 5);
        assert!(state.running);
    }

    #[test]
    fn shave_saturates_and_expires_a_running_timer() {
        let mut state = TimerState::default();
        state.start(15);
        assert_eq!(
            state.shave(10),
            vec![ClockEvent::Tick { remaining_seconds: 5 }]
        );
        assert_eq!(
            state.shave(10),
            vec![ClockEvent::Tick { remaining_seconds: 0 }, ClockEvent::Expired]
        );
        assert!(state.shave(10).is_empty());
    }

    #[test]
    fn shave_on_stopped_timer_does_not_expire() {
        let mut state = TimerState::new(5);
        assert_eq!(
            state.shave(10),
            vec![ClockEvent::Tick { remaining_seconds: 0 }]
        );
        assert!(!state.resume());
    }
}
