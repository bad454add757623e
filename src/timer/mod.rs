pub mod clock;
pub mod controller;
pub mod sequencer;
pub mod state;

pub use clock::Clock;
pub use controller::{channel_sink, EventSink, TickMachine, TimerController};
pub use sequencer::{SequenceError, Sequencer, SequencerEvent, SequencerState};
pub use state::{ClockEvent, TimerState};
