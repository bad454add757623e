use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::{ClockEvent, TimerState};

/// Callback receiving every event a timer produces, in order.
pub type EventSink<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Builds a sink that forwards into an unbounded channel.
pub fn channel_sink<E: Send + 'static>() -> (EventSink<E>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: EventSink<E> = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (sink, rx)
}

/// State that advances one step per tick while it reports itself running.
pub trait TickMachine: Send + 'static {
    type Event: Send + 'static;

    fn is_running(&self) -> bool;

    fn on_tick(&mut self) -> Vec<Self::Event>;
}

impl TickMachine for TimerState {
    type Event = ClockEvent;

    fn is_running(&self) -> bool {
        self.running
    }

    fn on_tick(&mut self) -> Vec<ClockEvent> {
        self.tick()
    }
}

struct Shared<M> {
    machine: M,
    /// Bumped whenever the ticker is started or stopped; a ticker whose
    /// generation no longer matches exits without touching the machine.
    generation: u64,
}

/// Drives a [`TickMachine`] from a tokio interval.
///
/// Events are delivered to the sink while the state lock is held, so no event
/// can arrive after a stopping command has returned.
pub struct TimerController<M: TickMachine> {
    shared: Arc<Mutex<Shared<M>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    sink: EventSink<M::Event>,
    tick_interval: Duration,
}

impl<M: TickMachine> TimerController<M> {
    pub fn new(machine: M, sink: EventSink<M::Event>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                machine,
                generation: 0,
            })),
            ticker: Mutex::new(None),
            sink,
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub async fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        let guard = self.shared.lock().await;
        f(&guard.machine)
    }

    /// Runs `command` against the machine, emits the events it returns, then
    /// starts or stops the ticker to match the machine's running flag.
    pub async fn apply<R>(&self, command: impl FnOnce(&mut M) -> (R, Vec<M::Event>)) -> R {
        let mut guard = self.shared.lock().await;
        let was_running = guard.machine.is_running();
        let (output, events) = command(&mut guard.machine);
        for event in events {
            (self.sink)(event);
        }

        let now_running = guard.machine.is_running();
        if now_running && !was_running {
            guard.generation = guard.generation.wrapping_add(1);
            self.spawn_ticker(guard.generation).await;
        } else if !now_running && was_running {
            guard.generation = guard.generation.wrapping_add(1);
            self.cancel_ticker().await;
        }

        output
    }

    /// Stops ticking regardless of machine state. Used on teardown.
    pub async fn halt(&self) {
        let mut guard = self.shared.lock().await;
        guard.generation = guard.generation.wrapping_add(1);
        self.cancel_ticker().await;
    }

    pub async fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    async fn spawn_ticker(&self, generation: u64) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let shared = self.shared.clone();
        let sink = self.sink.clone();
        let tick_interval = self.tick_interval;
        let first_tick = time::Instant::now() + tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first_tick, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let mut guard = shared.lock().await;
                if guard.generation != generation || !guard.machine.is_running() {
                    break;
                }
                for event in guard.machine.on_tick() {
                    sink(event);
                }
                if !guard.machine.is_running() {
                    debug!("ticker generation {generation} finished");
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

impl<M: TickMachine + Clone> TimerController<M> {
    pub async fn snapshot(&self) -> M {
        self.shared.lock().await.machine.clone()
    }
}

impl<M: TickMachine> Drop for TimerController<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}
