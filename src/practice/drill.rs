//! Impromptu speaking drill: a random prompt, a short think countdown, then a
//! timed take that stops by itself and goes straight to self-review.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{level_source, round::RoundOptions, PracticeError};
use crate::{
    audio::{AudioFocus, LevelMeter, LevelReading, LevelSource},
    models::{DebateFormat, RecordingHandle},
    review::{coaching_notes, CoachingNotes, ReviewForm},
    timer::{channel_sink, Clock, ClockEvent, EventSink, TimerState},
};

pub const THINK_SECONDS: u32 = 10;

const POLICY_PROMPTS: [&str; 10] = [
    "Should the United States increase its use of renewable energy in federal buildings?",
    "Is it better for the federal government to prioritize economic growth or environmental protection?",
    "Should the U.S. federal government increase funding for public transportation?",
    "Is universal healthcare a policy the U.S. should adopt?",
    "Should the U.S. federal government ban single-use plastics?",
    "What is the most effective way to address climate change?",
    "Should the U.S. federal government implement a carbon tax?",
    "Is it better to have a strong federal government or more state autonomy?",
    "Should the U.S. federal government increase the minimum wage?",
    "Is it better to invest in military spending or social programs?",
];

const CONGRESS_PROMPTS: [&str; 10] = [
    "Should the filibuster be abolished in Congress?",
    "Is the current committee system effective in Congress?",
    "What is the most important role of a Senator?",
    "Should term limits be imposed on members of Congress?",
    "How can Congress better represent minority interests?",
    "Should campaign finance laws be reformed?",
    "What is the best way to resolve gridlock in Congress?",
    "Should Congress have more oversight over the executive branch?",
    "Is the two-party system beneficial for Congress?",
    "How can Congress improve public trust?",
];

/// Prompt pool for a format. Only Congress has its own.
pub fn prompts_for(format: DebateFormat) -> &'static [&'static str] {
    match format {
        DebateFormat::Congress => &CONGRESS_PROMPTS,
        _ => &POLICY_PROMPTS,
    }
}

/// A prompt from `prompts` other than `current`, when there is a choice.
fn pick_prompt<R: Rng + ?Sized>(
    prompts: &[&'static str],
    current: Option<&str>,
    rng: &mut R,
) -> &'static str {
    let choices: Vec<&'static str> = prompts
        .iter()
        .copied()
        .filter(|prompt| Some(*prompt) != current)
        .collect();
    choices
        .choose(rng)
        .copied()
        .or_else(|| prompts.first().copied())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrillStep {
    Prompt,
    Think,
    Record,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DrillEvent {
    StepChanged { step: DrillStep },
    Think { event: ClockEvent },
    Speech { event: ClockEvent },
    Level { reading: LevelReading },
    RecordingFailed { reason: String },
}

#[derive(Debug, Clone, Copy)]
enum Expiry {
    Think,
    Speech,
}

struct DrillState {
    step: DrillStep,
    prompt: &'static str,
    rng: StdRng,
}

struct DrillShared {
    format: DebateFormat,
    focus: Arc<AudioFocus>,
    think: Clock,
    speech: Clock,
    /// Held across every step change, including the audio calls inside it.
    state: Mutex<DrillState>,
    review: Mutex<ReviewForm>,
    meter: Mutex<LevelMeter>,
    levels: Option<Arc<dyn LevelSource>>,
    meter_interval: Duration,
    events: EventSink<DrillEvent>,
}

impl DrillShared {
    fn enter(&self, state: &mut DrillState, step: DrillStep) {
        state.step = step;
        (self.events)(DrillEvent::StepChanged { step });
    }

    async fn on_think_over(&self) {
        let mut state = self.state.lock().await;
        if state.step != DrillStep::Think {
            return;
        }
        if let Err(err) = self.focus.start_recording().await {
            warn!("drill recording did not start: {err}");
            (self.events)(DrillEvent::RecordingFailed {
                reason: err.to_string(),
            });
            self.enter(&mut state, DrillStep::Prompt);
            return;
        }
        self.enter(&mut state, DrillStep::Record);
        if let Some(source) = &self.levels {
            if let Err(err) = self.meter.lock().await.start(source.clone(), self.meter_interval) {
                warn!("level meter did not start: {err:#}");
            }
        }
        if let Err(err) = self.speech.start(self.format.drill_speech_seconds()).await {
            warn!("speech clock did not start: {err}");
        }
    }

    async fn finish_take(&self) -> Result<RecordingHandle, PracticeError> {
        let mut state = self.state.lock().await;
        if state.step != DrillStep::Record {
            return Err(PracticeError::WrongStep {
                expected: DrillStep::Record,
                actual: state.step,
            });
        }
        self.speech.stop().await;
        self.stop_meter().await;
        match self.focus.stop_recording().await {
            Ok(recording) => {
                self.review.lock().await.attach_recording(recording.clone());
                self.enter(&mut state, DrillStep::Review);
                info!("drill take saved to {}", recording.path().display());
                Ok(recording)
            }
            Err(err) => {
                (self.events)(DrillEvent::RecordingFailed {
                    reason: err.to_string(),
                });
                self.enter(&mut state, DrillStep::Prompt);
                Err(err.into())
            }
        }
    }

    async fn stop_meter(&self) {
        if let Err(err) = self.meter.lock().await.stop().await {
            warn!("level meter did not stop cleanly: {err:#}");
        }
    }
}

/// Drives one drill screen. Must be created inside a tokio runtime.
pub struct ImpromptuDrill {
    shared: Arc<DrillShared>,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ImpromptuDrill {
    pub fn new(
        format: DebateFormat,
        focus: Arc<AudioFocus>,
        options: RoundOptions,
        rng: StdRng,
        events: EventSink<DrillEvent>,
    ) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();

        let think_events = events.clone();
        let think_tx = expiry_tx.clone();
        let think_sink: EventSink<ClockEvent> = Arc::new(move |event: ClockEvent| {
            think_events(DrillEvent::Think { event });
            if event == ClockEvent::Expired {
                let _ = think_tx.send(Expiry::Think);
            }
        });

        let speech_events = events.clone();
        let speech_sink: EventSink<ClockEvent> = Arc::new(move |event: ClockEvent| {
            speech_events(DrillEvent::Speech { event });
            if event == ClockEvent::Expired {
                let _ = expiry_tx.send(Expiry::Speech);
            }
        });

        let level_events = events.clone();
        let level_sink: EventSink<LevelReading> =
            Arc::new(move |reading: LevelReading| level_events(DrillEvent::Level { reading }));

        let mut rng = rng;
        let prompt = pick_prompt(prompts_for(format), None, &mut rng);

        let shared = Arc::new(DrillShared {
            format,
            levels: level_source(&options.meter, &focus),
            meter_interval: options.meter.interval(),
            focus,
            think: Clock::loaded(THINK_SECONDS, think_sink).with_tick_interval(options.tick_interval),
            speech: Clock::loaded(format.drill_speech_seconds(), speech_sink)
                .with_tick_interval(options.tick_interval),
            state: Mutex::new(DrillState {
                step: DrillStep::Prompt,
                prompt,
                rng,
            }),
            review: Mutex::new(ReviewForm::new(format.drill_template())),
            meter: Mutex::new(LevelMeter::new(level_sink)),
            events,
        });

        let cancel = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(shared.clone(), expiry_rx, cancel.clone()));
        Self {
            shared,
            cancel,
            supervisor: Mutex::new(Some(supervisor)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn channel(
        format: DebateFormat,
        focus: Arc<AudioFocus>,
        options: RoundOptions,
    ) -> (Self, mpsc::UnboundedReceiver<DrillEvent>) {
        let (sink, rx) = channel_sink();
        (
            Self::new(format, focus, options, StdRng::from_entropy(), sink),
            rx,
        )
    }

    pub fn format(&self) -> DebateFormat {
        self.shared.format
    }

    pub async fn prompt(&self) -> &'static str {
        self.shared.state.lock().await.prompt
    }

    pub async fn step(&self) -> DrillStep {
        self.shared.state.lock().await.step
    }

    pub async fn think_clock(&self) -> TimerState {
        self.shared.think.state().await
    }

    pub async fn speech_clock(&self) -> TimerState {
        self.shared.speech.state().await
    }

    /// Starts the think countdown; recording follows on its own.
    pub async fn begin(&self) -> Result<(), PracticeError> {
        let mut state = self.shared.state.lock().await;
        if state.step != DrillStep::Prompt {
            return Err(PracticeError::WrongStep {
                expected: DrillStep::Prompt,
                actual: state.step,
            });
        }
        self.shared.enter(&mut state, DrillStep::Think);
        self.shared.think.start(THINK_SECONDS).await?;
        Ok(())
    }

    /// Ends the take before the limit.
    pub async fn finish_early(&self) -> Result<RecordingHandle, PracticeError> {
        self.shared.finish_take().await
    }

    pub async fn review(&self) -> ReviewForm {
        self.shared.review.lock().await.clone()
    }

    pub async fn toggle_item(&self, index: usize) -> Result<bool, PracticeError> {
        Ok(self.shared.review.lock().await.toggle(index)?)
    }

    pub async fn set_rating(&self, rating: u8) -> u8 {
        self.shared.review.lock().await.set_rating(rating)
    }

    pub async fn play_recording(&self) -> Result<RecordingHandle, PracticeError> {
        let recording = self
            .shared
            .review
            .lock()
            .await
            .recording()
            .cloned()
            .ok_or(PracticeError::NoRecording)?;
        self.shared.focus.play(&recording).await?;
        Ok(recording)
    }

    pub async fn stop_playback(&self) -> Result<(), PracticeError> {
        Ok(self.shared.focus.stop_playback().await?)
    }

    pub async fn coaching_with<R: Rng + ?Sized>(&self, rng: &mut R) -> CoachingNotes {
        let form = self.shared.review.lock().await;
        coaching_notes(&form, rng)
    }

    /// The "Finish & Get Encouragement" step.
    pub async fn coaching(&self) -> CoachingNotes {
        let form = self.shared.review.lock().await;
        coaching_notes(&form, &mut rand::thread_rng())
    }

    /// Drops the current attempt and returns a fresh prompt.
    pub async fn try_another(&self) -> &'static str {
        let mut state = self.shared.state.lock().await;
        self.shared.think.reset(THINK_SECONDS).await;
        self.shared
            .speech
            .reset(self.shared.format.drill_speech_seconds())
            .await;
        self.shared.stop_meter().await;
        self.shared.focus.release().await;
        self.shared.review.lock().await.reset();

        let current = state.prompt;
        let next = pick_prompt(prompts_for(self.shared.format), Some(current), &mut state.rng);
        state.prompt = next;
        self.shared.enter(&mut state, DrillStep::Prompt);
        state.prompt
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.shared.think.shutdown().await;
        self.shared.speech.shutdown().await;
        self.shared.stop_meter().await;
        self.shared.focus.release().await;
        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(err) = handle.await {
                warn!("drill supervisor ended abnormally: {err}");
            }
        }
    }
}

impl Drop for ImpromptuDrill {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                let shared = self.shared.clone();
                runtime.spawn(async move {
                    shared.think.shutdown().await;
                    shared.speech.shutdown().await;
                    shared.stop_meter().await;
                    shared.focus.release().await;
                });
            }
            Err(_) => warn!("drill dropped outside a runtime, audio not released"),
        }
    }
}

async fn supervise(
    shared: Arc<DrillShared>,
    mut expiries: mpsc::UnboundedReceiver<Expiry>,
    cancel: CancellationToken,
) {
    loop {
        let expiry = tokio::select! {
            _ = cancel.cancelled() => break,
            next = expiries.recv() => match next {
                Some(expiry) => expiry,
                None => break,
            },
        };
        match expiry {
            Expiry::Think => shared.on_think_over().await,
            Expiry::Speech => match shared.finish_take().await {
                Ok(_) | Err(PracticeError::WrongStep { .. }) => {}
                Err(err) => warn!("drill take did not stop: {err}"),
            },
        }
    }
}
