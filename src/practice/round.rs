use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{info, warn};
use rand::Rng;
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{level_source, PracticeError, SHAVE_SECONDS};
use crate::{
    audio::{AudioFocus, LevelMeter, LevelReading, LevelSource},
    gateway::{SubmissionContext, SubmissionGateway, SubmissionReceipt},
    models::{DebateFormat, RecordingHandle, Section},
    review::{coaching_notes, submit_review, CoachingNotes, ReviewForm},
    settings::MeterSettings,
    timer::{
        channel_sink, Clock, ClockEvent, EventSink, Sequencer, SequencerEvent, SequencerState,
        TimerState,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RoundEvent {
    Prep { event: ClockEvent },
    Section { event: SequencerEvent },
    Level { reading: LevelReading },
    RecordingStarted,
    RecordingStopped { recording: RecordingHandle },
    ReviewOpened,
    Submitted { receipt: SubmissionReceipt },
}

#[derive(Debug, Clone)]
pub struct RoundOptions {
    pub meter: MeterSettings,
    pub tick_interval: Duration,
    /// Whether [`PracticeRound::begin_section`] turns the microphone on.
    pub record_sections: bool,
}

impl Default for RoundOptions {
    fn default() -> Self {
        Self {
            meter: MeterSettings::default(),
            tick_interval: Duration::from_secs(1),
            record_sections: true,
        }
    }
}

/// Everything the round shares with its supervisor task.
struct RoundShared {
    focus: Arc<AudioFocus>,
    review: Mutex<ReviewForm>,
    review_open: AtomicBool,
    meter: Mutex<LevelMeter>,
    levels: Option<Arc<dyn LevelSource>>,
    meter_interval: Duration,
    events: EventSink<RoundEvent>,
}

impl RoundShared {
    async fn begin_recording(&self) -> Result<(), PracticeError> {
        self.focus.start_recording().await?;
        (self.events)(RoundEvent::RecordingStarted);

        if let Some(source) = &self.levels {
            let mut meter = self.meter.lock().await;
            if !meter.is_active() {
                if let Err(err) = meter.start(source.clone(), self.meter_interval) {
                    warn!("level meter did not start: {err:#}");
                }
            }
        }
        Ok(())
    }

    /// Stops the take, hands it to the review form and opens the review.
    async fn finish_recording(&self) -> Result<RecordingHandle, PracticeError> {
        let recording = self.focus.stop_recording().await?;
        self.stop_meter().await;
        {
            let mut form = self.review.lock().await;
            if form.is_submitted() {
                form.reset();
            }
            form.attach_recording(recording.clone());
        }
        self.review_open.store(true, Ordering::SeqCst);
        (self.events)(RoundEvent::RecordingStopped {
            recording: recording.clone(),
        });
        (self.events)(RoundEvent::ReviewOpened);
        Ok(recording)
    }

    async fn stop_meter(&self) {
        if let Err(err) = self.meter.lock().await.stop().await {
            warn!("level meter did not stop cleanly: {err:#}");
        }
    }
}

/// One practice screen: a prep clock, the format's sections, the microphone
/// and the self-review that follows a take.
///
/// Recording runs independently of the section clock. A take still running
/// when the last section expires is stopped and handed to the review.
pub struct PracticeRound {
    format: DebateFormat,
    context: SubmissionContext,
    prep: Clock,
    sequencer: Sequencer,
    shared: Arc<RoundShared>,
    gateway: Arc<dyn SubmissionGateway>,
    record_sections: bool,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PracticeRound {
    /// Must be called from within a tokio runtime.
    pub fn new(
        format: DebateFormat,
        uid: impl Into<String>,
        focus: Arc<AudioFocus>,
        gateway: Arc<dyn SubmissionGateway>,
        options: RoundOptions,
        events: EventSink<RoundEvent>,
    ) -> Result<Self, PracticeError> {
        let prep_events = events.clone();
        let prep_sink: EventSink<ClockEvent> =
            Arc::new(move |event: ClockEvent| prep_events(RoundEvent::Prep { event }));
        let prep = Clock::loaded(format.prep_seconds(), prep_sink)
            .with_tick_interval(options.tick_interval);

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let section_events = events.clone();
        let section_sink: EventSink<SequencerEvent> = Arc::new(move |event: SequencerEvent| {
            let complete = event == SequencerEvent::SequenceComplete;
            section_events(RoundEvent::Section { event });
            if complete {
                let _ = completion_tx.send(());
            }
        });
        let sequencer = Sequencer::new(format.sections(), section_sink)?
            .with_tick_interval(options.tick_interval);

        let level_events = events.clone();
        let level_sink: EventSink<LevelReading> =
            Arc::new(move |reading: LevelReading| level_events(RoundEvent::Level { reading }));

        let shared = Arc::new(RoundShared {
            levels: level_source(&options.meter, &focus),
            meter_interval: options.meter.interval(),
            focus,
            review: Mutex::new(ReviewForm::new(format.review_template())),
            review_open: AtomicBool::new(false),
            meter: Mutex::new(LevelMeter::new(level_sink)),
            events,
        });

        let cancel = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(shared.clone(), completion_rx, cancel.clone()));
        info!("{} round opened", format.label());

        Ok(Self {
            format,
            context: SubmissionContext::new(uid, format.label()),
            prep,
            sequencer,
            shared,
            gateway,
            record_sections: options.record_sections,
            cancel,
            supervisor: Mutex::new(Some(supervisor)),
            closed: AtomicBool::new(false),
        })
    }

    /// A round plus the receiving end of its events.
    pub fn channel(
        format: DebateFormat,
        uid: impl Into<String>,
        focus: Arc<AudioFocus>,
        gateway: Arc<dyn SubmissionGateway>,
        options: RoundOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoundEvent>), PracticeError> {
        let (sink, rx) = channel_sink();
        Ok((Self::new(format, uid, focus, gateway, options, sink)?, rx))
    }

    pub fn format(&self) -> DebateFormat {
        self.format
    }

    pub fn context(&self) -> &SubmissionContext {
        &self.context
    }

    // Prep

    /// Continues the prep clock, or restarts it once it has run out.
    pub async fn start_prep(&self) -> Result<bool, PracticeError> {
        if self.prep.remaining_seconds().await == 0 {
            return Ok(self.prep.start(self.format.prep_seconds()).await?);
        }
        Ok(self.prep.resume().await)
    }

    pub async fn stop_prep(&self) -> bool {
        self.prep.stop().await
    }

    pub async fn shave_prep(&self) {
        self.prep.shave(SHAVE_SECONDS).await
    }

    pub async fn reset_prep(&self) {
        self.prep.reset(self.format.prep_seconds()).await
    }

    pub async fn prep(&self) -> TimerState {
        self.prep.state().await
    }

    // Sections

    /// Runs the current section, optionally starting a recording first. A
    /// recording that fails to start leaves the section untouched.
    pub async fn start_section(&self, record: bool) -> Result<bool, PracticeError> {
        if record && !self.shared.focus.recorder().is_busy().await {
            self.shared.begin_recording().await?;
        }
        Ok(self.sequencer.start().await)
    }

    /// The start button: runs the current section, recording it when the
    /// round was opened with `record_sections`.
    pub async fn begin_section(&self) -> Result<bool, PracticeError> {
        self.start_section(self.record_sections).await
    }

    pub async fn stop_section(&self) -> bool {
        self.sequencer.stop().await
    }

    pub async fn skip_section(&self) {
        self.sequencer.skip().await
    }

    pub async fn jump_to(&self, index: usize) -> Result<(), PracticeError> {
        Ok(self.sequencer.jump_to(index).await?)
    }

    pub async fn shave_section(&self) {
        self.sequencer.shave(SHAVE_SECONDS).await
    }

    pub async fn reset_section(&self) {
        self.sequencer.reset_section().await
    }

    pub async fn current_section(&self) -> Section {
        self.sequencer.current().await
    }

    pub async fn sequence(&self) -> SequencerState {
        self.sequencer.snapshot().await
    }

    // Recording

    pub async fn start_recording(&self) -> Result<(), PracticeError> {
        self.shared.begin_recording().await
    }

    pub async fn stop_recording(&self) -> Result<RecordingHandle, PracticeError> {
        self.shared.finish_recording().await
    }

    pub async fn is_recording(&self) -> bool {
        self.shared.focus.recorder().is_recording().await
    }

    /// Plays the take attached to the review. An active recording is
    /// finished first and becomes that take.
    pub async fn play_recording(&self) -> Result<RecordingHandle, PracticeError> {
        if self.is_recording().await {
            self.shared.finish_recording().await?;
        }
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

    pub async fn pause_playback(&self) -> Result<(), PracticeError> {
        Ok(self.shared.focus.pause_playback().await?)
    }

    pub async fn stop_playback(&self) -> Result<(), PracticeError> {
        Ok(self.shared.focus.stop_playback().await?)
    }

    // Review

    pub fn is_review_open(&self) -> bool {
        self.shared.review_open.load(Ordering::SeqCst)
    }

    /// Copy of the form as it stands.
    pub async fn review(&self) -> ReviewForm {
        self.shared.review.lock().await.clone()
    }

    pub async fn edit_review<R>(&self, edit: impl FnOnce(&mut ReviewForm) -> R) -> R {
        let mut form = self.shared.review.lock().await;
        edit(&mut form)
    }

    pub async fn toggle_item(&self, index: usize) -> Result<bool, PracticeError> {
        Ok(self.edit_review(|form| form.toggle(index)).await?)
    }

    pub async fn set_rating(&self, rating: u8) -> u8 {
        self.edit_review(|form| form.set_rating(rating)).await
    }

    pub async fn enter_points(&self, key: &str, raw: &str) -> Result<u32, PracticeError> {
        Ok(self.edit_review(|form| form.enter_points(key, raw)).await?)
    }

    pub async fn review_total(&self) -> u32 {
        self.shared.review.lock().await.total()
    }

    pub async fn submit_review(&self) -> Result<SubmissionReceipt, PracticeError> {
        let receipt = submit_review(&self.shared.review, self.gateway.as_ref(), &self.context).await?;
        info!(
            "{} review submitted as {}",
            self.format.label(),
            receipt.score_id
        );
        (self.shared.events)(RoundEvent::Submitted {
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }

    pub async fn coaching_with<R: Rng + ?Sized>(&self, rng: &mut R) -> CoachingNotes {
        let form = self.shared.review.lock().await;
        coaching_notes(&form, rng)
    }

    pub async fn coaching(&self) -> CoachingNotes {
        let form = self.shared.review.lock().await;
        coaching_notes(&form, &mut rand::thread_rng())
    }

    /// Clears the review without touching the clocks.
    pub async fn reset_review(&self) {
        self.shared.review.lock().await.reset();
        self.shared.review_open.store(false, Ordering::SeqCst);
    }

    /// Back to the first section with a full prep clock; the current take
    /// is dropped and the review cleared.
    pub async fn reset_all(&self) {
        self.prep.reset(self.format.prep_seconds()).await;
        self.sequencer.reset().await;
        self.shared.stop_meter().await;
        self.shared.focus.release().await;
        self.reset_review().await;
    }

    /// Leaves the screen: every clock and the meter stop, the microphone and
    /// speaker are released. Nothing is emitted afterwards.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.prep.shutdown().await;
        self.sequencer.shutdown().await;
        self.shared.stop_meter().await;
        self.shared.focus.release().await;
        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(err) = handle.await {
                warn!("round supervisor ended abnormally: {err}");
            }
        }
        info!("{} round closed", self.format.label());
    }
}

impl Drop for PracticeRound {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // The clocks stop with their controllers; the meter and the
        // microphone need an async hand-off.
        match Handle::try_current() {
            Ok(runtime) => {
                let shared = self.shared.clone();
                runtime.spawn(async move {
                    shared.stop_meter().await;
                    shared.focus.release().await;
                });
            }
            Err(_) => warn!("round dropped outside a runtime, audio not released"),
        }
    }
}

async fn supervise(
    shared: Arc<RoundShared>,
    mut completions: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = completions.recv() => {
                if next.is_none() {
                    break;
                }
                if !shared.focus.recorder().is_recording().await {
                    continue;
                }
                info!("last section expired, closing the take");
                if let Err(err) = shared.finish_recording().await {
                    warn!("could not stop recording at end of round: {err}");
                }
            }
        }
    }
}
