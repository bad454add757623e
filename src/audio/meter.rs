//! Voice level meter shown while a speech is being recorded.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::RecorderSession;
use crate::timer::EventSink;

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const REFERENCE_AMPLITUDE: f32 = 0.0001;
pub const MIN_DECIBELS: f32 = 30.0;
pub const MAX_DECIBELS: f32 = 80.0;
pub const GOOD_RANGE: (f32, f32) = (65.0, 75.0);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VoiceStatus {
    NotRecording,
    TooLow,
    GoodVolume,
    TooHigh,
}

impl VoiceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VoiceStatus::NotRecording => "Not Recording",
            VoiceStatus::TooLow => "Too Low",
            VoiceStatus::GoodVolume => "Good Volume",
            VoiceStatus::TooHigh => "Too High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReading {
    pub decibels: f32,
    pub status: VoiceStatus,
}

impl LevelReading {
    pub fn idle() -> Self {
        Self {
            decibels: 0.0,
            status: VoiceStatus::NotRecording,
        }
    }

    pub fn from_amplitude(amplitude: f32) -> Self {
        let decibels = decibels(amplitude);
        Self {
            decibels,
            status: classify(decibels),
        }
    }
}

/// Amplitude to display decibels, clamped to the meter's range. Silence reads 0.
pub fn decibels(amplitude: f32) -> f32 {
    if !(amplitude > 0.0) {
        return 0.0;
    }
    (20.0 * (amplitude / REFERENCE_AMPLITUDE).log10()).clamp(MIN_DECIBELS, MAX_DECIBELS)
}

pub fn classify(decibels: f32) -> VoiceStatus {
    let (low, high) = GOOD_RANGE;
    if decibels < low {
        VoiceStatus::TooLow
    } else if decibels > high {
        VoiceStatus::TooHigh
    } else {
        VoiceStatus::GoodVolume
    }
}

/// Produces one amplitude sample in `[0, 1]` per meter tick.
pub trait LevelSource: Send + Sync {
    fn sample(&self) -> f32;
}

/// Placeholder source that synthesizes speech-like noise instead of reading
/// the microphone.
pub struct SimulatedLevels {
    rng: std::sync::Mutex<StdRng>,
}

impl SimulatedLevels {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: std::sync::Mutex::new(rng),
        }
    }
}

impl Default for SimulatedLevels {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelSource for SimulatedLevels {
    fn sample(&self) -> f32 {
        match self.rng.lock() {
            Ok(mut rng) => {
                let noise: f32 = rng.gen::<f32>() * 0.3;
                let voice: f32 = rng.gen::<f32>() * 0.4;
                0.1 + noise + voice
            }
            Err(_) => 0.0,
        }
    }
}

/// Reads the live RMS of the active recording.
pub struct CaptureLevels {
    recorder: Arc<RecorderSession>,
}

impl CaptureLevels {
    pub fn new(recorder: Arc<RecorderSession>) -> Self {
        Self { recorder }
    }
}

impl LevelSource for CaptureLevels {
    fn sample(&self) -> f32 {
        self.recorder.amplitude()
    }
}

/// Samples a [`LevelSource`] on an interval until stopped.
pub struct LevelMeter {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    sink: EventSink<LevelReading>,
}

impl LevelMeter {
    pub fn new(sink: EventSink<LevelReading>) -> Self {
        Self {
            handle: None,
            cancel_token: None,
            sink,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, source: Arc<dyn LevelSource>, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("level meter already active");
        }
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(meter_loop(
            source,
            interval,
            self.sink.clone(),
            cancel_token.clone(),
        ));
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops sampling and publishes the idle reading.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("level meter task failed to join"),
            None => return Ok(()),
        };
        (self.sink)(LevelReading::idle());
        joined
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn meter_loop(
    source: Arc<dyn LevelSource>,
    interval: Duration,
    sink: EventSink<LevelReading>,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sink(LevelReading::from_amplitude(source.sample()));
            }
            _ = cancel_token.cancelled() => {
                log_info!("level meter shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::channel_sink;

    struct Fixed(f32);

    impl LevelSource for Fixed {
        fn sample(&self) -> f32 {
            self.0
        }
    }

    #[test]
    fn decibels_are_clamped() {
        assert_eq!(decibels(0.0), 0.0);
        assert_eq!(decibels(0.000_001), MIN_DECIBELS);
        assert_eq!(decibels(1.0), MAX_DECIBELS);
        assert!((decibels(0.1) - 60.0).abs() < 0.01);
    }

    #[test]
    fn status_bands() {
        assert_eq!(classify(64.9), VoiceStatus::TooLow);
        assert_eq!(classify(65.0), VoiceStatus::GoodVolume);
        assert_eq!(classify(75.0), VoiceStatus::GoodVolume);
        assert_eq!(classify(75.1), VoiceStatus::TooHigh);
        assert_eq!(VoiceStatus::GoodVolume.label(), "Good Volume");
    }

    #[test]
    fn simulated_levels_stay_in_band() {
        let source = SimulatedLevels::seeded(42);
        for _ in 0..500 {
            let amplitude = source.sample();
            assert!((0.1..=0.8).contains(&amplitude));
            let db = decibels(amplitude);
            assert!((60.0..=MAX_DECIBELS).contains(&db));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_every_interval_until_stopped() {
        let (sink, mut rx) = channel_sink();
        let mut meter = LevelMeter::new(sink);
        meter.start(Arc::new(Fixed(0.3)), DEFAULT_INTERVAL).unwrap();
        assert!(meter.start(Arc::new(Fixed(0.3)), DEFAULT_INTERVAL).is_err());

        time::sleep(Duration::from_millis(1_050)).await;
        meter.stop().await.unwrap();

        let mut readings = Vec::new();
        while let Ok(reading) = rx.try_recv() {
            readings.push(reading);
        }
        assert_eq!(readings.len(), 6);
        assert!(readings[..5]
            .iter()
            .all(|r| r.status == VoiceStatus::GoodVolume));
        assert_eq!(readings[5], LevelReading::idle());
        assert!(!meter.is_active());
    }
}
