pub mod accounts;
pub mod admin;
pub mod assignments;
pub mod audio;
pub mod db;
pub mod gateway;
pub mod models;
pub mod practice;
pub mod review;
pub mod settings;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;

use accounts::AccountService;
use admin::AdminConsole;
use assignments::StudentAssignments;
use audio::{
    AudioFocus, AudioOutput, CaptureBackend, CpalCapture, PlaybackEvent, PlaybackSession,
    RecorderSession, RodioOutput,
};
use db::Database;
use gateway::{
    blob_store::DEFAULT_MAX_BLOB_SIZE, reconcile_orphans, LocalBlobStore, LocalGateway,
    ObjectStore,
};
use models::DebateFormat;
use practice::{DrillEvent, ImpromptuDrill, PracticeError, PracticeRound, RoundEvent, RoundOptions};
use settings::SettingsStore;
use timer::{channel_sink, EventSink};

pub use utils::init_logging;

/// Pending uploads older than this are treated as orphans at startup.
const ORPHAN_GRACE_HOURS: i64 = 1;

/// Long-lived services shared by every practice screen.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub focus: Arc<AudioFocus>,
    pub gateway: LocalGateway,
    pub accounts: AccountService,
    pub admin: AdminConsole,
    pub assignments: StudentAssignments,
    data_dir: PathBuf,
}

impl AppState {
    /// Opens everything under `data_dir` on the real microphone and speaker.
    pub async fn bootstrap(
        data_dir: PathBuf,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlaybackEvent>)> {
        let (playback_events, rx) = channel_sink();
        let state = Self::with_backends(
            data_dir,
            Arc::new(CpalCapture::new()),
            Arc::new(RodioOutput::new()),
            playback_events,
        )
        .await?;
        Ok((state, rx))
    }

    pub async fn with_backends(
        data_dir: PathBuf,
        capture: Arc<dyn CaptureBackend>,
        output: Arc<dyn AudioOutput>,
        playback_events: EventSink<PlaybackEvent>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("podium.sqlite3"))?;
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalBlobStore::new(data_dir.join("blobs"), DEFAULT_MAX_BLOB_SIZE).await?,
        );

        let recordings_dir = data_dir.join("recordings");
        std::fs::create_dir_all(&recordings_dir).with_context(|| {
            format!(
                "failed to create recordings directory {}",
                recordings_dir.display()
            )
        })?;

        let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

        let recorder = Arc::new(RecorderSession::new(capture, recordings_dir));
        let playback = Arc::new(PlaybackSession::new(output, playback_events));
        let focus = Arc::new(AudioFocus::new(recorder, playback));

        // Uploads whose record write never landed.
        match reconcile_orphans(
            &db,
            store.as_ref(),
            chrono::Duration::hours(ORPHAN_GRACE_HOURS),
        )
        .await
        {
            Ok(0) => debug!("no orphaned uploads"),
            Ok(removed) => info!("removed {removed} orphaned uploads"),
            Err(err) => warn!("orphan reconciliation failed: {err:#}"),
        }

        let gateway = LocalGateway::new(db.clone(), store);
        let accounts = AccountService::new(db.clone(), settings.clone());
        let admin = AdminConsole::new(accounts.clone());
        let assignments = StudentAssignments::new(accounts.clone(), gateway.clone());

        info!("podium ready in {}", data_dir.display());
        Ok(Self {
            db,
            settings,
            focus,
            gateway,
            accounts,
            admin,
            assignments,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Meter and recording options as currently configured.
    pub fn round_options(&self) -> RoundOptions {
        let defaults = RoundOptions::default();
        match self.settings.snapshot() {
            Ok(settings) => RoundOptions {
                meter: settings.meter,
                record_sections: settings.record_sections_by_default,
                ..defaults
            },
            Err(err) => {
                warn!("practice settings unavailable, using defaults: {err:#}");
                defaults
            }
        }
    }

    /// Opens a practice screen for `uid`, with the saved playback volume
    /// applied.
    pub async fn open_round(
        &self,
        format: DebateFormat,
        uid: &str,
    ) -> Result<(PracticeRound, mpsc::UnboundedReceiver<RoundEvent>), PracticeError> {
        self.apply_volume().await;
        PracticeRound::channel(
            format,
            uid,
            self.focus.clone(),
            Arc::new(self.gateway.clone()),
            self.round_options(),
        )
    }

    pub async fn open_drill(
        &self,
        format: DebateFormat,
    ) -> (ImpromptuDrill, mpsc::UnboundedReceiver<DrillEvent>) {
        self.apply_volume().await;
        let (sink, rx) = channel_sink();
        let drill = ImpromptuDrill::new(
            format,
            self.focus.clone(),
            self.round_options(),
            StdRng::from_entropy(),
            sink,
        );
        (drill, rx)
    }

    async fn apply_volume(&self) {
        let volume = match self.settings.playback_volume() {
            Ok(volume) => volume,
            Err(err) => {
                warn!("playback volume unavailable: {err:#}");
                return;
            }
        };
        if let Err(err) = self.focus.playback().set_volume(volume).await {
            debug!("volume not applied yet: {err}");
        }
    }
}
