use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::models::{AccountStatus, UserAccount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeterSource {
    /// Synthesized levels; not a real measurement.
    Simulated,
    Microphone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeterSettings {
    pub enabled: bool,
    pub source: MeterSource,
    pub interval_ms: u64,
}

impl MeterSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(20))
    }
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            source: MeterSource::Simulated,
            interval_ms: 200,
        }
    }
}

/// Last profile seen from the store. Shown while offline; never used to
/// decide access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProfile {
    pub uid: String,
    pub display_name: String,
    pub is_admin: bool,
    pub status: AccountStatus,
}

impl From<&UserAccount> for CachedProfile {
    fn from(account: &UserAccount) -> Self {
        Self {
            uid: account.uid.clone(),
            display_name: account.display_name.clone(),
            is_admin: account.is_admin,
            status: account.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PracticeSettings {
    pub meter: MeterSettings,
    pub playback_volume: f32,
    pub record_sections_by_default: bool,
    pub cached_profile: Option<CachedProfile>,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            meter: MeterSettings::default(),
            playback_volume: 1.0,
            record_sections_by_default: true,
            cached_profile: None,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PracticeSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("settings at {} unreadable, using defaults: {err}", path.display());
                PracticeSettings::default()
            })
        } else {
            PracticeSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> Result<PracticeSettings> {
        Ok(self.read()?.clone())
    }

    pub fn meter(&self) -> Result<MeterSettings> {
        Ok(self.read()?.meter.clone())
    }

    pub fn update_meter(&self, meter: MeterSettings) -> Result<()> {
        self.update(|settings| settings.meter = meter)
    }

    pub fn playback_volume(&self) -> Result<f32> {
        Ok(self.read()?.playback_volume)
    }

    /// Stores the volume clamped to `[0, 1]` and returns it.
    pub fn set_playback_volume(&self, volume: f32) -> Result<f32> {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self.update(|settings| settings.playback_volume = volume)?;
        Ok(volume)
    }

    pub fn record_sections_by_default(&self) -> Result<bool> {
        Ok(self.read()?.record_sections_by_default)
    }

    pub fn set_record_sections_by_default(&self, enabled: bool) -> Result<()> {
        self.update(|settings| settings.record_sections_by_default = enabled)
    }

    pub fn cached_profile(&self) -> Result<Option<CachedProfile>> {
        Ok(self.read()?.cached_profile.clone())
    }

    pub fn set_cached_profile(&self, profile: Option<CachedProfile>) -> Result<()> {
        self.update(|settings| settings.cached_profile = profile)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: PracticeSettings =
            serde_json::from_str(&contents).context("Failed to parse settings")?;
        *self.write()? = data;
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut PracticeSettings)) -> Result<()> {
        let mut guard = self.write()?;
        change(&mut guard);
        self.persist(&guard)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, PracticeSettings>> {
        self.data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, PracticeSettings>> {
        self.data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn persist(&self, data: &PracticeSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
