use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a finished local recording.
///
/// The file stays owned by whoever produced it until it is handed to a
/// submission gateway; nothing deletes it automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingHandle {
    pub uri: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl RecordingHandle {
    pub fn new(uri: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self { uri, created_at }
    }

    pub fn path(&self) -> &Path {
        &self.uri
    }
}
