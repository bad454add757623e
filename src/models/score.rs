use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted practice score, one per submitted review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeScore {
    pub id: String,
    pub uid: String,
    pub event: String,
    pub total: u32,
    pub max_total: u32,
    pub breakdown: BTreeMap<String, u32>,
    pub recording_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
