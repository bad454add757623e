use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecordingHandle;

/// Values collected by a review form, in the shape of its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ReviewScores {
    Checklist {
        items: Vec<String>,
        checked: Vec<bool>,
        rating: u8,
    },
    Rubric {
        breakdown: BTreeMap<String, u32>,
        total: u32,
        max_total: u32,
    },
}

impl ReviewScores {
    /// The headline number: the 1-5 rating or the rubric total.
    pub fn total(&self) -> u32 {
        match self {
            ReviewScores::Checklist { rating, .. } => u32::from(*rating),
            ReviewScores::Rubric { total, .. } => *total,
        }
    }

    pub fn max_total(&self) -> u32 {
        match self {
            ReviewScores::Checklist { .. } => 5,
            ReviewScores::Rubric { max_total, .. } => *max_total,
        }
    }

    /// Per-item values; checklist items map to 1 (checked) or 0.
    pub fn breakdown(&self) -> BTreeMap<String, u32> {
        match self {
            ReviewScores::Checklist { items, checked, .. } => items
                .iter()
                .zip(checked)
                .map(|(item, done)| (item.clone(), u32::from(*done)))
                .collect(),
            ReviewScores::Rubric { breakdown, .. } => breakdown.clone(),
        }
    }
}

/// A submitted self-review. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub id: String,
    pub scores: ReviewScores,
    pub recording: Option<RecordingHandle>,
    pub created_at: DateTime<Utc>,
}
