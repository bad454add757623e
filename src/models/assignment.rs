use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentStatus {
    Assigned,
    Submitted,
    Feedback,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Submitted => "submitted",
            AssignmentStatus::Feedback => "feedback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assigned" => Some(AssignmentStatus::Assigned),
            "submitted" => Some(AssignmentStatus::Submitted),
            "feedback" => Some(AssignmentStatus::Feedback),
            _ => None,
        }
    }

    /// Submitted work and work with feedback both count as done.
    pub fn is_completed(&self) -> bool {
        !matches!(self, AssignmentStatus::Assigned)
    }
}

/// An assignment as authored by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// One user's copy of an assignment, carrying its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignment {
    pub id: String,
    pub assignment_id: String,
    pub uid: String,
    pub title: String,
    pub description: String,
    pub status: AssignmentStatus,
    pub submission_note: Option<String>,
    pub submission_audio_url: Option<String>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub feedback_at: Option<DateTime<Utc>>,
}
