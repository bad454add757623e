use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{format_datetime, parse_assignment_status, parse_datetime, parse_optional_datetime},
    repositories::uploads::{link_within, StagedUpload},
    Database,
};
use crate::models::{Assignment, AssignmentStatus, UserAssignment};

const USER_ASSIGNMENT_SELECT: &str = "SELECT ua.id, ua.assignment_id, ua.uid, a.title, a.description,
        ua.status, ua.submission_note, ua.submission_audio_url, ua.feedback,
        ua.created_at, ua.submitted_at, ua.feedback_at
     FROM user_assignments ua
     JOIN assignments a ON a.id = ua.assignment_id";

fn row_to_user_assignment(row: &Row) -> Result<UserAssignment> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;

    Ok(UserAssignment {
        id: row.get("id")?,
        assignment_id: row.get("assignment_id")?,
        uid: row.get("uid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: parse_assignment_status(&status)?,
        submission_note: row.get("submission_note")?,
        submission_audio_url: row.get("submission_audio_url")?,
        feedback: row.get("feedback")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        submitted_at: parse_optional_datetime(row.get("submitted_at")?, "submitted_at")?,
        feedback_at: parse_optional_datetime(row.get("feedback_at")?, "feedback_at")?,
    })
}

impl Database {
    /// Stores `assignment` and one `assigned` copy per uid in `targets`.
    /// Returns how many copies were created; duplicate uids are skipped.
    pub async fn insert_assignment(
        &self,
        assignment: &Assignment,
        targets: Vec<String>,
    ) -> Result<usize> {
        let record = assignment.clone();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open assignment transaction")?;
            tx.execute(
                "INSERT INTO assignments (id, title, description, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.title,
                    record.description,
                    record.created_by,
                    format_datetime(&record.created_at),
                ],
            )
            .context("failed to insert assignment")?;

            let mut created = 0;
            for uid in &targets {
                created += tx
                    .execute(
                        "INSERT OR IGNORE INTO user_assignments (id, assignment_id, uid, status, created_at)
                         VALUES (?1, ?2, ?3, 'assigned', ?4)",
                        params![
                            Uuid::new_v4().to_string(),
                            record.id,
                            uid,
                            format_datetime(&record.created_at),
                        ],
                    )
                    .context("failed to insert user assignment")?;
            }

            tx.commit().context("failed to commit assignment")?;
            Ok(created)
        })
        .await
    }

    /// A user's assignments, newest first.
    pub async fn list_user_assignments(&self, uid: &str) -> Result<Vec<UserAssignment>> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{USER_ASSIGNMENT_SELECT} WHERE ua.uid = ?1 ORDER BY ua.created_at DESC"
            ))?;
            let mut rows = stmt.query(params![uid])?;
            let mut assignments = Vec::new();
            while let Some(row) = rows.next()? {
                assignments.push(row_to_user_assignment(row)?);
            }
            Ok(assignments)
        })
        .await
    }

    /// Copies waiting for feedback, oldest submission first.
    pub async fn list_submitted_assignments(&self) -> Result<Vec<UserAssignment>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{USER_ASSIGNMENT_SELECT} WHERE ua.status = 'submitted' ORDER BY ua.submitted_at ASC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut assignments = Vec::new();
            while let Some(row) = rows.next()? {
                assignments.push(row_to_user_assignment(row)?);
            }
            Ok(assignments)
        })
        .await
    }

    pub async fn get_user_assignment(&self, id: &str) -> Result<Option<UserAssignment>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("{USER_ASSIGNMENT_SELECT} WHERE ua.id = ?1"))?;
            let assignment = stmt
                .query_row(params![id], |row| Ok(row_to_user_assignment(row)))
                .optional()?
                .transpose()?;
            Ok(assignment)
        })
        .await
    }

    /// Records a submission on the owner's copy. Returns false when `id` is
    /// not one of `uid`'s assignments.
    pub async fn submit_user_assignment(
        &self,
        id: &str,
        uid: &str,
        note: Option<String>,
        audio: Option<StagedUpload>,
        submitted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let id = id.to_string();
        let uid = uid.to_string();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open submission transaction")?;
            let updated = tx
                .execute(
                    "UPDATE user_assignments
                     SET status = ?1,
                         submission_note = ?2,
                         submission_audio_url = ?3,
                         submitted_at = ?4
                     WHERE id = ?5 AND uid = ?6",
                    params![
                        AssignmentStatus::Submitted.as_str(),
                        note,
                        audio.as_ref().map(|upload| upload.url.as_str()),
                        format_datetime(&submitted_at),
                        id,
                        uid,
                    ],
                )
                .context("failed to record assignment submission")?;
            if updated == 0 {
                return Ok(false);
            }
            if let Some(upload) = &audio {
                link_within(&tx, &upload.key)?;
            }
            tx.commit()
                .context("failed to commit assignment submission")?;
            Ok(true)
        })
        .await
    }

    pub async fn set_assignment_feedback(
        &self,
        id: &str,
        feedback: &str,
        feedback_at: DateTime<Utc>,
    ) -> Result<bool> {
        let id = id.to_string();
        let feedback = feedback.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE user_assignments
                     SET status = ?1, feedback = ?2, feedback_at = ?3
                     WHERE id = ?4",
                    params![
                        AssignmentStatus::Feedback.as_str(),
                        feedback,
                        format_datetime(&feedback_at),
                        id,
                    ],
                )
                .context("failed to record assignment feedback")?;
            Ok(updated > 0)
        })
        .await
    }
}
