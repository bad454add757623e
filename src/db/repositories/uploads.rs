//! Journal of blob uploads, used to find blobs no record ever referenced.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{format_datetime, parse_datetime, parse_optional_datetime},
    Database,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Linked,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Linked => "linked",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(UploadStatus::Pending),
            "linked" => Ok(UploadStatus::Linked),
            other => Err(anyhow!("unknown upload status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub key: String,
    pub url: String,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub linked_at: Option<DateTime<Utc>>,
}

/// A journaled blob waiting for the record that will reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub key: String,
    pub url: String,
}

/// Marks `key` linked inside the caller's transaction.
pub(crate) fn link_within(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "UPDATE uploads SET status = 'linked', linked_at = ?1 WHERE key = ?2",
        params![format_datetime(&Utc::now()), key],
    )
    .context("failed to mark upload linked")?;
    Ok(())
}

fn row_to_upload(row: &Row) -> Result<UploadRecord> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    Ok(UploadRecord {
        key: row.get("key")?,
        url: row.get("url")?,
        status: UploadStatus::parse(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        linked_at: parse_optional_datetime(row.get("linked_at")?, "linked_at")?,
    })
}

impl Database {
    pub async fn record_pending_upload(
        &self,
        key: &str,
        url: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = key.to_string();
        let url = url.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO uploads (key, url, status, created_at)
                 VALUES (?1, ?2, 'pending', ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     url = excluded.url,
                     status = 'pending',
                     created_at = excluded.created_at,
                     linked_at = NULL",
                params![key, url, format_datetime(&created_at)],
            )
            .context("failed to journal upload")?;
            Ok(())
        })
        .await
    }

    pub async fn mark_upload_linked(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE uploads SET status = 'linked', linked_at = ?1 WHERE key = ?2",
                    params![format_datetime(&Utc::now()), key],
                )
                .context("failed to mark upload linked")?;
            Ok(updated > 0)
        })
        .await
    }

    /// Uploads still pending that were journaled before `cutoff`.
    pub async fn list_stale_uploads(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, url, status, created_at, linked_at
                 FROM uploads
                 WHERE status = 'pending' AND created_at < ?1
                 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query(params![format_datetime(&cutoff)])?;
            let mut uploads = Vec::new();
            while let Some(row) = rows.next()? {
                uploads.push(row_to_upload(row)?);
            }
            Ok(uploads)
        })
        .await
    }

    /// Whether a saved score or assignment submission points at `url`.
    pub async fn upload_is_referenced(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        self.execute(move |conn| {
            let referenced: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM scores WHERE recording_url = ?1)
                         OR EXISTS (SELECT 1 FROM user_assignments
                                    WHERE submission_audio_url = ?1)",
                    params![url],
                    |row| row.get(0),
                )
                .context("failed to look up upload references")?;
            Ok(referenced)
        })
        .await
    }

    pub async fn get_upload(&self, key: &str) -> Result<Option<UploadRecord>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, url, status, created_at, linked_at FROM uploads WHERE key = ?1",
            )?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_upload(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn delete_upload(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM uploads WHERE key = ?1", params![key])
                .context("failed to delete upload journal entry")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::test_support::open_temp;

    #[tokio::test]
    async fn only_old_pending_uploads_are_stale() {
        let (_dir, db) = open_temp();
        let now = Utc::now();
        db.record_pending_upload("old", "file:///old", now - Duration::hours(2))
            .await
            .unwrap();
        db.record_pending_upload("fresh", "file:///fresh", now).await.unwrap();
        db.record_pending_upload("done", "file:///done", now - Duration::hours(2))
            .await
            .unwrap();
        assert!(db.mark_upload_linked("done").await.unwrap());

        let stale = db
            .list_stale_uploads(now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key, "old");
        assert_eq!(stale[0].status, UploadStatus::Pending);

        let done = db.get_upload("done").await.unwrap().unwrap();
        assert_eq!(done.status, UploadStatus::Linked);
        assert!(done.linked_at.is_some());
    }
}
