use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{encode_breakdown, format_datetime, parse_breakdown, parse_datetime, to_i64, to_u32},
    repositories::uploads::link_within,
    Database,
};
use crate::models::PracticeScore;

fn row_to_score(row: &Row) -> Result<PracticeScore> {
    let breakdown: String = row.get("breakdown")?;
    let created_at: String = row.get("created_at")?;

    Ok(PracticeScore {
        id: row.get("id")?,
        uid: row.get("uid")?,
        event: row.get("event")?,
        total: to_u32(row.get("total")?, "total")?,
        max_total: to_u32(row.get("max_total")?, "max_total")?,
        breakdown: parse_breakdown(&breakdown)?,
        recording_url: row.get("recording_url")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn insert(conn: &Connection, score: &PracticeScore) -> Result<()> {
    conn.execute(
        "INSERT INTO scores (id, uid, event, total, max_total, breakdown, recording_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            score.id,
            score.uid,
            score.event,
            to_i64(score.total),
            to_i64(score.max_total),
            encode_breakdown(&score.breakdown)?,
            score.recording_url,
            format_datetime(&score.created_at),
        ],
    )
    .context("failed to insert score")?;
    Ok(())
}

impl Database {
    /// Inserts `score` and, in the same transaction, marks the upload its
    /// recording URL came from as linked.
    pub async fn insert_score(&self, score: &PracticeScore, upload_key: Option<&str>) -> Result<()> {
        let record = score.clone();
        let upload_key = upload_key.map(str::to_string);
        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to open score transaction")?;
            insert(&tx, &record)?;
            if let Some(key) = &upload_key {
                link_within(&tx, key)?;
            }
            tx.commit().context("failed to commit score")?;
            Ok(())
        })
        .await
    }

    /// A user's scores, newest first.
    pub async fn list_scores_for_user(&self, uid: &str) -> Result<Vec<PracticeScore>> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uid, event, total, max_total, breakdown, recording_url, created_at
                 FROM scores
                 WHERE uid = ?1
                 ORDER BY created_at DESC",
            )?;
            let mut rows = stmt.query(params![uid])?;
            let mut scores = Vec::new();
            while let Some(row) = rows.next()? {
                scores.push(row_to_score(row)?);
            }
            Ok(scores)
        })
        .await
    }

    pub async fn delete_score(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM scores WHERE id = ?1", params![id])
                .context("failed to delete score")?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Edits are delete-and-recreate: the old record goes away and
    /// `replacement` is inserted in the same transaction.
    pub async fn replace_score(&self, old_id: &str, replacement: &PracticeScore) -> Result<bool> {
        let old_id = old_id.to_string();
        let record = replacement.clone();
        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to open score transaction")?;
            let deleted = tx
                .execute("DELETE FROM scores WHERE id = ?1", params![old_id])
                .context("failed to delete score")?;
            if deleted == 0 {
                return Ok(false);
            }
            insert(&tx, &record)?;
            tx.commit().context("failed to commit score replacement")?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::{test_support::open_temp, UploadStatus};

    fn score(id: &str, uid: &str, total: u32, minutes_ago: i64) -> PracticeScore {
        PracticeScore {
            id: id.to_string(),
            uid: uid.to_string(),
            event: "Policy".to_string(),
            total,
            max_total: 100,
            breakdown: BTreeMap::from([("clarity".to_string(), total.min(20))]),
            recording_url: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn lists_newest_first_per_user() {
        let (_dir, db) = open_temp();
        db.insert_score(&score("old", "u1", 70, 30), None).await.unwrap();
        db.insert_score(&score("new", "u1", 88, 1), None).await.unwrap();
        db.insert_score(&score("other", "u2", 50, 5), None).await.unwrap();

        let scores = db.list_scores_for_user("u1").await.unwrap();
        let ids: Vec<&str> = scores.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(scores[0].breakdown["clarity"], 20);
    }

    #[tokio::test]
    async fn score_and_upload_link_commit_together() {
        let (_dir, db) = open_temp();
        let now = Utc::now();
        db.record_pending_upload("take", "file:///take.wav", now)
            .await
            .unwrap();

        let mut first = score("s1", "u1", 40, 0);
        first.recording_url = Some("file:///take.wav".to_string());
        db.insert_score(&first, Some("take")).await.unwrap();
        let linked = db.get_upload("take").await.unwrap().unwrap();
        assert_eq!(linked.status, UploadStatus::Linked);

        // A duplicate id fails the insert, and the link rolls back with it.
        db.record_pending_upload("again", "file:///again.wav", now)
            .await
            .unwrap();
        assert!(db.insert_score(&first, Some("again")).await.is_err());
        let pending = db.get_upload("again").await.unwrap().unwrap();
        assert_eq!(pending.status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn replace_deletes_and_recreates() {
        let (_dir, db) = open_temp();
        db.insert_score(&score("a", "u1", 60, 10), None).await.unwrap();

        assert!(db.replace_score("a", &score("b", "u1", 75, 0)).await.unwrap());
        let scores = db.list_scores_for_user("u1").await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].id, "b");
        assert_eq!(scores[0].total, 75);

        assert!(!db.replace_score("missing", &score("c", "u1", 1, 0)).await.unwrap());
        assert_eq!(db.list_scores_for_user("u1").await.unwrap().len(), 1);
    }
}
