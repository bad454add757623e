use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_date, format_datetime, parse_date, parse_datetime, parse_optional_date},
    Database,
};
use crate::models::{Announcement, Tournament};

fn row_to_announcement(row: &Row) -> Result<Announcement> {
    let created_at: String = row.get("created_at")?;
    Ok(Announcement {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        date: parse_optional_date(row.get("date")?, "date")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn row_to_tournament(row: &Row) -> Result<Tournament> {
    let start_date: String = row.get("start_date")?;
    let created_at: String = row.get("created_at")?;
    Ok(Tournament {
        id: row.get("id")?,
        name: row.get("name")?,
        location: row.get("location")?,
        start_date: parse_date(&start_date, "start_date")?,
        end_date: parse_optional_date(row.get("end_date")?, "end_date")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_announcement(&self, announcement: &Announcement) -> Result<()> {
        let record = announcement.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO announcements (id, title, content, date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.title,
                    record.content,
                    record.date.as_ref().map(format_date),
                    format_datetime(&record.created_at),
                ],
            )
            .context("failed to insert announcement")?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn list_announcements(&self) -> Result<Vec<Announcement>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content, date, created_at
                 FROM announcements
                 ORDER BY created_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut announcements = Vec::new();
            while let Some(row) = rows.next()? {
                announcements.push(row_to_announcement(row)?);
            }
            Ok(announcements)
        })
        .await
    }

    pub async fn delete_announcement(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM announcements WHERE id = ?1", params![id])
                .context("failed to delete announcement")?;
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn insert_tournament(&self, tournament: &Tournament) -> Result<()> {
        let record = tournament.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO tournaments (id, name, location, start_date, end_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.name,
                    record.location,
                    format_date(&record.start_date),
                    record.end_date.as_ref().map(format_date),
                    format_datetime(&record.created_at),
                ],
            )
            .context("failed to insert tournament")?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn list_tournaments(&self) -> Result<Vec<Tournament>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, location, start_date, end_date, created_at
                 FROM tournaments
                 ORDER BY created_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut tournaments = Vec::new();
            while let Some(row) = rows.next()? {
                tournaments.push(row_to_tournament(row)?);
            }
            Ok(tournaments)
        })
        .await
    }

    pub async fn delete_tournament(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM tournaments WHERE id = ?1", params![id])
                .context("failed to delete tournament")?;
            Ok(deleted > 0)
        })
        .await
    }
}
