use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{format_datetime, parse_account_status, parse_datetime},
    Database,
};
use crate::models::{AccountStatus, UserAccount};

const ACCOUNT_COLUMNS: &str =
    "uid, display_name, category, status, is_admin, created_at, updated_at";

fn row_to_account(row: &Row) -> Result<UserAccount> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(UserAccount {
        uid: row.get("uid")?,
        display_name: row.get("display_name")?,
        category: row.get("category")?,
        status: parse_account_status(&status)?,
        is_admin: row.get::<_, i64>("is_admin")? != 0,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Inserts or overwrites the profile with the same uid.
    pub async fn upsert_account(&self, account: &UserAccount) -> Result<()> {
        let record = account.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO accounts (uid, display_name, category, status, is_admin, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(uid) DO UPDATE SET
                     display_name = excluded.display_name,
                     category = excluded.category,
                     status = excluded.status,
                     is_admin = excluded.is_admin,
                     updated_at = excluded.updated_at",
                params![
                    record.uid,
                    record.display_name,
                    record.category,
                    record.status.as_str(),
                    record.is_admin as i64,
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )
            .context("failed to upsert account")?;
            Ok(())
        })
        .await
    }

    pub async fn get_account(&self, uid: &str) -> Result<Option<UserAccount>> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE uid = ?1"
            ))?;
            let account = stmt
                .query_row(params![uid], |row| Ok(row_to_account(row)))
                .optional()?
                .transpose()?;
            Ok(account)
        })
        .await
    }

    /// Every account, sorted by display name.
    pub async fn list_accounts(&self) -> Result<Vec<UserAccount>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY display_name COLLATE NOCASE"
            ))?;
            let mut rows = stmt.query([])?;
            let mut accounts = Vec::new();
            while let Some(row) = rows.next()? {
                accounts.push(row_to_account(row)?);
            }
            Ok(accounts)
        })
        .await
    }

    /// Uids of approved accounts in `category`.
    pub async fn list_approved_uids_in_category(&self, category: &str) -> Result<Vec<String>> {
        let category = category.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT uid FROM accounts
                 WHERE category = ?1 AND status = 'approved'
                 ORDER BY uid",
            )?;
            let uids = stmt
                .query_map(params![category], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(uids)
        })
        .await
    }

    pub async fn set_account_status(&self, uid: &str, status: AccountStatus) -> Result<bool> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE accounts SET status = ?1, updated_at = ?2 WHERE uid = ?3",
                    params![status.as_str(), format_datetime(&Utc::now()), uid],
                )
                .context("failed to update account status")?;
            Ok(updated > 0)
        })
        .await
    }

    /// Self-service edit: only the name and category change, never the
    /// status or admin flag.
    pub async fn update_account_profile(
        &self,
        uid: &str,
        display_name: &str,
        category: Option<String>,
    ) -> Result<bool> {
        let uid = uid.to_string();
        let display_name = display_name.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE accounts
                     SET display_name = ?1, category = ?2, updated_at = ?3
                     WHERE uid = ?4",
                    params![display_name, category, format_datetime(&Utc::now()), uid],
                )
                .context("failed to update profile")?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn set_account_admin(&self, uid: &str, is_admin: bool) -> Result<bool> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE accounts SET is_admin = ?1, updated_at = ?2 WHERE uid = ?3",
                    params![is_admin as i64, format_datetime(&Utc::now()), uid],
                )
                .context("failed to update admin flag")?;
            Ok(updated > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp;

    #[tokio::test]
    async fn new_accounts_start_pending() {
        let (_dir, db) = open_temp();
        db.upsert_account(&UserAccount::new("u1", "Ada", Some("Policy".into())))
            .await
            .unwrap();

        let account = db.get_account("u1").await.unwrap().unwrap();
        assert_eq!(account.status, AccountStatus::Pending);
        assert!(!account.is_admin);
        assert!(db.get_account("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approved_category_members_only() {
        let (_dir, db) = open_temp();
        for (uid, category) in [("a", "Policy"), ("b", "Policy"), ("c", "Congress")] {
            db.upsert_account(&UserAccount::new(uid, uid, Some(category.into())))
                .await
                .unwrap();
        }
        db.set_account_status("a", AccountStatus::Approved).await.unwrap();
        db.set_account_status("c", AccountStatus::Approved).await.unwrap();

        assert_eq!(
            db.list_approved_uids_in_category("Policy").await.unwrap(),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn status_and_admin_updates_report_missing_rows() {
        let (_dir, db) = open_temp();
        assert!(!db.set_account_status("ghost", AccountStatus::Approved).await.unwrap());
        db.upsert_account(&UserAccount::new("u1", "Ada", None)).await.unwrap();
        assert!(db.set_account_admin("u1", true).await.unwrap());
        assert!(db.get_account("u1").await.unwrap().unwrap().is_admin);
    }
}
