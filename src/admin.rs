//! Admin workflow: approving accounts, authoring assignments, giving
//! feedback and keeping the bulletin board current. Every operation checks
//! the caller's stored profile first.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    accounts::{AccessError, AccountService},
    db::Database,
    models::{AccountStatus, Announcement, Assignment, Tournament, UserAccount, UserAssignment},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsByStatus {
    pub pending: Vec<UserAccount>,
    pub approved: Vec<UserAccount>,
    pub rejected: Vec<UserAccount>,
    pub waitlist: Vec<UserAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub title: String,
    pub description: String,
    /// Individually selected users.
    #[serde(default)]
    pub uids: Vec<String>,
    /// Every approved user in this category is added as well.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone)]
pub struct AdminConsole {
    accounts: AccountService,
}

impl AdminConsole {
    pub fn new(accounts: AccountService) -> Self {
        Self { accounts }
    }

    fn db(&self) -> &Database {
        self.accounts.db()
    }

    pub async fn accounts_by_status(&self, admin: &str) -> Result<AccountsByStatus, AccessError> {
        self.accounts.require_admin(admin).await?;
        let mut grouped = AccountsByStatus::default();
        for account in self.db().list_accounts().await? {
            match account.status {
                AccountStatus::Pending => grouped.pending.push(account),
                AccountStatus::Approved => grouped.approved.push(account),
                AccountStatus::Rejected => grouped.rejected.push(account),
                AccountStatus::Waitlist => grouped.waitlist.push(account),
            }
        }
        Ok(grouped)
    }

    pub async fn set_status(
        &self,
        admin: &str,
        uid: &str,
        status: AccountStatus,
    ) -> Result<(), AccessError> {
        self.accounts.require_admin(admin).await?;
        if !self.db().set_account_status(uid, status).await? {
            return Err(AccessError::NotFound(format!("account {uid}")));
        }
        info!("{admin} set {uid} to {}", status.as_str());
        Ok(())
    }

    pub async fn set_admin(&self, admin: &str, uid: &str, is_admin: bool) -> Result<(), AccessError> {
        self.accounts.require_admin(admin).await?;
        if !self.db().set_account_admin(uid, is_admin).await? {
            return Err(AccessError::NotFound(format!("account {uid}")));
        }
        info!("{admin} set admin={is_admin} on {uid}");
        Ok(())
    }

    /// Creates the assignment and one copy per distinct target. Returns the
    /// assignment and how many users received it.
    pub async fn create_assignment(
        &self,
        admin: &str,
        request: NewAssignment,
    ) -> Result<(Assignment, usize), AccessError> {
        self.accounts.require_admin(admin).await?;

        let mut targets: BTreeSet<String> = request
            .uids
            .into_iter()
            .filter(|uid| !uid.is_empty())
            .collect();
        if let Some(category) = request.category.as_deref() {
            targets.extend(self.db().list_approved_uids_in_category(category).await?);
        }

        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            title: request.title,
            description: request.description,
            created_by: admin.to_string(),
            created_at: Utc::now(),
        };
        let created = self
            .db()
            .insert_assignment(&assignment, targets.into_iter().collect())
            .await?;
        info!("assignment {} sent to {created} user(s)", assignment.id);
        Ok((assignment, created))
    }

    /// Submissions waiting for feedback.
    pub async fn submissions(&self, admin: &str) -> Result<Vec<UserAssignment>, AccessError> {
        self.accounts.require_admin(admin).await?;
        Ok(self.db().list_submitted_assignments().await?)
    }

    pub async fn send_feedback(
        &self,
        admin: &str,
        user_assignment_id: &str,
        feedback: &str,
    ) -> Result<(), AccessError> {
        self.accounts.require_admin(admin).await?;
        if !self
            .db()
            .set_assignment_feedback(user_assignment_id, feedback, Utc::now())
            .await?
        {
            return Err(AccessError::NotFound(format!(
                "assignment {user_assignment_id}"
            )));
        }
        Ok(())
    }

    pub async fn post_announcement(
        &self,
        admin: &str,
        title: &str,
        content: &str,
        date: Option<NaiveDate>,
    ) -> Result<Announcement, AccessError> {
        self.accounts.require_admin(admin).await?;
        let announcement = Announcement {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            date,
            created_at: Utc::now(),
        };
        self.db().insert_announcement(&announcement).await?;
        Ok(announcement)
    }

    pub async fn delete_announcement(&self, admin: &str, id: &str) -> Result<bool, AccessError> {
        self.accounts.require_admin(admin).await?;
        Ok(self.db().delete_announcement(id).await?)
    }

    pub async fn add_tournament(
        &self,
        admin: &str,
        name: &str,
        location: Option<String>,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Tournament, AccessError> {
        self.accounts.require_admin(admin).await?;
        let tournament = Tournament {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            location,
            start_date,
            end_date,
            created_at: Utc::now(),
        };
        self.db().insert_tournament(&tournament).await?;
        Ok(tournament)
    }

    pub async fn delete_tournament(&self, admin: &str, id: &str) -> Result<bool, AccessError> {
        self.accounts.require_admin(admin).await?;
        Ok(self.db().delete_tournament(id).await?)
    }
}

/// Read side of the bulletin board, open to any approved user.
pub struct Bulletin {
    pub announcements: Vec<Announcement>,
    pub tournaments: Vec<Tournament>,
}

pub async fn bulletin(accounts: &AccountService, uid: &str) -> Result<Bulletin, AccessError> {
    accounts.require_approved(uid).await?;
    Ok(Bulletin {
        announcements: accounts.db().list_announcements().await?,
        tournaments: accounts.db().list_tournaments().await?,
    })
}
