//! Profile lookup and the access checks built on it.
//!
//! The stored profile is the only source of truth for approval and admin
//! rights. The copy cached in settings is refreshed here and only ever shown.

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    db::Database,
    models::{AccountStatus, UserAccount},
    settings::{CachedProfile, SettingsStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("account is {}", .0.as_str())]
    NotApproved(AccountStatus),
    #[error("admin rights required")]
    NotAdmin,
    #[error("{0} not found")]
    NotFound(String),
    #[error("account store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for AccessError {
    fn from(err: anyhow::Error) -> Self {
        AccessError::Store(format!("{err:#}"))
    }
}

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    settings: Arc<SettingsStore>,
}

impl AccountService {
    pub fn new(db: Database, settings: Arc<SettingsStore>) -> Self {
        Self { db, settings }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Creates a pending profile on first sign-in; an existing profile is
    /// returned untouched.
    pub async fn register(
        &self,
        uid: &str,
        display_name: &str,
        category: Option<String>,
    ) -> Result<UserAccount, AccessError> {
        if uid.is_empty() {
            return Err(AccessError::NotSignedIn);
        }
        if let Some(existing) = self.db.get_account(uid).await? {
            return Ok(existing);
        }
        let account = UserAccount::new(uid, display_name, category);
        self.db.upsert_account(&account).await?;
        debug!("registered {uid} as pending");
        Ok(account)
    }

    /// Fetches the stored profile and refreshes the cached copy.
    pub async fn load_profile(&self, uid: &str) -> Result<UserAccount, AccessError> {
        if uid.is_empty() {
            return Err(AccessError::NotSignedIn);
        }
        let account = self
            .db
            .get_account(uid)
            .await?
            .ok_or(AccessError::NotSignedIn)?;

        if let Err(err) = self
            .settings
            .set_cached_profile(Some(CachedProfile::from(&account)))
        {
            warn!("could not cache profile for {uid}: {err:#}");
        }
        Ok(account)
    }

    pub async fn require_approved(&self, uid: &str) -> Result<UserAccount, AccessError> {
        let account = self.load_profile(uid).await?;
        if account.status != AccountStatus::Approved {
            return Err(AccessError::NotApproved(account.status));
        }
        Ok(account)
    }

    pub async fn require_admin(&self, uid: &str) -> Result<UserAccount, AccessError> {
        let account = self.load_profile(uid).await?;
        if !account.is_admin {
            return Err(AccessError::NotAdmin);
        }
        Ok(account)
    }

    /// The profile screen's save: a trimmed display name and an optional
    /// category. A blank category clears it.
    pub async fn update_profile(
        &self,
        uid: &str,
        display_name: &str,
        category: Option<String>,
    ) -> Result<UserAccount, AccessError> {
        if uid.is_empty() {
            return Err(AccessError::NotSignedIn);
        }
        let category = category
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty());
        let updated = self
            .db
            .update_account_profile(uid, display_name.trim(), category)
            .await?;
        if !updated {
            return Err(AccessError::NotFound(uid.to_string()));
        }
        debug!("{uid} updated their profile");
        self.load_profile(uid).await
    }

    /// Display hint for the last signed-in user.
    pub fn cached_profile(&self) -> Option<CachedProfile> {
        self.settings.cached_profile().ok().flatten()
    }

    pub fn sign_out(&self) {
        if let Err(err) = self.settings.set_cached_profile(None) {
            warn!("could not clear cached profile: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp;

    fn service(dir: &tempfile::TempDir, db: Database) -> AccountService {
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        AccountService::new(db, settings)
    }

    #[tokio::test]
    async fn cached_admin_flag_grants_nothing() {
        let (dir, db) = open_temp();
        let accounts = service(&dir, db.clone());
        accounts.register("u1", "Ada", None).await.unwrap();

        accounts
            .settings
            .set_cached_profile(Some(CachedProfile {
                uid: "u1".into(),
                display_name: "Ada".into(),
                is_admin: true,
                status: AccountStatus::Approved,
            }))
            .unwrap();

        assert_eq!(
            accounts.require_admin("u1").await.unwrap_err(),
            AccessError::NotAdmin
        );
        let cached = accounts.cached_profile().unwrap();
        assert!(!cached.is_admin);
        assert_eq!(cached.status, AccountStatus::Pending);
    }

    #[tokio::test]
    async fn approval_is_read_from_the_store() {
        let (dir, db) = open_temp();
        let accounts = service(&dir, db.clone());
        accounts.register("u1", "Ada", None).await.unwrap();
        assert_eq!(
            accounts.require_approved("u1").await.unwrap_err(),
            AccessError::NotApproved(AccountStatus::Pending)
        );

        db.set_account_status("u1", AccountStatus::Approved)
            .await
            .unwrap();
        assert!(accounts.require_approved("u1").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_or_empty_identity_is_not_signed_in() {
        let (dir, db) = open_temp();
        let accounts = service(&dir, db);
        assert_eq!(
            accounts.load_profile("").await.unwrap_err(),
            AccessError::NotSignedIn
        );
        assert_eq!(
            accounts.load_profile("ghost").await.unwrap_err(),
            AccessError::NotSignedIn
        );
    }

    #[tokio::test]
    async fn profile_edit_leaves_access_alone() {
        let (dir, db) = open_temp();
        let accounts = service(&dir, db.clone());
        accounts.register("u1", "Ada", None).await.unwrap();
        db.set_account_status("u1", AccountStatus::Approved)
            .await
            .unwrap();
        let before = db.get_account("u1").await.unwrap().unwrap();

        let edited = accounts
            .update_profile("u1", "  Ada L.  ", Some("ld".into()))
            .await
            .unwrap();
        assert_eq!(edited.display_name, "Ada L.");
        assert_eq!(edited.category.as_deref(), Some("ld"));
        assert_eq!(edited.status, AccountStatus::Approved);
        assert!(!edited.is_admin);
        assert!(edited.updated_at >= before.updated_at);
        assert_eq!(accounts.cached_profile().unwrap().display_name, "Ada L.");
        assert_eq!(
            db.list_approved_uids_in_category("ld").await.unwrap(),
            vec!["u1".to_string()]
        );

        let cleared = accounts
            .update_profile("u1", "Ada L.", Some(" ".into()))
            .await
            .unwrap();
        assert_eq!(cleared.category, None);
        assert_eq!(
            accounts.update_profile("ghost", "G", None).await.unwrap_err(),
            AccessError::NotFound("ghost".into())
        );
    }

    #[tokio::test]
    async fn register_keeps_existing_profile() {
        let (dir, db) = open_temp();
        let accounts = service(&dir, db.clone());
        accounts.register("u1", "Ada", None).await.unwrap();
        db.set_account_status("u1", AccountStatus::Approved)
            .await
            .unwrap();

        let again = accounts.register("u1", "Someone else", None).await.unwrap();
        assert_eq!(again.display_name, "Ada");
        assert_eq!(again.status, AccountStatus::Approved);
    }
}
