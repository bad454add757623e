use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
    Waitlist,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Approved => "approved",
            AccountStatus::Rejected => "rejected",
            AccountStatus::Waitlist => "waitlist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AccountStatus::Pending),
            "approved" => Some(AccountStatus::Approved),
            "rejected" => Some(AccountStatus::Rejected),
            "waitlist" => Some(AccountStatus::Waitlist),
            _ => None,
        }
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        AccountStatus::Pending
    }
}

/// Profile record for a signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub uid: String,
    pub display_name: String,
    pub category: Option<String>,
    pub status: AccountStatus,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// A fresh sign-up: pending approval, not an admin.
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>, category: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            category,
            status: AccountStatus::Pending,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }
}
