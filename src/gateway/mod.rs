//! Where finished reviews go: an object store for recordings and the
//! document store for score records.

pub mod blob_store;
pub mod local;
pub mod testing;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ReviewSubmission;

pub use blob_store::LocalBlobStore;
pub use local::{reconcile_orphans, LocalGateway};
pub use testing::MemoryGateway;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authorized: {0}")]
    Auth(String),
    #[error("storage quota exceeded: {0}")]
    StorageQuota(String),
    #[error("could not save record: {0}")]
    Persistence(String),
}

/// Who is submitting and for which event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionContext {
    pub uid: String,
    pub event: String,
}

impl SubmissionContext {
    pub fn new(uid: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            event: event.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub score_id: String,
    pub recording_url: Option<String>,
}

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Persists `submission`. When it carries a recording, the upload
    /// happens first and the stored record references the durable URL.
    async fn submit(
        &self,
        context: &SubmissionContext,
        submission: &ReviewSubmission,
    ) -> Result<SubmissionReceipt, GatewayError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// URL the object at `key` is (or will be) reachable at.
    fn url_for(&self, key: &str) -> Result<String, GatewayError>;

    async fn upload(&self, local: &Path, key: &str) -> Result<String, GatewayError>;

    /// Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), GatewayError>;
}
