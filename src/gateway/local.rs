use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{info, warn};
use uuid::Uuid;

use super::{GatewayError, ObjectStore, SubmissionContext, SubmissionGateway, SubmissionReceipt};
use crate::{
    db::{Database, StagedUpload},
    models::{AccountStatus, PracticeScore, RecordingHandle, ReviewSubmission},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

fn persistence(err: anyhow::Error) -> GatewayError {
    GatewayError::Persistence(format!("{err:#}"))
}

/// Gateway over the local document store and an object store.
///
/// Every upload is journaled as pending before the blob is written and
/// marked linked in the transaction that writes the record referencing it,
/// so a crash or failed write in between leaves something
/// [`reconcile_orphans`] can clean up.
#[derive(Clone)]
pub struct LocalGateway {
    db: Database,
    store: Arc<dyn ObjectStore>,
}

impl LocalGateway {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Fails with `Auth` unless `uid` has an approved profile.
    pub async fn require_approved(&self, uid: &str) -> Result<(), GatewayError> {
        let account = self.db.get_account(uid).await.map_err(persistence)?;
        match account {
            Some(account) if account.status == AccountStatus::Approved => Ok(()),
            Some(account) => Err(GatewayError::Auth(format!(
                "account is {}",
                account.status.as_str()
            ))),
            None => Err(GatewayError::Auth("no profile for this user".to_string())),
        }
    }

    /// Uploads a recording under `key` and journals it as pending. The
    /// record that references it links it in the same transaction.
    pub async fn upload_recording(
        &self,
        handle: &RecordingHandle,
        key: &str,
    ) -> Result<StagedUpload, GatewayError> {
        let url = self.store.url_for(key)?;
        self.db
            .record_pending_upload(key, &url, Utc::now())
            .await
            .map_err(persistence)?;

        match self.store.upload(handle.path(), key).await {
            Ok(url) => {
                log_info!("uploaded {} as {key}", handle.path().display());
                Ok(StagedUpload {
                    key: key.to_string(),
                    url,
                })
            }
            Err(err) => {
                log_warn!("upload of {key} failed: {err}");
                if let Err(cleanup) = self.db.delete_upload(key).await {
                    log_warn!("could not clear journal entry for {key}: {cleanup:#}");
                }
                Err(err)
            }
        }
    }

    /// Best-effort removal of an upload whose record could not be written.
    pub async fn abandon_upload(&self, key: &str) {
        match self.store.delete(key).await {
            Ok(()) => {
                if let Err(err) = self.db.delete_upload(key).await {
                    log_warn!("journal cleanup for {key} failed: {err:#}");
                }
            }
            Err(err) => log_warn!("left orphaned blob {key} for reconciliation: {err}"),
        }
    }
}

#[async_trait]
impl SubmissionGateway for LocalGateway {
    async fn submit(
        &self,
        context: &SubmissionContext,
        submission: &ReviewSubmission,
    ) -> Result<SubmissionReceipt, GatewayError> {
        self.require_approved(&context.uid).await?;

        let upload = match &submission.recording {
            Some(handle) => {
                let key = format!("recordings/{}/{}.wav", context.uid, Uuid::new_v4());
                Some(self.upload_recording(handle, &key).await?)
            }
            None => None,
        };

        let score = PracticeScore {
            id: submission.id.clone(),
            uid: context.uid.clone(),
            event: context.event.clone(),
            total: submission.scores.total(),
            max_total: submission.scores.max_total(),
            breakdown: submission.scores.breakdown(),
            recording_url: upload.as_ref().map(|staged| staged.url.clone()),
            created_at: Utc::now(),
        };

        let upload_key = upload.as_ref().map(|staged| staged.key.as_str());
        if let Err(err) = self.db.insert_score(&score, upload_key).await {
            warn!("score write failed for {}: {err:#}", context.uid);
            if let Some(key) = upload_key {
                self.abandon_upload(key).await;
            }
            return Err(persistence(err));
        }

        info!(
            "saved {} score {} for {}",
            context.event, score.total, context.uid
        );
        Ok(SubmissionReceipt {
            score_id: score.id,
            recording_url: score.recording_url,
        })
    }
}

/// Deletes blobs whose upload was journaled more than `grace` ago but never
/// linked to a record. A stale entry whose URL a saved record does use is
/// linked instead. Returns how many blobs were removed.
pub async fn reconcile_orphans(
    db: &Database,
    store: &dyn ObjectStore,
    grace: Duration,
) -> Result<usize> {
    let stale = db.list_stale_uploads(Utc::now() - grace).await?;
    let mut removed = 0;
    for upload in stale {
        if db.upload_is_referenced(&upload.url).await? {
            warn!("upload {} is referenced but was never linked", upload.key);
            db.mark_upload_linked(&upload.key).await?;
            continue;
        }
        match store.delete(&upload.key).await {
            Ok(()) => {
                db.delete_upload(&upload.key).await?;
                removed += 1;
            }
            Err(err) => warn!("orphaned blob {} not removed: {err}", upload.key),
        }
    }
    if removed > 0 {
        info!("removed {removed} orphaned upload(s)");
    }
    Ok(removed)
}
