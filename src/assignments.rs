//! The student side of assignments: seeing what is due and turning work in.

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    accounts::{AccessError, AccountService},
    gateway::{GatewayError, LocalGateway},
    models::{RecordingHandle, UserAssignment},
};

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("assignment {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentBoard {
    pub open: Vec<UserAssignment>,
    pub completed: Vec<UserAssignment>,
}

#[derive(Clone)]
pub struct StudentAssignments {
    accounts: AccountService,
    gateway: LocalGateway,
}

impl StudentAssignments {
    pub fn new(accounts: AccountService, gateway: LocalGateway) -> Self {
        Self { accounts, gateway }
    }

    pub async fn board(&self, uid: &str) -> Result<AssignmentBoard, AssignmentError> {
        self.accounts.require_approved(uid).await?;
        let (completed, open): (Vec<_>, Vec<_>) = self
            .accounts
            .db()
            .list_user_assignments(uid)
            .await
            .map_err(AccessError::from)?
            .into_iter()
            .partition(|assignment| assignment.status.is_completed());
        Ok(AssignmentBoard { open, completed })
    }

    /// Turns in a note and an optional recording. The recording is uploaded
    /// before the assignment record is touched.
    pub async fn submit(
        &self,
        uid: &str,
        user_assignment_id: &str,
        note: Option<String>,
        recording: Option<&RecordingHandle>,
    ) -> Result<UserAssignment, AssignmentError> {
        self.accounts.require_approved(uid).await?;
        let db = self.accounts.db();

        let owned = db
            .get_user_assignment(user_assignment_id)
            .await
            .map_err(AccessError::from)?
            .filter(|assignment| assignment.uid == uid)
            .ok_or_else(|| AssignmentError::NotFound(user_assignment_id.to_string()))?;

        let upload = match recording {
            Some(handle) => {
                let key = format!("assignments/{uid}/{}/{}.wav", owned.id, Uuid::new_v4());
                Some(self.gateway.upload_recording(handle, &key).await?)
            }
            None => None,
        };

        let written = db
            .submit_user_assignment(
                &owned.id,
                uid,
                note,
                upload.clone(),
                Utc::now(),
            )
            .await;
        let failure = match written {
            Ok(true) => None,
            Ok(false) => Some(AssignmentError::NotFound(owned.id.clone())),
            Err(err) => {
                warn!("assignment submission write failed: {err:#}");
                Some(GatewayError::Persistence(format!("{err:#}")).into())
            }
        };
        if let Some(err) = failure {
            if let Some(staged) = &upload {
                self.gateway.abandon_upload(&staged.key).await;
            }
            return Err(err);
        }

        info!("{uid} submitted assignment {}", owned.id);
        db.get_user_assignment(&owned.id)
            .await
            .map_err(AccessError::from)?
            .ok_or_else(|| AssignmentError::NotFound(owned.id.clone()))
    }
}
