//! A gateway that keeps submissions in memory, for tests and offline use.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{GatewayError, SubmissionContext, SubmissionGateway, SubmissionReceipt};
use crate::models::ReviewSubmission;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct MemoryState {
    received: Vec<(SubmissionContext, ReviewSubmission)>,
    fail_with: Option<GatewayError>,
    attempts: usize,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following submit fails with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<GatewayError>) {
        lock(&self.state).fail_with = error;
    }

    pub fn received(&self) -> Vec<(SubmissionContext, ReviewSubmission)> {
        lock(&self.state).received.clone()
    }

    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }
}

#[async_trait]
impl SubmissionGateway for MemoryGateway {
    async fn submit(
        &self,
        context: &SubmissionContext,
        submission: &ReviewSubmission,
    ) -> Result<SubmissionReceipt, GatewayError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        state.attempts += 1;
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        state
            .received
            .push((context.clone(), submission.clone()));
        Ok(SubmissionReceipt {
            score_id: submission.id.clone(),
            recording_url: submission
                .recording
                .as_ref()
                .map(|handle| format!("memory://{}", handle.uri.display())),
        })
    }
}
