//! Self-review after a recorded speech: the form, its submission and the
//! coaching shown afterwards.

pub mod coaching;
pub mod form;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::gateway::{GatewayError, SubmissionContext, SubmissionGateway, SubmissionReceipt};

pub use coaching::{coaching_notes, CoachingNotes, CoachingTip};
pub use form::{parse_points, ReviewForm, ReviewTemplate, RubricItem};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("unknown rubric item: {0}")]
    UnknownItem(String),
    #[error("checklist has no item at index {0}")]
    ChecklistIndex(usize),
    #[error("a submission is already being saved")]
    SubmitInFlight,
    #[error("this review was already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Submits the form through `gateway`.
///
/// The lock is released while the gateway works, so the form stays readable;
/// a second call in that window is refused with `SubmitInFlight`. On failure
/// every entered value is kept for a retry.
pub async fn submit_review(
    form: &Mutex<ReviewForm>,
    gateway: &dyn SubmissionGateway,
    context: &SubmissionContext,
) -> Result<SubmissionReceipt, ReviewError> {
    let submission = form.lock().await.begin_submit()?;
    let result = gateway.submit(context, &submission).await;
    form.lock().await.finish_submit(result.is_ok());
    Ok(result?)
}
