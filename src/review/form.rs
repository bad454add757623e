use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ReviewError;
use crate::models::{RecordingHandle, ReviewScores, ReviewSubmission};

pub const DEFAULT_RATING: u8 = 3;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricItem {
    pub key: String,
    pub label: String,
    pub max: u32,
}

impl RubricItem {
    pub fn new(key: impl Into<String>, label: impl Into<String>, max: u32) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "items")]
pub enum ReviewTemplate {
    /// Yes/no prompts plus a 1-5 rating.
    Checklist(Vec<String>),
    /// Named items, each scored from zero to its own maximum.
    Rubric(Vec<RubricItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitPhase {
    Editing,
    Saving,
    Submitted,
}

/// Parses typed points, coercing anything that is not an integer to zero and
/// clamping into `[0, max]`.
pub fn parse_points(raw: &str, max: u32) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(value) => value.clamp(0, i64::from(max)) as u32,
        Err(_) => 0,
    }
}

#[derive(Debug, Clone)]
pub struct ReviewForm {
    template: ReviewTemplate,
    checked: Vec<bool>,
    rating: u8,
    points: BTreeMap<String, u32>,
    recording: Option<RecordingHandle>,
    phase: SubmitPhase,
}

impl ReviewForm {
    pub fn new(template: ReviewTemplate) -> Self {
        let checked = match &template {
            ReviewTemplate::Checklist(items) => vec![false; items.len()],
            ReviewTemplate::Rubric(_) => Vec::new(),
        };
        Self {
            template,
            checked,
            rating: DEFAULT_RATING,
            points: BTreeMap::new(),
            recording: None,
            phase: SubmitPhase::Editing,
        }
    }

    pub fn template(&self) -> &ReviewTemplate {
        &self.template
    }

    pub fn toggle(&mut self, index: usize) -> Result<bool, ReviewError> {
        let slot = self
            .checked
            .get_mut(index)
            .ok_or(ReviewError::ChecklistIndex(index))?;
        *slot = !*slot;
        Ok(*slot)
    }

    pub fn checked(&self) -> &[bool] {
        &self.checked
    }

    pub fn set_rating(&mut self, rating: u8) -> u8 {
        self.rating = rating.clamp(1, MAX_RATING);
        self.rating
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    /// Stores the clamped value for a rubric item and returns it.
    pub fn enter_points(&mut self, key: &str, raw: &str) -> Result<u32, ReviewError> {
        let max = self.rubric_item(key)?.max;
        let value = parse_points(raw, max);
        self.points.insert(key.to_string(), value);
        Ok(value)
    }

    pub fn points(&self, key: &str) -> u32 {
        self.points.get(key).copied().unwrap_or(0)
    }

    pub fn max_total(&self) -> u32 {
        match &self.template {
            ReviewTemplate::Checklist(_) => u32::from(MAX_RATING),
            ReviewTemplate::Rubric(items) => items.iter().map(|item| item.max).sum(),
        }
    }

    pub fn total(&self) -> u32 {
        match &self.template {
            ReviewTemplate::Checklist(_) => u32::from(self.rating),
            ReviewTemplate::Rubric(items) => items
                .iter()
                .map(|item| self.points(&item.key).min(item.max))
                .sum::<u32>()
                .min(self.max_total()),
        }
    }

    pub fn attach_recording(&mut self, handle: RecordingHandle) {
        self.recording = Some(handle);
    }

    pub fn recording(&self) -> Option<&RecordingHandle> {
        self.recording.as_ref()
    }

    pub fn is_saving(&self) -> bool {
        self.phase == SubmitPhase::Saving
    }

    pub fn is_submitted(&self) -> bool {
        self.phase == SubmitPhase::Submitted
    }

    /// Clears every entered value and the attached recording. A save in
    /// flight stays in flight until `finish_submit` reports on it.
    pub fn reset(&mut self) {
        let saving = self.phase == SubmitPhase::Saving;
        let template = std::mem::replace(&mut self.template, ReviewTemplate::Checklist(Vec::new()));
        *self = Self::new(template);
        if saving {
            self.phase = SubmitPhase::Saving;
        }
    }

    /// Freezes the current values into a submission and marks the form busy.
    pub fn begin_submit(&mut self) -> Result<ReviewSubmission, ReviewError> {
        match self.phase {
            SubmitPhase::Saving => return Err(ReviewError::SubmitInFlight),
            SubmitPhase::Submitted => return Err(ReviewError::AlreadySubmitted),
            SubmitPhase::Editing => {}
        }
        let submission = ReviewSubmission {
            id: Uuid::new_v4().to_string(),
            scores: self.scores(),
            recording: self.recording.clone(),
            created_at: Utc::now(),
        };
        self.phase = SubmitPhase::Saving;
        Ok(submission)
    }

    /// Ends a save started by `begin_submit`; a failure leaves every value in
    /// place so the user can retry.
    pub fn finish_submit(&mut self, succeeded: bool) {
        if self.phase == SubmitPhase::Saving {
            self.phase = if succeeded {
                SubmitPhase::Submitted
            } else {
                SubmitPhase::Editing
            };
        }
    }

    fn scores(&self) -> ReviewScores {
        match &self.template {
            ReviewTemplate::Checklist(items) => ReviewScores::Checklist {
                items: items.clone(),
                checked: self.checked.clone(),
                rating: self.rating,
            },
            ReviewTemplate::Rubric(items) => ReviewScores::Rubric {
                breakdown: items
                    .iter()
                    .map(|item| (item.key.clone(), self.points(&item.key)))
                    .collect(),
                total: self.total(),
                max_total: self.max_total(),
            },
        }
    }

    fn rubric_item(&self, key: &str) -> Result<&RubricItem, ReviewError> {
        match &self.template {
            ReviewTemplate::Rubric(items) => items
                .iter()
                .find(|item| item.key == key)
                .ok_or_else(|| ReviewError::UnknownItem(key.to_string())),
            ReviewTemplate::Checklist(_) => Err(ReviewError::UnknownItem(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DebateFormat;

    fn rubric_form() -> ReviewForm {
        ReviewForm::new(DebateFormat::Policy.review_template())
    }

    #[test]
    fn rubric_values_are_clamped() {
        let mut form = rubric_form();
        assert_eq!(form.enter_points("clarity", "25").unwrap(), 20);
        assert_eq!(form.enter_points("organization", "-5").unwrap(), 0);
        assert_eq!(form.enter_points("evidence", "lots").unwrap(), 0);
        assert_eq!(form.enter_points("delivery", " 17 ").unwrap(), 17);
        assert_eq!(form.total(), 37);
    }

    #[test]
    fn reset_during_a_save_does_not_reopen_submit() {
        let mut form = rubric_form();
        form.enter_points("clarity", "18").unwrap();
        form.begin_submit().unwrap();

        form.reset();
        assert_eq!(form.total(), 0);
        assert!(form.is_saving());
        assert!(matches!(
            form.begin_submit(),
            Err(ReviewError::SubmitInFlight)
        ));

        form.finish_submit(false);
        assert!(!form.is_saving());
        assert!(form.begin_submit().is_ok());
    }

    #[test]
    fn unknown_rubric_key_is_an_error() {
        let mut form = rubric_form();
        assert!(matches!(
            form.enter_points("volume", "10"),
            Err(ReviewError::UnknownItem(key)) if key == "volume"
        ));
    }

    #[test]
    fn rubric_submission_carries_breakdown_and_total() {
        let mut form = rubric_form();
        for (key, value) in [
            ("clarity", "18"),
            ("organization", "16"),
            ("evidence", "20"),
            ("delivery", "15"),
            ("time", "19"),
        ] {
            form.enter_points(key, value).unwrap();
        }

        let submission = form.begin_submit().unwrap();
        assert_eq!(submission.scores.total(), 88);
        assert_eq!(submission.scores.max_total(), 100);
        assert_eq!(submission.scores.breakdown()["evidence"], 20);
    }

    #[test]
    fn checklist_defaults_and_rating_bounds() {
        let mut form = ReviewForm::new(DebateFormat::Congress.review_template());
        assert_eq!(form.rating(), DEFAULT_RATING);
        assert_eq!(form.checked(), &[false; 5]);
        assert!(form.toggle(2).unwrap());
        assert!(matches!(form.toggle(9), Err(ReviewError::ChecklistIndex(9))));
        assert_eq!(form.set_rating(9), 5);
        assert_eq!(form.set_rating(0), 1);
        assert_eq!(form.total(), 1);
    }

    #[test]
    fn second_submit_while_saving_is_refused() {
        let mut form = rubric_form();
        form.begin_submit().unwrap();
        assert!(matches!(form.begin_submit(), Err(ReviewError::SubmitInFlight)));

        form.finish_submit(false);
        assert!(form.begin_submit().is_ok());
        form.finish_submit(true);
        assert!(matches!(form.begin_submit(), Err(ReviewError::AlreadySubmitted)));
    }

    #[test]
    fn failed_submit_keeps_values() {
        let mut form = rubric_form();
        form.enter_points("clarity", "12").unwrap();
        form.begin_submit().unwrap();
        form.finish_submit(false);
        assert_eq!(form.points("clarity"), 12);
        assert!(!form.is_saving());
    }

    #[test]
    fn reset_clears_values_and_recording() {
        let mut form = ReviewForm::new(DebateFormat::LincolnDouglas.review_template());
        form.toggle(0).unwrap();
        form.set_rating(5);
        form.attach_recording(RecordingHandle::new("/tmp/take.wav".into(), Utc::now()));
        form.begin_submit().unwrap();
        form.finish_submit(true);

        form.reset();
        assert_eq!(form.checked(), &[false; 5]);
        assert_eq!(form.rating(), DEFAULT_RATING);
        assert!(form.recording().is_none());
        assert!(!form.is_submitted());
    }
}
