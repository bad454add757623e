use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::timer::SequenceError;

/// One timed part of a round, e.g. `1AC` for eight minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    label: Cow<'static, str>,
    duration_seconds: u32,
}

impl Section {
    pub fn new(label: impl Into<String>, duration_seconds: u32) -> Result<Self, SequenceError> {
        if duration_seconds == 0 {
            return Err(SequenceError::ZeroDuration);
        }
        Ok(Self {
            label: Cow::Owned(label.into()),
            duration_seconds,
        })
    }

    /// Catalogue entries are authored in minutes and are never zero.
    pub(crate) const fn minutes(label: &'static str, minutes: u32) -> Self {
        Self {
            label: Cow::Borrowed(label),
            duration_seconds: minutes * 60,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }
}
