//! Catalogue of the supported debate formats.

use serde::{Deserialize, Serialize};

use super::Section;
use crate::review::{ReviewTemplate, RubricItem};

const POLICY_SECTIONS: [Section; 12] = [
    Section::minutes("1AC", 8),
    Section::minutes("Cross X", 3),
    Section::minutes("1NC", 8),
    Section::minutes("Cross X", 3),
    Section::minutes("2AC", 8),
    Section::minutes("Cross X", 3),
    Section::minutes("2NC", 8),
    Section::minutes("Cross X", 3),
    Section::minutes("1NR", 5),
    Section::minutes("1AR", 5),
    Section::minutes("2NR", 5),
    Section::minutes("2AR", 5),
];

const PUBLIC_FORUM_SECTIONS: [Section; 11] = [
    Section::minutes("1AC", 4),
    Section::minutes("1NC", 4),
    Section::minutes("1st Crossfire", 3),
    Section::minutes("1AR", 4),
    Section::minutes("1NR", 4),
    Section::minutes("2nd Crossfire", 3),
    Section::minutes("2AR", 2),
    Section::minutes("2NR", 2),
    Section::minutes("Grand Crossfire", 3),
    Section::minutes("1FF", 2),
    Section::minutes("2FF", 2),
];

const LINCOLN_DOUGLAS_SECTIONS: [Section; 7] = [
    Section::minutes("AC", 6),
    Section::minutes("Cross X", 3),
    Section::minutes("NC", 7),
    Section::minutes("Cross X", 3),
    Section::minutes("1AR", 4),
    Section::minutes("NR", 6),
    Section::minutes("2AR", 3),
];

const CONGRESS_SECTIONS: [Section; 1] = [Section::minutes("Speech", 3)];

const SPEAKING_CHECKLIST: [&str; 5] = [
    "Did you speak clearly?",
    "Did you stay on topic?",
    "Did you use evidence?",
    "Did you finish in time?",
    "Did you avoid filler words?",
];

const DRILL_CHECKLIST: [&str; 5] = [
    "Did you speak clearly?",
    "Did you stay on topic?",
    "Did you organize your thoughts?",
    "Did you use evidence or examples?",
    "Did you avoid filler words?",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DebateFormat {
    LincolnDouglas,
    PublicForum,
    Policy,
    Congress,
}

impl DebateFormat {
    pub const ALL: [DebateFormat; 4] = [
        DebateFormat::LincolnDouglas,
        DebateFormat::PublicForum,
        DebateFormat::Policy,
        DebateFormat::Congress,
    ];

    /// Event name stored with every score.
    pub fn label(&self) -> &'static str {
        match self {
            DebateFormat::LincolnDouglas => "Lincoln-Douglas",
            DebateFormat::PublicForum => "Public Forum",
            DebateFormat::Policy => "Policy",
            DebateFormat::Congress => "Congress",
        }
    }

    pub fn prep_seconds(&self) -> u32 {
        match self {
            DebateFormat::LincolnDouglas => 4 * 60,
            DebateFormat::PublicForum => 3 * 60,
            DebateFormat::Policy => 8 * 60,
            DebateFormat::Congress => 3 * 60,
        }
    }

    pub fn sections(&self) -> Vec<Section> {
        match self {
            DebateFormat::LincolnDouglas => LINCOLN_DOUGLAS_SECTIONS.to_vec(),
            DebateFormat::PublicForum => PUBLIC_FORUM_SECTIONS.to_vec(),
            DebateFormat::Policy => POLICY_SECTIONS.to_vec(),
            DebateFormat::Congress => CONGRESS_SECTIONS.to_vec(),
        }
    }

    /// Recording limit for an impromptu drill in this format.
    pub fn drill_speech_seconds(&self) -> u32 {
        match self {
            DebateFormat::Congress => 3 * 60,
            _ => 60,
        }
    }

    /// Impromptu drills always use the speaking checklist.
    pub fn drill_template(&self) -> ReviewTemplate {
        ReviewTemplate::Checklist(DRILL_CHECKLIST.iter().map(|item| item.to_string()).collect())
    }

    pub fn review_template(&self) -> ReviewTemplate {
        match self {
            DebateFormat::PublicForum | DebateFormat::Policy => ReviewTemplate::Rubric(vec![
                RubricItem::new("clarity", "Clarity", 20),
                RubricItem::new("organization", "Organization", 20),
                RubricItem::new("evidence", "Evidence/Support", 20),
                RubricItem::new("delivery", "Delivery/Presence", 20),
                RubricItem::new("time", "Time Management", 20),
            ]),
            DebateFormat::LincolnDouglas | DebateFormat::Congress => ReviewTemplate::Checklist(
                SPEAKING_CHECKLIST.iter().map(|item| item.to_string()).collect(),
            ),
        }
    }
}
