use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

use super::{ReviewForm, ReviewTemplate};

const ENCOURAGEMENTS: [&str; 5] = [
    "Great job! Keep practicing!",
    "Remember to breathe and pace yourself.",
    "Confidence comes with practice!",
    "Try to make eye contact with your audience.",
    "Strong arguments are clear and concise.",
];

const FALLBACK_TIPS: [&str; 2] = [
    "Record yourself and listen back for this one.",
    "Pick one habit to work on in your next round.",
];

fn tips_for(item: &str) -> &'static [&'static str] {
    match item {
        "Did you speak clearly?" => &[
            "Practice enunciating each word.",
            "Record yourself and listen for mumbling.",
            "Slow down your speech to improve clarity.",
        ],
        "Did you stay on topic?" => &[
            "Write down your main point before speaking.",
            "If you get off track, pause and return to your main idea.",
            "Practice summarizing your answer in one sentence.",
        ],
        "Did you organize your thoughts?" => &[
            "Use a simple structure: introduction, body, conclusion.",
            "List your points before you start speaking.",
            "Practice outlining your answer mentally before responding.",
        ],
        "Did you use evidence?" | "Did you use evidence or examples?" => &[
            "Think of a real-life story or fact to support your point.",
            "Use phrases like \"For example...\" or \"For instance...\"",
            "Practice connecting your ideas to things you know.",
        ],
        "Did you finish in time?" => &[
            "Glance at the clock at the halfway mark.",
            "Plan a short closing line you can jump to.",
        ],
        "Did you avoid filler words?" => &[
            "Pause instead of saying \"um\" or \"like\".",
            "Practice speaking slowly and deliberately.",
            "Record yourself and count your filler words.",
        ],
        _ => &FALLBACK_TIPS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingTip {
    pub item: String,
    pub tips: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingNotes {
    pub tips: Vec<CoachingTip>,
    pub encouragement: &'static str,
}

/// Tips for every checklist item left unchecked, plus one encouragement.
/// Rubric forms only get the encouragement.
pub fn coaching_notes<R: Rng + ?Sized>(form: &ReviewForm, rng: &mut R) -> CoachingNotes {
    let tips = match form.template() {
        ReviewTemplate::Checklist(items) => items
            .iter()
            .zip(form.checked())
            .filter(|(_, done)| !**done)
            .map(|(item, _)| CoachingTip {
                item: item.clone(),
                tips: tips_for(item).to_vec(),
            })
            .collect(),
        ReviewTemplate::Rubric(_) => Vec::new(),
    };
    CoachingNotes {
        tips,
        encouragement: random_encouragement(rng),
    }
}

pub fn random_encouragement<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    ENCOURAGEMENTS
        .choose(rng)
        .copied()
        .unwrap_or(ENCOURAGEMENTS[0])
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::models::DebateFormat;

    #[test]
    fn only_unchecked_items_get_tips() {
        let mut form = ReviewForm::new(DebateFormat::Congress.drill_template());
        form.toggle(0).unwrap();
        form.toggle(4).unwrap();

        let notes = coaching_notes(&form, &mut StdRng::seed_from_u64(7));
        let items: Vec<&str> = notes.tips.iter().map(|tip| tip.item.as_str()).collect();
        assert_eq!(
            items,
            vec![
                "Did you stay on topic?",
                "Did you organize your thoughts?",
                "Did you use evidence or examples?",
            ]
        );
        assert!(notes.tips.iter().all(|tip| !tip.tips.is_empty()));
        assert!(ENCOURAGEMENTS.contains(&notes.encouragement));
    }

    #[test]
    fn rubric_gets_encouragement_only() {
        let form = ReviewForm::new(DebateFormat::Policy.review_template());
        let notes = coaching_notes(&form, &mut StdRng::seed_from_u64(1));
        assert!(notes.tips.is_empty());
        assert!(!notes.encouragement.is_empty());
    }
}
