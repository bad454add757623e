use std::{sync::Arc, time::Duration};

use podium_lib::{
    audio::{
        testing::{FakeCapture, FakeOutput},
        AudioFocus, PlaybackSession, RecorderSession,
    },
    gateway::MemoryGateway,
    models::{DebateFormat, ReviewScores},
    practice::{PracticeRound, RoundEvent, RoundOptions},
    review::ReviewTemplate,
    settings::MeterSettings,
    timer::{channel_sink, SequencerEvent},
};
use tokio::sync::mpsc;

fn focus(dir: &std::path::Path) -> Arc<AudioFocus> {
    let (sink, _rx) = channel_sink();
    let recorder = Arc::new(RecorderSession::new(
        Arc::new(FakeCapture::new()),
        dir.join("recordings"),
    ));
    let playback = Arc::new(PlaybackSession::new(Arc::new(FakeOutput::new()), sink));
    Arc::new(AudioFocus::new(recorder, playback))
}

fn options() -> RoundOptions {
    RoundOptions {
        meter: MeterSettings {
            enabled: false,
            ..MeterSettings::default()
        },
        ..RoundOptions::default()
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<RoundEvent>) -> Vec<RoundEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn run_for(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn policy_round_from_prep_to_submitted_rubric() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MemoryGateway::new());
    let (round, mut rx) = PracticeRound::channel(
        DebateFormat::Policy,
        "debater-1",
        focus(dir.path()),
        gateway.clone(),
        options(),
    )
    .unwrap();

    let sequence = round.sequence().await;
    assert_eq!(sequence.sections().len(), 12);
    assert_eq!(sequence.current().label(), "1AC");

    // Prep: 480s, stopped by hand at 470.
    assert_eq!(round.prep().await.remaining_seconds, 480);
    round.start_prep().await.unwrap();
    run_for(10.5).await;
    round.stop_prep().await;
    assert_eq!(round.prep().await.remaining_seconds, 470);
    assert!(!round.prep().await.running);

    // 1AC runs its full eight minutes with the microphone on.
    round.start_section(true).await.unwrap();
    run_for(480.5).await;
    let sequence = round.sequence().await;
    assert_eq!(sequence.current_index(), 1);
    assert_eq!(sequence.current().label(), "Cross X");
    assert!(sequence.timer().running);
    assert_eq!(sequence.timer().remaining_seconds, 180);
    assert!(round.is_recording().await);

    let take = round.stop_recording().await.unwrap();
    assert!(round.is_review_open());

    let events = drain(&mut rx);
    assert!(events.contains(&RoundEvent::Section {
        event: SequencerEvent::SectionChanged {
            index: 1,
            label: "Cross X".to_string(),
            remaining_seconds: 180,
        }
    }));
    let section_ticks: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            RoundEvent::Section {
                event: SequencerEvent::Tick {
                    index: 0,
                    remaining_seconds,
                },
            } => Some(*remaining_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(section_ticks, (0..480).rev().collect::<Vec<u32>>());

    // Five rubric items, twenty points each.
    let form = round.review().await;
    match form.template() {
        ReviewTemplate::Rubric(items) => {
            assert_eq!(items.len(), 5);
            assert!(items.iter().all(|item| item.max == 20));
        }
        other => panic!("expected a rubric, got {other:?}"),
    }
    let keys: Vec<String> = match form.template() {
        ReviewTemplate::Rubric(items) => items.iter().map(|item| item.key.clone()).collect(),
        ReviewTemplate::Checklist(_) => Vec::new(),
    };
    for (key, points) in keys.iter().zip(["18", "16", "20", "15", "19"]) {
        round.enter_points(key, points).await.unwrap();
    }
    assert_eq!(round.review_total().await, 88);

    let receipt = round.submit_review().await.unwrap();
    let received = gateway.received();
    assert_eq!(received.len(), 1);
    let (context, submission) = &received[0];
    assert_eq!(context.uid, "debater-1");
    assert_eq!(context.event, "Policy");
    assert_eq!(submission.id, receipt.score_id);
    assert_eq!(submission.recording.as_ref(), Some(&take));
    assert_eq!(submission.scores.total(), 88);
    assert_eq!(submission.scores.max_total(), 100);
    match &submission.scores {
        ReviewScores::Rubric { breakdown, .. } => {
            assert_eq!(breakdown.values().sum::<u32>(), 88);
            assert_eq!(breakdown.len(), 5);
        }
        other => panic!("expected rubric scores, got {other:?}"),
    }

    round.close().await;
}

#[tokio::test(start_paused = true)]
async fn second_submit_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MemoryGateway::new());
    let (round, _rx) = PracticeRound::channel(
        DebateFormat::LincolnDouglas,
        "debater-2",
        focus(dir.path()),
        gateway.clone(),
        options(),
    )
    .unwrap();

    round.toggle_item(2).await.unwrap();
    round.set_rating(4).await;
    round.submit_review().await.unwrap();
    assert!(round.submit_review().await.is_err());
    assert_eq!(gateway.attempts(), 1);
    round.close().await;
}

#[tokio::test(start_paused = true)]
async fn leaving_the_screen_mid_round_stops_everything() {
    let dir = tempfile::tempdir().unwrap();
    let focus = focus(dir.path());
    let (round, mut rx) = PracticeRound::channel(
        DebateFormat::PublicForum,
        "debater-3",
        focus.clone(),
        Arc::new(MemoryGateway::new()),
        options(),
    )
    .unwrap();

    round.start_prep().await.unwrap();
    round.start_section(true).await.unwrap();
    run_for(30.5).await;
    drop(round);
    drain(&mut rx);

    run_for(0.1).await;
    assert!(!focus.recorder().is_busy().await);
    assert!(focus.start_recording().await.is_ok());
    focus.stop_recording().await.unwrap();

    run_for(600.0).await;
    assert!(drain(&mut rx).is_empty());
}
