use std::{collections::BTreeMap, path::Path, sync::Arc};

use chrono::{Duration, NaiveDate, Utc};
use podium_lib::{
    accounts::AccessError,
    admin::{bulletin, NewAssignment},
    audio::testing::{FakeCapture, FakeOutput},
    db::UploadStatus,
    gateway::{reconcile_orphans, GatewayError, LocalBlobStore, ObjectStore},
    models::{AccountStatus, AssignmentStatus, DebateFormat, PracticeScore},
    practice::PracticeError,
    review::ReviewError,
    timer::channel_sink,
    AppState,
};

async fn app(dir: &Path) -> AppState {
    let (sink, _rx) = channel_sink();
    AppState::with_backends(
        dir.to_path_buf(),
        Arc::new(FakeCapture::new()),
        Arc::new(FakeOutput::new()),
        sink,
    )
    .await
    .unwrap()
}

async fn approved(state: &AppState, uid: &str, category: &str) {
    state
        .accounts
        .register(uid, uid, Some(category.to_string()))
        .await
        .unwrap();
    state
        .db
        .set_account_status(uid, AccountStatus::Approved)
        .await
        .unwrap();
}

async fn admin(state: &AppState, uid: &str) {
    approved(state, uid, "coaches").await;
    state.db.set_account_admin(uid, true).await.unwrap();
}

fn files_under(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                files_under(&path)
            } else {
                1
            }
        })
        .sum()
}

#[tokio::test]
async fn submitted_round_lands_in_score_history() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    approved(&state, "ava", "policy").await;

    let (round, _rx) = state.open_round(DebateFormat::Policy, "ava").await.unwrap();
    round.start_recording().await.unwrap();
    round.stop_recording().await.unwrap();
    for (key, points) in [("clarity", "18"), ("organization", "16"), ("evidence", "20")] {
        round.enter_points(key, points).await.unwrap();
    }
    let receipt = round.submit_review().await.unwrap();
    round.close().await;

    let scores = state.db.list_scores_for_user("ava").await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].id, receipt.score_id);
    assert_eq!(scores[0].event, "Policy");
    assert_eq!(scores[0].total, 54);
    assert_eq!(scores[0].breakdown.get("evidence"), Some(&20));
    let url = scores[0].recording_url.clone().unwrap();
    assert!(url.starts_with("file://"));
    assert_eq!(files_under(&dir.path().join("blobs")), 1);

    // Linked with the score, so a later sweep leaves it alone.
    assert!(state
        .db
        .list_stale_uploads(Utc::now() + Duration::hours(1))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn rounds_pick_up_the_saved_record_default() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    approved(&state, "gil", "pf").await;
    state.settings.set_record_sections_by_default(false).unwrap();
    assert!(!state.round_options().record_sections);

    let (round, _rx) = state
        .open_round(DebateFormat::PublicForum, "gil")
        .await
        .unwrap();
    round.begin_section().await.unwrap();
    assert!(!round.is_recording().await);
    round.close().await;
}

#[tokio::test]
async fn unapproved_user_cannot_submit() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    state.accounts.register("ben", "Ben", None).await.unwrap();

    let (round, _rx) = state
        .open_round(DebateFormat::Congress, "ben")
        .await
        .unwrap();
    round.toggle_item(0).await.unwrap();
    let err = round.submit_review().await.unwrap_err();
    assert!(matches!(
        err,
        PracticeError::Review(ReviewError::Gateway(GatewayError::Auth(_)))
    ));
    assert!(round.review().await.checked()[0]);
    round.close().await;
}

#[tokio::test]
async fn failed_score_write_leaves_no_blob_behind() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    approved(&state, "cal", "pf").await;

    let (round, _rx) = state
        .open_round(DebateFormat::PublicForum, "cal")
        .await
        .unwrap();
    round.start_recording().await.unwrap();
    round.stop_recording().await.unwrap();
    round.enter_points("delivery", "12").await.unwrap();

    state
        .db
        .execute(|conn| {
            conn.execute_batch("ALTER TABLE scores RENAME TO scores_offline")?;
            Ok(())
        })
        .await
        .unwrap();

    let err = round.submit_review().await.unwrap_err();
    assert!(matches!(
        err,
        PracticeError::Review(ReviewError::Gateway(GatewayError::Persistence(_)))
    ));
    assert_eq!(files_under(&dir.path().join("blobs")), 0);
    assert!(state
        .db
        .list_stale_uploads(Utc::now() + Duration::hours(1))
        .await
        .unwrap()
        .is_empty());

    // Entries survive for a retry once storage is back.
    assert_eq!(round.review_total().await, 12);
    state
        .db
        .execute(|conn| {
            conn.execute_batch("ALTER TABLE scores_offline RENAME TO scores")?;
            Ok(())
        })
        .await
        .unwrap();
    round.submit_review().await.unwrap();
    assert_eq!(state.db.list_scores_for_user("cal").await.unwrap().len(), 1);
    round.close().await;
}

#[tokio::test]
async fn stale_pending_uploads_are_swept() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    let store = LocalBlobStore::new(dir.path().join("blobs"), 1024 * 1024)
        .await
        .unwrap();

    let take = dir.path().join("take.wav");
    std::fs::write(&take, b"RIFF").unwrap();
    let stale_url = store.upload(&take, "recordings/dan/old.wav").await.unwrap();
    let fresh_url = store.upload(&take, "recordings/dan/new.wav").await.unwrap();
    state
        .db
        .record_pending_upload("recordings/dan/old.wav", &stale_url, Utc::now() - Duration::hours(3))
        .await
        .unwrap();
    state
        .db
        .record_pending_upload("recordings/dan/new.wav", &fresh_url, Utc::now())
        .await
        .unwrap();

    let removed = reconcile_orphans(&state.db, &store, Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!store.exists("recordings/dan/old.wav").await);
    assert!(store.exists("recordings/dan/new.wav").await);
    assert!(state
        .db
        .get_upload("recordings/dan/old.wav")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn sweep_keeps_blobs_a_saved_score_points_at() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    let store = LocalBlobStore::new(dir.path().join("blobs"), 1024 * 1024)
        .await
        .unwrap();

    let take = dir.path().join("take.wav");
    std::fs::write(&take, b"RIFF").unwrap();
    let key = "recordings/fin/kept.wav";
    let url = store.upload(&take, key).await.unwrap();
    state
        .db
        .record_pending_upload(key, &url, Utc::now() - Duration::hours(2))
        .await
        .unwrap();
    // Written before the link existed, as an older build would have left it.
    state
        .db
        .insert_score(
            &PracticeScore {
                id: "score-1".to_string(),
                uid: "fin".to_string(),
                event: "Policy".to_string(),
                total: 70,
                max_total: 100,
                breakdown: BTreeMap::new(),
                recording_url: Some(url.clone()),
                created_at: Utc::now(),
            },
            None,
        )
        .await
        .unwrap();

    let removed = reconcile_orphans(&state.db, &store, Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 0);
    assert!(store.exists(key).await);
    let journal = state.db.get_upload(key).await.unwrap().unwrap();
    assert_eq!(journal.status, UploadStatus::Linked);
}

#[tokio::test]
async fn bootstrap_sweeps_orphans_from_a_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    {
        let state = app(dir.path()).await;
        let store = LocalBlobStore::new(dir.path().join("blobs"), 1024 * 1024)
            .await
            .unwrap();
        let take = dir.path().join("take.wav");
        std::fs::write(&take, b"RIFF").unwrap();
        let url = store.upload(&take, "recordings/eve/lost.wav").await.unwrap();
        state
            .db
            .record_pending_upload("recordings/eve/lost.wav", &url, Utc::now() - Duration::days(1))
            .await
            .unwrap();
    }

    let state = app(dir.path()).await;
    assert_eq!(files_under(&dir.path().join("blobs")), 0);
    assert!(state
        .db
        .get_upload("recordings/eve/lost.wav")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn assignment_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    admin(&state, "coach").await;
    approved(&state, "fay", "ld").await;
    approved(&state, "gus", "ld").await;
    approved(&state, "hal", "pf").await;

    let (assignment, sent) = state
        .admin
        .create_assignment(
            "coach",
            NewAssignment {
                title: "Value clash".to_string(),
                description: "Record a 2AR on the value debate".to_string(),
                uids: vec!["fay".to_string(), "hal".to_string()],
                category: Some("ld".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(sent, 3);
    assert_eq!(assignment.created_by, "coach");

    let board = state.assignments.board("fay").await.unwrap();
    assert_eq!(board.open.len(), 1);
    assert!(board.completed.is_empty());
    let mine = board.open[0].clone();

    // Someone else's copy is off limits.
    assert!(state
        .assignments
        .submit("gus", &mine.id, None, None)
        .await
        .is_err());

    state.focus.start_recording().await.unwrap();
    let take = state.focus.stop_recording().await.unwrap();
    let submitted = state
        .assignments
        .submit("fay", &mine.id, Some("second try".to_string()), Some(&take))
        .await
        .unwrap();
    assert_eq!(submitted.status, AssignmentStatus::Submitted);
    assert_eq!(submitted.submission_note.as_deref(), Some("second try"));
    assert!(submitted.submission_audio_url.is_some());

    let waiting = state.admin.submissions("coach").await.unwrap();
    assert_eq!(waiting.len(), 1);
    state
        .admin
        .send_feedback("coach", &mine.id, "Slow down in the first minute")
        .await
        .unwrap();

    let board = state.assignments.board("fay").await.unwrap();
    assert!(board.open.is_empty());
    assert_eq!(board.completed[0].status, AssignmentStatus::Feedback);
    assert_eq!(
        board.completed[0].feedback.as_deref(),
        Some("Slow down in the first minute")
    );
}

#[tokio::test]
async fn admin_gate_reads_the_stored_profile() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    admin(&state, "coach").await;
    approved(&state, "ivy", "policy").await;
    state.accounts.register("jon", "Jon", None).await.unwrap();

    assert!(matches!(
        state.admin.accounts_by_status("ivy").await,
        Err(AccessError::NotAdmin)
    ));

    let grouped = state.admin.accounts_by_status("coach").await.unwrap();
    assert_eq!(grouped.pending.len(), 1);
    assert_eq!(grouped.approved.len(), 2);

    state
        .admin
        .set_status("coach", "jon", AccountStatus::Waitlist)
        .await
        .unwrap();
    assert!(matches!(
        state
            .admin
            .set_status("coach", "nobody", AccountStatus::Approved)
            .await,
        Err(AccessError::NotFound(_))
    ));

    // Revoking in the store wins over whatever the cache last saw.
    state.accounts.load_profile("coach").await.unwrap();
    state.db.set_account_admin("coach", false).await.unwrap();
    assert!(state.accounts.cached_profile().unwrap().is_admin);
    assert!(matches!(
        state.admin.accounts_by_status("coach").await,
        Err(AccessError::NotAdmin)
    ));
}

#[tokio::test]
async fn bulletin_board_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let state = app(dir.path()).await;
    admin(&state, "coach").await;
    approved(&state, "kai", "pf").await;
    state.accounts.register("lee", "Lee", None).await.unwrap();

    let first = state
        .admin
        .post_announcement("coach", "Practice moved", "Room 204 this week", None)
        .await
        .unwrap();
    let second = state
        .admin
        .post_announcement("coach", "Dues", "Due Friday", NaiveDate::from_ymd_opt(2026, 11, 6))
        .await
        .unwrap();
    state
        .admin
        .add_tournament(
            "coach",
            "Winter Classic",
            Some("Central High".to_string()),
            NaiveDate::from_ymd_opt(2026, 12, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 12, 6),
        )
        .await
        .unwrap();

    assert!(matches!(
        state
            .admin
            .post_announcement("kai", "Nope", "", None)
            .await,
        Err(AccessError::NotAdmin)
    ));

    let board = bulletin(&state.accounts, "kai").await.unwrap();
    let titles: Vec<&str> = board
        .announcements
        .iter()
        .map(|announcement| announcement.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Dues", "Practice moved"]);
    assert_eq!(board.tournaments.len(), 1);
    assert!(matches!(
        bulletin(&state.accounts, "lee").await,
        Err(AccessError::NotApproved(AccountStatus::Pending))
    ));

    assert!(state
        .admin
        .delete_announcement("coach", &first.id)
        .await
        .unwrap());
    let board = bulletin(&state.accounts, "kai").await.unwrap();
    assert_eq!(board.announcements.len(), 1);
    assert_eq!(board.announcements[0].id, second.id);
}
