mod common;

use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use common::{create_test_db, seed, text_items};
use pretty_assertions::assert_eq;
use wordschool::db::{ScoreRecord, SaveOutcome, SessionKey};
use wordschool::models::{
    ActivityType, ItemError, ModuleType, NewItem, PayloadPatch, Phase, PositionalMode,
    SessionPayload, SessionStatus, StudentStatus, StudyItem,
};
use wordschool::progress::PositionalProgress;

fn key(f: &common::Fixture) -> SessionKey {
    SessionKey {
        student_id: f.student_id,
        assignment_id: f.assignment_id,
        module_id: f.module_id,
    }
}

fn patch(value: serde_json::Value) -> PayloadPatch {
    PayloadPatch::from_map(value.as_object().cloned().unwrap()).unwrap()
}

fn image_item(path: Option<&str>, url: Option<&str>) -> NewItem {
    NewItem {
        prompt: "cat".to_string(),
        image_path: path.map(str::to_string),
        image_url: url.map(str::to_string),
        choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct_choice_index: Some(0),
    }
}

// ----- schema and catalog -----

#[tokio::test]
async fn migrations_are_recorded() {
    let db = create_test_db().await;
    assert!(db.migration_applied("V1").await.unwrap());
    assert!(!db.migration_applied("V999").await.unwrap());
}

#[tokio::test]
async fn text_modules_reject_images() {
    let db = create_test_db().await;

    let err = db
        .create_module("Animals", ModuleType::PairText, &[image_item(Some("cat.png"), None)])
        .await
        .unwrap_err();

    assert_eq!(err.downcast_ref::<ItemError>(), Some(&ItemError::ImageNotAllowed(0)));
}

#[tokio::test]
async fn image_modules_need_exactly_one_image_source() {
    let db = create_test_db().await;

    let missing = db
        .create_module("Animals", ModuleType::PairImage, &[image_item(None, Some("  "))])
        .await
        .unwrap_err();
    assert_eq!(missing.downcast_ref::<ItemError>(), Some(&ItemError::ImageRequired(0)));

    let both = db
        .create_module(
            "Animals",
            ModuleType::PairImage,
            &[image_item(Some("cat.png"), Some("https://img.example/cat.png"))],
        )
        .await
        .unwrap_err();
    assert_eq!(both.downcast_ref::<ItemError>(), Some(&ItemError::AmbiguousImage(0)));

    let module_id = db
        .create_module(
            "Animals",
            ModuleType::PairImage,
            &[image_item(None, Some("https://img.example/cat.png"))],
        )
        .await
        .unwrap();
    let items = db.module_items(module_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].image_path, None);
    assert_eq!(
        StudyItem::from(&items[0]).image.as_deref(),
        Some("https://img.example/cat.png")
    );
}

#[tokio::test]
async fn invalid_item_rejects_the_whole_module() {
    let db = create_test_db().await;
    let mut items = text_items(3);
    items[2].choices.pop();

    let err = db
        .create_module("Broken", ModuleType::PairText, &items)
        .await
        .unwrap_err();

    assert_eq!(err.downcast_ref::<ItemError>(), Some(&ItemError::ChoiceCount(2, 3)));
}

#[tokio::test]
async fn assigning_modules_appends_and_ignores_duplicates() {
    let f = seed(2).await;
    let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let second = f
        .db
        .create_module("Colors", ModuleType::PairText, &text_items(2))
        .await
        .unwrap();

    let again = f.db.assign_module(f.class_id, date, second).await.unwrap();
    let dup = f.db.assign_module(f.class_id, date, f.module_id).await.unwrap();

    assert_eq!(again, f.assignment_id);
    assert_eq!(dup, f.assignment_id);
    let modules: Vec<i64> = f
        .db
        .assignment_modules(f.assignment_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(modules, vec![f.module_id, second]);

    let found = f.db.find_assignment(f.class_id, date).await.unwrap().unwrap();
    assert_eq!(found.id, f.assignment_id);
    let module = f.db.get_module(second).await.unwrap().unwrap();
    assert_eq!((module.name.as_str(), module.module_type), ("Colors", ModuleType::PairText));
}

#[tokio::test]
async fn study_context_tracks_enrollment_and_status() {
    let f = seed(2).await;

    let ctx = f
        .db
        .study_context(f.student_id, f.assignment_id, f.module_id)
        .await
        .unwrap()
        .unwrap();
    assert!(ctx.student_enrolled && ctx.module_assigned);
    assert_eq!((ctx.campus_id, ctx.class_id), (f.campus_id, f.class_id));

    f.db.set_student_status(f.student_id, StudentStatus::Inactive)
        .await
        .unwrap();
    let ctx = f
        .db
        .study_context(f.student_id, f.assignment_id, f.module_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!ctx.student_enrolled);

    f.db.set_student_status(f.student_id, StudentStatus::Active)
        .await
        .unwrap();
    assert!(f.db.is_enrolled(f.student_id, f.class_id).await.unwrap());
    f.db.withdraw_student(f.class_id, f.student_id).await.unwrap();
    assert!(!f.db.is_enrolled(f.student_id, f.class_id).await.unwrap());

    assert!(f
        .db
        .study_context(f.student_id, f.assignment_id + 100, f.module_id)
        .await
        .unwrap()
        .is_none());
}

// ----- progress -----

#[tokio::test]
async fn positional_progress_never_regresses() {
    let f = seed(4).await;
    let now = Utc::now();

    let p = f
        .db
        .advance_progress(key(&f), PositionalMode::Wordlist, 2, 4, now)
        .await
        .unwrap();
    assert_eq!(
        p,
        PositionalProgress {
            max_index: Some(2),
            progress_pct: 75
        }
    );

    let back = f
        .db
        .advance_progress(key(&f), PositionalMode::Wordlist, 0, 4, now)
        .await
        .unwrap();
    assert_eq!(back, p);

    let past_end = f
        .db
        .advance_progress(key(&f), PositionalMode::Wordlist, 10, 4, now)
        .await
        .unwrap();
    assert_eq!(
        past_end,
        PositionalProgress {
            max_index: Some(3),
            progress_pct: 100
        }
    );
}

#[tokio::test]
async fn progress_modes_are_independent() {
    let f = seed(3).await;
    let now = Utc::now();

    f.db.advance_progress(key(&f), PositionalMode::Memorize, 0, 3, now)
        .await
        .unwrap();
    f.db.finish_progress(key(&f), PositionalMode::Wordlist, 3, now)
        .await
        .unwrap();

    let row = f.db.get_progress(key(&f)).await.unwrap().unwrap();
    assert_eq!(row.wordlist_max_index, Some(2));
    assert_eq!(row.wordlist_progress_pct, 100);
    assert_eq!(row.memorize_max_index, Some(0));
    assert_eq!(row.memorize_progress_pct, 33);
    assert!(!row.completed);
}

#[tokio::test]
async fn assignment_progress_reports_untouched_modules_as_zero() {
    let f = seed(2).await;

    let rows = f
        .db
        .progress_for_assignment(f.student_id, f.assignment_id)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].module_id, f.module_id);
    assert_eq!(rows[0].wordlist_max_index, None);
    assert_eq!(rows[0].wordlist_progress_pct, 0);
    assert!(!rows[0].completed);
}

// ----- sessions -----

#[tokio::test]
async fn starting_twice_reuses_the_in_progress_session() {
    let f = seed(3).await;
    let now = Utc::now();

    let first = f
        .db
        .open_quiz_session(key(&f), SessionPayload::new(Phase::Test, Vec::new()), now)
        .await
        .unwrap();
    let second = f
        .db
        .open_quiz_session(key(&f), SessionPayload::new(Phase::Test, Vec::new()), now)
        .await
        .unwrap();

    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.session_id, second.session_id);
    let open: Vec<_> = f
        .db
        .sessions_for(key(&f))
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.status == SessionStatus::InProgress)
        .collect();
    assert_eq!(open.len(), 1);
    assert!(f.db.get_progress(key(&f)).await.unwrap().is_some());
}

#[tokio::test]
async fn starting_another_phase_discards_the_stale_session() {
    let f = seed(3).await;
    let now = Utc::now();

    let test = f
        .db
        .open_quiz_session(key(&f), SessionPayload::new(Phase::Test, Vec::new()), now)
        .await
        .unwrap();
    let final_test = f
        .db
        .open_quiz_session(key(&f), SessionPayload::new(Phase::FinalTest, Vec::new()), now)
        .await
        .unwrap();

    assert_eq!(final_test.discarded, vec![test.session_id]);
    assert!(f.db.get_study_session(test.session_id).await.unwrap().is_none());
    let sessions = f.db.sessions_for(key(&f)).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].phase, Phase::FinalTest);
}

#[tokio::test]
async fn saving_merges_without_dropping_the_snapshot() {
    let f = seed(3).await;
    let now = Utc::now();
    let items: Vec<StudyItem> = f
        .db
        .module_items(f.module_id)
        .await
        .unwrap()
        .iter()
        .map(StudyItem::from)
        .collect();

    let opened = f
        .db
        .open_quiz_session(key(&f), SessionPayload::new(Phase::FinalTest, items.clone()), now)
        .await
        .unwrap();

    f.db.save_session_payload(
        opened.session_id,
        patch(serde_json::json!({"quizAnswers": {"0": 1}, "flagged": [2]})),
        now,
    )
    .await
    .unwrap();
    let outcome = f
        .db
        .save_session_payload(
            opened.session_id,
            patch(serde_json::json!({"currentIndex": 2})),
            now,
        )
        .await
        .unwrap();

    let SaveOutcome::Saved(payload) = outcome else {
        panic!("expected the session to be saved, got {outcome:?}");
    };
    assert_eq!(payload.phase(), Phase::FinalTest);
    assert_eq!(payload.current_index(), 2);
    assert_eq!(payload.final_test_items(), Some(items.as_slice()));
    assert_eq!(payload.answers().and_then(|a| a.choice(0)), Some(1));

    let stored = f.db.get_study_session(opened.session_id).await.unwrap().unwrap();
    assert_eq!(stored.payload.0["flagged"], serde_json::json!([2]));
    assert_eq!(stored.payload.0["finalTestItems"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn saving_a_missing_session_reports_it() {
    let db = create_test_db().await;
    let outcome = db
        .save_session_payload(42, PayloadPatch::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Missing);
}

// ----- scores -----

#[tokio::test]
async fn rollups_accumulate_per_local_day() {
    let f = seed(1).await;
    let offset = FixedOffset::east_opt(9 * 3600).unwrap();
    // 16:00 UTC is already the next day at UTC+9
    let evening = Utc.with_ymd_and_hms(2024, 4, 1, 16, 0, 0).unwrap();
    let morning = Utc.with_ymd_and_hms(2024, 4, 1, 2, 0, 0).unwrap();

    let record = |score, at| ScoreRecord {
        student_id: f.student_id,
        campus_id: f.campus_id,
        class_id: f.class_id,
        session_id: None,
        activity_type: ActivityType::Learning,
        score,
        at,
    };
    f.db.record_score(record(80, morning), offset).await.unwrap();
    f.db.record_score(record(60, morning + Duration::hours(1)), offset)
        .await
        .unwrap();
    f.db.record_score(record(100, evening), offset).await.unwrap();

    let rollups = f
        .db
        .daily_rollups(
            f.student_id,
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        )
        .await
        .unwrap();

    let days: Vec<_> = rollups
        .iter()
        .map(|r| (r.day, r.total_score, r.total_count))
        .collect();
    assert_eq!(
        days,
        vec![
            (NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), 140, 2),
            (NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(), 100, 1),
        ]
    );
    assert_eq!(f.db.score_logs_for_student(f.student_id).await.unwrap().len(), 3);
}
