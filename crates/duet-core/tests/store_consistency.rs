//! Store-level invariants: terminal records are immutable, attempt
//! audit rows survive retries, and uniqueness constraints hold across
//! separate connections to the same database file.

use duet_core::intent::Route;
use duet_core::model::{
    ArmKind, Experiment, ExperimentStatus, Rating, RewriteStatus, StepStatus, Variant,
    VerdictPayload,
};
use duet_core::storage::{AttemptResult, Store, UpsertOutcome};
use duet_core::CoreError;

fn seeded_store() -> (Store, String) {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    seed(&store, "e1", "explain photosynthesis");
    (store, "resp-e1-baseline".to_string())
}

fn seed(store: &Store, experiment_id: &str, prompt: &str) {
    store
        .create_experiment(&Experiment {
            id: experiment_id.into(),
            original_prompt: prompt.into(),
            route: Route::Qa,
            status: ExperimentStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
        .unwrap();
    for arm in [ArmKind::Baseline, ArmKind::Enhanced] {
        let variant_id = format!("var-{experiment_id}-{}", arm.as_str());
        store
            .create_variant(&Variant {
                id: variant_id.clone(),
                experiment_id: experiment_id.into(),
                arm,
                prompt_text: prompt.into(),
                rewrite_status: match arm {
                    ArmKind::Baseline => RewriteStatus::NotApplicable,
                    ArmKind::Enhanced => RewriteStatus::Pending,
                },
            })
            .unwrap();
        store
            .create_response_shell(&format!("resp-{experiment_id}-{}", arm.as_str()), &variant_id)
            .unwrap();
    }
}

fn sample_payload() -> VerdictPayload {
    serde_json::from_value(serde_json::json!({
        "score": 14.0,
        "intent": 4, "clarity": 3, "structure": 3, "safety": 4,
        "notes": "fine", "judge_kind": "llm"
    }))
    .unwrap()
}

#[test]
fn done_responses_are_immutable() {
    let (store, response_id) = seeded_store();

    let first = store
        .upsert_response_attempt(&response_id, AttemptResult::Success { text: "answer one" })
        .unwrap();
    assert_eq!(first, UpsertOutcome::Applied);

    // A second writer completing the same step is a no-op.
    let second = store
        .upsert_response_attempt(&response_id, AttemptResult::Success { text: "answer two" })
        .unwrap();
    assert_eq!(second, UpsertOutcome::AlreadyDone);

    let response = store.get_response(&response_id).unwrap().unwrap();
    assert_eq!(response.text.as_deref(), Some("answer one"));
    assert_eq!(response.attempts, 1);
    assert_eq!(store.list_response_attempts(&response_id).unwrap().len(), 1);
}

#[test]
fn failed_attempts_are_retained_after_success() {
    let (store, response_id) = seeded_store();

    for _ in 0..2 {
        store
            .upsert_response_attempt(
                &response_id,
                AttemptResult::Failure {
                    message: "503 from provider",
                    terminal: false,
                },
            )
            .unwrap();
    }
    store
        .upsert_response_attempt(&response_id, AttemptResult::Success { text: "finally" })
        .unwrap();

    let response = store.get_response(&response_id).unwrap().unwrap();
    assert_eq!(response.status, StepStatus::Done);
    assert_eq!(response.attempts, 3);

    let attempts = store.list_response_attempts(&response_id).unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].outcome, "failed");
    assert_eq!(attempts[1].outcome, "failed");
    assert_eq!(attempts[2].outcome, "done");
    assert_eq!(attempts[2].attempt_no, 3);
}

#[test]
fn terminal_failure_is_recorded() {
    let (store, response_id) = seeded_store();
    store
        .upsert_response_attempt(
            &response_id,
            AttemptResult::Failure {
                message: "budget spent",
                terminal: true,
            },
        )
        .unwrap();
    let response = store.get_response(&response_id).unwrap().unwrap();
    assert_eq!(response.status, StepStatus::Failed);
    assert!(response.text.is_none());
}

#[test]
fn attempts_on_unknown_responses_are_not_found() {
    let (store, _) = seeded_store();
    let err = store
        .upsert_response_attempt("ghost", AttemptResult::Success { text: "x" })
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn at_most_one_verdict_per_response() {
    let (store, response_id) = seeded_store();
    store
        .upsert_response_attempt(&response_id, AttemptResult::Success { text: "answer" })
        .unwrap();

    let first = store.upsert_verdict(&response_id, &sample_payload()).unwrap();
    let second = store.upsert_verdict(&response_id, &sample_payload()).unwrap();
    assert_eq!(first, second);

    let conn = store.conn.lock().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM verdicts WHERE response_id = ?1",
            [&response_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn rating_uniqueness_is_per_response_and_rater() {
    let (store, response_id) = seeded_store();
    store
        .upsert_response_attempt(&response_id, AttemptResult::Success { text: "answer" })
        .unwrap();

    let rating = |id: &str, rater: &str| Rating {
        id: id.to_string(),
        response_id: response_id.clone(),
        rater_id: rater.to_string(),
        score: 4,
        comment: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    store.insert_rating(&rating("rt1", "alice")).unwrap();
    let dup = store.insert_rating(&rating("rt2", "alice")).unwrap_err();
    assert!(matches!(dup, CoreError::DuplicateRating { .. }));
    store.insert_rating(&rating("rt3", "bob")).unwrap();

    let tree = store.get_experiment_tree("e1").unwrap().unwrap();
    let baseline = tree.arm(ArmKind::Baseline).unwrap();
    assert_eq!(baseline.ratings.len(), 2);
}

#[test]
fn list_experiments_filters_and_pages() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    seed(&store, "e1", "one");
    seed(&store, "e2", "two");
    seed(&store, "e3", "three");
    store
        .set_experiment_status("e2", ExperimentStatus::Completed)
        .unwrap();

    let all = store.list_experiments(None, 10, 0).unwrap();
    assert_eq!(all.len(), 3);

    let completed = store
        .list_experiments(Some(ExperimentStatus::Completed), 10, 0)
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, "e2");

    let paged = store.list_experiments(None, 2, 2).unwrap();
    assert_eq!(paged.len(), 1);
}

#[test]
fn data_survives_reopening_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duet.db");

    {
        let store = Store::open(&path).unwrap();
        store.init_schema().unwrap();
        seed(&store, "e1", "durable prompt");
        store
            .upsert_response_attempt(
                "resp-e1-baseline",
                AttemptResult::Success { text: "kept" },
            )
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    store.init_schema().unwrap();
    let tree = store.get_experiment_tree("e1").unwrap().unwrap();
    assert_eq!(tree.experiment.original_prompt, "durable prompt");
    let response = tree.arm(ArmKind::Baseline).unwrap().response.as_ref().unwrap();
    assert_eq!(response.text.as_deref(), Some("kept"));
}

#[test]
fn rewrite_done_is_terminal() {
    let (store, _) = seeded_store();
    let variant_id = "var-e1-enhanced";
    store
        .set_variant_rewrite(variant_id, RewriteStatus::Done, Some("improved prompt"))
        .unwrap();
    // A later writer cannot replace the landed rewrite.
    store
        .set_variant_rewrite(variant_id, RewriteStatus::Failed, Some("clobbered"))
        .unwrap();

    let tree = store.get_experiment_tree("e1").unwrap().unwrap();
    let enhanced = tree.arm(ArmKind::Enhanced).unwrap();
    assert_eq!(enhanced.variant.rewrite_status, RewriteStatus::Done);
    assert_eq!(enhanced.variant.prompt_text, "improved prompt");
}
