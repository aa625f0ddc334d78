//! Failure isolation: one arm's dead provider never takes down the
//! sibling arm, retries stay within budget, and the audit trail keeps
//! every failed attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use duet_core::answer::ResponseClient;
use duet_core::engine::Controller;
use duet_core::judge::heuristic::HeuristicJudge;
use duet_core::judge::JudgeClient;
use duet_core::model::{
    ArmKind, ExperimentStatus, RewriteStatus, StepStatus, VerdictPayload,
};
use duet_core::rewrite::RewriteClient;
use duet_core::storage::Store;
use duet_core::visibility::Role;
use duet_core::{CoreConfig, RetryConfig};

struct DeadRewriter;

#[async_trait]
impl RewriteClient for DeadRewriter {
    async fn rewrite(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("rewrite provider down")
    }
}

struct OkRewriter;

#[async_trait]
impl RewriteClient for OkRewriter {
    async fn rewrite(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(format!("better: {prompt}"))
    }
}

struct EchoResponder;

#[async_trait]
impl ResponseClient for EchoResponder {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(format!("answer: {prompt}"))
    }
}

/// Fails the first `n` calls, then answers.
struct FlakyResponder {
    failures_left: AtomicU32,
}

#[async_trait]
impl ResponseClient for FlakyResponder {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("transient 503")
        }
        Ok(format!("answer: {prompt}"))
    }
}

struct DeadJudge;

#[async_trait]
impl JudgeClient for DeadJudge {
    async fn judge(&self, _p: &str, _r: &str) -> anyhow::Result<VerdictPayload> {
        anyhow::bail!("judge provider down")
    }

    fn kind(&self) -> &'static str {
        "llm"
    }
}

fn tight_retry() -> CoreConfig {
    CoreConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            timeout_ms: 1_000,
        },
        ..CoreConfig::default()
    }
}

fn store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
}

#[tokio::test]
async fn dead_rewriter_degrades_only_the_enhanced_arm() {
    let ctl = Controller::new(
        store(),
        Arc::new(DeadRewriter),
        Arc::new(EchoResponder),
        Arc::new(HeuristicJudge),
        tight_retry(),
    );
    let id = ctl.submit("summarize this report for me").unwrap();

    let snapshot = ctl.run_to_completion(&id).await.unwrap();
    assert_eq!(snapshot.status, ExperimentStatus::PartiallyFailed);
    assert!(snapshot.pending.is_none());

    let admin = ctl.view(&id, &Role::Admin).unwrap();
    let baseline = admin.arms.iter().find(|a| a.arm == ArmKind::Baseline).unwrap();
    let enhanced = admin.arms.iter().find(|a| a.arm == ArmKind::Enhanced).unwrap();

    // Enhanced rewrite is terminally failed and its response never ran.
    assert_eq!(enhanced.rewrite_status, RewriteStatus::Failed);
    assert_eq!(
        enhanced.response.as_ref().unwrap().status,
        StepStatus::Pending
    );

    // The baseline arm still produced a judged response.
    let baseline_response = baseline.response.as_ref().unwrap();
    assert_eq!(baseline_response.status, StepStatus::Done);
    assert!(baseline_response.verdict.is_some());

    // A surviving done response stays ratable after partial failure.
    ctl.submit_rating(&baseline_response.id, "r1", 4, None)
        .unwrap();

    // The degraded experiment still serves a rater view.
    let rater = ctl.view(&id, &Role::parse("rater", "r1")).unwrap();
    assert!(rater.arms.iter().any(|a| a
        .response
        .as_ref()
        .and_then(|r| r.text.as_ref())
        .is_some()));
}

#[tokio::test]
async fn transient_response_failures_are_retried_within_budget() {
    let ctl = Controller::new(
        store(),
        Arc::new(OkRewriter),
        Arc::new(FlakyResponder {
            failures_left: AtomicU32::new(1),
        }),
        Arc::new(HeuristicJudge),
        tight_retry(),
    );
    let id = ctl.submit("draft a launch checklist").unwrap();
    let snapshot = ctl.run_to_completion(&id).await.unwrap();
    assert_eq!(snapshot.status, ExperimentStatus::Completed);

    // Baseline generates first, so it absorbed the transient failure:
    // one failed attempt retained, then one successful one.
    let tree = ctl.store().get_experiment_tree(&id).unwrap().unwrap();
    let baseline = tree.arm(ArmKind::Baseline).unwrap();
    let response = baseline.response.as_ref().unwrap();
    assert_eq!(response.status, StepStatus::Done);
    assert_eq!(response.attempts, 2);

    let attempts = ctl.store().list_response_attempts(&response.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].outcome, "failed");
    assert!(attempts[0].message.as_ref().unwrap().contains("503"));
    assert_eq!(attempts[1].outcome, "done");

    // The enhanced arm never failed.
    let enhanced = tree.arm(ArmKind::Enhanced).unwrap();
    assert_eq!(enhanced.response.as_ref().unwrap().attempts, 1);
}

#[tokio::test]
async fn exhausted_response_budget_is_terminal() {
    let ctl = Controller::new(
        store(),
        Arc::new(OkRewriter),
        Arc::new(FlakyResponder {
            // More failures than the 3-attempt budget for one arm, so
            // baseline exhausts while enhanced still succeeds.
            failures_left: AtomicU32::new(3),
        }),
        Arc::new(HeuristicJudge),
        tight_retry(),
    );
    let id = ctl.submit("explain how tides work").unwrap();
    let snapshot = ctl.run_to_completion(&id).await.unwrap();
    assert_eq!(snapshot.status, ExperimentStatus::PartiallyFailed);

    let tree = ctl.store().get_experiment_tree(&id).unwrap().unwrap();
    let baseline = tree.arm(ArmKind::Baseline).unwrap().response.as_ref().unwrap().clone();
    assert_eq!(baseline.status, StepStatus::Failed);
    assert_eq!(baseline.attempts, 3);
    assert!(baseline.text.is_none());

    let enhanced = tree.arm(ArmKind::Enhanced).unwrap().response.as_ref().unwrap().clone();
    assert_eq!(enhanced.status, StepStatus::Done);
    assert_eq!(enhanced.judge_status, StepStatus::Done);

    // A terminally failed response is not ratable.
    assert!(ctl.submit_rating(&baseline.id, "r1", 3, None).is_err());
}

#[tokio::test]
async fn dead_judge_leaves_responses_standing() {
    let ctl = Controller::new(
        store(),
        Arc::new(OkRewriter),
        Arc::new(EchoResponder),
        Arc::new(DeadJudge),
        tight_retry(),
    );
    let id = ctl.submit("what changed in the latest release?").unwrap();
    let snapshot = ctl.run_to_completion(&id).await.unwrap();
    assert_eq!(snapshot.status, ExperimentStatus::PartiallyFailed);

    let tree = ctl.store().get_experiment_tree(&id).unwrap().unwrap();
    for arm in &tree.arms {
        let response = arm.response.as_ref().unwrap();
        assert_eq!(response.status, StepStatus::Done);
        assert_eq!(response.judge_status, StepStatus::Failed);
        assert!(arm.verdict.is_none());
        // Responses remain ratable even though judging died.
        ctl.submit_rating(&response.id, "r1", 3, None).unwrap();
    }
}
