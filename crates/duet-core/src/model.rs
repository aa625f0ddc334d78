//! Record types for the experiment tree: one experiment owns two
//! variants (baseline, enhanced), each variant owns at most one active
//! response, each response at most one verdict and any number of
//! ratings. Status enums round-trip through the store as TEXT.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::intent::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    InProgress,
    Completed,
    PartiallyFailed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::InProgress => "in_progress",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::PartiallyFailed => "partially_failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => ExperimentStatus::InProgress,
            "completed" => ExperimentStatus::Completed,
            "partially_failed" => ExperimentStatus::PartiallyFailed,
            _ => ExperimentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmKind {
    Baseline,
    Enhanced,
}

impl ArmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmKind::Baseline => "baseline",
            ArmKind::Enhanced => "enhanced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "enhanced" => ArmKind::Enhanced,
            _ => ArmKind::Baseline,
        }
    }
}

/// Rewrite progress for a variant. The baseline arm never rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    NotApplicable,
    Pending,
    Done,
    Failed,
}

impl RewriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteStatus::NotApplicable => "n/a",
            RewriteStatus::Pending => "pending",
            RewriteStatus::Done => "done",
            RewriteStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => RewriteStatus::Pending,
            "done" => RewriteStatus::Done,
            "failed" => RewriteStatus::Failed,
            _ => RewriteStatus::NotApplicable,
        }
    }
}

/// Per-step state machine: pending -> in_progress -> done | failed.
/// `done` and budget-exhausted `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => StepStatus::InProgress,
            "done" => StepStatus::Done,
            "failed" => StepStatus::Failed,
            _ => StepStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub original_prompt: String,
    pub route: Route,
    pub status: ExperimentStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub experiment_id: String,
    pub arm: ArmKind,
    /// Text actually sent to the response client. For the baseline arm
    /// this equals the experiment's original prompt, verbatim, always.
    pub prompt_text: String,
    pub rewrite_status: RewriteStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub variant_id: String,
    pub status: StepStatus,
    /// Judging progress for this response; failures land here because
    /// a verdict row only exists once judging succeeds.
    pub judge_status: StepStatus,
    pub text: Option<String>,
    pub attempts: u32,
    pub generated_at: Option<String>,
}

/// One generation attempt, retained for audit even after a later
/// attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAttempt {
    pub response_id: String,
    pub attempt_no: u32,
    pub outcome: String,
    pub message: Option<String>,
    pub created_at: String,
}

/// Judge output: a required summary score plus whatever else the judge
/// produced (rubric dimensions, rationale, judge kind). Kept structured
/// so the visibility policy can reason about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictPayload {
    pub score: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub id: String,
    pub response_id: String,
    pub payload: VerdictPayload,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: String,
    pub response_id: String,
    pub rater_id: String,
    pub score: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

/// Fully joined experiment tree as loaded from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentTree {
    pub experiment: Experiment,
    pub arms: Vec<ArmRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmRecord {
    pub variant: Variant,
    pub response: Option<ResponseRecord>,
    pub verdict: Option<Verdict>,
    pub ratings: Vec<Rating>,
}

impl ExperimentTree {
    pub fn arm(&self, kind: ArmKind) -> Option<&ArmRecord> {
        self.arms.iter().find(|a| a.variant.arm == kind)
    }

    /// Content hash over prompts and response texts. Stable across
    /// reloads, used as a dedupe key in exports.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.experiment.original_prompt.as_bytes());
        for arm in &self.arms {
            hasher.update(b"|");
            hasher.update(arm.variant.prompt_text.as_bytes());
            hasher.update(b"|");
            if let Some(text) = arm.response.as_ref().and_then(|r| r.text.as_deref()) {
                hasher.update(text.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// An arm is blocked when its rewrite failed terminally: its response
/// and verdict steps can never run, but the sibling arm is unaffected.
pub fn arm_blocked(arm: &ArmRecord) -> bool {
    arm.variant.arm == ArmKind::Enhanced && arm.variant.rewrite_status == RewriteStatus::Failed
}

/// Pipeline stage an `advance` call drives next. One stage covers both
/// arms, so a full two-arm run is rewrite, respond, judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Rewrite,
    Respond,
    Judge,
}

fn needs_generation(arm: &ArmRecord) -> bool {
    if arm_blocked(arm) {
        return false;
    }
    if arm.variant.arm == ArmKind::Enhanced
        && arm.variant.rewrite_status == RewriteStatus::Pending
    {
        return false;
    }
    match &arm.response {
        Some(r) => matches!(r.status, StepStatus::Pending | StepStatus::InProgress),
        None => true,
    }
}

fn needs_judging(arm: &ArmRecord) -> bool {
    match &arm.response {
        Some(r) => {
            r.status == StepStatus::Done
                && matches!(r.judge_status, StepStatus::Pending | StepStatus::InProgress)
        }
        None => false,
    }
}

/// Next pending stage, or None when the pipeline has nothing left to
/// do (fully complete or terminally degraded).
pub fn pending_stage(tree: &ExperimentTree) -> Option<StageKind> {
    if let Some(enhanced) = tree.arm(ArmKind::Enhanced) {
        if enhanced.variant.rewrite_status == RewriteStatus::Pending {
            return Some(StageKind::Rewrite);
        }
    }
    if tree.arms.iter().any(needs_generation) {
        return Some(StageKind::Respond);
    }
    if tree.arms.iter().any(needs_judging) {
        return Some(StageKind::Judge);
    }
    None
}

/// Aggregate experiment status recomputed from the tree. Any terminal
/// step failure degrades the whole experiment to `partially_failed`;
/// everything that succeeded stays visible.
pub fn aggregate_status(tree: &ExperimentTree) -> ExperimentStatus {
    let mut any_failed = false;
    let mut any_progress = false;
    let mut all_done = true;

    for arm in &tree.arms {
        match arm.variant.rewrite_status {
            RewriteStatus::Failed => any_failed = true,
            RewriteStatus::Done => any_progress = true,
            RewriteStatus::Pending => all_done = false,
            RewriteStatus::NotApplicable => {}
        }
        let blocked = arm_blocked(arm);
        match &arm.response {
            Some(r) => {
                if r.attempts > 0 || r.status != StepStatus::Pending {
                    any_progress = true;
                }
                if r.status == StepStatus::Failed || r.judge_status == StepStatus::Failed {
                    any_failed = true;
                }
                if !blocked && !(r.status == StepStatus::Done && r.judge_status == StepStatus::Done)
                {
                    all_done = false;
                }
            }
            None => {
                if !blocked {
                    all_done = false;
                }
            }
        }
    }

    if any_failed {
        ExperimentStatus::PartiallyFailed
    } else if all_done {
        ExperimentStatus::Completed
    } else if any_progress {
        ExperimentStatus::InProgress
    } else {
        ExperimentStatus::Pending
    }
}

/// Point-in-time pipeline summary returned by `advance`. Holds no
/// timestamps so back-to-back idempotent calls compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSnapshot {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub pending: Option<StageKind>,
    pub arms: Vec<ArmSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSnapshot {
    pub arm: ArmKind,
    pub rewrite_status: RewriteStatus,
    pub response_status: StepStatus,
    pub judge_status: StepStatus,
    pub attempts: u32,
}

impl ExperimentSnapshot {
    pub fn from_tree(tree: &ExperimentTree) -> Self {
        let arms = tree
            .arms
            .iter()
            .map(|arm| ArmSnapshot {
                arm: arm.variant.arm,
                rewrite_status: arm.variant.rewrite_status,
                response_status: arm
                    .response
                    .as_ref()
                    .map(|r| r.status)
                    .unwrap_or(StepStatus::Pending),
                judge_status: arm
                    .response
                    .as_ref()
                    .map(|r| r.judge_status)
                    .unwrap_or(StepStatus::Pending),
                attempts: arm.response.as_ref().map(|r| r.attempts).unwrap_or(0),
            })
            .collect();
        ExperimentSnapshot {
            experiment_id: tree.experiment.id.clone(),
            status: tree.experiment.status,
            pending: pending_stage(tree),
            arms,
        }
    }
}

/// Provider completion as returned by an `LlmClient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub meta: serde_json::Value,
}
