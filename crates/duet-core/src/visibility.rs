//! Role-based field visibility. Pure functions, evaluated fresh on
//! every view call so a role change takes effect immediately. Raters
//! rate blind: verdict payloads and other raters' scores are absent
//! from their view, not blanked.

use serde::{Deserialize, Serialize};

use crate::model::{ArmKind, ExperimentStatus, ExperimentTree, RewriteStatus, StepStatus,
    VerdictPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Rater { rater_id: String },
    Admin,
}

impl Role {
    /// Unknown role strings fall back to the restrictive rater view.
    /// Never an error; the rating surface must survive missing role
    /// metadata.
    pub fn parse(role: &str, rater_id: &str) -> Role {
        match role.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::Rater {
                rater_id: rater_id.to_string(),
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Experiment tree after redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentView {
    pub id: String,
    pub original_prompt: String,
    pub status: ExperimentStatus,
    pub created_at: String,
    pub arms: Vec<ArmView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmView {
    pub arm: ArmKind,
    pub prompt_text: String,
    pub rewrite_status: RewriteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseView {
    pub id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub attempts: u32,
    /// Admin only. Absent for raters so blind ratings stay blind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictPayload>,
    pub ratings: Vec<RatingView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingView {
    pub rater_id: String,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: String,
}

/// Project the tree down to what `role` may see.
pub fn redact_tree(role: &Role, tree: &ExperimentTree) -> ExperimentView {
    let arms = tree
        .arms
        .iter()
        .map(|arm| ArmView {
            arm: arm.variant.arm,
            prompt_text: arm.variant.prompt_text.clone(),
            rewrite_status: arm.variant.rewrite_status,
            response: arm.response.as_ref().map(|r| {
                let verdict = match role {
                    Role::Admin => arm.verdict.as_ref().map(|v| v.payload.clone()),
                    Role::Rater { .. } => None,
                };
                let ratings = arm
                    .ratings
                    .iter()
                    .filter(|rating| match role {
                        Role::Admin => true,
                        Role::Rater { rater_id } => rating.rater_id == *rater_id,
                    })
                    .map(|rating| RatingView {
                        rater_id: rating.rater_id.clone(),
                        score: rating.score,
                        comment: rating.comment.clone(),
                        created_at: rating.created_at.clone(),
                    })
                    .collect();
                ResponseView {
                    id: r.id.clone(),
                    status: r.status,
                    text: r.text.clone(),
                    attempts: r.attempts,
                    verdict,
                    ratings,
                }
            }),
        })
        .collect();

    ExperimentView {
        id: tree.experiment.id.clone(),
        original_prompt: tree.experiment.original_prompt.clone(),
        status: tree.experiment.status,
        created_at: tree.experiment.created_at.clone(),
        arms,
    }
}
