//! Automated judging of a single (prompt, response) pair. The LLM
//! judge scores a four-dimension rubric and returns a structured
//! payload; the heuristic judge is a deterministic offline fallback.

pub mod heuristic;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::model::VerdictPayload;
use crate::prompts;
use crate::providers::LlmClient;

pub const RUBRIC_DIMS: [&str; 4] = ["intent", "clarity", "structure", "safety"];

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(&self, prompt: &str, response: &str) -> anyhow::Result<VerdictPayload>;

    fn kind(&self) -> &'static str;
}

pub struct LlmJudge {
    client: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

/// Validate the judge's JSON against the rubric and fold it into a
/// payload. Summary score is the rubric sum; dimension scores and
/// notes ride along in the extension map.
pub(crate) fn payload_from_rubric(val: &serde_json::Value) -> anyhow::Result<VerdictPayload> {
    let obj = val
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("judge output is not a JSON object"))?;

    let mut extra = serde_json::Map::new();
    let mut total = 0i64;
    for dim in RUBRIC_DIMS {
        let score = obj
            .get(dim)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| anyhow::anyhow!("judge output missing rubric field '{}'", dim))?;
        if !(1..=5).contains(&score) {
            anyhow::bail!("judge score for '{}' out of band: {}", dim, score);
        }
        total += score;
        extra.insert(dim.to_string(), json!(score));
    }
    let notes = obj.get("notes").and_then(|v| v.as_str()).unwrap_or("");
    extra.insert("notes".to_string(), json!(notes));

    Ok(VerdictPayload {
        score: total as f64,
        extra,
    })
}

#[async_trait]
impl JudgeClient for LlmJudge {
    async fn judge(&self, prompt: &str, response: &str) -> anyhow::Result<VerdictPayload> {
        let user = prompts::judge_user_prompt(prompt, response);
        let val = self
            .client
            .complete_json(&user, Some(prompts::JUDGE_SYSTEM), 0.0)
            .await?;
        let mut payload = payload_from_rubric(&val)?;
        payload
            .extra
            .insert("judge_kind".to_string(), json!(self.kind()));
        Ok(payload)
    }

    fn kind(&self) -> &'static str {
        "llm"
    }
}
