//! External LLM provider clients. The rest of the core only sees the
//! `LlmClient` trait; concrete transports live behind it.

pub mod fake;
pub mod gemini;

use async_trait::async_trait;

use crate::model::LlmResponse;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> anyhow::Result<LlmResponse>;

    /// Completion that must yield a JSON value. The default extracts
    /// the first JSON document from a plain completion; providers with
    /// a native JSON mode override this.
    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = self.complete(prompt, system, temperature).await?;
        extract_first_json(&resp.text)
    }

    fn provider_name(&self) -> &'static str;
}

/// Pull the first JSON document out of a completion that may wrap it
/// in prose or a code fence.
pub fn extract_first_json(text: &str) -> anyhow::Result<serde_json::Value> {
    let trimmed = text.trim();
    let start = trimmed
        .find('{')
        .or_else(|| trimmed.find('['))
        .ok_or_else(|| anyhow::anyhow!("no JSON start ({{ or [) found in model output"))?;
    let segment = &trimmed[start..];
    serde_json::Deserializer::from_str(segment)
        .into_iter::<serde_json::Value>()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no JSON document found in model output"))?
        .map_err(|e| anyhow::anyhow!("invalid JSON in model output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let val = extract_first_json("Sure, here you go:\n{\"score\": 4} hope it helps").unwrap();
        assert_eq!(val["score"], 4);
    }

    #[test]
    fn extracts_json_from_code_fence() {
        let val = extract_first_json("```json\n{\"a\": [1, 2]}\n```").unwrap();
        assert_eq!(val["a"][1], 2);
    }

    #[test]
    fn rejects_output_without_json() {
        assert!(extract_first_json("no structured data here").is_err());
    }
}
