use async_trait::async_trait;
use serde_json::json;

use super::LlmClient;
use crate::model::LlmResponse;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    pub model: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Reads GEMINI_API_KEY and optionally DUET_MODEL.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        let model =
            std::env::var("DUET_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(model, api_key))
    }

    fn build_body(
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        json_mode: bool,
    ) -> serde_json::Value {
        let mut generation_config = json!({ "temperature": temperature });
        if json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        json_mode: bool,
    ) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/{}:generateContent", API_BASE, self.model);
        let body = Self::build_body(prompt, system, temperature, json_mode);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_else(|_| String::new());
            anyhow::bail!("Gemini API error (status {}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Gemini response missing candidate text"))?
            .trim()
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "gemini".to_string(),
            model: self.model.clone(),
            meta: json.get("usageMetadata").cloned().unwrap_or(json!({})),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> anyhow::Result<LlmResponse> {
        self.generate(prompt, system, temperature, false).await
    }

    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> anyhow::Result<serde_json::Value> {
        // Native JSON mode; the model returns valid JSON in the text part.
        let resp = self.generate(prompt, system, temperature, true).await?;
        super::extract_first_json(&resp.text)
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_system_instruction_and_temperature() {
        let body = GeminiClient::build_body("hello", Some("be terse"), 0.2, false);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn json_mode_sets_response_mime_type() {
        let body = GeminiClient::build_body("hello", None, 0.0, true);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(body.get("systemInstruction").is_none());
    }
}
