//! Response generation. Both arms go through the same client; the only
//! difference between them is the prompt text itself, which keeps the
//! comparison clean.

use std::sync::Arc;

use async_trait::async_trait;

use crate::intent;
use crate::prompts;
use crate::providers::LlmClient;

#[async_trait]
pub trait ResponseClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// How the sampling temperature is picked per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempMode {
    /// Route-derived temperature.
    Auto,
    Fixed(f32),
}

pub struct LlmResponder {
    client: Arc<dyn LlmClient>,
    temp_mode: TempMode,
}

impl LlmResponder {
    pub fn new(client: Arc<dyn LlmClient>, temp_mode: TempMode) -> Self {
        Self { client, temp_mode }
    }
}

#[async_trait]
impl ResponseClient for LlmResponder {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let route = intent::classify(prompt).route;
        let temperature = match self.temp_mode {
            TempMode::Auto => intent::temperature_for(route),
            TempMode::Fixed(t) => t,
        };
        let system = prompts::answer_system(route);

        let resp = self.client.complete(prompt, Some(system), temperature).await?;
        let text = resp.text.trim().to_string();
        if text.is_empty() {
            anyhow::bail!("response client returned empty text");
        }
        Ok(text)
    }
}
