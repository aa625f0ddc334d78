//! Enhanced-arm prompt rewriting. Social messages pass through
//! verbatim; everything else gets a light or full editor pass keyed
//! off the intent route.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::intent::{self, RewriteMode};
use crate::prompts;
use crate::providers::LlmClient;

#[async_trait]
pub trait RewriteClient: Send + Sync {
    async fn rewrite(&self, prompt: &str) -> anyhow::Result<String>;
}

pub struct LlmRewriter {
    client: Arc<dyn LlmClient>,
}

const REWRITE_TEMPERATURE: f32 = 0.2;

impl LlmRewriter {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RewriteClient for LlmRewriter {
    async fn rewrite(&self, prompt: &str) -> anyhow::Result<String> {
        let trimmed = prompt.trim();
        let route = intent::classify(trimmed).route;
        let system = match intent::rewrite_mode_for(route) {
            RewriteMode::None => {
                debug!(route = route.as_str(), "passthrough, no rewrite");
                return Ok(trimmed.to_string());
            }
            RewriteMode::Light => prompts::REWRITE_SYSTEM_LIGHT,
            RewriteMode::Full => prompts::REWRITE_SYSTEM_FULL,
        };

        let resp = self
            .client
            .complete(trimmed, Some(system), REWRITE_TEMPERATURE)
            .await?;
        let rewritten = resp.text.trim().to_string();
        if rewritten.is_empty() {
            anyhow::bail!("rewriter returned an empty prompt");
        }
        Ok(rewritten)
    }
}
