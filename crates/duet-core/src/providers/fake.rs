//! Offline client for tests and demo runs. Scripted replies pop in
//! order; once the script is empty the client falls back to a
//! deterministic canned reply derived from the prompt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::LlmClient;
use crate::model::LlmResponse;

enum ScriptItem {
    Text(String),
    Fail(String),
}

pub struct FakeClient {
    script: Mutex<VecDeque<ScriptItem>>,
    /// Fail this many leading calls before succeeding. Used to exercise
    /// the retry path.
    fail_first: AtomicU32,
    calls: AtomicU32,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fail_first: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn scripted(replies: Vec<&str>) -> Self {
        let client = Self::new();
        {
            let mut script = client.script.lock().unwrap();
            for reply in replies {
                script.push_back(ScriptItem::Text(reply.to_string()));
            }
        }
        client
    }

    pub fn failing_first(n: u32) -> Self {
        let client = Self::new();
        client.fail_first.store(n, Ordering::SeqCst);
        client
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptItem::Fail(message.to_string()));
    }

    pub fn push_reply(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptItem::Text(text.to_string()));
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn canned(prompt: &str) -> String {
        let head: String = prompt.chars().take(48).collect();
        format!("[fake] {}", head.trim())
    }
}

impl Default for FakeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
    ) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("fake provider unavailable ({} failures left)", remaining - 1);
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let text = match scripted {
            Some(ScriptItem::Text(text)) => text,
            Some(ScriptItem::Fail(message)) => anyhow::bail!("{message}"),
            None => Self::canned(prompt),
        };

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: "fake".to_string(),
            meta: json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
