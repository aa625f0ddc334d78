//! Shared retry policy for all three provider adapters. One place for
//! the attempt budget, exponential backoff curve, jitter, and the
//! per-attempt timeout, instead of ad hoc loops at each call site.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::{CoreError, Stage};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    cfg: RetryConfig,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg }
    }

    pub fn max_attempts(&self) -> u32 {
        self.cfg.max_attempts.max(1)
    }

    /// Backoff before the next try after `attempt` failed (1-based).
    /// Doubles from the base and is capped; jitter is applied at sleep
    /// time so this stays deterministic for tests.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .cfg
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.cfg.max_delay_ms);
        Duration::from_millis(ms)
    }

    fn jittered(&self, base: Duration) -> Duration {
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_millis(((base.as_millis() as f64) * factor).round() as u64)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    /// `on_error` fires after every failed attempt with the 1-based
    /// attempt number, so callers can persist per-attempt audit rows.
    pub async fn run_observed<T, F, Fut>(
        &self,
        stage: Stage,
        mut op: F,
        mut on_error: impl FnMut(u32, &str),
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let budget = self.max_attempts();
        let timeout = Duration::from_millis(self.cfg.timeout_ms.max(1));
        let mut last_error = String::new();

        for attempt in 1..=budget {
            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("timed out after {}ms", timeout.as_millis()),
            };
            warn!(
                stage = %stage,
                attempt,
                budget,
                error = %outcome,
                "provider call failed"
            );
            on_error(attempt, &outcome);
            last_error = outcome;
            if attempt < budget {
                tokio::time::sleep(self.jittered(self.delay_for(attempt))).await;
            }
        }

        Err(CoreError::Provider {
            stage,
            message: last_error,
        })
    }

    pub async fn run<T, F, Fut>(&self, stage: Stage, op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run_observed(stage, op, |_, _| {}).await
    }
}
