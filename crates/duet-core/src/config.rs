//! Runtime knobs for the controller and retry policy. Explicit struct,
//! no process-wide singleton; callers construct one and hand it to the
//! controller.

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Submissions longer than this are rejected with a validation error.
    pub max_prompt_chars: usize,
    /// Inclusive human-rating band.
    pub rating_min: i64,
    pub rating_max: i64,
    pub retry: RetryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 4000,
            rating_min: 1,
            rating_max: 5,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempt budget per external call, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Per-attempt timeout; a call that exceeds it counts as a failed
    /// attempt. This is the only bound on how long `advance` blocks.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            timeout_ms: 30_000,
        }
    }
}
