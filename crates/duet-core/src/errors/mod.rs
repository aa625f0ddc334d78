use std::fmt;

/// Pipeline stage owning an external provider call. Used to attribute
/// failures to the record they degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rewrite,
    Response,
    Judge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Rewrite => write!(f, "rewrite"),
            Stage::Response => write!(f, "response"),
            Stage::Judge => write!(f, "judge"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Bad caller input. Never retried, surfaced immediately.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// External LLM call failed after the retry budget was spent.
    /// Recorded on the owning record as a degraded status; `advance`
    /// does not surface this to its caller.
    #[error("{stage} provider call failed: {message}")]
    Provider { stage: Stage, message: String },

    /// Referenced entity does not exist (or is not in a usable state).
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A rating for this (response, rater) pair already exists.
    #[error("duplicate rating for response {response_id} by rater {rater_id}")]
    DuplicateRating {
        response_id: String,
        rater_id: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation(reason: impl Into<String>) -> Self {
        CoreError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound { what: what.into() }
    }

    /// Provider failures are transient by default; everything else is
    /// a caller or integrity error and must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Provider { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_retryable() {
        let err = CoreError::Provider {
            stage: Stage::Judge,
            message: "503".into(),
        };
        assert!(err.is_retryable());
        assert!(!CoreError::validation("empty prompt").is_retryable());
        assert!(!CoreError::not_found("response x").is_retryable());
    }

    #[test]
    fn display_includes_stage() {
        let err = CoreError::Provider {
            stage: Stage::Rewrite,
            message: "timeout".into(),
        };
        assert!(err.to_string().contains("rewrite"));
    }
}
