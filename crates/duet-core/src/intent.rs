//! Rule-based intent router. Classifies a prompt into a coarse route
//! that drives the rewrite mode (social messages pass through
//! untouched), the answering system prompt, and the sampling
//! temperature. Deterministic and total: every input maps to a route.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Social,
    Qa,
    Task,
    Tech,
    Creative,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Social => "social",
            Route::Qa => "qa",
            Route::Task => "task",
            Route::Tech => "tech",
            Route::Creative => "creative",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "social" => Route::Social,
            "task" => Route::Task,
            "tech" => Route::Tech,
            "creative" => Route::Creative,
            _ => Route::Qa,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub route: Route,
    pub confidence: f32,
    pub reason: &'static str,
}

/// How aggressively the rewriter may touch the prompt for this route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Pass the prompt through verbatim.
    None,
    /// Fix obvious ambiguity and grammar only.
    Light,
    /// Full structural rewrite.
    Full,
}

lazy_static! {
    static ref SOCIAL: Regex = Regex::new(
        r"(?i)^\s*(hi|hey|hello|yo|sup|what's up|whats up|good\s+(morning|afternoon|evening)|how\s+are\s+you)\b"
    )
    .unwrap();
    static ref TECH: Regex = Regex::new(
        r"(?i)\b(traceback|stack\s*trace|exception|error|bug|debug|python|rust|java|javascript|typescript|sql|select|join|streamlit|pip|cargo|npm|git|docker|api|json|yaml)\b"
    )
    .unwrap();
    static ref CREATIVE: Regex = Regex::new(
        r"(?i)\b(story|poem|rap|lyrics|fantasy|character|plot|brainstorm|ideas|creative)\b"
    )
    .unwrap();
    static ref TASK: Regex = Regex::new(
        r"(?i)\b(draft|write|create|make|build|generate|design|plan|summarize|summarise|compare|review|fix|refactor|implement|convert|translate)\b"
    )
    .unwrap();
    static ref QUESTION: Regex =
        Regex::new(r"(?i)\b(what|why|how|when|where|which|who)\b").unwrap();
}

pub fn classify(text: &str) -> IntentResult {
    let t = text.trim();
    if t.is_empty() {
        return IntentResult {
            route: Route::Social,
            confidence: 0.6,
            reason: "empty input",
        };
    }
    if SOCIAL.is_match(t) && t.split_whitespace().count() <= 8 {
        return IntentResult {
            route: Route::Social,
            confidence: 0.9,
            reason: "greeting or small talk",
        };
    }
    if TECH.is_match(t) {
        return IntentResult {
            route: Route::Tech,
            confidence: 0.85,
            reason: "tech keywords",
        };
    }
    if CREATIVE.is_match(t) {
        return IntentResult {
            route: Route::Creative,
            confidence: 0.75,
            reason: "creative keywords",
        };
    }
    if TASK.is_match(t) {
        return IntentResult {
            route: Route::Task,
            confidence: 0.7,
            reason: "task verb",
        };
    }
    if t.contains('?') || QUESTION.is_match(t) {
        return IntentResult {
            route: Route::Qa,
            confidence: 0.65,
            reason: "question form",
        };
    }
    IntentResult {
        route: Route::Qa,
        confidence: 0.4,
        reason: "default qa",
    }
}

/// Sampling temperature per route. Factual routes run cold, creative
/// ones hot.
pub fn temperature_for(route: Route) -> f32 {
    match route {
        Route::Social => 0.8,
        Route::Creative => 1.0,
        Route::Qa => 0.2,
        Route::Tech => 0.1,
        Route::Task => 0.35,
    }
}

pub fn rewrite_mode_for(route: Route) -> RewriteMode {
    match route {
        Route::Social => RewriteMode::None,
        Route::Qa => RewriteMode::Light,
        Route::Task | Route::Tech | Route::Creative => RewriteMode::Full,
    }
}
