//! Deterministic rule-based judge. Scores from surface signals only
//! (term overlap, length, punctuation, list structure), so it is not
//! semantic. Useful offline and as a bias-free sanity baseline.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::JudgeClient;
use crate::model::VerdictPayload;

lazy_static! {
    static ref BULLET: Regex = Regex::new(r"(?m)^\s*([-*]|\d+\.)\s+").unwrap();
    static ref WORD: Regex = Regex::new(r"[A-Za-z]{4,}").unwrap();
    static ref HEDGE: Regex =
        Regex::new(r"(?i)\b(depends|cannot|limitation|trade-?off|uncertain)\b").unwrap();
}

pub struct HeuristicJudge;

fn clamp_1_5(x: f64) -> i64 {
    (x.round() as i64).clamp(1, 5)
}

fn overlap_terms(query: &str, response: &str) -> usize {
    let query_lower = query.to_lowercase();
    let resp_lower = response.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    WORD.find_iter(&query_lower)
        .filter(|m| seen.insert(m.as_str().to_string()) && resp_lower.contains(m.as_str()))
        .count()
}

#[async_trait]
impl JudgeClient for HeuristicJudge {
    async fn judge(&self, prompt: &str, response: &str) -> anyhow::Result<VerdictPayload> {
        let r = response.trim();
        let n_words = r.split_whitespace().count();
        let has_steps = BULLET.is_match(r);
        let asks_back = r.contains('?');
        let hedges = HEDGE.is_match(r);
        let overlap = overlap_terms(prompt, r);

        let intent =
            2.5 + if overlap >= 2 { 1.0 } else { 0.0 } + if n_words >= 25 { 1.0 } else { 0.0 };
        let clarity = 2.5
            + if r.contains('.') { 0.5 } else { 0.0 }
            + if n_words <= 250 { 0.5 } else { -0.5 };
        let structure = 2.0
            + if has_steps {
                1.0
            } else if n_words <= 120 {
                0.5
            } else {
                0.0
            };
        let safety = 4.5 + if hedges || asks_back { 0.5 } else { 0.0 };

        let scores = [
            ("intent", clamp_1_5(intent)),
            ("clarity", clamp_1_5(clarity)),
            ("structure", clamp_1_5(structure)),
            ("safety", clamp_1_5(safety)),
        ];

        let mut extra = serde_json::Map::new();
        let mut total = 0i64;
        for (dim, score) in scores {
            total += score;
            extra.insert(dim.to_string(), json!(score));
        }
        extra.insert(
            "notes".to_string(),
            json!("heuristic scores from overlap, length, and structure signals"),
        );
        extra.insert("judge_kind".to_string(), json!(self.kind()));

        Ok(VerdictPayload {
            score: total as f64,
            extra,
        })
    }

    fn kind(&self) -> &'static str {
        "heuristic"
    }
}
