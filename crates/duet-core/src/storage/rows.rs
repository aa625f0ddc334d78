//! Row-to-record mapping. Column order is fixed by the SELECT lists in
//! `store.rs`; keep the two in sync.

use rusqlite::types::Type;
use rusqlite::Row;

use crate::intent::Route;
use crate::model::{
    Experiment, ExperimentStatus, Rating, ResponseAttempt, ResponseRecord, RewriteStatus,
    StepStatus, Variant, Verdict, VerdictPayload,
};

pub(crate) fn row_to_experiment(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        original_prompt: row.get(1)?,
        route: Route::parse(&row.get::<_, String>(2)?),
        status: ExperimentStatus::parse(&row.get::<_, String>(3)?),
        created_at: row.get(4)?,
    })
}

pub(crate) fn row_to_variant(row: &Row<'_>) -> rusqlite::Result<Variant> {
    Ok(Variant {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        arm: crate::model::ArmKind::parse(&row.get::<_, String>(2)?),
        prompt_text: row.get(3)?,
        rewrite_status: RewriteStatus::parse(&row.get::<_, String>(4)?),
    })
}

pub(crate) fn row_to_response(row: &Row<'_>) -> rusqlite::Result<ResponseRecord> {
    Ok(ResponseRecord {
        id: row.get(0)?,
        variant_id: row.get(1)?,
        status: StepStatus::parse(&row.get::<_, String>(2)?),
        judge_status: StepStatus::parse(&row.get::<_, String>(3)?),
        text: row.get(4)?,
        attempts: row.get::<_, i64>(5)?.max(0) as u32,
        generated_at: row.get(6)?,
    })
}

pub(crate) fn row_to_verdict(row: &Row<'_>) -> rusqlite::Result<Verdict> {
    let payload_json: String = row.get(2)?;
    let payload: VerdictPayload = serde_json::from_str(&payload_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Verdict {
        id: row.get(0)?,
        response_id: row.get(1)?,
        payload,
        created_at: row.get(4)?,
    })
}

pub(crate) fn row_to_rating(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: row.get(0)?,
        response_id: row.get(1)?,
        rater_id: row.get(2)?,
        score: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<ResponseAttempt> {
    Ok(ResponseAttempt {
        response_id: row.get(0)?,
        attempt_no: row.get::<_, i64>(1)?.max(0) as u32,
        outcome: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}
