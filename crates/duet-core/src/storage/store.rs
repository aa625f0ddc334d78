//! Durable experiment log over SQLite. Append-mostly: a `done`
//! response, a verdict, and a rating are immutable once written, which
//! is what makes the log trustworthy for later analysis. Writes that
//! must stay consistent across a crash (attempt audit row plus counter
//! bump plus finalization) share one transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use super::{now_rfc3339, rows, schema};
use crate::errors::CoreError;
use crate::model::{
    aggregate_status, ArmRecord, Experiment, ExperimentStatus, ExperimentTree, Rating,
    ResponseAttempt, ResponseRecord, RewriteStatus, StepStatus, Variant, VerdictPayload,
};

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

/// Outcome of one generation attempt, as reported by the controller.
#[derive(Debug, Clone)]
pub enum AttemptResult<'a> {
    Success { text: &'a str },
    Failure { message: &'a str, terminal: bool },
}

/// Whether an upsert changed anything. A second writer finishing a
/// step that is already `done` gets `AlreadyDone` and writes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    AlreadyDone,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::init(&conn)
    }

    pub fn create_experiment(&self, exp: &Experiment) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO experiments(id, original_prompt, route, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                exp.id,
                exp.original_prompt,
                exp.route.as_str(),
                exp.status.as_str(),
                exp.created_at
            ],
        )?;
        Ok(())
    }

    pub fn create_variant(&self, variant: &Variant) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO variants(id, experiment_id, arm, prompt_text, rewrite_status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                variant.id,
                variant.experiment_id,
                variant.arm.as_str(),
                variant.prompt_text,
                variant.rewrite_status.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn create_response_shell(
        &self,
        response_id: &str,
        variant_id: &str,
    ) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO responses(id, variant_id, status, judge_status, attempts)
             VALUES (?1, ?2, 'pending', 'pending', 0)",
            params![response_id, variant_id],
        )?;
        Ok(())
    }

    /// Rewrite completion is terminal: once `done` the stored prompt
    /// text is never replaced.
    pub fn set_variant_rewrite(
        &self,
        variant_id: &str,
        status: RewriteStatus,
        new_prompt: Option<&str>,
    ) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        match new_prompt {
            Some(prompt) => conn.execute(
                "UPDATE variants SET rewrite_status = ?2, prompt_text = ?3
                 WHERE id = ?1 AND rewrite_status != 'done'",
                params![variant_id, status.as_str(), prompt],
            )?,
            None => conn.execute(
                "UPDATE variants SET rewrite_status = ?2
                 WHERE id = ?1 AND rewrite_status != 'done'",
                params![variant_id, status.as_str()],
            )?,
        };
        Ok(())
    }

    pub fn set_response_in_progress(&self, response_id: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE responses SET status = 'in_progress'
             WHERE id = ?1 AND status IN ('pending', 'in_progress')",
            params![response_id],
        )?;
        Ok(())
    }

    /// Record one generation attempt: append the audit row, bump the
    /// attempt counter, and finalize on success, all in one
    /// transaction. A record that is already `done` is left untouched.
    pub fn upsert_response_attempt(
        &self,
        response_id: &str,
        result: AttemptResult<'_>,
    ) -> Result<UpsertOutcome, CoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT status, attempts FROM responses WHERE id = ?1",
                params![response_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let (status, attempts) = match current {
            Some(found) => found,
            None => {
                return Err(CoreError::not_found(format!("response {response_id}")));
            }
        };
        if StepStatus::parse(&status) == StepStatus::Done {
            return Ok(UpsertOutcome::AlreadyDone);
        }

        let attempt_no = attempts + 1;
        let now = now_rfc3339();
        let (outcome, message) = match &result {
            AttemptResult::Success { .. } => ("done", None),
            AttemptResult::Failure { message, .. } => ("failed", Some(*message)),
        };
        tx.execute(
            "INSERT INTO response_attempts(response_id, attempt_no, outcome, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![response_id, attempt_no, outcome, message, now],
        )?;

        match result {
            AttemptResult::Success { text } => {
                tx.execute(
                    "UPDATE responses
                     SET status = 'done', text = ?2, attempts = ?3, generated_at = ?4
                     WHERE id = ?1",
                    params![response_id, text, attempt_no, now],
                )?;
            }
            AttemptResult::Failure { terminal, .. } => {
                let next_status = if terminal { "failed" } else { "in_progress" };
                tx.execute(
                    "UPDATE responses SET status = ?2, attempts = ?3 WHERE id = ?1",
                    params![response_id, next_status, attempt_no],
                )?;
            }
        }

        tx.commit()?;
        Ok(UpsertOutcome::Applied)
    }

    /// At most one verdict per response; a concurrent second judge
    /// completion returns the existing verdict id without writing.
    pub fn upsert_verdict(
        &self,
        response_id: &str,
        payload: &VerdictPayload,
    ) -> Result<String, CoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM verdicts WHERE response_id = ?1",
                params![response_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let response_exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM responses WHERE id = ?1",
            params![response_id],
            |row| row.get(0),
        )?;
        if response_exists == 0 {
            return Err(CoreError::not_found(format!("response {response_id}")));
        }

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO verdicts(id, response_id, payload, score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                response_id,
                serde_json::to_string(payload)?,
                payload.score,
                now_rfc3339()
            ],
        )?;
        tx.execute(
            "UPDATE responses SET judge_status = 'done' WHERE id = ?1",
            params![response_id],
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn set_judge_failed(&self, response_id: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE responses SET judge_status = 'failed'
             WHERE id = ?1 AND judge_status != 'done'",
            params![response_id],
        )?;
        Ok(())
    }

    /// The UNIQUE(response_id, rater_id) constraint is the only
    /// serialization point for concurrent raters.
    pub fn insert_rating(&self, rating: &Rating) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO ratings(id, response_id, rater_id, score, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rating.id,
                rating.response_id,
                rating.rater_id,
                rating.score,
                rating.comment,
                rating.created_at
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::DuplicateRating {
                    response_id: rating.response_id.clone(),
                    rater_id: rating.rater_id.clone(),
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn get_experiment(&self, id: &str) -> Result<Option<Experiment>, CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, original_prompt, route, status, created_at
             FROM experiments WHERE id = ?1",
            params![id],
            rows::row_to_experiment,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    pub fn get_response(&self, id: &str) -> Result<Option<ResponseRecord>, CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, variant_id, status, judge_status, text, attempts, generated_at
             FROM responses WHERE id = ?1",
            params![id],
            rows::row_to_response,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    pub fn list_response_attempts(
        &self,
        response_id: &str,
    ) -> Result<Vec<ResponseAttempt>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT response_id, attempt_no, outcome, message, created_at
             FROM response_attempts WHERE response_id = ?1
             ORDER BY attempt_no ASC",
        )?;
        let attempts = stmt
            .query_map(params![response_id], rows::row_to_attempt)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// Load the whole tree; baseline arm sorts first.
    pub fn get_experiment_tree(&self, id: &str) -> Result<Option<ExperimentTree>, CoreError> {
        let experiment = match self.get_experiment(id)? {
            Some(exp) => exp,
            None => return Ok(None),
        };

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, experiment_id, arm, prompt_text, rewrite_status
             FROM variants WHERE experiment_id = ?1 ORDER BY arm ASC",
        )?;
        let variants = stmt
            .query_map(params![id], rows::row_to_variant)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut arms = Vec::with_capacity(variants.len());
        for variant in variants {
            let response = conn
                .query_row(
                    "SELECT id, variant_id, status, judge_status, text, attempts, generated_at
                     FROM responses WHERE variant_id = ?1",
                    params![variant.id],
                    rows::row_to_response,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let (verdict, ratings) = match &response {
                Some(r) => {
                    let verdict = conn
                        .query_row(
                            "SELECT id, response_id, payload, score, created_at
                             FROM verdicts WHERE response_id = ?1",
                            params![r.id],
                            rows::row_to_verdict,
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(other),
                        })?;
                    let mut stmt = conn.prepare(
                        "SELECT id, response_id, rater_id, score, comment, created_at
                         FROM ratings WHERE response_id = ?1 ORDER BY created_at ASC, rowid ASC",
                    )?;
                    let ratings = stmt
                        .query_map(params![r.id], rows::row_to_rating)?
                        .collect::<Result<Vec<_>, _>>()?;
                    (verdict, ratings)
                }
                None => (None, Vec::new()),
            };

            arms.push(ArmRecord {
                variant,
                response,
                verdict,
                ratings,
            });
        }

        Ok(Some(ExperimentTree { experiment, arms }))
    }

    pub fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Experiment>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, original_prompt, route, status, created_at
                     FROM experiments WHERE status = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(
                    params![status.as_str(), limit, offset],
                    rows::row_to_experiment,
                )?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, original_prompt, route, status, created_at
                     FROM experiments
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit, offset], rows::row_to_experiment)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    pub fn set_experiment_status(
        &self,
        id: &str,
        status: ExperimentStatus,
    ) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE experiments SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(())
    }

    /// Recompute the aggregate from the tree and persist it.
    pub fn recompute_experiment_status(&self, id: &str) -> Result<ExperimentStatus, CoreError> {
        let tree = self
            .get_experiment_tree(id)?
            .ok_or_else(|| CoreError::not_found(format!("experiment {id}")))?;
        let status = aggregate_status(&tree);
        self.set_experiment_status(id, status)?;
        Ok(status)
    }
}
