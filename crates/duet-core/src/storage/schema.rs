//! Schema initialization and additive migrations. Migrations only ever
//! add columns; history rows are never rewritten.

use std::collections::HashSet;

use anyhow::Context;
use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS experiments (
            id TEXT PRIMARY KEY,
            original_prompt TEXT NOT NULL,
            route TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS variants (
            id TEXT PRIMARY KEY,
            experiment_id TEXT NOT NULL REFERENCES experiments(id),
            arm TEXT NOT NULL,
            prompt_text TEXT NOT NULL,
            rewrite_status TEXT NOT NULL,
            UNIQUE(experiment_id, arm)
        );

        CREATE TABLE IF NOT EXISTS responses (
            id TEXT PRIMARY KEY,
            variant_id TEXT NOT NULL UNIQUE REFERENCES variants(id),
            status TEXT NOT NULL,
            judge_status TEXT NOT NULL,
            text TEXT,
            attempts INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS response_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            response_id TEXT NOT NULL REFERENCES responses(id),
            attempt_no INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS verdicts (
            id TEXT PRIMARY KEY,
            response_id TEXT NOT NULL UNIQUE REFERENCES responses(id),
            payload TEXT NOT NULL,
            score REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ratings (
            id TEXT PRIMARY KEY,
            response_id TEXT NOT NULL REFERENCES responses(id),
            rater_id TEXT NOT NULL,
            score INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(response_id, rater_id)
        );

        CREATE INDEX IF NOT EXISTS idx_variants_experiment ON variants(experiment_id);
        CREATE INDEX IF NOT EXISTS idx_attempts_response ON response_attempts(response_id);
        CREATE INDEX IF NOT EXISTS idx_ratings_response ON ratings(response_id);
        ",
    )
    .context("create base schema")?;

    migrate(conn)
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let response_cols = get_columns(conn, "responses")?;
    add_column_if_missing(conn, &response_cols, "responses", "generated_at", "TEXT")?;

    let rating_cols = get_columns(conn, "ratings")?;
    add_column_if_missing(conn, &rating_cols, "ratings", "comment", "TEXT")?;
    Ok(())
}

pub(crate) fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .context("prepare pragma table_info")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

pub(crate) fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, []).context("alter table add column")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_adds_migrated_columns() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let cols = get_columns(&conn, "ratings").unwrap();
        assert!(cols.contains("comment"));
        let cols = get_columns(&conn, "responses").unwrap();
        assert!(cols.contains("generated_at"));
    }
}
