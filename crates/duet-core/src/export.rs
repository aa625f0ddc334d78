//! Offline export for analysis: one JSON line per experiment tree,
//! stamped with a content fingerprint so downstream tooling can dedupe
//! re-imports. Admin-level data; exports are not visibility-filtered.

use std::io::Write;

use serde::Serialize;

use crate::errors::CoreError;
use crate::model::{ExperimentStatus, ExperimentTree};
use crate::storage::Store;

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    fingerprint: String,
    #[serde(flatten)]
    tree: &'a ExperimentTree,
}

const PAGE: u32 = 200;

/// Write every experiment (optionally filtered by status) to `out` as
/// JSONL. Returns the number of lines written.
pub fn export_jsonl(
    store: &Store,
    status: Option<ExperimentStatus>,
    out: &mut impl Write,
) -> Result<usize, CoreError> {
    let mut written = 0;
    let mut offset = 0;
    loop {
        let page = store.list_experiments(status, PAGE, offset)?;
        if page.is_empty() {
            break;
        }
        for experiment in &page {
            let Some(tree) = store.get_experiment_tree(&experiment.id)? else {
                continue;
            };
            let record = ExportRecord {
                fingerprint: tree.fingerprint(),
                tree: &tree,
            };
            let line = serde_json::to_string(&record)?;
            out.write_all(line.as_bytes())
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| CoreError::validation(format!("export write failed: {e}")))?;
            written += 1;
        }
        offset += PAGE;
    }
    Ok(written)
}
