pub mod rows;
pub mod schema;
pub mod store;

pub use store::{AttemptResult, Store, UpsertOutcome};

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
