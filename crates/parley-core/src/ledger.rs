use serde::{Deserialize, Serialize};

use crate::ids::{JobId, UserId};

/// Audit record of one generation step. Keyed by `(job_id, step_name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub job_id: JobId,
    pub user_id: UserId,
    pub step_name: String,
    pub prompt: String,
    pub model: String,
    /// Attached once the backend call returns.
    pub response: Option<String>,
    pub timestamp: String,
    /// Insertion order within the job.
    pub sequence: i64,
}

impl LedgerEntry {
    pub fn is_complete(&self) -> bool {
        self.response.is_some() && !self.prompt.is_empty()
    }
}
