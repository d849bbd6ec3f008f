use parley_core::ids::{JobId, UserId};
use parley_core::ledger::LedgerEntry;
use parley_store::{LedgerRepo, StoreError};

/// Ledger access bound to one job and its owner.
#[derive(Clone)]
pub struct PromptTracker {
    repo: LedgerRepo,
    job_id: JobId,
    user_id: UserId,
}

impl PromptTracker {
    pub fn new(repo: LedgerRepo, job_id: JobId, user_id: UserId) -> Self {
        Self { repo, job_id, user_id }
    }

    /// Record a step before its call goes out.
    pub fn track(&self, step: &str, prompt: &str, model: &str) -> Result<(), StoreError> {
        self.repo
            .track(&self.job_id, &self.user_id, step, prompt, model, None)
    }

    pub fn update_result(&self, step: &str, response: &str) -> Result<(), StoreError> {
        self.repo
            .update_result(&self.job_id, &self.user_id, step, response)
    }

    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.repo.list(&self.job_id)
    }
}
