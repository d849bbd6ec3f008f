use chrono::Utc;
use tracing::instrument;

use parley_core::ids::{JobId, UserId};
use parley_core::ledger::LedgerEntry;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::RowReader;

/// Generation ledger, one row per `(job_id, step_name)`.
///
/// `track` and `update_result` are both upserts so they converge to a single entry
/// whichever lands first. Entries are never deleted.
#[derive(Clone)]
pub struct LedgerRepo {
    db: Database,
}

impl LedgerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or overwrite the prompt and model of a step. An already attached
    /// response survives unless `response` is given.
    #[instrument(skip(self, prompt, response), fields(job_id = %job_id, step = step_name, model))]
    pub fn track(
        &self,
        job_id: &JobId,
        user_id: &UserId,
        step_name: &str,
        prompt: &str,
        model: &str,
        response: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ledger_entries (job_id, user_id, step_name, prompt, model, response, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(job_id, step_name) DO UPDATE SET
                    user_id = excluded.user_id,
                    prompt = excluded.prompt,
                    model = excluded.model,
                    response = COALESCE(excluded.response, ledger_entries.response),
                    timestamp = excluded.timestamp",
                rusqlite::params![
                    job_id.as_str(),
                    user_id.as_str(),
                    step_name,
                    prompt,
                    model,
                    response,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Attach the response of a step. Creates a pending entry if the step is unknown.
    #[instrument(skip(self, response), fields(job_id = %job_id, step = step_name))]
    pub fn update_result(
        &self,
        job_id: &JobId,
        user_id: &UserId,
        step_name: &str,
        response: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ledger_entries (job_id, user_id, step_name, response, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(job_id, step_name) DO UPDATE SET response = excluded.response",
                rusqlite::params![job_id.as_str(), user_id.as_str(), step_name, response, now],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(job_id = %job_id, step = step_name))]
    pub fn get(&self, job_id: &JobId, step_name: &str) -> Result<LedgerEntry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, user_id, step_name, prompt, model, response, timestamp, sequence
                 FROM ledger_entries WHERE job_id = ?1 AND step_name = ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![job_id.as_str(), step_name])?;
            match rows.next()? {
                Some(row) => row_to_entry(row),
                None => Err(StoreError::NotFound(format!("ledger entry {job_id}/{step_name}"))),
            }
        })
    }

    /// All entries of a job in insertion order.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn list(&self, job_id: &JobId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, user_id, step_name, prompt, model, response, timestamp, sequence
                 FROM ledger_entries WHERE job_id = ?1 ORDER BY sequence ASC",
            )?;
            let mut rows = stmt.query([job_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_entry(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<LedgerEntry, StoreError> {
    let r = RowReader::new(row, "ledger_entries");
    Ok(LedgerEntry {
        job_id: JobId::from_raw(r.get::<String>(0, "job_id")?),
        user_id: UserId::from_raw(r.get::<String>(1, "user_id")?),
        step_name: r.get(2, "step_name")?,
        prompt: r.get(3, "prompt")?,
        model: r.get(4, "model")?,
        response: r.get(5, "response")?,
        timestamp: r.get(6, "timestamp")?,
        sequence: r.get(7, "sequence")?,
    })
}
