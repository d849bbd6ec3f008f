use std::time::Duration;

use chrono::Utc;
use tracing::instrument;

use parley_core::ids::JobId;

use crate::database::Database;
use crate::error::StoreError;

/// Result bytes per job with an expiration window. Expired rows read as not found
/// and are removed by [`ResultRepo::purge_expired`].
#[derive(Clone)]
pub struct ResultRepo {
    db: Database,
}

impl ResultRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, bytes), fields(job_id = %job_id, len = bytes.len(), ttl_secs = ttl.as_secs()))]
    pub fn set_with_expiration(
        &self,
        job_id: &JobId,
        bytes: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_results (job_id, result, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job_id) DO UPDATE SET result = excluded.result, expires_at = excluded.expires_at",
                rusqlite::params![job_id.as_str(), bytes, expires_at],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn get(&self, job_id: &JobId) -> Result<Vec<u8>, StoreError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT result FROM job_results WHERE job_id = ?1 AND expires_at > ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![job_id.as_str(), now])?;
            match rows.next()? {
                Some(row) => Ok(row.get(0)?),
                None => Err(StoreError::NotFound(format!("result for job {job_id}"))),
            }
        })
    }

    /// Delete expired results. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM job_results WHERE expires_at <= ?1", [now])?)
        })
    }
}
