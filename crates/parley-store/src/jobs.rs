use chrono::Utc;
use tracing::instrument;

use parley_core::ids::JobId;
use parley_core::job::{JobRecord, JobStatus};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::RowReader;

/// Job status store. Transitions are checked against the job state machine
/// under the connection lock, so concurrent updates cannot skip a check.
#[derive(Clone)]
pub struct JobRepo {
    db: Database,
}

impl JobRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a new job in `Created`. A second create for the same id is a conflict.
    #[instrument(skip(self, message), fields(job_id = %job_id))]
    pub fn create(&self, job_id: &JobId, message: &str) -> Result<JobRecord, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO jobs (job_id, status, message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    job_id.as_str(),
                    JobStatus::Created.to_string(),
                    message,
                    now,
                    now,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(format!("job {job_id} already exists")));
            }

            Ok(JobRecord {
                job_id: job_id.clone(),
                status: JobStatus::Created,
                message: message.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn get(&self, job_id: &JobId) -> Result<JobRecord, StoreError> {
        self.db.with_conn(|conn| fetch(conn, job_id))
    }

    /// Move a job to `status` with a new message. Illegal transitions are conflicts
    /// and leave the record untouched.
    #[instrument(skip(self, message), fields(job_id = %job_id, status = %status))]
    pub fn update_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        message: &str,
    ) -> Result<JobRecord, StoreError> {
        self.db.with_conn(|conn| {
            let current = fetch(conn, job_id)?;
            if !current.status.can_transition_to(status) {
                return Err(StoreError::Conflict(format!(
                    "job {job_id}: illegal transition {} -> {status}",
                    current.status
                )));
            }

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE jobs SET status = ?1, message = ?2, updated_at = ?3 WHERE job_id = ?4",
                rusqlite::params![status.to_string(), message, now, job_id.as_str()],
            )?;

            Ok(JobRecord {
                status,
                message: message.to_string(),
                updated_at: now,
                ..current
            })
        })
    }
}

fn fetch(conn: &rusqlite::Connection, job_id: &JobId) -> Result<JobRecord, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT job_id, status, message, created_at, updated_at FROM jobs WHERE job_id = ?1",
    )?;
    let mut rows = stmt.query([job_id.as_str()])?;
    match rows.next()? {
        Some(row) => row_to_job(row),
        None => Err(StoreError::NotFound(format!("job {job_id}"))),
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRecord, StoreError> {
    let r = RowReader::new(row, "jobs");
    Ok(JobRecord {
        job_id: JobId::from_raw(r.get::<String>(0, "job_id")?),
        status: r.parse(1, "status")?,
        message: r.get(2, "message")?,
        created_at: r.get(3, "created_at")?,
        updated_at: r.get(4, "updated_at")?,
    })
}
