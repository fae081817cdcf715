use anyhow::{Result, anyhow};
use rusqlite::params;

use super::JobStore;
use super::types::{JobRecord, JobStatus, JobType};

pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

const JOB_COLUMNS: &str = "id, user_id, job_type, status, input_data, result_data, \
     error_message, idempotency_key, attempts, max_attempts, created_at, started_at, \
     completed_at, metadata";

/// Row image with JSON and enums still as text; parsed outside the rusqlite
/// closure so serde errors surface as regular anyhow errors.
struct RawJob {
    id: String,
    user_id: String,
    job_type: String,
    status: String,
    input_data: String,
    result_data: Option<String>,
    error_message: Option<String>,
    idempotency_key: String,
    attempts: i64,
    max_attempts: i64,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    metadata: String,
}

fn read_raw(row: &rusqlite::Row) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        user_id: row.get(1)?,
        job_type: row.get(2)?,
        status: row.get(3)?,
        input_data: row.get(4)?,
        result_data: row.get(5)?,
        error_message: row.get(6)?,
        idempotency_key: row.get(7)?,
        attempts: row.get(8)?,
        max_attempts: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
        metadata: row.get(13)?,
    })
}

fn into_record(raw: RawJob) -> Result<JobRecord> {
    let job_type = JobType::parse(&raw.job_type)
        .ok_or_else(|| anyhow!("unknown job_type '{}' for job {}", raw.job_type, raw.id))?;
    let status = JobStatus::parse(&raw.status)
        .ok_or_else(|| anyhow!("unknown status '{}' for job {}", raw.status, raw.id))?;
    let result_data = match raw.result_data {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    Ok(JobRecord {
        id: raw.id,
        user_id: raw.user_id,
        job_type,
        status,
        input_data: serde_json::from_str(&raw.input_data)?,
        result_data,
        error_message: raw.error_message,
        idempotency_key: raw.idempotency_key,
        attempts: raw.attempts,
        max_attempts: raw.max_attempts,
        created_at: raw.created_at,
        started_at: raw.started_at,
        completed_at: raw.completed_at,
        metadata: serde_json::from_str(&raw.metadata)?,
    })
}

impl JobStore {
    /// Insert a new pending job. Exactly one row per successful submission.
    pub async fn create_job(
        &self,
        user_id: &str,
        job_type: JobType,
        input_data: &serde_json::Value,
        idempotency_key: &str,
        metadata: &serde_json::Value,
    ) -> Result<JobRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO jobs (id, user_id, job_type, status, input_data, idempotency_key, attempts, max_attempts, metadata)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, 0, ?6, ?7)",
            params![
                id,
                user_id,
                job_type.as_str(),
                serde_json::to_string(input_data)?,
                idempotency_key,
                DEFAULT_MAX_ATTEMPTS,
                serde_json::to_string(metadata)?,
            ],
        )?;
        let raw = db.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            read_raw,
        )?;
        into_record(raw)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1 LIMIT 1"))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(into_record(read_raw(row)?)?)),
            None => Ok(None),
        }
    }

    /// Fetch a job only if it belongs to `user_id`. Callers cannot observe
    /// other users' jobs, not even their existence.
    pub async fn get_job_for_user(&self, id: &str, user_id: &str) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1 AND user_id = ?2 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![id, user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(into_record(read_raw(row)?)?)),
            None => Ok(None),
        }
    }

    /// Jobs eligible for a worker cycle: pending with retries left, oldest first.
    pub async fn fetch_eligible_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'pending' AND attempts < max_attempts
             ORDER BY created_at ASC, rowid ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], read_raw)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(into_record(row?)?);
        }
        Ok(out)
    }

    /// Atomically claim a pending job for processing. The conditional UPDATE
    /// is the only mutual-exclusion point between overlapping worker cycles;
    /// zero rows updated means another worker already owns the job.
    pub async fn claim_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let raw = {
            let db = self.db.lock().await;
            let updated = db.execute(
                "UPDATE jobs
                 SET status = 'processing', attempts = attempts + 1, started_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status = 'pending'",
                params![id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            db.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                read_raw,
            )?
        };
        Ok(Some(into_record(raw)?))
    }

    /// Terminal success. Only valid from `processing`; a completed row is
    /// never touched again.
    pub async fn complete_job(&self, id: &str, result: &serde_json::Value) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE jobs
             SET status = 'completed', result_data = ?1, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?2 AND status = 'processing'",
            params![serde_json::to_string(result)?, id],
        )?;
        Ok(rows > 0)
    }

    /// Record a handler failure: back to `pending` when retries remain,
    /// terminal `failed` otherwise.
    pub async fn record_failure(&self, id: &str, error: &str, will_retry: bool) -> Result<bool> {
        let status = if will_retry { "pending" } else { "failed" };
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2
             WHERE id = ?3 AND status = 'processing'",
            params![status, error, id],
        )?;
        Ok(rows > 0)
    }

    /// An in-flight extension job for the given path, if any. Duplicate
    /// extend submissions resolve to this job instead of enqueueing again.
    pub async fn find_active_extension_job(
        &self,
        user_id: &str,
        path_id: &str,
    ) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE user_id = ?1 AND job_type = 'extend_path'
               AND status IN ('pending', 'processing')
               AND json_extract(input_data, '$.pathId') = ?2
             ORDER BY created_at ASC LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![user_id, path_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(into_record(read_raw(row)?)?)),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub(crate) async fn count_jobs(&self) -> i64 {
        let db = self.db.lock().await;
        db.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
            .unwrap_or(0)
    }
}
