mod jobs;
mod paths;
mod rate_limits;
mod tokens;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use rusqlite::Connection;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Durable store for jobs, rate-limit windows and generated content.
///
/// A single SQLite connection behind an async mutex; submitters, the worker
/// and the poller all share it through clones.
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Mutex<Connection>>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL,
        input_data TEXT NOT NULL,
        result_data TEXT,
        error_message TEXT,
        idempotency_key TEXT NOT NULL UNIQUE,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        started_at DATETIME,
        completed_at DATETIME,
        metadata TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at)",
    "CREATE TABLE IF NOT EXISTS rate_limits (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 1,
        window_start INTEGER NOT NULL,
        window_end INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_rate_limits_user_action ON rate_limits(user_id, action_type, window_end)",
    "CREATE TABLE IF NOT EXISTS learning_paths (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        difficulty TEXT NOT NULL,
        topics TEXT NOT NULL,
        total_lessons INTEGER NOT NULL,
        current_lesson INTEGER NOT NULL DEFAULT 1,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS lessons (
        id TEXT PRIMARY KEY,
        learning_path_id TEXT NOT NULL,
        lesson_number INTEGER NOT NULL,
        title TEXT NOT NULL,
        topic TEXT NOT NULL,
        explanations TEXT NOT NULL,
        quizzes TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(learning_path_id, lesson_number)
    )",
    "CREATE TABLE IF NOT EXISTS api_tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
];

impl JobStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }

        let db = Connection::open(db_path)?;
        for stmt in SCHEMA {
            db.execute(stmt, [])?;
        }
        info!("Job store opened at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

/// Seconds since the Unix epoch. Rate-limit window arithmetic works on
/// integers so `retry_after` never depends on SQLite's datetime parsing.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn unix_now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Create a store in a throwaway directory. Avoids polluting the real data dir.
#[cfg(test)]
pub async fn test_store() -> JobStore {
    let tmpdir = std::env::temp_dir().join(format!("pathforge-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&tmpdir).expect("create temp dir");
    JobStore::open(tmpdir.join("pathforge.db"))
        .await
        .expect("open test store")
}
