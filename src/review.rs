//! Durable list of tasks that missed their deadline and need a human.
//!
//! Entries are keyed by (job id, task index), so recording the same
//! timeout twice leaves a single row.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Job-level details attached to a review entry.
#[derive(Debug, Clone, Default)]
pub struct ReviewContext {
    pub working_dir: Option<PathBuf>,
    pub notify_url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub job_id: Uuid,
    pub index: usize,
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    pub notify_url: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct ReviewRecorder {
    conn: Mutex<Connection>,
}

impl ReviewRecorder {
    /// Open or create the reviews table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open review database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reviews (
                job_id      TEXT NOT NULL,
                task_index  INTEGER NOT NULL,
                prompt      TEXT NOT NULL,
                working_dir TEXT,
                notify_url  TEXT NOT NULL,
                reason      TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (job_id, task_index)
            )",
        )
        .context("failed to create reviews table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Record a timed-out task. Returns `false` if it was already recorded.
    pub fn record(
        &self,
        job_id: Uuid,
        prompt: &str,
        index: usize,
        context: &ReviewContext,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let working_dir = context
            .working_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO reviews
                    (job_id, task_index, prompt, working_dir, notify_url, reason, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job_id.to_string(),
                    index as i64,
                    prompt,
                    working_dir,
                    context.notify_url,
                    context.reason,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to record review for job {job_id} task {index}"))?;
        Ok(inserted > 0)
    }

    /// All entries, oldest first.
    pub fn list(&self) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, task_index, prompt, working_dir, notify_url, reason, recorded_at
             FROM reviews ORDER BY recorded_at ASC, job_id ASC, task_index ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(job_id, index, prompt, working_dir, notify_url, reason, recorded_at)| {
                    Ok(ReviewRecord {
                        job_id: Uuid::parse_str(&job_id).context("corrupt review job id")?,
                        index: index as usize,
                        prompt,
                        working_dir: working_dir.map(PathBuf::from),
                        notify_url,
                        reason,
                        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                            .context("corrupt review timestamp")?
                            .with_timezone(&Utc),
                    })
                },
            )
            .collect()
    }
}
