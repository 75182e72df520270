//! SQLite-backed job store.
//!
//! Shares a database with [`ReviewRecorder`](crate::review::ReviewRecorder),
//! pass the same path to both. Each job is one JSON document keyed by its
//! id; `seq` preserves submission order across restarts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::JobStore;
use crate::queue::job::Job;

pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open or create the jobs table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open job database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id     TEXT NOT NULL UNIQUE,
                status     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                data       TEXT NOT NULL
            )",
        )
        .context("failed to create jobs table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn upsert(conn: &Connection, job: &Job) -> Result<()> {
        let json = serde_json::to_string(job)?;
        conn.execute(
            "INSERT INTO jobs (job_id, status, created_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(job_id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![
                job.job_id.to_string(),
                job.status.to_string(),
                job.created_at.to_rfc3339(),
                json
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::upsert(&conn, job).with_context(|| format!("failed to save job {}", job.job_id))
    }

    async fn save_all(&self, jobs: &[Job]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for job in jobs {
            Self::upsert(&tx, job)?;
        }
        tx.commit().context("failed to flush jobs")?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT job_id, data FROM jobs ORDER BY seq ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read jobs")?;

        // One bad row must not strand every other job.
        let jobs = rows
            .into_iter()
            .filter_map(|(job_id, json)| match serde_json::from_str::<Job>(&json) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(%job_id, error = %e, "skipping corrupt job record");
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    async fn remove(&self, ids: &[Uuid]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM jobs WHERE job_id = ?1", [id.to_string()])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::{JobStatus, NotifyTarget};
    use chrono::Utc;

    fn job(prompt: &str) -> Job {
        Job::new(
            vec![prompt.to_string()],
            NotifyTarget::new("https://example.com/hook", None),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn load_empty() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_overwrites_same_job() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut j = job("a");
        store.save(&j).await.unwrap();
        j.start();
        store.save(&j).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn update_keeps_insertion_order() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut first = job("first");
        let second = job("second");
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        first.start();
        store.save_all(&[second.clone(), first.clone()]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded[0].job_id, first.job_id);
        assert_eq!(loaded[1].job_id, second.job_id);
    }

    #[tokio::test]
    async fn remove_deletes_only_given_ids() {
        let store = SqliteJobStore::in_memory().unwrap();
        let a = job("a");
        let b = job("b");
        store.save_all(&[a.clone(), b.clone()]).await.unwrap();
        store.remove(&[a.job_id, Uuid::new_v4()]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].job_id, b.job_id);
    }

    #[tokio::test]
    async fn corrupt_row_does_not_hide_the_others() {
        let store = SqliteJobStore::in_memory().unwrap();
        let good = job("good");
        store.save(&good).await.unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO jobs (job_id, status, created_at, data) VALUES (?1, 'pending', ?2, ?3)",
                params![Uuid::new_v4().to_string(), Utc::now().to_rfc3339(), "{not json"],
            )
            .unwrap();
        let later = job("later");
        store.save(&later).await.unwrap();

        let loaded = store.load().await.unwrap();
        let ids: Vec<Uuid> = loaded.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![good.job_id, later.job_id]);
    }

    #[tokio::test]
    async fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs-test.db");
        let path_str = path.to_str().unwrap();
        let j = job("durable");

        {
            let store = SqliteJobStore::open(path_str).unwrap();
            store.save(&j).await.unwrap();
        }

        {
            let store = SqliteJobStore::open(path_str).unwrap();
            let loaded = store.load().await.unwrap();
            assert_eq!(loaded, vec![j]);
        }
    }
}
