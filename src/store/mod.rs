pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::queue::job::Job;

/// Where job records survive restarts. Every write stores the full record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert a single job.
    async fn save(&self, job: &Job) -> Result<()>;
    /// Upsert all given jobs in one transaction.
    async fn save_all(&self, jobs: &[Job]) -> Result<()>;
    /// All stored jobs in insertion order.
    async fn load(&self) -> Result<Vec<Job>>;
    /// Drop the given jobs. Unknown ids are ignored.
    async fn remove(&self, ids: &[Uuid]) -> Result<()>;
}
