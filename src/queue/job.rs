use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a job. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
}

impl JobStatus {
    /// Still needs the worker.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Terminal status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        self == Self::Completed
    }
}

/// Where notifications for a job go. The secret never shows up in `Debug`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyTarget {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl NotifyTarget {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Debug for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyTarget")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Recorded outcome of one task. Never changed once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub prompt: String,
    pub index: usize,
    pub status: TaskStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Failed after every credential hit its quota.
    #[serde(default)]
    pub quota_exhausted: bool,
    /// Failed on a tool fault that outlived its retries.
    #[serde(default)]
    pub transient_fault: bool,
}

/// A submitted batch of prompts. This is the full record, secret included;
/// readers get a [`JobSnapshot`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: Uuid,
    pub prompts: Vec<String>,
    pub notify: NotifyTarget,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    pub status: JobStatus,
    pub results: Vec<TaskResult>,
    pub completed: usize,
    pub failed: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        prompts: Vec<String>,
        notify: NotifyTarget,
        project_id: Option<String>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            prompts,
            notify,
            project_id,
            working_dir,
            status: JobStatus::Pending,
            results: Vec::new(),
            completed: 0,
            failed: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.prompts.len()
    }

    /// Position of the next task to run.
    pub fn next_index(&self) -> usize {
        self.results.len()
    }

    /// Append a result and bump the matching counter.
    pub fn record(&mut self, result: TaskResult) {
        if result.status.is_success() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Mark as picked up by the worker.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn finish(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Interrupted work goes back to the queue. Results stay.
    pub fn reset_for_resume(&mut self) -> bool {
        if self.status == JobStatus::Processing {
            self.status = JobStatus::Pending;
            self.started_at = None;
            return true;
        }
        false
    }

    /// Finished and older than `retention`.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if self.status.is_active() {
            return false;
        }
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return false;
        };
        now.signed_duration_since(self.created_at) > retention
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            status: self.status,
            total: self.total(),
            completed: self.completed,
            failed: self.failed,
            results: self.results.clone(),
            project_id: self.project_id.clone(),
            working_dir: self.working_dir.clone(),
            notify_url: self.notify.url.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Reader-facing view of a job. No secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub results: Vec<TaskResult>,
    pub project_id: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub notify_url: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Prepare jobs loaded from the store: interrupted jobs go back to
/// pending, expired ones are split off. Returns `(kept, expired_ids)`.
pub fn restore(jobs: Vec<Job>, now: DateTime<Utc>, retention: Duration) -> (Vec<Job>, Vec<Uuid>) {
    let mut kept = Vec::with_capacity(jobs.len());
    let mut expired = Vec::new();
    for mut job in jobs {
        if job.is_expired(now, retention) {
            expired.push(job.job_id);
            continue;
        }
        job.reset_for_resume();
        kept.push(job);
    }
    (kept, expired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(prompts: &[&str]) -> Job {
        Job::new(
            prompts.iter().map(|p| p.to_string()).collect(),
            NotifyTarget::new("https://example.com/hook", Some("s3cret".to_string())),
            None,
            None,
        )
    }

    fn result(index: usize, status: TaskStatus) -> TaskResult {
        TaskResult {
            prompt: format!("p{index}"),
            index,
            status,
            output: String::new(),
            error: None,
            duration_ms: 1,
            timestamp: Utc::now(),
            quota_exhausted: false,
            transient_fault: false,
        }
    }

    #[test]
    fn new_job_is_pending_and_empty() {
        let j = job(&["a", "b"]);
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.total(), 2);
        assert_eq!(j.next_index(), 0);
        assert!(j.started_at.is_none());
        assert!(j.completed_at.is_none());
    }

    #[test]
    fn record_keeps_counters_consistent() {
        let mut j = job(&["a", "b", "c"]);
        j.record(result(0, TaskStatus::Completed));
        j.record(result(1, TaskStatus::Failed));
        j.record(result(2, TaskStatus::Timeout));
        assert_eq!(j.completed, 1);
        assert_eq!(j.failed, 2);
        assert_eq!(j.completed + j.failed, j.results.len());
    }

    #[test]
    fn start_keeps_existing_started_at() {
        let mut j = job(&["a"]);
        j.start();
        let first = j.started_at;
        j.start();
        assert_eq!(j.started_at, first);
        assert_eq!(j.status, JobStatus::Processing);
    }

    #[test]
    fn reset_only_touches_processing() {
        let mut j = job(&["a", "b"]);
        j.start();
        j.record(result(0, TaskStatus::Completed));
        assert!(j.reset_for_resume());
        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.started_at.is_none());
        assert_eq!(j.results.len(), 1);

        let mut done = job(&["a"]);
        done.finish();
        assert!(!done.reset_for_resume());
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[test]
    fn only_finished_jobs_expire() {
        let day = Duration::from_secs(24 * 60 * 60);
        let later = Utc::now() + chrono::Duration::hours(25);

        let pending = job(&["a"]);
        assert!(!pending.is_expired(later, day));

        let mut done = job(&["a"]);
        done.finish();
        assert!(done.is_expired(later, day));
        assert!(!done.is_expired(Utc::now(), day));
    }

    #[test]
    fn restore_resets_and_drops() {
        let day = Duration::from_secs(24 * 60 * 60);
        let mut interrupted = job(&["a", "b"]);
        interrupted.start();
        interrupted.record(result(0, TaskStatus::Completed));
        let mut old = job(&["x"]);
        old.finish();
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        let old_id = old.job_id;

        let (kept, expired) = restore(vec![interrupted, old], Utc::now(), day);
        assert_eq!(expired, vec![old_id]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].status, JobStatus::Pending);
        assert_eq!(kept[0].results.len(), 1);
    }

    #[test]
    fn snapshot_has_no_secret() {
        let j = job(&["a"]);
        let json = serde_json::to_string(&j.snapshot()).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"jobId\""));
    }

    #[test]
    fn notify_target_debug_redacts_secret() {
        let target = NotifyTarget::new("https://example.com", Some("s3cret".to_string()));
        let out = format!("{target:?}");
        assert!(!out.contains("s3cret"));
        assert!(out.contains("redacted"));
    }

    #[test]
    fn empty_secret_is_dropped() {
        let target = NotifyTarget::new("https://example.com", Some(String::new()));
        assert!(target.secret.is_none());
    }

    #[test]
    fn result_without_fault_flags_still_loads() {
        let json = r#"{"prompt":"p","index":0,"status":"failed","output":"","durationMs":3,"timestamp":"2025-01-01T00:00:00Z"}"#;
        let r: TaskResult = serde_json::from_str(json).unwrap();
        assert!(!r.quota_exhausted);
        assert!(!r.transient_fault);
    }

    #[test]
    fn full_record_roundtrips_through_json() {
        let mut j = job(&["a"]);
        j.start();
        j.record(result(0, TaskStatus::Timeout));
        let json = serde_json::to_string(&j).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, j);
        assert_eq!(back.notify.secret.as_deref(), Some("s3cret"));
    }
}
