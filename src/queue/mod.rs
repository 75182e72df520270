//! The job queue and its single sequential worker.
//!
//! [`QueueManager`] is the only writer of job state. Jobs live in a
//! `RwLock<Vec<Job>>` in submission order; write locks are held for short
//! mutations only and never across a tool run, a store write or a
//! notification, so status reads stay cheap while the worker is busy.
//! At most one worker task exists at a time, guarded by an `AtomicBool`.

pub mod job;
pub mod submission;

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::consts::{DEFAULT_FLUSH_INTERVAL, DEFAULT_RETENTION, DEFAULT_TASK_DEADLINE};
use crate::events::{Event, EventBus};
use crate::executor::TaskExecutor;
use crate::notify::{Notification, Notifier};
use crate::projects::ProjectLookup;
use crate::review::{ReviewContext, ReviewRecorder};
use crate::store::JobStore;
use job::{Job, JobSnapshot, JobStatus, NotifyTarget, TaskResult, TaskStatus};
use submission::Submission;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Deadline applied to every task, regardless of content.
    pub task_deadline: Duration,
    /// Period of the background flush and retention sweep.
    pub flush_interval: Duration,
    /// Finished jobs older than this are dropped.
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            task_deadline: DEFAULT_TASK_DEADLINE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Collaborators the queue is wired with.
pub struct QueueParts {
    pub executor: TaskExecutor,
    pub store: Arc<dyn JobStore>,
    pub reviews: Arc<ReviewRecorder>,
    pub notifier: Arc<dyn Notifier>,
    pub projects: Arc<dyn ProjectLookup>,
}

/// Handle to the queue. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: RwLock<Vec<Job>>,
    worker_active: AtomicBool,
    executor: TaskExecutor,
    store: Arc<dyn JobStore>,
    reviews: Arc<ReviewRecorder>,
    notifier: Arc<dyn Notifier>,
    projects: Arc<dyn ProjectLookup>,
    events: EventBus,
    config: QueueConfig,
}

impl QueueManager {
    pub fn new(parts: QueueParts, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(Vec::new()),
                worker_active: AtomicBool::new(false),
                executor: parts.executor,
                store: parts.store,
                reviews: parts.reviews,
                notifier: parts.notifier,
                projects: parts.projects,
                events: EventBus::default(),
                config,
            }),
        }
    }

    /// Load persisted jobs. Interrupted jobs come back as pending with
    /// their recorded results intact; expired ones are deleted. Does not
    /// start the worker, call [`start`](Self::start) for that.
    /// Returns the number of jobs waiting for the worker.
    pub async fn restore(&self) -> Result<usize> {
        let loaded = self.inner.store.load().await?;
        let (restored, expired) = job::restore(loaded, Utc::now(), self.inner.config.retention);

        if !expired.is_empty() {
            info!(count = expired.len(), "dropping expired jobs");
            if let Err(e) = self.inner.store.remove(&expired).await {
                warn!(error = %e, "failed to delete expired jobs");
            }
        }

        let waiting = restored.iter().filter(|j| j.status.is_active()).count();
        for job in restored.iter().filter(|j| j.status.is_active()) {
            info!(
                job_id = %job.job_id,
                recorded = job.results.len(),
                total = job.total(),
                "resuming job"
            );
        }

        if let Err(e) = self.inner.store.save_all(&restored).await {
            warn!(error = %e, "failed to persist restored jobs");
        }

        let mut jobs = self.inner.jobs.write().await;
        for job in restored {
            if !jobs.iter().any(|j| j.job_id == job.job_id) {
                jobs.push(job);
            }
        }
        Ok(waiting)
    }

    /// Kick the worker if there is anything to do.
    pub async fn start(&self) {
        let pending = self
            .inner
            .jobs
            .read()
            .await
            .iter()
            .any(|j| j.status.is_active());
        if pending {
            self.ensure_worker();
        }
    }

    /// Validate a boundary submission and enqueue it.
    pub async fn submit(&self, submission: Submission) -> Result<Uuid> {
        submission.validate()?;
        let project = submission.project().map(str::to_string);
        let notify = NotifyTarget::new(submission.webhook_url.trim(), submission.webhook_secret);
        Ok(self.add_job(submission.prompts, notify, project).await)
    }

    /// Enqueue a batch. The project's working directory is resolved once,
    /// here; an unknown project is logged and the job runs without one.
    pub async fn add_job(
        &self,
        prompts: Vec<String>,
        notify: NotifyTarget,
        project_id: Option<String>,
    ) -> Uuid {
        let working_dir = project_id.as_deref().and_then(|id| self.resolve_project(id));
        let job = Job::new(prompts, notify, project_id, working_dir);
        let job_id = job.job_id;
        let total = job.total();

        self.inner.jobs.write().await.push(job.clone());
        self.inner.persist(&job).await;
        info!(%job_id, total, "job queued");
        self.inner.events.emit(Event::JobSubmitted { job_id, total });

        self.ensure_worker();
        job_id
    }

    fn resolve_project(&self, project_id: &str) -> Option<PathBuf> {
        let dir = self.inner.projects.working_dir(project_id);
        if dir.is_none() {
            warn!(project_id, "project not found, running without a working directory");
        }
        dir
    }

    pub async fn get_job(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .find(|j| j.job_id == job_id)
            .map(Job::snapshot)
    }

    /// All jobs, most recent first.
    pub async fn list_jobs(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .inner
            .jobs
            .read()
            .await
            .iter()
            .map(Job::snapshot)
            .collect();
        snapshots.reverse();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Wait until the job is completed. `None` if the job is unknown.
    pub async fn wait_for(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let mut rx = self.inner.events.subscribe();
        loop {
            let snapshot = self.get_job(job_id).await?;
            if snapshot.status == JobStatus::Completed {
                return Some(snapshot);
            }
            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return self.get_job(job_id).await,
            }
        }
    }

    pub fn is_processing(&self) -> bool {
        self.inner.worker_active.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.inner.executor
    }

    pub fn reviews(&self) -> &ReviewRecorder {
        &self.inner.reviews
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Write every job to the store.
    pub async fn flush(&self) -> Result<()> {
        let jobs = self.inner.jobs.read().await.clone();
        self.inner.store.save_all(&jobs).await?;
        debug!(count = jobs.len(), "flushed jobs");
        Ok(())
    }

    /// Drop finished jobs past the retention window, from memory and store.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let retention = self.inner.config.retention;
        let expired: Vec<Uuid> = {
            let mut jobs = self.inner.jobs.write().await;
            let expired: Vec<Uuid> = jobs
                .iter()
                .filter(|j| j.is_expired(now, retention))
                .map(|j| j.job_id)
                .collect();
            jobs.retain(|j| !expired.contains(&j.job_id));
            expired
        };

        if !expired.is_empty() {
            info!(count = expired.len(), "removed expired jobs");
            if let Err(e) = self.inner.store.remove(&expired).await {
                warn!(error = %e, "failed to delete expired jobs");
            }
        }
        expired.len()
    }

    /// Periodic flush + sweep until the returned handle is aborted.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let queue = self.clone();
        let period = self.inner.config.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = queue.flush().await {
                    warn!(error = %e, "periodic flush failed");
                }
                queue.sweep().await;
            }
        })
    }

    fn ensure_worker(&self) {
        if self
            .inner
            .worker_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("starting worker");
            tokio::spawn(Inner::run_worker(Arc::clone(&self.inner)));
        }
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>) {
        loop {
            let next = {
                let mut jobs = self.jobs.write().await;
                jobs.iter_mut().find(|j| j.status.is_active()).map(|j| {
                    j.start();
                    j.clone()
                })
            };

            match next {
                Some(job) => {
                    self.persist(&job).await;
                    self.process(job).await;
                }
                None => {
                    self.worker_active.store(false, Ordering::SeqCst);
                    // A submission may have landed between the scan and the store.
                    let more = self.jobs.read().await.iter().any(|j| j.status.is_active());
                    if more
                        && self
                            .worker_active
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    debug!("queue idle");
                    return;
                }
            }
        }
    }

    /// Run the remaining tasks of a job, then complete it.
    async fn process(&self, job: Job) {
        let job_id = job.job_id;
        let total = job.total();
        // Recorded positions are final; pick up after the last one.
        let first = job.next_index();
        info!(%job_id, total, from = first, "processing job");

        for (index, prompt) in job.prompts.iter().enumerate().skip(first) {
            info!(%job_id, task = index + 1, total, "running task");
            let result = self.run_task(&job, index, prompt).await;

            let Some(updated) = self
                .update(job_id, |j| {
                    j.record(result.clone());
                })
                .await
            else {
                error!(%job_id, "job vanished while processing");
                return;
            };
            self.persist(&updated).await;

            let notification = Notification::prompt_completed(job_id, &result);
            self.deliver(&job.notify, &notification).await;
            self.events.emit(Event::TaskFinished {
                job_id,
                index,
                status: result.status,
            });
        }

        let Some(finished) = self.update(job_id, Job::finish).await else {
            error!(%job_id, "job vanished before completion");
            return;
        };
        self.persist(&finished).await;
        info!(
            %job_id,
            completed = finished.completed,
            failed = finished.failed,
            "job completed"
        );

        let summary = Notification::job_completed(
            job_id,
            finished.total(),
            finished.completed,
            finished.failed,
            finished.results.clone(),
        );
        self.deliver(&finished.notify, &summary).await;
        self.events.emit(Event::JobCompleted {
            job_id,
            completed: finished.completed,
            failed: finished.failed,
        });
    }

    async fn run_task(&self, job: &Job, index: usize, prompt: &str) -> TaskResult {
        let deadline = self.config.task_deadline;
        let started = Instant::now();
        let outcome = self
            .executor
            .run(prompt, job.working_dir.as_deref(), deadline)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut quota_exhausted = false;
        let mut transient_fault = false;
        let (status, output, error) = match outcome {
            Ok(outcome) if outcome.timed_out => {
                let reason = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("exceeded {}s deadline", deadline.as_secs()));
                self.flag_for_review(job, index, prompt, &reason);
                (TaskStatus::Timeout, outcome.output, Some(reason))
            }
            Ok(outcome) if outcome.success => (TaskStatus::Completed, outcome.output, outcome.error),
            Ok(outcome) => {
                if outcome.quota_exhausted {
                    warn!(job_id = %job.job_id, index, "task failed: all credentials exhausted");
                }
                quota_exhausted = outcome.quota_exhausted;
                transient_fault = outcome.transient_fault;
                (TaskStatus::Failed, outcome.output, outcome.error)
            }
            Err(e) => {
                error!(job_id = %job.job_id, index, error = %e, "task could not run");
                (TaskStatus::Failed, String::new(), Some(format!("{e:#}")))
            }
        };

        TaskResult {
            prompt: prompt.to_string(),
            index,
            status,
            output,
            error,
            duration_ms,
            timestamp: Utc::now(),
            quota_exhausted,
            transient_fault,
        }
    }

    fn flag_for_review(&self, job: &Job, index: usize, prompt: &str, reason: &str) {
        let context = ReviewContext {
            working_dir: job.working_dir.clone(),
            notify_url: job.notify.url.clone(),
            reason: reason.to_string(),
        };
        match self.reviews.record(job.job_id, prompt, index, &context) {
            Ok(true) => warn!(job_id = %job.job_id, index, "task timed out, flagged for review"),
            Ok(false) => debug!(job_id = %job.job_id, index, "task already flagged for review"),
            Err(e) => error!(job_id = %job.job_id, index, error = %e, "failed to record review"),
        }
    }

    /// Mutate a job under the write lock and hand back a copy.
    async fn update(&self, job_id: Uuid, f: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.job_id == job_id)?;
        f(job);
        Some(job.clone())
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.store.save(job).await {
            error!(job_id = %job.job_id, error = %e, "failed to persist job");
        }
    }

    async fn deliver(&self, target: &NotifyTarget, notification: &Notification) {
        if let Err(e) = self.notifier.notify(target, notification).await {
            warn!(
                url = %target.url,
                event = notification.event_name(),
                error = %e,
                "notification failed"
            );
        }
    }
}
