use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};
use crate::queue::job::JobSnapshot;

pub struct JobsCommand;

/// One summary line per job, e.g. `3f2a…  processing  2/5 (1 failed)`.
pub(crate) fn summary_line(job: &JobSnapshot) -> String {
    let mut line = format!(
        "{}  {:<10}  {}/{}",
        job.job_id,
        job.status.to_string(),
        job.completed + job.failed,
        job.total
    );
    if job.failed > 0 {
        line.push_str(&format!(" ({} failed)", job.failed));
    }
    line
}

#[async_trait]
impl Command for JobsCommand {
    fn name(&self) -> &str {
        "/jobs"
    }

    fn description(&self) -> &str {
        "list all jobs, newest first"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let jobs = info.queue.list_jobs().await;
        if jobs.is_empty() {
            println!("  (no jobs)");
        } else {
            for job in &jobs {
                println!("  {}", summary_line(job));
            }
        }
        CommandResult::Handled
    }
}
