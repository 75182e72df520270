//! Startup banner and shutdown summary display.

use std::time::Duration;

use crate::consts::{AUTHOR, HOMEPAGE, REPO};
use crate::queue::job::{JobSnapshot, JobStatus};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub tool: &'a str,
    pub tool_available: bool,
    pub keys: usize,
    pub key_source: &'a str,
    pub deadline: Duration,
    pub db: &'a str,
    pub resumed: usize,
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    let tool_status = if info.tool_available {
        "ok"
    } else {
        "not found, jobs will fail"
    };
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║              S C R I B E              ║
   ║     prompts in, webhooks out          ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   tool      {} ({})
   keys      {} (from {})
   deadline  {}s per task
   db        {}
   resumed   {} job(s)
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.tool,
        tool_status,
        info.keys,
        info.key_source,
        info.deadline.as_secs(),
        info.db,
        info.resumed,
    );
}

/// Counts of jobs per status, for the shutdown line.
pub fn summarize(jobs: &[JobSnapshot]) -> (usize, usize, usize) {
    jobs.iter().fold((0, 0, 0), |(p, r, c), job| match job.status {
        JobStatus::Pending => (p + 1, r, c),
        JobStatus::Processing => (p, r + 1, c),
        JobStatus::Completed => (p, r, c + 1),
    })
}

/// Print the session summary (job counts + farewell).
pub fn print_session_summary(jobs: &[JobSnapshot]) {
    let (pending, processing, completed) = summarize(jobs);
    if !jobs.is_empty() {
        println!(
            "jobs: {completed} completed, {processing} in progress, {pending} pending (state saved)"
        );
    }
    println!("goodbye.");
}
