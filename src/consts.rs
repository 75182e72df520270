//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// External text-generation tool invoked once per task.
pub const DEFAULT_TOOL: &str = "gemini";

/// Flag that lets the tool act without interactive confirmation.
pub const DEFAULT_TOOL_ARGS: &[&str] = &["--yolo"];

/// Environment variable the tool reads its credential from.
pub const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

/// Comma-separated credential list, preferred over [`CREDENTIAL_ENV`].
pub const CREDENTIALS_ENV: &str = "GEMINI_API_KEYS";

/// Optional model override passed to the tool as `--model <name>`.
pub const MODEL_ENV: &str = "GEMINI_MODEL";

/// Wall-clock deadline for a single task invocation.
pub const DEFAULT_TASK_DEADLINE: Duration = Duration::from_secs(600);

/// Time between SIGTERM and SIGKILL once a deadline is missed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Periodic persistence flush and retention sweep.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Completed jobs older than this are dropped.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Pause before retrying with the next credential.
pub const QUOTA_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Additional attempts after a transient tool fault.
pub const TRANSIENT_RETRIES: u32 = 2;

/// Backoff step for transient retries (2s, 4s, ...).
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);

/// Webhook delivery timeout.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Rough per-prompt estimate shown when a batch is accepted.
pub const ESTIMATED_SECS_PER_PROMPT: u64 = 30;

/// Default database path: `~/.scribe/scribe.db`.
/// Single DB for jobs and review records.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".scribe")
        .join("scribe.db")
}

/// Default root for project working directories: `~/.scribe/projects`.
pub fn default_projects_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".scribe")
        .join("projects")
}

/// Human estimate for a batch, e.g. `~2 minutes`.
pub fn estimate_label(prompts: usize) -> String {
    let secs = prompts as u64 * ESTIMATED_SECS_PER_PROMPT;
    let minutes = secs.div_ceil(60);
    if minutes == 1 {
        "~1 minute".to_string()
    } else {
        format!("~{minutes} minutes")
    }
}
