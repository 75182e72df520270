use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Invocation, Invoker, RawOutput};
use crate::consts::{CREDENTIAL_ENV, DEFAULT_KILL_GRACE, DEFAULT_TOOL, DEFAULT_TOOL_ARGS};

/// Maximum bytes kept per stream. Anything beyond this is truncated.
const MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;

/// How the external tool is launched.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: PathBuf,
    /// Arguments placed before the prompt.
    pub args: Vec<String>,
    /// Environment variable that receives the active credential.
    pub credential_env: String,
    /// Time between SIGTERM and SIGKILL after a missed deadline.
    pub kill_grace: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_TOOL),
            args: DEFAULT_TOOL_ARGS.iter().map(|a| a.to_string()).collect(),
            credential_env: CREDENTIAL_ENV.to_string(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl ProcessConfig {
    /// Append `--model <name>` when a model is configured.
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.map(str::trim)
            && !model.is_empty()
        {
            self.args.push("--model".to_string());
            self.args.push(model.to_string());
        }
        self
    }
}

/// Spawns the tool as a child process. The prompt is always its own argv
/// entry; no shell ever sees it.
pub struct ProcessInvoker {
    config: ProcessConfig,
}

impl ProcessInvoker {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Whether the tool can be launched at all (`<tool> --version`).
    /// Only a missing binary counts as unavailable; any other failure,
    /// including a slow response, still means it is installed.
    pub async fn is_available(&self) -> bool {
        let spawned = Command::new(&self.config.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(mut child) => {
                let _ = tokio::time::timeout(Duration::from_secs(10), child.wait()).await;
                true
            }
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        }
    }

    /// SIGTERM to the whole process group, wait out the grace period, then
    /// SIGKILL whatever is left of the group. The tool's own subprocesses
    /// share its group, so none of them outlive the task.
    async fn terminate(&self, child: &mut Child) {
        let Some(pid) = child.id() else {
            return;
        };
        signal_group(pid, "-TERM").await;

        match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
            Ok(_) => debug!(pid, "process exited after SIGTERM"),
            Err(_) => warn!(pid, "process ignored SIGTERM, killing"),
        }

        // The leader may be gone while its descendants linger.
        signal_group(pid, "-KILL").await;
        if let Err(e) = child.kill().await {
            debug!(pid, error = %e, "process already reaped");
        }
    }
}

/// `kill -<sig> -- -<pgid>`. A group with no members left is not an error.
async fn signal_group(pgid: u32, signal: &str) {
    let sent = Command::new("kill")
        .arg(signal)
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match sent {
        Ok(status) if !status.success() => debug!(pgid, signal, "process group already gone"),
        Ok(_) => {}
        Err(e) => warn!(pgid, signal, error = %e, "failed to signal process group"),
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<RawOutput> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(invocation.prompt)
            .env(&self.config.credential_env, invocation.credential)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(dir) = invocation.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.config.program.display()))?;

        // Drain both pipes while waiting, or a chatty child blocks on a full pipe.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let (exit_code, timed_out) =
            match tokio::time::timeout(invocation.deadline, child.wait()).await {
                Ok(status) => {
                    let status = status.context("failed to wait for tool process")?;
                    (status.code(), false)
                }
                Err(_) => {
                    warn!(
                        deadline_secs = invocation.deadline.as_secs(),
                        "tool exceeded its deadline"
                    );
                    self.terminate(&mut child).await;
                    (None, true)
                }
            };

        // Grandchildren may still hold the pipes open after a kill.
        let reader_wait = if timed_out {
            self.config.kill_grace
        } else {
            invocation.deadline.saturating_sub(started.elapsed()) + self.config.kill_grace
        };
        let stdout = collect(stdout, reader_wait).await;
        let stderr = collect(stderr, reader_wait).await;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?exit_code,
            timed_out,
            "tool finished"
        );

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}

fn spawn_reader<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return String::new();
        };
        let mut buf = Vec::new();
        if let Err(e) = stream.read_to_end(&mut buf).await {
            warn!(error = %e, "failed to read tool output");
        }
        truncate_output(&String::from_utf8_lossy(&buf), MAX_STREAM_BYTES)
    })
}

async fn collect(mut handle: JoinHandle<String>, wait: Duration) -> String {
    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "output reader failed");
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n[truncated: showing {}/{} bytes]",
        &output[..end],
        end,
        output.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_gemini() {
        let config = ProcessConfig::default();
        assert_eq!(config.program, PathBuf::from("gemini"));
        assert_eq!(config.args, vec!["--yolo".to_string()]);
        assert_eq!(config.credential_env, "GEMINI_API_KEY");
    }

    #[test]
    fn with_model_appends_flag() {
        let config = ProcessConfig::default().with_model(Some(" gemini-2.5-pro "));
        assert_eq!(
            config.args,
            vec!["--yolo", "--model", "gemini-2.5-pro"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn with_blank_model_is_ignored() {
        let config = ProcessConfig::default().with_model(Some("  "));
        assert_eq!(config.args.len(), 1);
        let config = ProcessConfig::default().with_model(None);
        assert_eq!(config.args.len(), 1);
    }

    #[test]
    fn truncate_short_is_unchanged() {
        assert_eq!(truncate_output("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let out = truncate_output("ééééé", 3);
        assert!(out.starts_with('é'));
        assert!(out.contains("[truncated: showing 2/10 bytes]"));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let invoker = ProcessInvoker::new(ProcessConfig {
            program: PathBuf::from("definitely-not-a-real-binary-xyz"),
            ..ProcessConfig::default()
        });
        assert!(!invoker.is_available().await);
    }

    #[tokio::test]
    async fn installed_binary_is_available() {
        let invoker = ProcessInvoker::new(ProcessConfig {
            program: PathBuf::from("sh"),
            ..ProcessConfig::default()
        });
        assert!(invoker.is_available().await);
    }
}
