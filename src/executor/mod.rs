pub mod classify;
pub mod mock;
pub mod process;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::consts::{QUOTA_RETRY_DELAY, TRANSIENT_BACKOFF, TRANSIENT_RETRIES};
use crate::credentials::CredentialPool;
use classify::{Classifier, Fault, classify};

/// Everything one invocation of the external tool needs.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub prompt: &'a str,
    pub working_dir: Option<&'a Path>,
    pub credential: &'a str,
    pub deadline: Duration,
}

/// What came back from a single invocation, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or never reported a code.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl RawOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: &str) -> Self {
        Self {
            stderr: stderr.to_string(),
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }
}

/// Runs the external tool exactly once. `Err` means the invocation itself
/// could not happen (spawn failure, broken pipe, ...).
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<RawOutput>;
}

/// Interpreted result of running one task, after any retries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
    pub quota_exhausted: bool,
    pub transient_fault: bool,
    pub credential_index: usize,
    pub attempts: u32,
}

/// Retry knobs. Zero delays are handy in tests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub quota_delay: Duration,
    pub transient_retries: u32,
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            quota_delay: QUOTA_RETRY_DELAY,
            transient_retries: TRANSIENT_RETRIES,
            transient_backoff: TRANSIENT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Same bounds, no sleeping.
    pub fn immediate() -> Self {
        Self {
            quota_delay: Duration::ZERO,
            transient_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Runs a task through an [`Invoker`], rotating credentials on quota
/// errors and backing off on transient tool faults.
pub struct TaskExecutor {
    invoker: Arc<dyn Invoker>,
    pool: Arc<CredentialPool>,
    classifier: Classifier,
    policy: RetryPolicy,
}

impl TaskExecutor {
    pub fn new(invoker: Arc<dyn Invoker>, pool: Arc<CredentialPool>) -> Self {
        Self {
            invoker,
            pool,
            classifier: classify,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Run one task to a final [`Outcome`].
    ///
    /// Fails only when no credential is configured; nothing is spawned in
    /// that case and the caller must not retry.
    pub async fn run(
        &self,
        prompt: &str,
        working_dir: Option<&Path>,
        deadline: Duration,
    ) -> Result<Outcome> {
        let mut attempts: u32 = 0;
        // Distinct credentials tried for this task, including the first.
        let mut credentials_tried: usize = 1;
        let mut transient_retries: u32 = 0;

        loop {
            let Some(credential) = self.pool.current() else {
                bail!("no API credentials configured; set {}", crate::consts::CREDENTIAL_ENV);
            };
            let credential_index = self.pool.current_index();
            attempts += 1;

            debug!(attempt = attempts, credential_index, "invoking tool");
            let invocation = Invocation {
                prompt,
                working_dir,
                credential,
                deadline,
            };

            let (mut outcome, diagnostics) = match self.invoker.invoke(invocation).await {
                Ok(raw) => interpret(raw),
                Err(e) => {
                    let message = format!("{e:#}");
                    let diagnostics = format!("{e:?}");
                    (
                        Outcome {
                            error: Some(message),
                            ..Outcome::default()
                        },
                        diagnostics,
                    )
                }
            };
            outcome.credential_index = credential_index;
            outcome.attempts = attempts;

            if outcome.success || outcome.timed_out {
                return Ok(outcome);
            }

            match (self.classifier)(&diagnostics) {
                Fault::Quota => {
                    let size = self.pool.size();
                    if size > 1 && credentials_tried < size && self.pool.rotate() {
                        credentials_tried += 1;
                        info!(
                            from = credential_index,
                            to = self.pool.current_index(),
                            "quota exhausted, rotating credential"
                        );
                        tokio::time::sleep(self.policy.quota_delay).await;
                        continue;
                    }
                    warn!(
                        pool_size = size,
                        credentials_tried, "quota exhausted and no credential left to rotate to"
                    );
                    outcome.quota_exhausted = true;
                    return Ok(outcome);
                }
                Fault::Transient => {
                    if transient_retries < self.policy.transient_retries {
                        transient_retries += 1;
                        let backoff = self.policy.transient_backoff * transient_retries;
                        warn!(
                            retry = transient_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            "transient tool fault, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    outcome.transient_fault = true;
                    return Ok(outcome);
                }
                Fault::Other => return Ok(outcome),
            }
        }
    }
}

/// Decide success from raw output. Returns the outcome and the text the
/// classifier should look at.
fn interpret(raw: RawOutput) -> (Outcome, String) {
    let stdout = raw.stdout.trim().to_string();
    let stderr = raw.stderr.trim().to_string();
    let diagnostics = format!("{stdout}\n{stderr}");

    if raw.timed_out {
        let outcome = Outcome {
            output: stdout,
            error: Some(if stderr.is_empty() {
                "timed out: process exceeded its deadline and was terminated".to_string()
            } else {
                format!("timed out: process exceeded its deadline and was terminated. stderr: {stderr}")
            }),
            timed_out: true,
            ..Outcome::default()
        };
        return (outcome, diagnostics);
    }

    let exited_ok = raw.exit_code == Some(0);
    if !exited_ok {
        let code = raw
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let detail = if stderr.is_empty() { &stdout } else { &stderr };
        let outcome = Outcome {
            output: stdout.clone(),
            error: Some(format!("exit code {code}: {detail}")),
            ..Outcome::default()
        };
        return (outcome, diagnostics);
    }

    if !stdout.is_empty() || stderr.is_empty() {
        let outcome = Outcome {
            success: true,
            output: stdout,
            error: (!stderr.is_empty()).then_some(stderr),
            ..Outcome::default()
        };
        return (outcome, diagnostics);
    }

    // Exit 0 but only stderr to show for it.
    let outcome = Outcome {
        error: Some(stderr),
        ..Outcome::default()
    };
    (outcome, diagnostics)
}
