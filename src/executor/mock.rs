use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Invocation, Invoker, RawOutput};

/// A scripted invoker for tests. Returns pre-defined outputs in order and
/// records which credential each call saw. Once the script runs out, the
/// fallback (if any) is returned forever.
pub struct MockInvoker {
    script: Vec<RawOutput>,
    fallback: Option<RawOutput>,
    index: AtomicUsize,
    seen: Mutex<Vec<Call>>,
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub prompt: String,
    pub credential: String,
    pub working_dir: Option<std::path::PathBuf>,
}

impl MockInvoker {
    pub fn new(script: Vec<RawOutput>) -> Self {
        Self {
            script,
            fallback: None,
            index: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call echoes the prompt back as stdout.
    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    /// Every call (after the script) returns `output`.
    pub fn always(output: RawOutput) -> Self {
        Self::new(Vec::new()).then(output)
    }

    pub fn then(mut self, fallback: RawOutput) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.seen.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<RawOutput> {
        self.seen.lock().unwrap().push(Call {
            prompt: invocation.prompt.to_string(),
            credential: invocation.credential.to_string(),
            working_dir: invocation.working_dir.map(|p| p.to_path_buf()),
        });
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let output = match self.script.get(i) {
            Some(output) => output.clone(),
            None => match &self.fallback {
                Some(output) => output.clone(),
                None => RawOutput::success(invocation.prompt),
            },
        };
        Ok(output)
    }
}
