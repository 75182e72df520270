use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// A batch as it arrives from the outside, before it becomes a job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub prompts: Vec<String>,
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl Submission {
    /// Parse and validate a JSON submission.
    pub fn from_json(text: &str) -> Result<Self> {
        let submission: Self =
            serde_json::from_str(text).context("\"prompts\" must be an array of strings and \"webhookUrl\" a string")?;
        submission.validate()?;
        Ok(submission)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompts.is_empty() {
            bail!("\"prompts\" must not be empty");
        }
        if let Some(i) = self.prompts.iter().position(|p| p.trim().is_empty()) {
            bail!("prompt {i} is empty; every prompt must be a non-empty string");
        }
        let url = url::Url::parse(self.webhook_url.trim())
            .with_context(|| format!("\"webhookUrl\" is not a valid URL: {}", self.webhook_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("\"webhookUrl\" must use http or https, got {}", url.scheme());
        }
        Ok(())
    }

    /// Project id with blanks treated as absent.
    pub fn project(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}
