//! Runtime settings assembled from CLI flags and the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::consts::CREDENTIAL_ENV;
use crate::credentials::CredentialPool;
use crate::executor::process::ProcessConfig;
use crate::queue::QueueConfig;

/// Everything needed to wire a queue, in one place.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: String,
    pub projects_dir: PathBuf,
    pub process: ProcessConfig,
    pub queue: QueueConfig,
}

/// Where the credential list came from, for the startup banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `--api-keys` or its environment fallback.
    List,
    /// The single-key variable.
    Single,
    None,
}

impl CredentialSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::List => "--api-keys / GEMINI_API_KEYS",
            Self::Single => CREDENTIAL_ENV,
            Self::None => "none",
        }
    }
}

/// Build the credential pool from the comma-separated list, falling back
/// to the single key. Both values come from the CLI layer, which reads the
/// environment.
pub fn load_credentials(
    list: Option<&str>,
    single: Option<&str>,
) -> (CredentialPool, CredentialSource) {
    let candidates = [
        (list, CredentialSource::List),
        (single, CredentialSource::Single),
    ];
    for (raw, source) in candidates {
        if let Some(raw) = raw {
            let pool = CredentialPool::from_config(raw);
            if !pool.is_empty() {
                return (pool, source);
            }
        }
    }
    (CredentialPool::new(Vec::new()), CredentialSource::None)
}

/// Hours on the command line, a `Duration` everywhere else.
pub fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_beats_single() {
        let (pool, source) = load_credentials(Some("k1, k2, k3"), Some("single"));
        assert_eq!(source, CredentialSource::List);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.current(), Some("k1"));
    }

    #[test]
    fn single_key_for_backward_compat() {
        let (pool, source) = load_credentials(None, Some("only-key"));
        assert_eq!(source, CredentialSource::Single);
        assert_eq!(pool.current(), Some("only-key"));
    }

    #[test]
    fn blank_list_falls_through() {
        let (pool, source) = load_credentials(Some(" , "), Some("k"));
        assert_eq!(source, CredentialSource::Single);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn nothing_configured() {
        let (pool, source) = load_credentials(None, Some("  "));
        assert_eq!(source, CredentialSource::None);
        assert!(pool.is_empty());
    }

    #[test]
    fn hours_converts() {
        assert_eq!(hours(24), Duration::from_secs(86_400));
    }

    #[test]
    fn huge_hours_saturate() {
        assert_eq!(hours(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
