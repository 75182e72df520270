//! Heuristic classification of failed invocations.
//!
//! The indicator tables are plain data so they can grow without touching
//! the retry loop. Swap the whole thing out with
//! [`TaskExecutor::with_classifier`](super::TaskExecutor::with_classifier).

/// What kind of failure a piece of tool output points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The active credential hit a provider limit. Rotate and retry.
    Quota,
    /// The tool crashed during startup. Back off and retry.
    Transient,
    /// Anything else. Not retried.
    Other,
}

/// Pluggable classifier. Receives the combined stdout/stderr (or error chain).
pub type Classifier = fn(&str) -> Fault;

/// Provider-side exhaustion signatures (matched lowercase).
pub const QUOTA_INDICATORS: &[&str] = &[
    "quota",
    "rate limit",
    "ratelimit",
    "rate_limit",
    "429",
    "resource exhausted",
    "resource_exhausted",
    "too many requests",
    "exceeded",
];

/// Known startup faults of the tool's own dependencies (matched lowercase).
pub const TRANSIENT_INDICATORS: &[&str] = &[
    "invalid regular expression",
    "cannot find module",
    "err_module_not_found",
    "err_require_esm",
    "unexpected token in json at position 0",
];

/// Default classifier. Quota wins when both tables match, since rotating
/// is the cheaper recovery.
pub fn classify(text: &str) -> Fault {
    let lower = text.to_lowercase();
    if QUOTA_INDICATORS.iter().any(|pat| lower.contains(pat)) {
        return Fault::Quota;
    }
    if TRANSIENT_INDICATORS.iter().any(|pat| lower.contains(pat)) {
        return Fault::Transient;
    }
    Fault::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_case_insensitive() {
        assert_eq!(classify("Quota EXCEEDED for project"), Fault::Quota);
        assert_eq!(classify("RESOURCE_EXHAUSTED"), Fault::Quota);
    }

    #[test]
    fn http_429_is_quota() {
        assert_eq!(classify("request failed with status 429"), Fault::Quota);
    }

    #[test]
    fn too_many_requests_is_quota() {
        assert_eq!(classify("Error: Too Many Requests"), Fault::Quota);
    }

    #[test]
    fn regex_fault_is_transient() {
        assert_eq!(
            classify("SyntaxError: Invalid regular expression: /(?<=a/: Unterminated group"),
            Fault::Transient
        );
    }

    #[test]
    fn missing_module_is_transient() {
        assert_eq!(
            classify("Error: Cannot find module '@google/genai'"),
            Fault::Transient
        );
    }

    #[test]
    fn quota_takes_priority() {
        assert_eq!(
            classify("Cannot find module ... then rate limit"),
            Fault::Quota
        );
    }

    #[test]
    fn unrelated_error_is_other() {
        assert_eq!(classify("permission denied"), Fault::Other);
        assert_eq!(classify(""), Fault::Other);
    }
}
