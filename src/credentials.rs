//! Rotating pool of interchangeable API credentials.
//!
//! The cursor is process-local: a restart always begins with the first
//! credential again.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered credentials plus the index currently in use.
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a comma-separated list. A single key without commas works too.
    /// Blank entries are dropped.
    pub fn from_config(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(keys)
    }

    /// Credential at the cursor, or `None` when nothing is configured.
    pub fn current(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let index = self.cursor.load(Ordering::SeqCst) % self.keys.len();
        Some(&self.keys[index])
    }

    /// Advance to the next credential, wrapping around.
    /// Returns `false` when there is nothing to rotate to.
    pub fn rotate(&self) -> bool {
        let size = self.keys.len();
        if size <= 1 {
            return false;
        }
        let _ = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % size));
        true
    }

    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Never print the keys themselves.
impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("size", &self.size())
            .field("current_index", &self.current_index())
            .finish()
    }
}
