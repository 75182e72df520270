use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Mutex;

use super::{Notification, Notifier};
use crate::queue::job::NotifyTarget;

/// Collects notifications instead of sending them. Can be told to fail
/// every delivery to exercise the error path.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every attempt, then reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// URLs each notification was addressed to, in order.
    pub fn urls(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((target.url.clone(), notification.clone()));
        if self.fail {
            bail!("simulated delivery failure");
        }
        Ok(())
    }
}
