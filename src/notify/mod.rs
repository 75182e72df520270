//! Outbound notifications about task and job completion.
//!
//! The queue only builds [`Notification`] values; a [`Notifier`] delivers
//! them. Delivery is a single attempt and failures never reach the job.

pub mod mock;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::queue::job::{NotifyTarget, TaskResult};

/// Per-task status as seen by the callback endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// Wire payloads, tagged by `event`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Notification {
    #[serde(rename = "prompt.completed", rename_all = "camelCase")]
    PromptCompleted {
        job_id: Uuid,
        prompt: String,
        output: String,
        status: DeliveryStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.completed", rename_all = "camelCase")]
    JobCompleted {
        job_id: Uuid,
        total_prompts: usize,
        completed: usize,
        failed: usize,
        results: Vec<TaskResult>,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    pub fn prompt_completed(job_id: Uuid, result: &TaskResult) -> Self {
        Self::PromptCompleted {
            job_id,
            prompt: result.prompt.clone(),
            output: result.output.clone(),
            status: if result.status.is_success() {
                DeliveryStatus::Success
            } else {
                DeliveryStatus::Failed
            },
            error: result.error.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn job_completed(
        job_id: Uuid,
        total_prompts: usize,
        completed: usize,
        failed: usize,
        results: Vec<TaskResult>,
    ) -> Self {
        Self::JobCompleted {
            job_id,
            total_prompts,
            completed,
            failed,
            results,
            timestamp: Utc::now(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PromptCompleted { .. } => "prompt.completed",
            Self::JobCompleted { .. } => "job.completed",
        }
    }
}

/// Delivers a notification to its target. One attempt; `Err` is logged by
/// the caller and otherwise ignored.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<()>;
}
