//! The uniform publisher contract every platform adapter implements.

use crate::content::{Content, ContentLimits};
use crate::error::Result;
use crate::task::{Task, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of starting a login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    pub success: bool,
    /// QR code image reference (usually a data or https URL) the user must scan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qrcode_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResult {
    pub fn logged_in() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }
}

/// How thoroughly to check a login
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginProbe {
    /// Saved session exists; no browser involved
    #[default]
    Cached,
    /// Restore the session in a fresh page and look for the login indicator
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

/// Caller-facing view of a publish task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub task_id: TaskId,
    pub status: PublishStatus,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PublishResult {
    pub fn from_task(task: &Task) -> Self {
        let (status, error) = match task.status {
            TaskStatus::Pending => (PublishStatus::Pending, None),
            TaskStatus::Running => (PublishStatus::Processing, None),
            TaskStatus::Completed => (PublishStatus::Success, None),
            TaskStatus::Failed => (PublishStatus::Failed, task.error.clone()),
            TaskStatus::Cancelled => (PublishStatus::Failed, Some("task cancelled".to_string())),
        };

        let field = |key: &str| {
            task.result
                .as_ref()
                .and_then(|result| result.get(key))
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };

        Self {
            task_id: task.id,
            status,
            platform: task.platform.clone(),
            post_id: field("post_id"),
            post_url: field("post_url"),
            error,
            created_at: task.created_at,
            finished_at: task.finished_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PublishStatus::Success
    }
}

/// Login, publish and task control for one platform
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> &str;

    fn limits(&self) -> &ContentLimits;

    /// Report an existing session, or start a QR login without waiting for the user
    async fn login(&self, cancel: &CancellationToken) -> Result<LoginResult>;

    /// Block until the user finished logging in and persist the session
    async fn wait_for_login(&self, cancel: &CancellationToken, timeout: Duration) -> Result<()>;

    async fn check_login_status(&self, probe: LoginProbe) -> Result<bool>;

    /// Forget the saved session. Returns whether one existed.
    async fn logout(&self) -> Result<bool>;

    /// Validate, publish and wait for the outcome
    async fn publish(&self, cancel: &CancellationToken, content: Content) -> Result<PublishResult>;

    /// Validate and queue a publish; returns the task id immediately
    async fn publish_async(&self, content: Content) -> Result<TaskId>;

    async fn query_status(&self, task_id: TaskId) -> Result<PublishResult>;

    async fn cancel(&self, task_id: TaskId) -> Result<()>;

    /// Release the browser
    async fn close(&self) -> Result<()>;
}
