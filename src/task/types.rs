use crate::error::PublishError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Free-form JSON object carried as task input and output
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Kind of work a task performs; selects the registered handler
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Publish,
    Login,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Publish => "publish",
            TaskType::Login => "login",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(TaskType::Publish),
            "login" => Ok(TaskType::Login),
            other => Err(PublishError::InvalidTask(format!(
                "unknown task type '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle state of a task
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for execution
    Pending,
    /// Handler is running
    Running,
    /// Handler returned a result
    Completed,
    /// Handler returned an error, panicked or was missing
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, Failed and Cancelled never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(PublishError::InvalidTask(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

/// One asynchronous unit of work and its observable state
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub platform: String,
    /// Input set at creation; never mutated afterwards
    pub payload: Payload,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with a fresh id
    pub fn new(task_type: TaskType, platform: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            platform: platform.into(),
            payload,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, stamping start and finish times. Illegal edges leave the task untouched.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), PublishError> {
        if !self.status.can_transition_to(next) {
            return Err(if self.status.is_terminal() {
                PublishError::AlreadyTerminal {
                    task_id: self.id,
                    status: self.status,
                }
            } else {
                PublishError::AlreadyStarted {
                    task_id: self.id,
                    status: self.status,
                }
            });
        }

        let now = Utc::now();
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Record progress while running; clamped to 100 and never decreasing
    pub fn set_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if self.status != TaskStatus::Running || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    pub fn complete(&mut self, result: Payload) -> Result<(), PublishError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PublishError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), PublishError> {
        self.transition(TaskStatus::Cancelled)?;
        self.error = Some("task cancelled".to_string());
        Ok(())
    }

    /// Wall-clock run time, once started
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.finished_at.unwrap_or_else(Utc::now) - started)
    }
}

/// Conjunctive filter for task listings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub platform: Option<String>,
    pub task_type: Option<TaskType>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn paginate(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| s == task.status)
            && self.platform.as_deref().is_none_or(|p| p == task.platform)
            && self.task_type.is_none_or(|t| t == task.task_type)
    }
}
