//! Error types shared by the task, session and platform layers.

use crate::content::Violation;
use crate::task::{TaskId, TaskStatus, TaskType};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Failures reported by a browser automation driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// Navigation failed (page not loaded, network hiccup, redirect loop).
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Selector matched nothing on the current page.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// Element exists but cannot receive input yet (hidden, disabled, covered).
    #[error("element not interactable: {selector}")]
    NotInteractable { selector: String },

    /// Driver-level timeout.
    #[error("browser operation timed out after {0}ms")]
    Timeout(u64),

    /// The page or browser has been closed.
    #[error("browser page closed")]
    Closed,

    /// Anything else the automation protocol reports.
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether retrying the same interaction might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DriverError::Closed)
    }
}

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Content violates the platform limits. Never retried.
    #[error("content failed validation: {}", describe_violations(.0))]
    Validation(Vec<Violation>),

    /// No saved session for the platform, or the saved one was rejected.
    #[error("not logged in to {platform}; run the login flow first")]
    NotLoggedIn { platform: String },

    /// A browser sub-step kept failing until its retry budget ran out.
    #[error("{step} failed after {attempts} attempt(s): {source}")]
    StepFailed {
        step: String,
        attempts: u32,
        #[source]
        source: DriverError,
    },

    /// A driver failure outside any retried sub-step.
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("platform {0} is not supported")]
    PlatformUnsupported(String),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {task_id} already started (status: {status})")]
    AlreadyStarted { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} is already {status}")]
    AlreadyTerminal { task_id: TaskId, status: TaskStatus },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("no handler registered for task type {0}")]
    NoHandler(TaskType),

    #[error("media file not found: {}", .0.display())]
    MediaNotFound(PathBuf),

    #[error("{operation} timed out after {}ms", .elapsed.as_millis())]
    Timeout { operation: String, elapsed: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("session store error: {0}")]
    Session(String),

    #[error("invalid site profile {platform}: {reason}")]
    InvalidProfile { platform: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Stable snake_case tag used in logs and task event metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Validation(_) => "validation",
            PublishError::NotLoggedIn { .. } => "not_logged_in",
            PublishError::StepFailed { .. } => "transient_automation",
            PublishError::Driver(_) => "driver",
            PublishError::PlatformUnsupported(_) => "platform_unsupported",
            PublishError::TaskNotFound(_) => "task_not_found",
            PublishError::AlreadyStarted { .. } => "already_started",
            PublishError::AlreadyTerminal { .. } => "already_terminal",
            PublishError::InvalidTask(_) => "invalid_task",
            PublishError::InvalidPayload(_) => "invalid_payload",
            PublishError::NoHandler(_) => "no_handler",
            PublishError::MediaNotFound(_) => "media_not_found",
            PublishError::Timeout { .. } => "timeout",
            PublishError::Cancelled => "cancelled",
            PublishError::Session(_) => "session",
            PublishError::InvalidProfile { .. } => "invalid_profile",
            PublishError::Io(_) => "io",
            PublishError::Serialization(_) => "serialization",
        }
    }

    /// The violations carried by a validation error, if any.
    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            PublishError::Validation(violations) => Some(violations),
            _ => None,
        }
    }
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
