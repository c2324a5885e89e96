use crate::error::{PublishError, Result};
use crate::task::events::*;
use crate::task::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the work behind one task type
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Receives a snapshot of the task taken when it started running. The returned map
    /// becomes the task result.
    async fn handle(&self, task: Task, ctx: TaskContext) -> Result<Payload>;
}

/// Configuration for task manager
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Tasks allowed in Running at once; 0 means unbounded
    pub max_concurrent_tasks: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
        }
    }
}

struct TaskEntry {
    task: Task,
    cancel: CancellationToken,
    status_tx: watch::Sender<TaskStatus>,
    /// Creation order, used to break `created_at` ties when listing
    seq: u64,
}

type TaskMap = HashMap<TaskId, TaskEntry>;

/// Handle given to a running handler for cancellation checks and progress reports
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    cancel: CancellationToken,
    tasks: Arc<RwLock<TaskMap>>,
    tracker: TaskTracker,
}

impl TaskContext {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(PublishError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record progress. Values above 100 are clamped and regressions are ignored.
    pub async fn report_progress(&self, progress: u8, message: impl Into<String>) {
        let recorded = {
            let mut tasks = self.tasks.write().await;
            tasks
                .get_mut(&self.task_id)
                .and_then(|entry| entry.task.set_progress(progress).then_some(entry.task.progress))
        };

        if let Some(progress) = recorded {
            let message = message.into();
            debug!("Task {} progress {}%: {}", self.task_id, progress, message);
            self.tracker
                .record(
                    self.task_id,
                    TaskEventType::Progress,
                    message,
                    progress,
                    Payload::new(),
                )
                .await;
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Creates, executes, tracks and cancels tasks
#[derive(Clone)]
pub struct TaskManager {
    tasks: Arc<RwLock<TaskMap>>,
    handlers: Arc<RwLock<HashMap<TaskType, Arc<dyn TaskHandler>>>>,
    tracker: TaskTracker,
    slots: Option<Arc<Semaphore>>,
    next_seq: Arc<AtomicU64>,
    config: TaskManagerConfig,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        Self::with_tracker(config, TaskTracker::default())
    }

    pub fn with_tracker(config: TaskManagerConfig, tracker: TaskTracker) -> Self {
        let slots = match config.max_concurrent_tasks {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            tracker,
            slots,
            next_seq: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Register (or replace) the handler for a task type
    pub async fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().await.insert(task_type, handler);
        debug!("Registered handler for {} tasks", task_type);
    }

    /// Create a pending task
    pub async fn create_task(
        &self,
        task_type: TaskType,
        platform: &str,
        payload: Payload,
    ) -> Result<Task> {
        validate_platform_id(platform)?;

        let task = Task::new(task_type, platform, payload);
        let (status_tx, _) = watch::channel(task.status);
        let entry = TaskEntry {
            task: task.clone(),
            cancel: CancellationToken::new(),
            status_tx,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        self.tasks.write().await.insert(task.id, entry);

        self.tracker
            .record(
                task.id,
                TaskEventType::Created,
                format!("{} task created for {}", task_type, platform),
                0,
                Payload::new(),
            )
            .await;

        info!("Created {} task {} for {}", task_type, task.id, platform);
        Ok(task)
    }

    /// Run a pending task to completion and return its final snapshot.
    ///
    /// Handler failures are recorded on the task, not returned. Errors are reserved for
    /// unknown ids and tasks that already left Pending.
    pub async fn execute(&self, task_id: TaskId) -> Result<Task> {
        let cancel = {
            let tasks = self.tasks.read().await;
            let entry = tasks
                .get(&task_id)
                .ok_or(PublishError::TaskNotFound(task_id))?;
            ensure_pending(&entry.task)?;
            entry.cancel.clone()
        };

        // Queued tasks stay Pending until a slot frees up
        let _permit = match &self.slots {
            Some(slots) => {
                tokio::select! {
                    permit = slots.clone().acquire_owned() => Some(permit.map_err(|_| {
                        PublishError::InvalidTask("task manager is shut down".to_string())
                    })?),
                    _ = cancel.cancelled() => None,
                }
            }
            None => None,
        };

        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let entry = tasks
                .get_mut(&task_id)
                .ok_or(PublishError::TaskNotFound(task_id))?;
            ensure_pending(&entry.task)?;
            entry.task.transition(TaskStatus::Running)?;
            entry.status_tx.send_replace(TaskStatus::Running);
            entry.task.clone()
        };

        info!("Started {} task {}", snapshot.task_type, task_id);
        self.tracker
            .record(
                task_id,
                TaskEventType::Started,
                "task started",
                0,
                Payload::new(),
            )
            .await;

        let handler = self.handlers.read().await.get(&snapshot.task_type).cloned();
        let Some(handler) = handler else {
            let error = PublishError::NoHandler(snapshot.task_type);
            warn!("Task {} failed: {}", task_id, error);
            return self
                .finish(task_id, Err(HandlerFailure::Error(error)), &cancel)
                .await;
        };

        let ctx = TaskContext {
            task_id,
            cancel: cancel.clone(),
            tasks: self.tasks.clone(),
            tracker: self.tracker.clone(),
        };

        let outcome = match tokio::spawn(async move { handler.handle(snapshot, ctx).await }).await
        {
            Ok(outcome) => outcome.map_err(HandlerFailure::Error),
            Err(join_error) if join_error.is_panic() => {
                error!("Handler for task {} panicked", task_id);
                Err(HandlerFailure::Panicked)
            }
            Err(join_error) => {
                error!("Handler for task {} aborted: {}", task_id, join_error);
                Err(HandlerFailure::Panicked)
            }
        };

        self.finish(task_id, outcome, &cancel).await
    }

    /// Execute on a new tokio task
    pub fn spawn(&self, task_id: TaskId) -> JoinHandle<Result<Task>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.execute(task_id).await })
    }

    /// Resolve once the task reaches a terminal status
    pub async fn wait(&self, task_id: TaskId) -> Result<Task> {
        let mut status_rx = {
            let tasks = self.tasks.read().await;
            tasks
                .get(&task_id)
                .ok_or(PublishError::TaskNotFound(task_id))?
                .status_tx
                .subscribe()
        };

        status_rx
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| PublishError::TaskNotFound(task_id))?;

        self.get_task(task_id).await
    }

    /// Consistent snapshot of a task
    pub async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&task_id)
            .map(|entry| entry.task.clone())
            .ok_or(PublishError::TaskNotFound(task_id))
    }

    /// Tasks matching `filter`, newest first
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<&TaskEntry> = tasks
            .values()
            .filter(|entry| filter.matches(&entry.task))
            .collect();

        matching.sort_by(|a, b| {
            b.task
                .created_at
                .cmp(&a.task.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Cancel a task. Pending tasks end Cancelled immediately; running tasks are signalled
    /// and end once their handler observes the signal.
    pub async fn cancel(&self, task_id: TaskId) -> Result<Task> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let entry = tasks
                .get_mut(&task_id)
                .ok_or(PublishError::TaskNotFound(task_id))?;

            match entry.task.status {
                TaskStatus::Pending => {
                    entry.task.cancel()?;
                    entry.cancel.cancel();
                }
                TaskStatus::Running => {
                    entry.cancel.cancel();
                    info!("Cancellation requested for running task {}", task_id);
                    return Ok(entry.task.clone());
                }
                status => {
                    return Err(PublishError::AlreadyTerminal { task_id, status });
                }
            }
            entry.task.clone()
        };

        info!("Cancelled pending task {}", task_id);
        self.tracker
            .record(
                task_id,
                TaskEventType::Cancelled,
                "task cancelled before start",
                snapshot.progress,
                Payload::new(),
            )
            .await;
        self.announce(task_id, snapshot.status).await;
        Ok(snapshot)
    }

    /// Record the handler outcome as the task's terminal state
    async fn finish(
        &self,
        task_id: TaskId,
        outcome: std::result::Result<Payload, HandlerFailure>,
        cancel: &CancellationToken,
    ) -> Result<Task> {
        let mut metadata = Payload::new();

        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let entry = tasks
                .get_mut(&task_id)
                .ok_or(PublishError::TaskNotFound(task_id))?;

            match outcome {
                Ok(result) => entry.task.complete(result)?,
                Err(_) if cancel.is_cancelled() => entry.task.cancel()?,
                Err(failure) => {
                    metadata.insert("error_kind".to_string(), failure.kind().into());
                    entry.task.fail(failure.message())?;
                }
            }
            entry.task.clone()
        };

        let (event_type, message) = match snapshot.status {
            TaskStatus::Completed => (TaskEventType::Completed, "task completed".to_string()),
            TaskStatus::Cancelled => (TaskEventType::Cancelled, "task cancelled".to_string()),
            _ => (
                TaskEventType::Failed,
                snapshot.error.clone().unwrap_or_default(),
            ),
        };

        match snapshot.status {
            TaskStatus::Failed => warn!("Task {} failed: {}", task_id, message),
            status => info!("Task {} finished: {}", task_id, status),
        }

        self.tracker
            .record(task_id, event_type, message, snapshot.progress, metadata)
            .await;
        self.announce(task_id, snapshot.status).await;
        Ok(snapshot)
    }

    /// Wake `wait`ers once the terminal event is on record
    async fn announce(&self, task_id: TaskId, status: TaskStatus) {
        if let Some(entry) = self.tasks.read().await.get(&task_id) {
            entry.status_tx.send_replace(status);
        }
    }
}

/// Why a handler produced no result
enum HandlerFailure {
    Error(PublishError),
    Panicked,
}

impl HandlerFailure {
    fn kind(&self) -> &'static str {
        match self {
            HandlerFailure::Error(e) => e.kind(),
            HandlerFailure::Panicked => "panic",
        }
    }

    fn message(&self) -> String {
        match self {
            HandlerFailure::Error(e) => e.to_string(),
            HandlerFailure::Panicked => "task handler panicked".to_string(),
        }
    }
}

fn ensure_pending(task: &Task) -> Result<()> {
    if task.status == TaskStatus::Pending {
        Ok(())
    } else {
        Err(PublishError::AlreadyStarted {
            task_id: task.id,
            status: task.status,
        })
    }
}

/// Platform ids are non-empty and limited to `[a-z0-9_-]`
pub fn validate_platform_id(platform: &str) -> Result<()> {
    let valid = !platform.is_empty()
        && platform
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PublishError::InvalidTask(format!(
            "malformed platform id '{}'",
            platform
        )))
    }
}
