//! Task audit trail.
//!
//! Every lifecycle change of a task is recorded as a [`TaskEvent`], broadcast to live
//! subscribers and optionally persisted through an [`EventStore`]. Persisting is best
//! effort: a failing store is logged and never fails the task itself.

use crate::error::{PublishError, Result};
use crate::task::types::{Payload, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs as async_fs;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

/// One audit record for a task
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskEvent {
    pub id: Uuid,
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    pub message: String,
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per tracker; orders events recorded within the same instant
    #[serde(default)]
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub metadata: Payload,
}

/// Storage backend for task events
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save_event(&self, event: &TaskEvent) -> Result<()>;

    /// Events for `task_id` in recording order. With a limit, only the most recent are kept.
    async fn list_events(&self, task_id: TaskId, limit: Option<usize>) -> Result<Vec<TaskEvent>>;
}

fn sort_and_limit(mut events: Vec<TaskEvent>, limit: Option<usize>) -> Vec<TaskEvent> {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.sequence.cmp(&b.sequence))
    });
    if let Some(limit) = limit
        && events.len() > limit
    {
        events.drain(..events.len() - limit);
    }
    events
}

/// Keeps events in process memory
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<TaskEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save_event(&self, event: &TaskEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, task_id: TaskId, limit: Option<usize>) -> Result<Vec<TaskEvent>> {
        let events = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        Ok(sort_and_limit(events, limit))
    }
}

/// Writes each event as `<root>/<YYYY-MM-DD>/<task_id>_<event_id>.json`
#[derive(Debug, Clone)]
pub struct JsonEventStore {
    root: PathBuf,
}

impl JsonEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn event_path(&self, event: &TaskEvent) -> PathBuf {
        self.root
            .join(event.timestamp.format("%Y-%m-%d").to_string())
            .join(format!("{}_{}.json", event.task_id, event.id))
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn save_event(&self, event: &TaskEvent) -> Result<()> {
        let path = self.event_path(event);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(event)?;
        async_fs::write(&path, data).await?;
        Ok(())
    }

    async fn list_events(&self, task_id: TaskId, limit: Option<usize>) -> Result<Vec<TaskEvent>> {
        let mut events = Vec::new();
        if !async_fs::try_exists(&self.root).await? {
            return Ok(events);
        }

        let prefix = format!("{}_", task_id);
        let mut days = async_fs::read_dir(&self.root).await?;
        while let Some(day) = days.next_entry().await? {
            if !day.file_type().await?.is_dir() {
                continue;
            }
            let mut files = async_fs::read_dir(day.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if !name.starts_with(&prefix) || !name.ends_with(".json") {
                    continue;
                }
                let data = async_fs::read(file.path()).await?;
                match serde_json::from_slice::<TaskEvent>(&data) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!("Skipping unreadable event file {}: {}", name, e),
                }
            }
        }

        Ok(sort_and_limit(events, limit))
    }
}

/// Records, broadcasts and optionally persists task events
#[derive(Clone)]
pub struct TaskTracker {
    store: Option<Arc<dyn EventStore>>,
    sender: broadcast::Sender<TaskEvent>,
    sequence: Arc<AtomicU64>,
}

impl TaskTracker {
    pub fn new(store: Option<Arc<dyn EventStore>>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Receive every event recorded after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub async fn record(
        &self,
        task_id: TaskId,
        event_type: TaskEventType,
        message: impl Into<String>,
        progress: u8,
        metadata: Payload,
    ) -> TaskEvent {
        let event = TaskEvent {
            id: Uuid::new_v4(),
            task_id,
            event_type,
            message: message.into(),
            progress,
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            metadata,
        };

        if let Some(store) = &self.store
            && let Err(e) = store.save_event(&event).await
        {
            warn!("Failed to persist event for task {}: {}", task_id, e);
        }

        // No subscribers is fine
        if self.sender.send(event.clone()).is_err() {
            debug!("No subscribers for task event {:?}", event.event_type);
        }

        event
    }

    pub async fn history(&self, task_id: TaskId, limit: Option<usize>) -> Result<Vec<TaskEvent>> {
        match &self.store {
            Some(store) => store.list_events(task_id, limit).await,
            None => Err(PublishError::InvalidTask(
                "task history requires an event store".to_string(),
            )),
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("persistent", &self.store.is_some())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
