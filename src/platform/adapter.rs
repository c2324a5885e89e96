use crate::content::{Content, ContentLimits, ensure_valid};
use crate::error::{PublishError, Result};
use crate::platform::automation::SiteAutomation;
use crate::platform::traits::{LoginProbe, LoginResult, Publisher, PublishResult};
use crate::task::{Task, TaskId, TaskManager, TaskType};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The one [`Publisher`] implementation: a site automation plus the shared task manager
#[derive(Clone)]
pub struct SiteAdapter {
    automation: Arc<SiteAutomation>,
    tasks: TaskManager,
}

impl SiteAdapter {
    pub fn new(automation: Arc<SiteAutomation>, tasks: TaskManager) -> Self {
        Self { automation, tasks }
    }

    pub fn automation(&self) -> &Arc<SiteAutomation> {
        &self.automation
    }

    /// Probe media sizes and check the content against this platform's limits
    fn prepare(&self, mut content: Content) -> Result<Content> {
        content.probe_media();
        ensure_valid(&content, self.limits())?;
        Ok(content)
    }

    /// Fetch a task that belongs to this platform
    async fn own_task(&self, task_id: TaskId) -> Result<Task> {
        let task = self.tasks.get_task(task_id).await?;
        if task.platform != self.platform() {
            return Err(PublishError::TaskNotFound(task_id));
        }
        Ok(task)
    }
}

#[async_trait]
impl Publisher for SiteAdapter {
    fn platform(&self) -> &str {
        self.automation.platform()
    }

    fn limits(&self) -> &ContentLimits {
        &self.automation.profile().limits
    }

    async fn login(&self, cancel: &CancellationToken) -> Result<LoginResult> {
        self.automation.login(cancel).await
    }

    async fn wait_for_login(&self, cancel: &CancellationToken, timeout: Duration) -> Result<()> {
        self.automation.wait_for_login(cancel, timeout).await?;
        Ok(())
    }

    async fn check_login_status(&self, probe: LoginProbe) -> Result<bool> {
        self.automation.check_login_status(probe).await
    }

    async fn logout(&self) -> Result<bool> {
        info!("[{}] Logging out", self.platform());
        self.automation.sessions().delete(self.platform()).await
    }

    async fn publish(&self, cancel: &CancellationToken, content: Content) -> Result<PublishResult> {
        let content = self.prepare(content)?;
        if !self.automation.sessions().exists(self.platform()).await? {
            return Err(PublishError::NotLoggedIn {
                platform: self.platform().to_string(),
            });
        }

        let task = self
            .tasks
            .create_task(TaskType::Publish, self.platform(), content.to_payload()?)
            .await?;
        // Completion is observed through `wait`, so the join handle is not needed
        drop(self.tasks.spawn(task.id));

        let finished = tokio::select! {
            finished = self.tasks.wait(task.id) => finished?,
            _ = cancel.cancelled() => {
                debug!("[{}] Publish {} cancelled by caller", self.platform(), task.id);
                match self.tasks.cancel(task.id).await {
                    Ok(_) | Err(PublishError::AlreadyTerminal { .. }) => {}
                    Err(e) => return Err(e),
                }
                self.tasks.wait(task.id).await?
            }
        };

        Ok(PublishResult::from_task(&finished))
    }

    async fn publish_async(&self, content: Content) -> Result<TaskId> {
        let content = self.prepare(content)?;
        let task = self
            .tasks
            .create_task(TaskType::Publish, self.platform(), content.to_payload()?)
            .await?;
        drop(self.tasks.spawn(task.id));
        info!("[{}] Queued publish task {}", self.platform(), task.id);
        Ok(task.id)
    }

    async fn query_status(&self, task_id: TaskId) -> Result<PublishResult> {
        let task = self.own_task(task_id).await?;
        Ok(PublishResult::from_task(&task))
    }

    async fn cancel(&self, task_id: TaskId) -> Result<()> {
        self.own_task(task_id).await?;
        self.tasks.cancel(task_id).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.automation.close().await
    }
}

impl std::fmt::Debug for SiteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAdapter")
            .field("platform", &self.platform())
            .finish()
    }
}
