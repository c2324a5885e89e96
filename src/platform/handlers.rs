use crate::content::{Content, ensure_valid};
use crate::error::Result;
use crate::platform::registry::PlatformRegistry;
use crate::task::{Payload, Task, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Runs `publish` tasks: decodes the payload, re-validates it and drives the site
pub struct PublishTaskHandler {
    registry: PlatformRegistry,
}

impl PublishTaskHandler {
    pub fn new(registry: PlatformRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TaskHandler for PublishTaskHandler {
    async fn handle(&self, task: Task, ctx: TaskContext) -> Result<Payload> {
        let automation = self.registry.automation(&task.platform)?;

        let mut content = Content::from_payload(&task.payload)?;
        content.probe_media();
        // Tasks may be created directly, bypassing the adapter's validation
        ensure_valid(&content, &automation.profile().limits)?;
        ctx.report_progress(5, "content validated").await;

        automation.run_publish(&content, &ctx).await
    }
}

/// Runs `login` tasks: waits for the user to finish a QR login.
///
/// The payload may carry `timeout_secs`; otherwise the automation's configured login
/// timeout applies.
pub struct LoginTaskHandler {
    registry: PlatformRegistry,
}

impl LoginTaskHandler {
    pub fn new(registry: PlatformRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TaskHandler for LoginTaskHandler {
    async fn handle(&self, task: Task, ctx: TaskContext) -> Result<Payload> {
        let automation = self.registry.automation(&task.platform)?;
        let timeout = task
            .payload
            .get("timeout_secs")
            .and_then(|value| value.as_u64())
            .map(Duration::from_secs)
            .unwrap_or_else(|| automation.config().login_timeout());

        info!(
            "[{}] Waiting up to {}s for login",
            task.platform,
            timeout.as_secs()
        );
        let session = automation
            .wait_for_login(ctx.cancel_token(), timeout)
            .await?;

        let mut result = Payload::new();
        result.insert("logged_in".to_string(), true.into());
        result.insert("platform".to_string(), task.platform.clone().into());
        result.insert(
            "cookie_count".to_string(),
            (session.cookies.len() as u64).into(),
        );
        Ok(result)
    }
}
