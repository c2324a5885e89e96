//! # System wiring
//!
//! [`PublishSystem`] is the composition root: it turns a [`PublisherConfig`] and a
//! browser driver into a session store, an audited task manager with both task handlers
//! registered, and a [`PlatformRegistry`] holding one automation per configured site.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PublishSystem                   │
//! │  ┌────────────┐  ┌─────────────┐  ┌────────────┐ │
//! │  │    Task    │  │  Platform   │  │  Session   │ │
//! │  │  Manager   │──│  Registry   │──│   Store    │ │
//! │  └────────────┘  └─────────────┘  └────────────┘ │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use autopublish::{Content, PublishSystem, PublisherConfig, Publisher};
//! use autopublish::platform::BrowserDriver;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn publish(driver: Arc<dyn BrowserDriver>) -> anyhow::Result<()> {
//!     let system = PublishSystem::new(PublisherConfig::default(), driver).await?;
//!     let adapter = system.adapter("douyin")?;
//!
//!     let content = Content::video("Release day", "/videos/launch.mp4");
//!     let result = adapter.publish(&CancellationToken::new(), content).await?;
//!     println!("{:?}: {:?}", result.status, result.post_url);
//!
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::content::ContentLimits;
use crate::env;
use crate::error::Result as CoreResult;
use crate::platform::{
    AutomationConfig, BrowserDriver, LoginTaskHandler, PlatformRegistry, PublishTaskHandler,
    SiteAdapter, SiteAutomation, SiteProfile, SiteSelectors,
};
use crate::retry::{Clock, RetryExecutor, TokioClock};
use crate::session::SessionStore;
use crate::task::{
    JsonEventStore, Payload, TaskFilter, TaskId, TaskManager, TaskManagerConfig, TaskTracker,
    TaskType,
};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Top-level configuration, usually loaded from `autopublish.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Root for the default cookie and event directories
    pub workspace_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_dir: Option<PathBuf>,
    /// Write task events to disk as JSON records
    pub persist_events: bool,
    pub task: TaskManagerConfig,
    pub automation: AutomationConfig,
    /// Overrides and additions to the built-in site profiles
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<ProfileOverride>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            workspace_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cookie_dir: None,
            event_dir: None,
            persist_events: true,
            task: TaskManagerConfig::default(),
            automation: AutomationConfig::default(),
            platforms: Vec::new(),
        }
    }
}

/// Partial site profile from configuration.
///
/// An entry whose id matches a built-in profile replaces only the fields it sets. Any
/// other id defines a new site and must set every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ContentLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SiteSelectors>,
}

fn enabled_by_default() -> bool {
    true
}

impl ProfileOverride {
    fn apply(self, profile: &mut SiteProfile) {
        if let Some(display_name) = self.display_name {
            profile.display_name = display_name;
        }
        if let Some(login_url) = self.login_url {
            profile.login_url = login_url;
        }
        if let Some(publish_url) = self.publish_url {
            profile.publish_url = publish_url;
        }
        if let Some(cookie_domain) = self.cookie_domain {
            profile.cookie_domain = cookie_domain;
        }
        if let Some(cookie_keys) = self.cookie_keys {
            profile.cookie_keys = cookie_keys;
        }
        if let Some(limits) = self.limits {
            profile.limits = limits;
        }
        if let Some(selectors) = self.selectors {
            profile.selectors = selectors;
        }
    }

    fn into_profile(self) -> Result<SiteProfile> {
        let missing = |field: &str| {
            anyhow::anyhow!(
                "platform '{}' has no built-in profile, so '{}' is required",
                self.id,
                field
            )
        };
        Ok(SiteProfile {
            id: self.id.clone(),
            display_name: self.display_name.clone().unwrap_or_else(|| self.id.clone()),
            login_url: self.login_url.clone().ok_or_else(|| missing("login_url"))?,
            publish_url: self.publish_url.clone().ok_or_else(|| missing("publish_url"))?,
            cookie_domain: self
                .cookie_domain
                .clone()
                .ok_or_else(|| missing("cookie_domain"))?,
            cookie_keys: self
                .cookie_keys
                .clone()
                .ok_or_else(|| missing("cookie_keys"))?,
            limits: self.limits.clone().ok_or_else(|| missing("limits"))?,
            selectors: self.selectors.clone().ok_or_else(|| missing("selectors"))?,
        })
    }
}

impl PublisherConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    pub fn cookie_dir(&self) -> PathBuf {
        self.cookie_dir
            .clone()
            .unwrap_or_else(|| env::cookies_dir_path(&self.workspace_path))
    }

    pub fn event_dir(&self) -> PathBuf {
        self.event_dir
            .clone()
            .unwrap_or_else(|| env::events_dir_path(&self.workspace_path))
    }

    /// Built-in profiles with the configured overrides applied, in declaration order
    pub fn profiles(&self) -> Result<Vec<SiteProfile>> {
        let mut profiles = SiteProfile::builtin();

        for entry in self.platforms.iter().cloned() {
            let position = profiles.iter().position(|p| p.id == entry.id);
            match (entry.enabled, position) {
                (false, Some(index)) => {
                    debug!("Platform {} disabled by configuration", entry.id);
                    profiles.remove(index);
                }
                (false, None) => warn!("Cannot disable unknown platform {}", entry.id),
                (true, Some(index)) => entry.apply(&mut profiles[index]),
                (true, None) => profiles.push(entry.into_profile()?),
            }
        }

        for profile in &profiles {
            profile
                .validate()
                .with_context(|| format!("Invalid configuration for platform {}", profile.id))?;
        }
        Ok(profiles)
    }
}

/// Everything needed to log in and publish, built once at start-up
pub struct PublishSystem {
    config: PublisherConfig,
    driver: Arc<dyn BrowserDriver>,
    sessions: SessionStore,
    tasks: TaskManager,
    registry: PlatformRegistry,
}

impl PublishSystem {
    pub async fn new(config: PublisherConfig, driver: Arc<dyn BrowserDriver>) -> Result<Self> {
        Self::with_clock(config, driver, Arc::new(TokioClock)).await
    }

    /// Build the system with an explicit time source for retries and polling
    pub async fn with_clock(
        config: PublisherConfig,
        driver: Arc<dyn BrowserDriver>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let profiles = config.profiles()?;
        let sessions = SessionStore::new(config.cookie_dir());

        let automations = profiles
            .into_iter()
            .map(|profile| {
                SiteAutomation::new(
                    profile,
                    driver.clone(),
                    sessions.clone(),
                    RetryExecutor::new(clock.clone()),
                    config.automation.clone(),
                )
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let registry = PlatformRegistry::new(automations);

        let tracker = if config.persist_events {
            TaskTracker::new(Some(Arc::new(JsonEventStore::new(config.event_dir()))))
        } else {
            TaskTracker::new(None)
        };
        let tasks = TaskManager::with_tracker(config.task.clone(), tracker);
        tasks
            .register_handler(
                TaskType::Publish,
                Arc::new(PublishTaskHandler::new(registry.clone())),
            )
            .await;
        tasks
            .register_handler(
                TaskType::Login,
                Arc::new(LoginTaskHandler::new(registry.clone())),
            )
            .await;

        info!(
            "Publish system ready for {} platform(s): {}",
            registry.supported_platforms().len(),
            registry.supported_platforms().join(", ")
        );

        Ok(Self {
            config,
            driver,
            sessions,
            tasks,
            registry,
        })
    }

    /// Publisher for one platform
    pub fn adapter(&self, platform: &str) -> CoreResult<SiteAdapter> {
        self.registry.adapter(platform, &self.tasks)
    }

    /// Queue a background login wait; the task completes once the session is saved
    pub async fn start_login(
        &self,
        platform: &str,
        timeout: Option<Duration>,
    ) -> CoreResult<TaskId> {
        self.registry.automation(platform)?;

        let mut payload = Payload::new();
        if let Some(timeout) = timeout {
            payload.insert("timeout_secs".to_string(), timeout.as_secs().into());
        }
        let task = self
            .tasks
            .create_task(TaskType::Login, platform, payload)
            .await?;
        drop(self.tasks.spawn(task.id));
        Ok(task.id)
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Cancel unfinished tasks, wait for them to settle and close the browser
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down publish system...");

        let unfinished: Vec<TaskId> = self
            .tasks
            .list_tasks(&TaskFilter::default())
            .await
            .into_iter()
            .filter(|task| !task.is_terminal())
            .map(|task| task.id)
            .collect();

        for task_id in &unfinished {
            if let Err(e) = self.tasks.cancel(*task_id).await {
                debug!("Task {} finished before cancellation: {}", task_id, e);
            }
        }
        for outcome in join_all(unfinished.iter().map(|id| self.tasks.wait(*id))).await {
            if let Err(e) = outcome {
                warn!("Task did not settle during shutdown: {}", e);
            }
        }

        self.driver
            .close()
            .await
            .context("Failed to close browser driver")?;
        info!("Publish system shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for PublishSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSystem")
            .field("registry", &self.registry)
            .field("cookie_dir", &self.sessions.dir())
            .finish()
    }
}
