//! # Autopublish
//!
//! Publishes image and video posts to content platforms (douyin, toutiao, xiaohongshu)
//! by driving a browser. Every publish runs as a tracked task with a durable,
//! queryable outcome, reuses saved login sessions and retries flaky UI steps.
//!
//! ## Architecture Overview
//!
//! Leaf modules first:
//!
//! - **[`session`]**: per-platform cookie persistence with a read-through cache
//! - **[`content`]**: content model, platform limits and the pure validator
//! - **[`retry`]**: bounded retries with linear backoff, polling with timeout, injectable clock
//! - **[`platform`]**: site profiles, the generic site automation and the [`Publisher`] contract
//! - **[`task`]**: task state machine, concurrent execution, cancellation and audit events
//! - **[`integration`]**: [`PublishSystem`], the composition root
//!
//! The browser itself is not part of the crate. Plug one in by implementing
//! [`platform::BrowserDriver`] and [`platform::BrowserPage`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autopublish::{Content, LoginProbe, PublishSystem, PublisherConfig, Publisher};
//! use autopublish::platform::BrowserDriver;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(driver: Arc<dyn BrowserDriver>) -> anyhow::Result<()> {
//!     let system = PublishSystem::new(PublisherConfig::default(), driver).await?;
//!     let douyin = system.adapter("douyin")?;
//!     let cancel = CancellationToken::new();
//!
//!     if !douyin.check_login_status(LoginProbe::Cached).await? {
//!         let login = douyin.login(&cancel).await?;
//!         println!("Scan this QR code: {:?}", login.qrcode_ref);
//!         douyin.wait_for_login(&cancel, Duration::from_secs(300)).await?;
//!     }
//!
//!     let post = Content::images("Weekend hike", vec!["/photos/trail.jpg".into()])
//!         .with_tags(["hiking"]);
//!     let task_id = douyin.publish_async(post).await?;
//!     let outcome = system.tasks().wait(task_id).await?;
//!     println!("Task {} finished as {}", task_id, outcome.status);
//!
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```

/// Content model and validation against platform limits.
pub mod content;

/// Error types shared by every module.
pub mod error;

/// Retry, backoff and polling primitives.
///
/// Everything that waits goes through an injected [`retry::Clock`], so tests can run
/// backoff schedules instantly.
pub mod retry;

/// Per-platform login session persistence.
pub mod session;

/// Asynchronous task management.
///
/// Provides the task state machine, handler registry, bounded concurrent execution,
/// cooperative cancellation and per-task audit events.
pub mod task;

/// Platform adapters.
pub mod platform;

/// System wiring and top-level configuration.
pub mod integration;

/// Environment constants and path utilities.
///
/// Centralizes all hardcoded paths and directory names used throughout
/// the application for easier maintenance and consistency.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use content::{Content, ContentLimits, ContentType, Violation, ViolationField, validate};
pub use error::{DriverError, PublishError, Result};
pub use integration::{ProfileOverride, PublishSystem, PublisherConfig};
pub use platform::{
    LoginProbe, LoginResult, PlatformRegistry, PublishResult, PublishStatus, Publisher,
    SiteAdapter, SiteProfile,
};
pub use session::{SessionCookie, SessionStore};
pub use task::{Task, TaskId, TaskManager, TaskManagerConfig, TaskStatus, TaskType};
