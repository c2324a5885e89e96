//! Browser automation capability consumed by the site automations.
//!
//! The crate does not ship a browser. Callers plug in a driver (CDP, WebDriver or a
//! test double) by implementing [`BrowserDriver`] and [`BrowserPage`].

use crate::error::DriverError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// A cookie as read from or written to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }
}

/// Element matched by a selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub selector: String,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Opens pages
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError>;

    /// Shut the browser down. Pages opened earlier become unusable.
    async fn close(&self) -> Result<(), DriverError>;
}

/// One browser tab. Implementations synchronise internally so a page can be polled
/// from shared references.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// `Ok(None)` when nothing matches the selector right now
    async fn find_element(&self, selector: &str) -> Result<Option<Element>, DriverError>;

    async fn set_files(&self, selector: &str, paths: &[PathBuf]) -> Result<(), DriverError>;

    async fn input(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    async fn read_cookies(&self) -> Result<Vec<BrowserCookie>, DriverError>;

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// An open page that is closed on every exit path.
///
/// [`OpenPage::release`] closes it in place. If the guard is dropped unreleased (a
/// panicking driver, an aborted future) the close is spawned onto the current runtime.
pub struct OpenPage {
    page: Arc<dyn BrowserPage>,
    released: bool,
}

impl OpenPage {
    pub fn new(page: Box<dyn BrowserPage>) -> Self {
        Self {
            page: Arc::from(page),
            released: false,
        }
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    pub async fn release(mut self) -> Result<(), DriverError> {
        self.released = true;
        self.page.close().await
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let page = self.page.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("Failed to close abandoned page: {}", e);
                    }
                });
            }
            Err(_) => warn!("Page dropped outside a runtime; it stays open"),
        }
    }
}
