use crate::content::{Content, ContentType};
use crate::error::{DriverError, PublishError, Result};
use crate::platform::driver::{BrowserCookie, BrowserDriver, BrowserPage, Element, OpenPage};
use crate::platform::profile::SiteProfile;
use crate::platform::traits::{LoginProbe, LoginResult};
use crate::retry::{Jitter, PollError, PollOptions, RetryError, RetryExecutor, RetryPolicy, poll_until};
use crate::session::{CookieMap, SessionCookie, SessionStore, extract_curated};
use crate::task::{Payload, TaskContext};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Timing knobs for browser automation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AutomationConfig {
    /// Attempts per sub-step, including the first
    pub step_attempts: u32,
    /// Linear backoff unit between sub-step attempts
    pub step_base_delay_ms: u64,
    /// Extra random delay added to each backoff
    pub retry_jitter: Jitter,
    /// Humanized pause between UI actions
    pub action_jitter: Jitter,
    pub poll_interval_ms: u64,
    pub login_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    /// Fixed wait used when a profile has no completion selector
    pub settle_delay_ms: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            step_attempts: 3,
            step_base_delay_ms: 2000,
            retry_jitter: Jitter::NONE,
            action_jitter: Jitter {
                min_ms: 500,
                max_ms: 1000,
            },
            poll_interval_ms: 2000,
            login_timeout_secs: 300,
            upload_timeout_secs: 600,
            confirm_timeout_secs: 60,
            settle_delay_ms: 5000,
        }
    }
}

impl AutomationConfig {
    pub fn step_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.step_attempts,
            Duration::from_millis(self.step_base_delay_ms),
        )
        .with_jitter(self.retry_jitter)
    }

    pub fn poll_options(&self, timeout: Duration) -> PollOptions {
        PollOptions::new(Duration::from_millis(self.poll_interval_ms), timeout)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

/// Drives one site through its profile: login, session checks and the publish flow
pub struct SiteAutomation {
    profile: SiteProfile,
    driver: Arc<dyn BrowserDriver>,
    sessions: SessionStore,
    retry: RetryExecutor,
    config: AutomationConfig,
}

impl SiteAutomation {
    pub fn new(
        profile: SiteProfile,
        driver: Arc<dyn BrowserDriver>,
        sessions: SessionStore,
        retry: RetryExecutor,
        config: AutomationConfig,
    ) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            profile,
            driver,
            sessions,
            retry,
            config,
        })
    }

    pub fn platform(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Report an existing session or fetch the login QR code
    pub async fn login(&self, cancel: &CancellationToken) -> Result<LoginResult> {
        if self.sessions.exists(self.platform()).await? {
            info!("[{}] Already logged in", self.platform());
            return Ok(LoginResult::logged_in());
        }

        let page = OpenPage::new(self.driver.new_page().await?);
        let outcome = self.login_on_page(page.page(), cancel).await;
        self.release(page).await;
        outcome
    }

    async fn login_on_page(
        &self,
        page: &dyn BrowserPage,
        cancel: &CancellationToken,
    ) -> Result<LoginResult> {
        let url = self.profile.login_url.as_str();
        self.step("navigate", cancel, move |_| page.navigate(url))
            .await?;
        self.retry.pause(self.config.action_jitter, cancel).await?;

        // A browser profile that is still logged in needs no QR scan
        if page
            .find_element(&self.profile.selectors.login_indicator)
            .await?
            .is_some()
            && self.capture_session(page).await?.is_some()
        {
            return Ok(LoginResult::logged_in());
        }

        let selectors = &self.profile.selectors;
        let qrcode = page
            .find_element(&selectors.qrcode)
            .await?
            .and_then(|element| {
                element
                    .attribute(&selectors.qrcode_attribute)
                    .map(str::to_string)
            });

        match qrcode {
            Some(qrcode_ref) => {
                info!("[{}] Waiting for QR code scan", self.platform());
                Ok(LoginResult {
                    success: false,
                    qrcode_ref: Some(qrcode_ref),
                    error: None,
                })
            }
            None => {
                warn!("[{}] Login page shows no QR code", self.platform());
                Ok(LoginResult {
                    success: false,
                    qrcode_ref: None,
                    error: Some(format!("no QR code found at {}", selectors.qrcode)),
                })
            }
        }
    }

    /// Poll the login page until the user is logged in, then persist the curated cookies
    pub async fn wait_for_login(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Arc<SessionCookie>> {
        let page = OpenPage::new(self.driver.new_page().await?);
        let outcome = self.wait_for_login_on_page(page.page(), cancel, timeout).await;
        self.release(page).await;
        outcome
    }

    async fn wait_for_login_on_page(
        &self,
        page: &dyn BrowserPage,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Arc<SessionCookie>> {
        let url = self.profile.login_url.as_str();
        self.step("navigate", cancel, move |_| page.navigate(url))
            .await?;

        let indicator = self.profile.selectors.login_indicator.as_str();
        let keys = &self.profile.cookie_keys;
        let curated = poll_until(
            self.retry.clock().as_ref(),
            cancel,
            self.config.poll_options(timeout),
            move || logged_in_cookies(page, indicator, keys),
        )
        .await
        .map_err(|e| poll_failure("wait_for_login", e))?;

        let session = self.sessions.save(self.platform(), curated).await?;
        info!(
            "[{}] Login complete, saved {} cookie(s)",
            self.platform(),
            session.cookies.len()
        );
        Ok(session)
    }

    /// Whether the platform has a usable session
    pub async fn check_login_status(&self, probe: LoginProbe) -> Result<bool> {
        let Some(session) = self.sessions.load(self.platform()).await? else {
            return Ok(false);
        };
        if probe == LoginProbe::Cached {
            return Ok(true);
        }

        let page = OpenPage::new(self.driver.new_page().await?);
        let outcome = self.probe_session(page.page(), &session).await;
        self.release(page).await;
        outcome
    }

    async fn probe_session(&self, page: &dyn BrowserPage, session: &SessionCookie) -> Result<bool> {
        let cancel = CancellationToken::new();
        let cookies = self.browser_cookies(session);
        let cookies = cookies.as_slice();
        self.step("restore-session", &cancel, move |_| page.set_cookies(cookies))
            .await?;
        let url = self.profile.publish_url.as_str();
        self.step("navigate", &cancel, move |_| page.navigate(url))
            .await?;

        let logged_in = page
            .find_element(&self.profile.selectors.login_indicator)
            .await?
            .is_some();
        debug!("[{}] Live login probe: {}", self.platform(), logged_in);
        Ok(logged_in)
    }

    /// Run the full publish flow for already validated content.
    ///
    /// Media files and the saved session are checked before a page is opened. Exactly one
    /// page is used and it is closed on every exit path.
    pub async fn run_publish(&self, content: &Content, ctx: &TaskContext) -> Result<Payload> {
        for path in content.media_paths() {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(PublishError::MediaNotFound(path));
            }
        }

        let session = self
            .sessions
            .load(self.platform())
            .await?
            .ok_or_else(|| PublishError::NotLoggedIn {
                platform: self.platform().to_string(),
            })?;

        ctx.check_cancelled()?;
        let page = OpenPage::new(self.driver.new_page().await?);
        let outcome = self
            .publish_on_page(page.page(), content, &session, ctx)
            .await;
        self.release(page).await;

        match &outcome {
            Ok(_) => info!("[{}] Publish finished", self.platform()),
            Err(e) => warn!("[{}] Publish failed: {}", self.platform(), e),
        }
        outcome
    }

    async fn publish_on_page(
        &self,
        page: &dyn BrowserPage,
        content: &Content,
        session: &SessionCookie,
        ctx: &TaskContext,
    ) -> Result<Payload> {
        let cancel = ctx.cancel_token();
        let selectors = &self.profile.selectors;

        let cookies = self.browser_cookies(session);
        let cookies = cookies.as_slice();
        self.step("restore-session", cancel, move |_| page.set_cookies(cookies))
            .await?;

        let url = self.profile.publish_url.as_str();
        self.step("navigate", cancel, move |_| page.navigate(url))
            .await?;
        self.retry.pause(self.config.action_jitter, cancel).await?;
        ctx.report_progress(10, "publish page opened").await;

        // Driver faults stay step failures; only a clean miss means the session is gone
        let indicator = selectors.login_indicator.as_str();
        self.step("login-check", cancel, move |_| async move {
            page.find_element(indicator).await?.map(|_| ()).ok_or_else(|| {
                DriverError::ElementNotFound {
                    selector: indicator.to_string(),
                }
            })
        })
        .await
        .map_err(|e| match e {
            PublishError::StepFailed {
                source: DriverError::ElementNotFound { .. },
                ..
            } => PublishError::NotLoggedIn {
                platform: self.platform().to_string(),
            },
            other => other,
        })?;
        ctx.report_progress(20, "session accepted").await;

        self.upload_media(page, content, ctx).await?;

        if let Some(done) = selectors.upload_complete.as_deref() {
            let timeout = Duration::from_secs(self.config.upload_timeout_secs);
            self.wait_for_element(page, "wait-upload", done, timeout, cancel)
                .await?;
        } else {
            self.settle(cancel).await?;
        }
        ctx.report_progress(60, "media uploaded").await;

        let title_input = selectors.title_input.as_str();
        let title = content.title.as_str();
        self.step("fill-title", cancel, move |_| page.input(title_input, title))
            .await?;
        self.retry.pause(self.config.action_jitter, cancel).await?;

        if !content.body.is_empty() {
            let body_input = selectors.body_input.as_str();
            let body = content.body.as_str();
            self.step("fill-body", cancel, move |_| page.input(body_input, body))
                .await?;
            self.retry.pause(self.config.action_jitter, cancel).await?;
        }

        let tag_input = selectors.tag_input.as_str();
        for tag in &content.tags {
            let topic = format!("#{}", tag.trim_start_matches('#'));
            let topic = topic.as_str();
            self.step("fill-tags", cancel, move |_| page.input(tag_input, topic))
                .await?;
            self.retry.pause(self.config.action_jitter, cancel).await?;
        }
        ctx.report_progress(80, "content filled").await;

        let submit = selectors.submit_button.as_str();
        self.step("submit", cancel, move |_| async move {
            match page.find_element(submit).await? {
                None => Err(DriverError::ElementNotFound {
                    selector: submit.to_string(),
                }),
                Some(button) if !button.visible => Err(DriverError::NotInteractable {
                    selector: submit.to_string(),
                }),
                Some(_) => page.click(submit).await,
            }
        })
        .await?;
        ctx.report_progress(90, "submitted").await;

        let mut result = Payload::new();
        result.insert("platform".to_string(), self.platform().into());
        result.insert("content_type".to_string(), content.content_type.as_str().into());

        if let Some(success) = selectors.publish_success.as_deref() {
            let timeout = Duration::from_secs(self.config.confirm_timeout_secs);
            let element = self
                .wait_for_element(page, "confirm-publish", success, timeout, cancel)
                .await?;
            if let Some(post_url) = element.attribute(&selectors.post_url_attribute) {
                if let Some(post_id) = post_id_from_url(post_url) {
                    result.insert("post_id".to_string(), post_id.into());
                }
                result.insert("post_url".to_string(), post_url.into());
            }
        } else {
            self.settle(cancel).await?;
        }

        result.insert("published_at".to_string(), Utc::now().to_rfc3339().into());
        Ok(result)
    }

    async fn upload_media(&self, page: &dyn BrowserPage, content: &Content, ctx: &TaskContext) -> Result<()> {
        let cancel = ctx.cancel_token();
        let selectors = &self.profile.selectors;

        match content.content_type {
            ContentType::Video => {
                let paths = content.media_paths();
                let paths = paths.as_slice();
                let input = selectors.video_input.as_str();
                info!("[{}] Uploading video", self.platform());
                self.step("upload-video", cancel, move |_| page.set_files(input, paths))
                    .await?;
            }
            ContentType::Images => {
                let input = selectors.image_input.as_str();
                let total = content.image_paths.len();
                for (index, path) in content.image_paths.iter().enumerate() {
                    debug!(
                        "[{}] Uploading image {}/{}: {}",
                        self.platform(),
                        index + 1,
                        total,
                        path.display()
                    );
                    let paths = std::slice::from_ref(path);
                    self.step("upload-image", cancel, move |_| page.set_files(input, paths))
                        .await?;
                    self.retry.pause(self.config.action_jitter, cancel).await?;

                    let progress = 20 + (30 * (index + 1) / total.max(1)) as u8;
                    ctx.report_progress(progress, format!("uploaded image {}/{}", index + 1, total))
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Run one browser sub-step under the retry policy
    async fn step<T, F, Fut>(&self, name: &str, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, DriverError>>,
    {
        debug!("[{}] Step {}", self.platform(), name);
        self.retry
            .run(&self.config.step_policy(), cancel, operation)
            .await
            .map_err(|e| match e {
                RetryError::Cancelled { .. } => PublishError::Cancelled,
                RetryError::Exhausted { attempts, last } | RetryError::Aborted { attempts, last } => {
                    PublishError::StepFailed {
                        step: name.to_string(),
                        attempts,
                        source: last,
                    }
                }
            })
    }

    async fn wait_for_element(
        &self,
        page: &dyn BrowserPage,
        step: &str,
        selector: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Element> {
        debug!("[{}] Step {}", self.platform(), step);
        poll_until(
            self.retry.clock().as_ref(),
            cancel,
            self.config.poll_options(timeout),
            move || lookup(page, selector),
        )
        .await
        .map_err(|e| match e {
            PollError::TimedOut { elapsed, polls } => PublishError::StepFailed {
                step: step.to_string(),
                attempts: polls,
                source: DriverError::Timeout(elapsed.as_millis() as u64),
            },
            PollError::Cancelled => PublishError::Cancelled,
            PollError::Failed(source) => PublishError::StepFailed {
                step: step.to_string(),
                attempts: 1,
                source,
            },
        })
    }

    async fn settle(&self, cancel: &CancellationToken) -> Result<()> {
        let delay = Duration::from_millis(self.config.settle_delay_ms);
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PublishError::Cancelled),
            _ = self.retry.clock().sleep(delay) => Ok(()),
        }
    }

    /// Save the curated cookies of a logged-in page, if any are present
    async fn capture_session(&self, page: &dyn BrowserPage) -> Result<Option<Arc<SessionCookie>>> {
        let jar = page.read_cookies().await?;
        let curated: CookieMap = extract_curated(
            jar.iter().map(|c| (c.name.as_str(), c.value.as_str())),
            &self.profile.cookie_keys,
        );
        if curated.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.sessions.save(self.platform(), curated).await?))
    }

    fn browser_cookies(&self, session: &SessionCookie) -> Vec<BrowserCookie> {
        session
            .cookies
            .iter()
            .map(|(name, value)| BrowserCookie::new(name, value, &self.profile.cookie_domain))
            .collect()
    }

    async fn release(&self, page: OpenPage) {
        if let Err(e) = page.release().await {
            warn!("[{}] Failed to close page: {}", self.platform(), e);
        }
    }

    /// Shut down the shared browser
    pub async fn close(&self) -> Result<()> {
        self.driver.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SiteAutomation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAutomation")
            .field("platform", &self.profile.id)
            .field("config", &self.config)
            .finish()
    }
}

/// Element lookup for polling: transient driver errors count as "not there yet"
async fn lookup(page: &dyn BrowserPage, selector: &str) -> std::result::Result<Option<Element>, DriverError> {
    match page.find_element(selector).await {
        Ok(found) => Ok(found),
        Err(e) if e.is_transient() => {
            debug!("Lookup of {} failed: {}", selector, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Curated cookies once the page shows the login indicator and a session cookie
async fn logged_in_cookies(
    page: &dyn BrowserPage,
    indicator: &str,
    keys: &[String],
) -> std::result::Result<Option<CookieMap>, DriverError> {
    if lookup(page, indicator).await?.is_none() {
        return Ok(None);
    }
    let jar = page.read_cookies().await?;
    let curated = extract_curated(jar.iter().map(|c| (c.name.as_str(), c.value.as_str())), keys);
    if curated.is_empty() {
        debug!("Login indicator present but no session cookie yet");
        return Ok(None);
    }
    Ok(Some(curated))
}

fn poll_failure(operation: &str, error: PollError<DriverError>) -> PublishError {
    match error {
        PollError::TimedOut { elapsed, .. } => PublishError::Timeout {
            operation: operation.to_string(),
            elapsed,
        },
        PollError::Cancelled => PublishError::Cancelled,
        PollError::Failed(e) => PublishError::Driver(e),
    }
}

/// Last non-empty path segment of a post URL
fn post_id_from_url(post_url: &str) -> Option<String> {
    let url = Url::parse(post_url).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
