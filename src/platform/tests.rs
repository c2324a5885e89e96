use crate::content::Content;
use crate::error::{DriverError, PublishError};
use crate::platform::*;
use crate::retry::{Clock, Jitter, RetryExecutor, TokioClock};
use crate::session::{CookieMap, SessionStore};
use crate::task::{Payload, Task, TaskFilter, TaskManager, TaskManagerConfig, TaskStatus, TaskType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl FakeClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        })
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        tokio::task::yield_now().await;
    }
}

/// What the fake browser shows and everything done to it
#[derive(Default)]
struct BrowserState {
    elements: HashMap<String, Element>,
    cookies: Vec<crate::platform::BrowserCookie>,
    /// Remaining scripted failures per action name
    failures: HashMap<&'static str, u32>,
    /// Action that makes the driver panic
    panic_on: Option<&'static str>,
    calls: Vec<String>,
    opened: usize,
    closed: usize,
    driver_closed: bool,
}

#[derive(Clone, Default)]
struct FakeDriver {
    state: Arc<Mutex<BrowserState>>,
}

impl FakeDriver {
    fn show(&self, element: Element) {
        let mut state = self.state.lock().unwrap();
        state.elements.insert(element.selector.clone(), element);
    }

    fn set_browser_cookies(&self, cookies: &[(&str, &str)]) {
        self.state.lock().unwrap().cookies = cookies
            .iter()
            .map(|(name, value)| BrowserCookie::new(*name, *value, ".douyin.com"))
            .collect();
    }

    fn fail(&self, action: &'static str, times: u32) {
        self.state.lock().unwrap().failures.insert(action, times);
    }

    fn panic_on(&self, action: &'static str) {
        self.state.lock().unwrap().panic_on = Some(action);
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn calls_to(&self, action: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(action))
            .count()
    }

    fn pages(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.opened, state.closed)
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError> {
        self.state.lock().unwrap().opened += 1;
        Ok(Box::new(FakePage {
            state: self.state.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().driver_closed = true;
        Ok(())
    }
}

struct FakePage {
    state: Arc<Mutex<BrowserState>>,
}

impl FakePage {
    fn act(&self, action: &'static str, detail: String) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", action, detail).trim_end().to_string());
        if state.panic_on == Some(action) {
            drop(state);
            panic!("driver crashed during {}", action);
        }
        if let Some(remaining) = state.failures.get_mut(action)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(DriverError::Protocol(format!("scripted {} failure", action)));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.act("navigate", url.to_string())
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Element>, DriverError> {
        self.act("find", selector.to_string())?;
        Ok(self.state.lock().unwrap().elements.get(selector).cloned())
    }

    async fn set_files(&self, selector: &str, paths: &[PathBuf]) -> Result<(), DriverError> {
        self.act("set_files", format!("{} {}", selector, paths.len()))
    }

    async fn input(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.act("input", format!("{} {}", selector, text))
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.act("click", selector.to_string())
    }

    async fn read_cookies(&self) -> Result<Vec<BrowserCookie>, DriverError> {
        self.act("read_cookies", String::new())?;
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), DriverError> {
        self.act("set_cookies", cookies.len().to_string())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

fn element(selector: &str) -> Element {
    Element {
        selector: selector.to_string(),
        attributes: HashMap::new(),
        visible: true,
    }
}

fn quiet_config() -> AutomationConfig {
    AutomationConfig {
        action_jitter: Jitter::NONE,
        settle_delay_ms: 0,
        login_timeout_secs: 10,
        ..Default::default()
    }
}

struct Harness {
    _dir: TempDir,
    media_dir: PathBuf,
    driver: FakeDriver,
    sessions: SessionStore,
    registry: PlatformRegistry,
    tasks: TaskManager,
}

impl Harness {
    async fn new() -> Self {
        Self::build(SiteProfile::douyin(), FakeClock::new(), quiet_config()).await
    }

    async fn build(profile: SiteProfile, clock: Arc<dyn Clock>, config: AutomationConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let media_dir = dir.path().join("media");
        std::fs::create_dir_all(&media_dir).unwrap();

        let driver = FakeDriver::default();
        let sessions = SessionStore::new(dir.path().join("cookies"));
        let automations = [profile, SiteProfile::toutiao()].into_iter().map(|profile| {
            SiteAutomation::new(
                profile,
                Arc::new(driver.clone()),
                sessions.clone(),
                RetryExecutor::new(clock.clone()),
                config.clone(),
            )
            .unwrap()
        });
        let registry = PlatformRegistry::new(automations.collect::<Vec<_>>());

        let tasks = TaskManager::new(TaskManagerConfig::default());
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

        Self {
            _dir: dir,
            media_dir,
            driver,
            sessions,
            registry,
            tasks,
        }
    }

    fn adapter(&self, platform: &str) -> SiteAdapter {
        self.registry.adapter(platform, &self.tasks).unwrap()
    }

    fn media(&self, name: &str) -> PathBuf {
        let path = self.media_dir.join(name);
        std::fs::write(&path, b"fake media").unwrap();
        path
    }

    async fn log_in(&self, platform: &str) {
        let mut cookies = CookieMap::new();
        cookies.insert("sessionid".to_string(), "abc123".to_string());
        self.sessions.save(platform, cookies).await.unwrap();
    }

    /// A douyin publish page that accepts the session
    fn ready_publish_page(&self) {
        self.driver.show(element(".login-avatar"));
        self.driver.show(element("button[type='submit']"));
    }
}

fn image_post(path: &Path) -> Content {
    Content::images("Weekend hike", vec![path.to_path_buf()])
        .with_body("Trail notes")
        .with_tags(["hiking", "#outdoors"])
}

#[tokio::test]
async fn test_publish_success_reports_post_url() {
    let mut profile = SiteProfile::douyin();
    profile.selectors.publish_success = Some(".publish-done".to_string());
    let harness = Harness::build(profile, FakeClock::new(), quiet_config()).await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    let mut done = element(".publish-done");
    done.attributes.insert(
        "href".to_string(),
        "https://www.douyin.com/video/7350000000/".to_string(),
    );
    harness.driver.show(done);

    let adapter = harness.adapter("douyin");
    let image = harness.media("cover.jpg");
    let result = adapter
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap();

    assert!(result.is_success(), "unexpected result: {:?}", result);
    assert_eq!(result.platform, "douyin");
    assert_eq!(result.post_id.as_deref(), Some("7350000000"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://www.douyin.com/video/7350000000/")
    );
    assert!(result.finished_at.is_some());

    let calls = harness.driver.calls();
    assert_eq!(calls[0], "set_cookies 1");
    assert!(calls.contains(&"navigate https://creator.douyin.com/creator-micro/content/publish".to_string()));
    assert!(calls.contains(&"set_files input[type='file'][accept*='image'] 1".to_string()));
    assert!(calls.contains(&"input input[placeholder*='标题'] Weekend hike".to_string()));
    assert!(calls.contains(&"input textarea[placeholder*='正文'] Trail notes".to_string()));
    assert!(calls.contains(&"input input[placeholder*='话题'] #hiking".to_string()));
    assert!(calls.contains(&"input input[placeholder*='话题'] #outdoors".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("find .publish-done"));
    assert_eq!(harness.driver.calls_to("click"), 1);
    assert_eq!(harness.driver.pages(), (1, 1));

    let task = harness.tasks.get_task(result.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    let output = task.result.unwrap();
    assert_eq!(output["content_type"], "images");
    assert!(output.contains_key("published_at"));
}

#[tokio::test]
async fn test_invalid_content_never_reaches_the_browser() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let image = harness.media("cover.jpg");
    let content = Content::images("x".repeat(31), vec![image]);

    let err = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), content)
        .await
        .unwrap_err();

    let violations = err.violations().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field, crate::content::ViolationField::Title);
    assert_eq!(harness.driver.pages(), (0, 0));
    assert!(harness.tasks.list_tasks(&TaskFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_images_post_without_images_never_reaches_the_browser() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let content = Content::images("Weekend hike", vec![]);

    let err = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), content)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    let violations = err.violations().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field, crate::content::ViolationField::Images);
    assert_eq!(harness.driver.pages(), (0, 0));
    assert!(harness.driver.calls().is_empty());
    assert!(harness.tasks.list_tasks(&TaskFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_publish_async_rejects_invalid_content_without_a_task() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let image = harness.media("cover.jpg");
    let content = Content::images("x".repeat(31), vec![image]);

    let err = harness
        .adapter("douyin")
        .publish_async(content)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    assert_eq!(harness.driver.pages(), (0, 0));
    assert!(harness.driver.calls().is_empty());
    assert!(harness.tasks.list_tasks(&TaskFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_claimed_video_size_is_replaced_by_file_size() {
    let mut profile = SiteProfile::douyin();
    profile.limits.max_video_size = 4;
    let harness = Harness::build(profile, FakeClock::new(), quiet_config()).await;
    harness.log_in("douyin").await;
    let video = harness.media("clip.mp4");

    let mut content = Content::video("Clip", &video);
    content.video_size_bytes = Some(1);
    let err = harness
        .adapter("douyin")
        .publish_async(content)
        .await
        .unwrap_err();
    assert_eq!(err.violations().unwrap()[0].field, crate::content::ViolationField::Video);

    // Tasks created directly cannot smuggle a size in through the payload
    let mut payload = Content::video("Clip", &video).to_payload().unwrap();
    payload.insert("video_size_bytes".to_string(), 1.into());
    let task = harness
        .tasks
        .create_task(TaskType::Publish, "douyin", payload)
        .await
        .unwrap();
    harness.tasks.spawn(task.id);
    let task = harness.tasks.wait(task.id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("10 bytes exceeds the limit of 4 bytes"));
    assert_eq!(harness.driver.pages(), (0, 0));
}

#[tokio::test]
async fn test_publish_without_session_is_rejected_up_front() {
    let harness = Harness::new().await;
    let image = harness.media("cover.jpg");

    let err = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::NotLoggedIn { ref platform } if platform == "douyin"));
    assert!(harness.tasks.list_tasks(&TaskFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_missing_media_fails_before_opening_a_page() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let missing = harness.media_dir.join("gone.jpg");

    let result = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&missing))
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    assert!(result.error.unwrap().contains("media file not found"));
    assert_eq!(harness.driver.pages(), (0, 0));
}

#[tokio::test]
async fn test_transient_step_failure_is_retried() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    harness.driver.fail("navigate", 2);
    let image = harness.media("cover.jpg");

    let result = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap();

    assert!(result.is_success(), "unexpected result: {:?}", result);
    assert_eq!(harness.driver.calls_to("navigate"), 3);
}

#[tokio::test]
async fn test_exhausted_step_names_the_step() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    harness.driver.fail("click", 10);
    let image = harness.media("cover.jpg");

    let result = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("submit failed after 3 attempt(s)"), "{}", error);
    assert_eq!(harness.driver.calls_to("click"), 3);
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_hidden_submit_button_is_not_clicked() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    let mut hidden = element("button[type='submit']");
    hidden.visible = false;
    harness.driver.show(hidden);
    let image = harness.media("cover.jpg");

    let result = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    assert!(result.error.unwrap().contains("not interactable"));
    assert_eq!(harness.driver.calls_to("click"), 0);
}

#[tokio::test]
async fn test_flaky_login_check_is_a_step_failure() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    harness.driver.fail("find", 100);
    let image = harness.media("cover.jpg");

    let result = harness
        .adapter("douyin")
        .publish(&CancellationToken::new(), image_post(&image))
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("login-check failed after 3 attempt(s)"), "{}", error);
    assert!(!error.contains("not logged in"));
    assert_eq!(harness.driver.calls_to("set_files"), 0);
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_panicking_driver_still_closes_page() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    harness.driver.panic_on("set_files");
    let image = harness.media("cover.jpg");

    let task_id = harness
        .adapter("douyin")
        .publish_async(image_post(&image))
        .await
        .unwrap();
    let task = harness.tasks.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("task handler panicked"));

    for _ in 0..100 {
        if harness.driver.pages() == (1, 1) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_rejected_session_reports_not_logged_in() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let image = harness.media("cover.jpg");

    let task_id = harness
        .adapter("douyin")
        .publish_async(image_post(&image))
        .await
        .unwrap();
    let task = harness.tasks.wait(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error.as_deref(),
        Some("not logged in to douyin; run the login flow first")
    );
    assert_eq!(harness.driver.calls_to("set_files"), 0);
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_caller_cancel_before_start_skips_browser() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let image = harness.media("cover.jpg");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .adapter("douyin")
        .publish(&cancel, image_post(&image))
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("task cancelled"));
    assert_eq!(harness.driver.pages(), (0, 0));
}

#[tokio::test]
async fn test_caller_cancel_mid_publish_closes_page() {
    let config = AutomationConfig {
        settle_delay_ms: 60_000,
        ..quiet_config()
    };
    let harness = Harness::build(SiteProfile::douyin(), Arc::new(TokioClock), config).await;
    harness.log_in("douyin").await;
    harness.ready_publish_page();
    let image = harness.media("cover.jpg");

    let adapter = harness.adapter("douyin");
    let cancel = CancellationToken::new();
    let publish = {
        let cancel = cancel.clone();
        tokio::spawn(async move { adapter.publish(&cancel, image_post(&image)).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), publish)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(result.status, PublishStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("task cancelled"));
    assert_eq!(harness.driver.calls_to("click"), 0);
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_query_and_cancel_are_scoped_to_the_platform() {
    let harness = Harness::new().await;
    let task = harness
        .tasks
        .create_task(TaskType::Publish, "toutiao", Payload::new())
        .await
        .unwrap();

    let douyin = harness.adapter("douyin");
    assert!(matches!(
        douyin.query_status(task.id).await,
        Err(PublishError::TaskNotFound(id)) if id == task.id
    ));
    assert!(matches!(
        douyin.cancel(task.id).await,
        Err(PublishError::TaskNotFound(_))
    ));

    let toutiao = harness.adapter("toutiao");
    assert_eq!(
        toutiao.query_status(task.id).await.unwrap().status,
        PublishStatus::Pending
    );
    toutiao.cancel(task.id).await.unwrap();
    let status = toutiao.query_status(task.id).await.unwrap();
    assert_eq!(status.status, PublishStatus::Failed);
    assert_eq!(status.error.as_deref(), Some("task cancelled"));
}

#[tokio::test]
async fn test_login_reuses_saved_session() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;

    let result = harness
        .adapter("douyin")
        .login(&CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(harness.driver.pages(), (0, 0));
}

#[tokio::test]
async fn test_login_returns_qr_code() {
    let harness = Harness::new().await;
    let mut qrcode = element(".qrcode-img");
    qrcode
        .attributes
        .insert("src".to_string(), "data:image/png;base64,iVBOR".to_string());
    harness.driver.show(qrcode);

    let result = harness
        .adapter("douyin")
        .login(&CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.qrcode_ref.as_deref(), Some("data:image/png;base64,iVBOR"));
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_login_without_qr_code_reports_error() {
    let harness = Harness::new().await;

    let result = harness
        .adapter("douyin")
        .login(&CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.qrcode_ref.is_none());
    assert!(result.error.unwrap().contains(".qrcode-img"));
}

#[tokio::test]
async fn test_wait_for_login_saves_curated_cookies() {
    let harness = Harness::new().await;
    harness.driver.show(element(".login-avatar"));
    harness.driver.set_browser_cookies(&[
        ("sessionid", "s1"),
        ("tt_webid", "w1"),
        ("_ga", "tracking"),
    ]);

    harness
        .adapter("douyin")
        .wait_for_login(&CancellationToken::new(), Duration::from_secs(30))
        .await
        .unwrap();

    let session = harness.sessions.load("douyin").await.unwrap().unwrap();
    let names: Vec<_> = session.cookies.keys().cloned().collect();
    assert_eq!(names, vec!["sessionid".to_string(), "tt_webid".to_string()]);
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_wait_for_login_times_out() {
    let harness = Harness::new().await;

    let err = harness
        .adapter("douyin")
        .wait_for_login(&CancellationToken::new(), Duration::from_secs(10))
        .await
        .unwrap_err();

    assert!(
        matches!(err, PublishError::Timeout { ref operation, elapsed } if operation == "wait_for_login" && elapsed >= Duration::from_secs(10))
    );
    assert!(!harness.sessions.exists("douyin").await.unwrap());
    assert_eq!(harness.driver.pages(), (1, 1));
}

#[tokio::test]
async fn test_login_task_records_session() {
    let harness = Harness::new().await;
    harness.driver.show(element(".login-avatar"));
    harness.driver.set_browser_cookies(&[("sessionid", "s1")]);

    let mut payload = Payload::new();
    payload.insert("timeout_secs".to_string(), 20.into());
    let task = harness
        .tasks
        .create_task(TaskType::Login, "douyin", payload)
        .await
        .unwrap();
    let task = harness.tasks.execute(task.id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    let result = task.result.unwrap();
    assert_eq!(result["logged_in"], true);
    assert_eq!(result["cookie_count"], 1);
}

#[tokio::test]
async fn test_check_login_status_probes() {
    let harness = Harness::new().await;
    let adapter = harness.adapter("douyin");

    assert!(!adapter.check_login_status(LoginProbe::Cached).await.unwrap());
    assert!(!adapter.check_login_status(LoginProbe::Live).await.unwrap());
    assert_eq!(harness.driver.pages(), (0, 0));

    harness.log_in("douyin").await;
    assert!(adapter.check_login_status(LoginProbe::Cached).await.unwrap());
    assert_eq!(harness.driver.pages(), (0, 0));

    assert!(!adapter.check_login_status(LoginProbe::Live).await.unwrap());
    harness.driver.show(element(".login-avatar"));
    assert!(adapter.check_login_status(LoginProbe::Live).await.unwrap());
    assert_eq!(harness.driver.pages(), (2, 2));
}

#[tokio::test]
async fn test_logout_removes_session() {
    let harness = Harness::new().await;
    harness.log_in("douyin").await;
    let adapter = harness.adapter("douyin");

    assert!(adapter.logout().await.unwrap());
    assert!(!adapter.logout().await.unwrap());
    assert!(!adapter.check_login_status(LoginProbe::Cached).await.unwrap());
}

#[tokio::test]
async fn test_close_shuts_down_driver() {
    let harness = Harness::new().await;
    harness.adapter("douyin").close().await.unwrap();
    assert!(harness.driver.state.lock().unwrap().driver_closed);
}

#[tokio::test]
async fn test_registry_rejects_unknown_platform() {
    let harness = Harness::new().await;

    assert_eq!(
        harness.registry.supported_platforms(),
        vec!["douyin".to_string(), "toutiao".to_string()]
    );
    assert!(!harness.registry.is_supported("weibo"));
    assert!(matches!(
        harness.registry.adapter("weibo", &harness.tasks),
        Err(PublishError::PlatformUnsupported(ref p)) if p == "weibo"
    ));
}

#[test]
fn test_publish_result_from_task() {
    let mut task = Task::new(TaskType::Publish, "douyin", Payload::new());
    assert_eq!(PublishResult::from_task(&task).status, PublishStatus::Pending);

    task.transition(TaskStatus::Running).unwrap();
    assert_eq!(
        PublishResult::from_task(&task).status,
        PublishStatus::Processing
    );

    let mut output = Payload::new();
    output.insert("post_id".to_string(), "42".into());
    output.insert("post_url".to_string(), "https://example.com/p/42".into());
    task.complete(output).unwrap();
    let result = PublishResult::from_task(&task);
    assert!(result.is_success());
    assert_eq!(result.post_id.as_deref(), Some("42"));
    assert_eq!(result.post_url.as_deref(), Some("https://example.com/p/42"));

    let mut cancelled = Task::new(TaskType::Publish, "douyin", Payload::new());
    cancelled.cancel().unwrap();
    let result = PublishResult::from_task(&cancelled);
    assert_eq!(result.status, PublishStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("task cancelled"));
}

#[test]
fn test_builtin_profiles_are_valid() {
    let profiles = SiteProfile::builtin();
    let ids: Vec<_> = profiles.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["douyin", "toutiao", "xiaohongshu"]);
    for profile in &profiles {
        profile.validate().unwrap();
    }

    assert_eq!(SiteProfile::toutiao().limits.title_max_length, 30);
    assert_eq!(SiteProfile::xiaohongshu().limits.title_max_length, 20);
    assert_eq!(SiteProfile::xiaohongshu().limits.max_images, 18);
    assert!(SiteProfile::builtin_by_id("weibo").is_none());
}

#[test]
fn test_profile_validation_rejects_broken_profiles() {
    let mut bad_url = SiteProfile::douyin();
    bad_url.publish_url = "ftp://creator.douyin.com".to_string();
    assert!(matches!(
        bad_url.validate(),
        Err(PublishError::InvalidProfile { ref reason, .. }) if reason.contains("publish_url")
    ));

    let mut no_keys = SiteProfile::douyin();
    no_keys.cookie_keys.clear();
    assert!(no_keys.validate().is_err());

    let mut blank_selector = SiteProfile::douyin();
    blank_selector.selectors.submit_button = "  ".to_string();
    assert!(matches!(
        blank_selector.validate(),
        Err(PublishError::InvalidProfile { ref reason, .. }) if reason.contains("submit_button")
    ));

    let mut bad_id = SiteProfile::douyin();
    bad_id.id = "Dou Yin".to_string();
    let err = SiteAutomation::new(
        bad_id,
        Arc::new(FakeDriver::default()),
        SessionStore::new("unused"),
        RetryExecutor::default(),
        AutomationConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "invalid_profile");
}
