//! End-to-end publish flows through the public API with a scripted browser.

use async_trait::async_trait;
use autopublish::platform::{BrowserCookie, BrowserDriver, BrowserPage, Element};
use autopublish::retry::Clock;
use autopublish::session::CookieMap;
use autopublish::task::TaskEventType;
use autopublish::{
    Content, DriverError, PublishStatus, PublishSystem, Publisher, PublisherConfig, TaskManagerConfig,
    TaskStatus,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct InstantClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

#[async_trait]
impl Clock for InstantClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        tokio::task::yield_now().await;
    }
}

/// What the scripted browser observed
#[derive(Default)]
struct Counters {
    open_pages: Mutex<usize>,
    peak_pages: Mutex<usize>,
    uploads: Mutex<Vec<PathBuf>>,
}

/// Every site looks logged in and every action succeeds
#[derive(Default)]
struct HappyBrowser {
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserDriver for HappyBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError> {
        let mut open = self.counters.open_pages.lock().unwrap();
        *open += 1;
        let mut peak = self.counters.peak_pages.lock().unwrap();
        *peak = (*peak).max(*open);
        Ok(Box::new(HappyPage {
            counters: self.counters.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct HappyPage {
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserPage for HappyPage {
    async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Element>, DriverError> {
        Ok(Some(Element {
            selector: selector.to_string(),
            attributes: HashMap::new(),
            visible: true,
        }))
    }

    async fn set_files(&self, _selector: &str, paths: &[PathBuf]) -> Result<(), DriverError> {
        self.counters.uploads.lock().unwrap().extend_from_slice(paths);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn input(&self, _selector: &str, _text: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn read_cookies(&self) -> Result<Vec<BrowserCookie>, DriverError> {
        Ok(vec![BrowserCookie::new("sessionid", "fresh", ".douyin.com")])
    }

    async fn set_cookies(&self, _cookies: &[BrowserCookie]) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        *self.counters.open_pages.lock().unwrap() -= 1;
        Ok(())
    }
}

async fn system_in(temp: &TempDir, browser: Arc<HappyBrowser>, max_concurrent_tasks: usize) -> PublishSystem {
    let mut config = PublisherConfig {
        workspace_path: temp.path().to_path_buf(),
        task: TaskManagerConfig {
            max_concurrent_tasks,
        },
        ..Default::default()
    };
    config.automation.settle_delay_ms = 0;

    let clock = Arc::new(InstantClock {
        start: Instant::now(),
        elapsed: Mutex::new(Duration::ZERO),
    });
    PublishSystem::with_clock(config, browser, clock).await.unwrap()
}

async fn save_session(system: &PublishSystem, platform: &str) {
    let mut cookies = CookieMap::new();
    cookies.insert("sessionid".to_string(), "saved".to_string());
    system.sessions().save(platform, cookies).await.unwrap();
}

fn media(temp: &TempDir, name: &str) -> PathBuf {
    let path = temp.path().join(name);
    std::fs::write(&path, vec![0u8; 1024]).unwrap();
    path
}

#[tokio::test]
async fn test_video_publish_end_to_end() {
    let temp = TempDir::new().unwrap();
    let browser = Arc::new(HappyBrowser::default());
    let system = system_in(&temp, browser.clone(), 3).await;
    save_session(&system, "douyin").await;
    let video = media(&temp, "launch.mp4");

    let douyin = system.adapter("douyin").unwrap();
    let result = douyin
        .publish(
            &CancellationToken::new(),
            Content::video("Launch day", &video).with_tags(["release"]),
        )
        .await
        .unwrap();

    assert_eq!(result.status, PublishStatus::Success);
    assert_eq!(*browser.counters.uploads.lock().unwrap(), vec![video]);
    assert_eq!(*browser.counters.open_pages.lock().unwrap(), 0);

    let history = system
        .tasks()
        .tracker()
        .history(result.task_id, None)
        .await
        .unwrap();
    assert_eq!(history.first().unwrap().event_type, TaskEventType::Created);
    assert_eq!(history[1].event_type, TaskEventType::Started);
    assert_eq!(history.last().unwrap().event_type, TaskEventType::Completed);
    let progress: Vec<u8> = history.iter().map(|event| event.progress).collect();
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", progress);
    assert_eq!(*progress.last().unwrap(), 100);

    let day_dirs = std::fs::read_dir(temp.path().join(".autopublish/events"))
        .unwrap()
        .count();
    assert_eq!(day_dirs, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_async_publishes_respect_concurrency_limit() {
    let temp = TempDir::new().unwrap();
    let browser = Arc::new(HappyBrowser::default());
    let system = system_in(&temp, browser.clone(), 1).await;
    save_session(&system, "xiaohongshu").await;

    let xhs = system.adapter("xiaohongshu").unwrap();
    let mut task_ids = Vec::new();
    for i in 0..3 {
        let image = media(&temp, &format!("photo-{}.png", i));
        let post = Content::images(format!("Photo {}", i), vec![image]);
        task_ids.push(xhs.publish_async(post).await.unwrap());
    }

    for task_id in &task_ids {
        let task = system.tasks().wait(*task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(
            xhs.query_status(*task_id).await.unwrap().status,
            PublishStatus::Success
        );
    }
    assert_eq!(*browser.counters.peak_pages.lock().unwrap(), 1);
    assert_eq!(browser.counters.uploads.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_login_task_saves_session() {
    let temp = TempDir::new().unwrap();
    let system = system_in(&temp, Arc::new(HappyBrowser::default()), 3).await;

    let task_id = system
        .start_login("douyin", Some(Duration::from_secs(30)))
        .await
        .unwrap();
    let task = system.tasks().wait(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    let session = system.sessions().load("douyin").await.unwrap().unwrap();
    assert_eq!(session.get("sessionid"), Some("fresh"));
    assert!(
        temp.path()
            .join(".autopublish/cookies/douyin_cookies.json")
            .is_file()
    );
}
