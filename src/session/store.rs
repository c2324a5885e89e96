use crate::env;
use crate::error::{PublishError, Result};
use crate::task::validate_platform_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cookie name to value, as persisted on disk
pub type CookieMap = BTreeMap<String, String>;

/// Saved authentication state for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub platform: String,
    /// Curated subset of the browser cookies
    pub cookies: CookieMap,
    pub saved_at: DateTime<Utc>,
}

impl SessionCookie {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.saved_at
    }
}

/// Per-platform cookie persistence with a read-through cache.
///
/// Each platform is stored as a JSON object in `<dir>/<platform>_cookies.json`. Writes go
/// through a temp file and a rename, under the same write lock that updates the cache.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, Arc<SessionCookie>>>>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `cookies` as the session for `platform`, replacing any previous one.
    pub async fn save(&self, platform: &str, cookies: CookieMap) -> Result<Arc<SessionCookie>> {
        check_platform(platform)?;
        if cookies.is_empty() {
            return Err(PublishError::Session(format!(
                "refusing to save an empty cookie set for {}",
                platform
            )));
        }

        let mut cache = self.cache.write().await;

        async_fs::create_dir_all(&self.dir).await?;
        let path = env::cookie_file_path(&self.dir, platform);
        let temp_path = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(&cookies)?;
        let mut file = async_fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        async_fs::rename(&temp_path, &path).await?;

        let session = Arc::new(SessionCookie {
            platform: platform.to_string(),
            cookies,
            saved_at: Utc::now(),
        });
        cache.insert(platform.to_string(), session.clone());

        info!(
            "Saved {} cookie(s) for {} to {}",
            session.cookies.len(),
            platform,
            path.display()
        );
        Ok(session)
    }

    /// Saved session for `platform`, reading the file on a cache miss
    pub async fn load(&self, platform: &str) -> Result<Option<Arc<SessionCookie>>> {
        check_platform(platform)?;

        if let Some(session) = self.cache.read().await.get(platform) {
            return Ok(Some(session.clone()));
        }

        let mut cache = self.cache.write().await;
        // Another caller may have filled the entry while we waited for the lock
        if let Some(session) = cache.get(platform) {
            return Ok(Some(session.clone()));
        }

        let path = env::cookie_file_path(&self.dir, platform);
        let Some(session) = read_session_file(platform, &path).await? else {
            return Ok(None);
        };

        let session = Arc::new(session);
        cache.insert(platform.to_string(), session.clone());
        debug!(
            "Loaded {} cookie(s) for {} from disk",
            session.cookies.len(),
            platform
        );
        Ok(Some(session))
    }

    pub async fn exists(&self, platform: &str) -> Result<bool> {
        Ok(self.load(platform).await?.is_some())
    }

    /// Remove the saved session. Returns whether one existed.
    pub async fn delete(&self, platform: &str) -> Result<bool> {
        check_platform(platform)?;

        let mut cache = self.cache.write().await;
        let cached = cache.remove(platform).is_some();

        let path = env::cookie_file_path(&self.dir, platform);
        let on_disk = match async_fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if cached || on_disk {
            info!("Deleted saved session for {}", platform);
        }
        Ok(cached || on_disk)
    }

    /// Platforms that currently have a saved session, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let _cache = self.cache.read().await;

        let mut platforms = Vec::new();
        if !async_fs::try_exists(&self.dir).await? {
            return Ok(platforms);
        }

        let mut entries = async_fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && let Some(platform) = env::platform_from_cookie_file(name)
                && validate_platform_id(platform).is_ok()
            {
                platforms.push(platform.to_string());
            }
        }

        platforms.sort();
        Ok(platforms)
    }
}

/// Pick the curated cookies out of a browser cookie jar. Later duplicates win.
pub fn extract_curated<'a>(
    cookies: impl IntoIterator<Item = (&'a str, &'a str)>,
    keys: &[String],
) -> CookieMap {
    cookies
        .into_iter()
        .filter(|(name, _)| keys.iter().any(|key| key == name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn check_platform(platform: &str) -> Result<()> {
    validate_platform_id(platform)
        .map_err(|_| PublishError::Session(format!("invalid platform id '{}'", platform)))
}

async fn read_session_file(platform: &str, path: &Path) -> Result<Option<SessionCookie>> {
    let data = match async_fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let cookies: CookieMap = serde_json::from_slice(&data).map_err(|e| {
        PublishError::Session(format!(
            "corrupt cookie file {}: {}",
            path.display(),
            e
        ))
    })?;

    if cookies.is_empty() {
        warn!("Ignoring empty cookie file {}", path.display());
        return Ok(None);
    }

    let saved_at = async_fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Some(SessionCookie {
        platform: platform.to_string(),
        cookies,
        saved_at,
    }))
}
