//! Directory names and path helpers for autopublish.
//!
//! Every hardcoded location (config discovery, cookie files, event records) is built
//! here so the rest of the crate never joins path literals itself.

use std::path::{Path, PathBuf};

/// Application directory name, created inside the workspace or home directory
pub const APP_DIR_NAME: &str = ".autopublish";

/// Configuration file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the working directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "autopublish.toml";

/// System-wide configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/autopublish/config.toml";

/// Saved login sessions
pub const COOKIES_DIR_NAME: &str = "cookies";

/// Task event records
pub const EVENTS_DIR_NAME: &str = "events";

/// Suffix of a per-platform cookie file: `<platform>_cookies.json`
pub const COOKIE_FILE_SUFFIX: &str = "_cookies.json";

/// Build the application directory path from a workspace root
pub fn app_dir_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(APP_DIR_NAME)
}

/// Default cookie directory for a workspace
pub fn cookies_dir_path(workspace_root: &Path) -> PathBuf {
    app_dir_path(workspace_root).join(COOKIES_DIR_NAME)
}

/// Default event directory for a workspace
pub fn events_dir_path(workspace_root: &Path) -> PathBuf {
    app_dir_path(workspace_root).join(EVENTS_DIR_NAME)
}

/// Cookie file for one platform
pub fn cookie_file_path(cookie_dir: &Path, platform: &str) -> PathBuf {
    cookie_dir.join(format!("{}{}", platform, COOKIE_FILE_SUFFIX))
}

/// Platform id encoded in a cookie file name, if it is one
pub fn platform_from_cookie_file(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(COOKIE_FILE_SUFFIX)
        .filter(|platform| !platform.is_empty())
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    app_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Config file placed directly in the working directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Config file inside the working directory's application directory
pub fn workspace_config_file_path(current_dir: &Path) -> PathBuf {
    app_dir_path(current_dir).join(CONFIG_FILE_NAME)
}
