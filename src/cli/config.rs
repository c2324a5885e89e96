//! Configuration discovery and loading
//!
//! Candidates are checked in order and the first existing file wins:
//! 1. `./autopublish.toml`
//! 2. `./.autopublish/config.toml`
//! 3. `~/.autopublish/config.toml`
//! 4. `/etc/autopublish/config.toml`
//! 5. Built-in defaults

use crate::{PublisherConfig, env};
use anyhow::{Context, Result};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load `path` when given, otherwise discover the configuration
    pub fn load(path: Option<&Path>) -> Result<PublisherConfig> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                PublisherConfig::from_toml_file(path)
            }
            None => Self::discover_config(),
        }
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<PublisherConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return PublisherConfig::from_toml_file(&config_path)
                .with_context(|| format!("Invalid configuration in {}", config_path.display()));
        }

        info!("No configuration file found, using defaults");
        Ok(PublisherConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(Self::get_config_candidates())
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        Self::candidates_for(current_dir.as_deref(), home_dir.as_deref())
    }

    fn candidates_for(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(env::local_config_file_path(current_dir));
            candidates.push(env::workspace_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE));

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config(force: bool) -> Result<PathBuf> {
        let home_dir = Self::get_home_dir().context("Could not determine home directory")?;
        let config_path = env::user_config_file_path(&home_dir);
        Self::write_default_config(&config_path, force)?;
        Ok(config_path)
    }

    fn write_default_config(config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            warn!("Configuration file already exists: {:?}", config_path);
            return Ok(());
        }

        if let Some(config_dir) = config_path.parent()
            && !config_dir.exists()
        {
            fs::create_dir_all(config_dir)
                .with_context(|| format!("Failed to create {}", config_dir.display()))?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        PublisherConfig::default().to_toml_file(config_path)?;
        info!("Created default configuration file: {:?}", config_path);
        Ok(())
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.is_file() {
                "EXISTS"
            } else if candidate.exists() {
                "NOT A FILE"
            } else {
                "NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_config_file() {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}
