//! Command line argument parsing
//!
//! The CLI is an offline companion to the library. It inspects configuration, site
//! limits and saved sessions, and validates content files. It never opens a browser.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "autopublish")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish images and videos to content platforms through browser automation")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List configured platforms
    Platforms,
    /// Show the content limits of a platform
    Limits {
        platform: String,
    },
    /// Check a content file (JSON) against a platform's limits
    Validate {
        platform: String,
        /// Content description, e.g. {"type": "video", "title": "...", "video": "clip.mp4"}
        file: PathBuf,
    },
    /// List saved login sessions
    Sessions,
    /// Delete the saved session of a platform
    Logout {
        platform: String,
    },
    /// Show configuration discovery information and the effective configuration
    ShowConfig,
    /// Write a default configuration file to the user config directory
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// Log filter for the chosen verbosity, unless `RUST_LOG` overrides it
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "autopublish=debug"
        } else {
            "autopublish=info"
        }
    }
}
