use anyhow::{Context, Result, bail};
use autopublish::cli::{Args, Commands, ConfigDiscovery};
use autopublish::{Content, PublisherConfig, SessionStore, SiteProfile, validate};
use clap::Parser;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::InitConfig { force } = args.command {
        let path = ConfigDiscovery::create_default_user_config(force)?;
        println!("Configuration file: {}", path.display());
        return Ok(());
    }

    let config = ConfigDiscovery::load(args.config.as_deref())?;

    match args.command {
        Commands::Platforms => list_platforms(&config),
        Commands::Limits { platform } => show_limits(&config, &platform),
        Commands::Validate { platform, file } => validate_file(&config, &platform, &file),
        Commands::Sessions => list_sessions(&config).await,
        Commands::Logout { platform } => logout(&config, &platform).await,
        Commands::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            println!();
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn find_profile(config: &PublisherConfig, platform: &str) -> Result<SiteProfile> {
    let profiles = config.profiles()?;
    let known: Vec<String> = profiles.iter().map(|p| p.id.clone()).collect();
    profiles
        .into_iter()
        .find(|profile| profile.id == platform)
        .with_context(|| {
            format!(
                "platform {} is not supported (configured: {})",
                platform,
                known.join(", ")
            )
        })
}

fn list_platforms(config: &PublisherConfig) -> Result<()> {
    for profile in config.profiles()? {
        println!(
            "{:<12} {:<12} {}",
            profile.id, profile.display_name, profile.publish_url
        );
    }
    Ok(())
}

fn show_limits(config: &PublisherConfig, platform: &str) -> Result<()> {
    let profile = find_profile(config, platform)?;
    let limits = toml::to_string_pretty(&profile.limits)
        .context("Failed to render content limits")?;
    println!("# {} ({})", profile.display_name, profile.id);
    print!("{}", limits);
    Ok(())
}

fn validate_file(config: &PublisherConfig, platform: &str, file: &Path) -> Result<()> {
    let profile = find_profile(config, platform)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read content file {}", file.display()))?;
    let mut content: Content = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse content file {}", file.display()))?;
    content.probe_media();

    let violations = validate(&content, &profile.limits);
    if violations.is_empty() {
        println!("{}: content is valid for {}", file.display(), profile.id);
        return Ok(());
    }

    for violation in &violations {
        println!("  {}", violation);
    }
    bail!(
        "content has {} violation(s) for {}",
        violations.len(),
        profile.id
    )
}

async fn list_sessions(config: &PublisherConfig) -> Result<()> {
    let store = SessionStore::new(config.cookie_dir());
    let platforms = store.list().await?;
    if platforms.is_empty() {
        println!("No saved sessions in {}", store.dir().display());
        return Ok(());
    }

    for platform in platforms {
        match store.load(&platform).await? {
            Some(session) => println!(
                "{:<12} {} cookie(s), saved {}",
                platform,
                session.cookies.len(),
                session.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => println!("{:<12} (empty)", platform),
        }
    }
    Ok(())
}

async fn logout(config: &PublisherConfig, platform: &str) -> Result<()> {
    let store = SessionStore::new(config.cookie_dir());
    if store.delete(platform).await? {
        info!("Deleted saved session for {}", platform);
        println!("Logged out of {}", platform);
    } else {
        println!("No saved session for {}", platform);
    }
    Ok(())
}
