//! Configuration management commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{print_formatted, print_success, OutputFormat};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Get a specific config value
    Get {
        /// Config key (e.g., "updates.auto_download", "feed.repository")
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., "updates.auto_download", "feed.repository")
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[derive(Serialize)]
struct ConfigPathResult {
    path: String,
    exists: bool,
}

pub async fn run(command: ConfigCommands, format: OutputFormat, quiet: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(format),
        ConfigCommands::Get { key } => get(&key, format),
        ConfigCommands::Set { key, value } => set(&key, &value, quiet),
        ConfigCommands::Path => path(format),
    }
}

fn show(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => println!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

fn get(key: &str, format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let value = get_config_value(&config, key)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
        OutputFormat::Text => println!("{}", value),
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["launcher", "dark_theme"] => Ok(config.launcher.dark_theme.to_string()),
        ["launcher", "window_title"] => Ok(config.launcher.window_title.clone()),
        ["updates", "check_on_startup"] => Ok(config.updates.check_on_startup.to_string()),
        ["updates", "check_in_development"] => Ok(config.updates.check_in_development.to_string()),
        ["updates", "allow_prerelease"] => Ok(config.updates.allow_prerelease.to_string()),
        ["updates", "auto_download"] => Ok(config.updates.auto_download.to_string()),
        ["feed", "api_base"] => Ok(config.feed.api_base.clone()),
        ["feed", "repository"] => Ok(config.feed.repository.clone()),
        ["feed", "installer_suffix"] => Ok(config.feed.installer_suffix.clone()),
        ["feed", "manifest_path"] => Ok(config
            .feed
            .manifest_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not set>".to_string())),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

fn set(key: &str, value: &str, quiet: bool) -> Result<()> {
    let mut config = Config::load()?;

    set_config_value(&mut config, key, value)?;
    config.save()?;

    print_success(&format!("Set {} = {}", key, value), quiet);
    Ok(())
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["launcher", "dark_theme"] => config.launcher.dark_theme = value.parse()?,
        ["launcher", "window_title"] => config.launcher.window_title = value.to_string(),
        ["updates", "check_on_startup"] => config.updates.check_on_startup = value.parse()?,
        ["updates", "check_in_development"] => {
            config.updates.check_in_development = value.parse()?
        }
        ["updates", "allow_prerelease"] => config.updates.allow_prerelease = value.parse()?,
        ["updates", "auto_download"] => config.updates.auto_download = value.parse()?,
        ["feed", "api_base"] => config.feed.api_base = value.to_string(),
        ["feed", "repository"] => config.feed.repository = value.to_string(),
        ["feed", "installer_suffix"] => config.feed.installer_suffix = value.to_string(),
        ["feed", "manifest_path"] => {
            config.feed.manifest_path = match value {
                "" => None,
                path => Some(path.into()),
            }
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    Ok(())
}

fn path(format: OutputFormat) -> Result<()> {
    let path = Config::config_path()?;
    let exists = path.exists();

    let result = ConfigPathResult {
        path: path.to_string_lossy().to_string(),
        exists,
    };

    print_formatted(&result, format, |r| {
        format!("{}{}", r.path, if r.exists { "" } else { " (not found)" })
    });

    Ok(())
}
