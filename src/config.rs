use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub updates: UpdateConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Window appearance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Enable dark theme
    #[serde(default = "default_true")]
    pub dark_theme: bool,
    /// Window title
    #[serde(default = "default_window_title")]
    pub window_title: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            dark_theme: true,
            window_title: default_window_title(),
        }
    }
}

fn default_window_title() -> String {
    "App Updater".to_string()
}

/// Update behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Check for updates when the window opens
    #[serde(default = "default_true")]
    pub check_on_startup: bool,
    /// Also run the startup check in development builds (reports "not initialized")
    #[serde(default)]
    pub check_in_development: bool,
    /// Offer prerelease versions
    #[serde(default = "default_true")]
    pub allow_prerelease: bool,
    /// Download as soon as an update is found
    #[serde(default)]
    pub auto_download: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            check_on_startup: true,
            check_in_development: false,
            allow_prerelease: true,
            auto_download: false,
        }
    }
}

impl UpdateConfig {
    /// Whether the display layer should fire the initial check on attach
    pub fn startup_check(&self, production: bool) -> bool {
        self.check_on_startup && (production || self.check_in_development)
    }
}

/// Release feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// GitHub API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Repository publishing releases (owner/name)
    #[serde(default = "default_repository")]
    pub repository: String,
    /// File name suffix of the installer asset for this platform
    #[serde(default = "default_installer_suffix")]
    pub installer_suffix: String,
    /// Explicit path to the packaged manifest carrying the app version
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            repository: default_repository(),
            installer_suffix: default_installer_suffix(),
            manifest_path: None,
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_repository() -> String {
    "app-updater/app-updater".to_string()
}

fn default_installer_suffix() -> String {
    if cfg!(target_os = "windows") {
        ".exe"
    } else if cfg!(target_os = "macos") {
        ".dmg"
    } else {
        ".AppImage"
    }
    .to_string()
}

fn default_true() -> bool {
    true
}

/// Platform directories for this application
pub fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "app-updater", "AppUpdater")
        .ok_or_else(|| anyhow::anyhow!("Could not determine application directories"))
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
