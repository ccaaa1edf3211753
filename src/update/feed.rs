//! GitHub releases as an update feed.
//!
//! Releases are tagged with semantic versions (an optional leading `v` is
//! accepted). A release qualifies when it is newer than the running version,
//! is not a draft, and carries an installer asset for this platform. When an
//! asset named `<installer>.sha256` is attached, the download is verified
//! against it.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;

use crate::config::FeedConfig;

use super::delivery::{DeliveryEvents, UpdateDelivery};
use super::download::{self, download_asset, parse_checksum, verify_checksum};
use super::install;
use super::{DeliveryEvent, UpdateInfo};

/// User agent for API requests
const USER_AGENT: &str = concat!("App-Updater/", env!("CARGO_PKG_VERSION"));

/// How many releases to scan when prereleases are allowed
const RELEASES_PER_PAGE: u32 = 20;

/// A GitHub release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// An asset attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub size: u64,
    pub browser_download_url: String,
}

/// Release picked by a check, waiting to be downloaded
#[derive(Debug, Clone)]
struct Candidate {
    info: UpdateInfo,
    installer: ReleaseAsset,
    checksum_url: Option<String>,
}

/// Parse a release tag as a semantic version
fn parse_tag(tag: &str) -> Option<semver::Version> {
    let trimmed = tag.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

/// Pick the newest release that qualifies as an update
fn select_candidate(
    releases: &[Release],
    current: &semver::Version,
    allow_prerelease: bool,
    installer_suffix: &str,
) -> Option<Candidate> {
    releases
        .iter()
        .filter(|r| !r.draft)
        .filter(|r| allow_prerelease || !r.prerelease)
        .filter_map(|r| {
            let version = parse_tag(&r.tag_name)?;
            if !allow_prerelease && !version.pre.is_empty() {
                return None;
            }
            if version <= *current {
                return None;
            }
            let installer = r.assets.iter().find(|a| a.name.ends_with(installer_suffix))?;
            Some((version, r, installer))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(version, release, installer)| {
            let checksum_name = format!("{}.sha256", installer.name);
            let checksum_url = release
                .assets
                .iter()
                .find(|a| a.name == checksum_name)
                .map(|a| a.browser_download_url.clone());

            Candidate {
                info: UpdateInfo {
                    version: version.to_string(),
                    release_date: release.published_at.clone().unwrap_or_default(),
                    release_notes: release.body.clone().filter(|b| !b.trim().is_empty()),
                },
                installer: installer.clone(),
                checksum_url,
            }
        })
}

/// Update delivery backed by a GitHub repository's releases
pub struct GitHubFeed {
    client: reqwest::Client,
    api_base: String,
    repository: String,
    installer_suffix: String,
    allow_prerelease: bool,
    current: semver::Version,
    download_dir: Option<PathBuf>,
    pending: Mutex<Option<Candidate>>,
    downloaded: Mutex<Option<PathBuf>>,
}

impl GitHubFeed {
    /// Create a feed for the running version `current_version`
    pub fn new(config: &FeedConfig, allow_prerelease: bool, current_version: &str) -> Result<Self> {
        let current = parse_tag(current_version)
            .with_context(|| format!("App version {:?} is not a semantic version", current_version))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            installer_suffix: config.installer_suffix.clone(),
            allow_prerelease,
            current,
            download_dir: None,
            pending: Mutex::new(None),
            downloaded: Mutex::new(None),
        })
    }

    /// Store downloads in `dir` instead of the cache directory
    #[cfg(test)]
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = Some(dir);
        self
    }

    /// Replace the HTTP client
    #[cfg(test)]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn releases_url(&self) -> String {
        if self.allow_prerelease {
            format!(
                "{}/repos/{}/releases?per_page={}",
                self.api_base, self.repository, RELEASES_PER_PAGE
            )
        } else {
            format!("{}/repos/{}/releases/latest", self.api_base, self.repository)
        }
    }

    /// Fetch the releases to consider. `/releases/latest` never reports prereleases.
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let start = std::time::Instant::now();
        let url = self.releases_url();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .context("Failed to reach release feed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND && !self.allow_prerelease {
            tracing::info!("No published release in {}", self.repository);
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API error: {} - {}", status, text);
        }

        let releases: Vec<Release> = if self.allow_prerelease {
            response.json().await?
        } else {
            vec![response.json().await?]
        };

        tracing::info!(
            "Fetched {} releases in {:.1}s",
            releases.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(releases)
    }

    async fn check(&self, events: &DeliveryEvents) -> Result<Option<UpdateInfo>> {
        events.emit(DeliveryEvent::CheckingForUpdate);

        let releases = match self.fetch_releases().await {
            Ok(releases) => releases,
            Err(e) => {
                events.emit(DeliveryEvent::Error(format!("{:#}", e)));
                return Err(e);
            }
        };

        let candidate = select_candidate(
            &releases,
            &self.current,
            self.allow_prerelease,
            &self.installer_suffix,
        );
        let info = candidate.as_ref().map(|c| c.info.clone());
        *lock(&self.pending) = candidate;

        match &info {
            Some(info) => {
                tracing::info!("Update available: {} (current {})", info.version, self.current);
                events.emit(DeliveryEvent::UpdateAvailable(info.clone()));
            }
            None => {
                tracing::info!("No newer release than {}", self.current);
                events.emit(DeliveryEvent::UpdateNotAvailable(None));
            }
        }
        Ok(info)
    }

    async fn download(&self, events: &DeliveryEvents) -> Result<UpdateInfo> {
        match self.fetch_installer(events).await {
            Ok((info, path)) => {
                *lock(&self.downloaded) = Some(path);
                events.emit(DeliveryEvent::UpdateDownloaded(info.clone()));
                Ok(info)
            }
            Err(e) => {
                events.emit(DeliveryEvent::Error(format!("{:#}", e)));
                Err(e)
            }
        }
    }

    async fn fetch_installer(&self, events: &DeliveryEvents) -> Result<(UpdateInfo, PathBuf)> {
        let candidate = lock(&self.pending)
            .clone()
            .context("No update available to download")?;

        let dir = match &self.download_dir {
            Some(dir) => dir.clone(),
            None => download::download_dir()?,
        };
        let dest = dir.join(&candidate.installer.name);

        tracing::info!(
            "Downloading {} from {}",
            candidate.installer.name,
            candidate.installer.browser_download_url
        );
        let downloaded = download_asset(
            &self.client,
            &candidate.installer.browser_download_url,
            &dest,
            candidate.installer.size,
            |progress| events.emit(DeliveryEvent::DownloadProgress(progress)),
        )
        .await?;
        tracing::info!(
            "Downloaded {} bytes to {}",
            downloaded.bytes,
            downloaded.file_path.display()
        );

        if let Some(url) = &candidate.checksum_url {
            let expected = self.fetch_checksum(url).await?;
            if let Err(e) = verify_checksum(&downloaded.file_path, &expected).await {
                let _ = tokio::fs::remove_file(&downloaded.file_path).await;
                return Err(e);
            }
        } else {
            tracing::debug!("No checksum published for {}", candidate.installer.name);
        }

        Ok((candidate.info, downloaded.file_path))
    }

    async fn fetch_checksum(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch checksum")?;
        if !response.status().is_success() {
            anyhow::bail!("Checksum download failed with status: {}", response.status());
        }
        let text = response.text().await?;
        parse_checksum(&text).context("Published checksum is malformed")
    }
}

impl UpdateDelivery for GitHubFeed {
    fn check_for_updates<'a>(
        &'a self,
        events: &'a DeliveryEvents,
    ) -> BoxFuture<'a, Result<Option<UpdateInfo>>> {
        self.check(events).boxed()
    }

    fn download_update<'a>(&'a self, events: &'a DeliveryEvents) -> BoxFuture<'a, Result<UpdateInfo>> {
        self.download(events).boxed()
    }

    fn quit_and_install(&self) -> Result<()> {
        let path = lock(&self.downloaded)
            .clone()
            .context("No downloaded update to install")?;
        install::launch_installer(&path)?;

        tracing::info!("Installer started, exiting");
        std::process::exit(0);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
