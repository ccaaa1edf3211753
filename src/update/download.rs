//! Installer download and checksum verification.

use anyhow::{Context, Result};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use crate::config::project_dirs;

use super::DownloadProgress;

/// Minimum time between two progress reports
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Result of a successful download
pub struct DownloadResult {
    pub file_path: PathBuf,
    pub bytes: u64,
}

/// Download an installer with progress reporting.
///
/// Downloads to a `.part` file next to `dest_path`, then renames on success.
/// `expected_size` is used when the server sends no content length.
pub async fn download_asset<F>(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    expected_size: u64,
    mut on_progress: F,
) -> Result<DownloadResult>
where
    F: FnMut(DownloadProgress),
{
    let download_start = Instant::now();

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to connect to download server")?;

    if !response.status().is_success() {
        anyhow::bail!(
            "Download failed with status: {} - {}",
            response.status(),
            response.status().canonical_reason().unwrap_or("Unknown error")
        );
    }

    let total_size = response.content_length().unwrap_or(expected_size);

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create download directory")?;
    }

    let temp_path = part_path(dest_path);
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .context("Failed to create temporary download file")?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_progress_time = Instant::now();
    let mut last_downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.context("Error reading download stream")?;

        file.write_all(&chunk)
            .await
            .context("Failed to write to download file")?;

        downloaded += chunk.len() as u64;

        let now = Instant::now();
        let elapsed = now.duration_since(last_progress_time);
        if elapsed >= PROGRESS_INTERVAL {
            let bytes_since_last = downloaded - last_downloaded;
            let speed = (bytes_since_last as f64 / elapsed.as_secs_f64()) as u64;
            on_progress(DownloadProgress::new(downloaded, total_size, speed));

            last_downloaded = downloaded;
            last_progress_time = now;
        }
    }

    file.sync_all()
        .await
        .context("Failed to sync download file")?;
    drop(file);

    tokio::fs::rename(&temp_path, dest_path)
        .await
        .context("Failed to finalize download")?;

    let elapsed = download_start.elapsed().as_secs_f64().max(f64::EPSILON);
    let average_speed = (downloaded as f64 / elapsed) as u64;
    on_progress(DownloadProgress::new(
        downloaded,
        total_size.max(downloaded),
        average_speed,
    ));

    tracing::info!(
        "Download complete: {:.1} MB in {:.1}s",
        downloaded as f64 / 1_000_000.0,
        elapsed
    );

    Ok(DownloadResult {
        file_path: dest_path.to_path_buf(),
        bytes: downloaded,
    })
}

/// Temporary path used while a download is in flight
fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest_path.with_file_name(name)
}

/// Extract the hex digest from a `sha256sum`-style line (`<hash>  <file>`)
pub fn parse_checksum(text: &str) -> Option<String> {
    let digest = text.split_whitespace().next()?.to_ascii_lowercase();
    let valid = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
    valid.then_some(digest)
}

/// Verify a downloaded file against an expected SHA-256 hex digest
pub async fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let path_buf = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path_buf)
            .with_context(|| format!("Failed to open {:?} for verification", path_buf))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher).context("Failed to hash download")?;
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .context("Checksum task failed")??;

    if !actual.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }

    tracing::debug!("Checksum verified for {:?}", path);
    Ok(())
}

/// Get the download cache directory.
pub fn download_dir() -> Result<PathBuf> {
    let download_dir = project_dirs()?.cache_dir().join("downloads");
    std::fs::create_dir_all(&download_dir)?;

    Ok(download_dir)
}
