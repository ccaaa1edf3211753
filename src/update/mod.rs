//! Update lifecycle for the application itself.
//!
//! This module handles:
//! - The update state machine and its allowed transitions
//! - Fan-out of lifecycle events to the display layer (`channel`)
//! - Coordination of check / download / install (`coordinator`)
//! - The delivery capability seam and its GitHub-backed implementation

mod channel;
mod coordinator;
mod delivery;
mod download;
mod feed;
mod install;
#[cfg(test)]
pub(crate) mod testing;

pub use channel::{EventChannel, HostEvent, Subscription, UpdateStatusChannel};
pub use coordinator::UpdateCoordinator;

#[cfg(test)]
pub use channel::StatusMessage;
#[cfg(test)]
pub use delivery::{NullDelivery, UpdateDelivery};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RuntimeContext;

/// Current state of the update lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    NoUpdate,
    Available,
    Downloading,
    Downloaded,
    Installing,
    Error,
}

impl UpdateState {
    /// Get a human-readable description of the current state
    pub fn description(&self) -> &'static str {
        match self {
            UpdateState::Idle => "No updates checked",
            UpdateState::Checking => "Checking for updates...",
            UpdateState::NoUpdate => "Up to date",
            UpdateState::Available => "Update available",
            UpdateState::Downloading => "Downloading update...",
            UpdateState::Downloaded => "Update ready to install",
            UpdateState::Installing => "Installing update...",
            UpdateState::Error => "Update failed",
        }
    }

    /// Whether the state machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: UpdateState) -> bool {
        use UpdateState::*;
        match (self, next) {
            (Installing, _) => false,
            (_, Error) => true,
            (Idle | NoUpdate | Available, Checking) => true,
            (Checking, Available | NoUpdate) => true,
            (Available, Downloading) => true,
            (Downloading, Downloaded) => true,
            (Downloaded, Installing) => true,
            (Error, Checking) => true,
            _ => false,
        }
    }

    /// Whether a check or download is currently outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, UpdateState::Checking | UpdateState::Downloading)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::NoUpdate => "no-update",
            UpdateState::Available => "available",
            UpdateState::Downloading => "downloading",
            UpdateState::Downloaded => "downloaded",
            UpdateState::Installing => "installing",
            UpdateState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Leading text of the status line for a check that found a release
pub const AVAILABLE_STATUS: &str = "Update available";

/// Leading text of the status line for a check that found nothing newer
pub const NO_UPDATE_STATUS: &str = "Update not available";

/// Whether a status line settles a check with a release to download
pub fn reports_available(status: &str) -> bool {
    status.starts_with(AVAILABLE_STATUS)
}

/// Whether a status line settles a check with "no update"
pub fn reports_no_update(status: &str) -> bool {
    status.starts_with(NO_UPDATE_STATUS)
}

/// Release metadata produced by the delivery capability.
///
/// Every field tolerates absence on decode: `update-downloaded` payloads are
/// allowed to be partial.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateInfo {
    pub version: String,
    /// ISO-8601 publication timestamp
    pub release_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// Download progress as reported by the delivery capability
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub bytes_per_second: u64,
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
}

impl DownloadProgress {
    /// Build a progress report, deriving the percentage from the byte counts
    pub fn new(transferred: u64, total: u64, bytes_per_second: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (transferred as f64 / total as f64) * 100.0
        };
        Self {
            bytes_per_second,
            percent,
            transferred,
            total,
        }
    }
}

/// Lifecycle events emitted by a delivery capability
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    CheckingForUpdate,
    UpdateAvailable(UpdateInfo),
    UpdateNotAvailable(Option<UpdateInfo>),
    Error(String),
    DownloadProgress(DownloadProgress),
    UpdateDownloaded(UpdateInfo),
}

impl DeliveryEvent {
    /// Wire name of the event as the delivery capability reports it
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryEvent::CheckingForUpdate => "checking-for-update",
            DeliveryEvent::UpdateAvailable(_) => "update-available",
            DeliveryEvent::UpdateNotAvailable(_) => "update-not-available",
            DeliveryEvent::Error(_) => "error",
            DeliveryEvent::DownloadProgress(_) => "download-progress",
            DeliveryEvent::UpdateDownloaded(_) => "update-downloaded",
        }
    }
}

/// Coordinator operations, used in error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Check,
    Download,
    Install,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Check => "check for updates",
            Operation::Download => "download update",
            Operation::Install => "install update",
        })
    }
}

/// Failures of the update flow. All of them degrade to status messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error(
        "Updater not initialized (running in {context} context). Build and install the app to enable updates."
    )]
    NotInitialized { context: RuntimeContext },

    #[error("Update feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Check failed: {0}")]
    CheckFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cannot {operation} while update state is {state}")]
    InvalidState {
        operation: Operation,
        state: UpdateState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            UpdateState::Idle,
            UpdateState::Checking,
            UpdateState::Available,
            UpdateState::Downloading,
            UpdateState::Downloaded,
            UpdateState::Installing,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_idle_cannot_skip_to_download() {
        assert!(!UpdateState::Idle.can_transition_to(UpdateState::Downloading));
        assert!(!UpdateState::Idle.can_transition_to(UpdateState::Downloaded));
        assert!(!UpdateState::Checking.can_transition_to(UpdateState::Downloading));
        assert!(!UpdateState::NoUpdate.can_transition_to(UpdateState::Downloading));
    }

    #[test]
    fn test_error_reachable_from_non_terminal_states() {
        for state in [
            UpdateState::Idle,
            UpdateState::Checking,
            UpdateState::NoUpdate,
            UpdateState::Available,
            UpdateState::Downloading,
            UpdateState::Downloaded,
            UpdateState::Error,
        ] {
            assert!(state.can_transition_to(UpdateState::Error), "{state}");
        }
        assert!(!UpdateState::Installing.can_transition_to(UpdateState::Error));
    }

    #[test]
    fn test_terminal_check_status_recognized() {
        assert!(reports_no_update("Update not available. Current 1.0.0"));
        assert!(!reports_no_update("Update available: 1.1.0 (current 1.0.0)"));
        assert!(!reports_no_update("Check failed: connection refused"));

        assert!(reports_available("Update available: 1.1.0 (current 1.0.0)"));
        assert!(!reports_available("Update not available. Current 1.0.0"));
        assert!(!reports_available("Download failed: disk full"));
    }

    #[test]
    fn test_no_recheck_while_busy_or_downloaded() {
        assert!(!UpdateState::Checking.can_transition_to(UpdateState::Checking));
        assert!(!UpdateState::Downloading.can_transition_to(UpdateState::Checking));
        assert!(!UpdateState::Downloaded.can_transition_to(UpdateState::Checking));
    }

    #[test]
    fn test_download_progress_percent() {
        let progress = DownloadProgress::new(500, 1000, 1000);
        assert_eq!(progress.percent, 50.0);

        let empty = DownloadProgress::new(10, 0, 0);
        assert_eq!(empty.percent, 0.0);
    }

    #[test]
    fn test_update_info_tolerates_missing_fields() {
        let info: UpdateInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info, UpdateInfo::default());

        let info: UpdateInfo =
            serde_json::from_str(r#"{"version":"1.2.0","releaseDate":"2026-01-02T03:04:05Z"}"#)
                .unwrap();
        assert_eq!(info.version, "1.2.0");
        assert!(info.release_notes.is_none());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = UpdateError::InvalidState {
            operation: Operation::Install,
            state: UpdateState::Available,
        };
        assert_eq!(
            err.to_string(),
            "Cannot install update while update state is available"
        );
    }
}
