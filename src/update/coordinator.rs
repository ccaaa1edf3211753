//! Update lifecycle coordinator.
//!
//! Owns the update state machine and the last known release, drives the
//! delivery capability and turns everything it reports into status messages
//! and typed events on the [`UpdateStatusChannel`].

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Config;
use crate::context::RuntimeContext;
use crate::version::VersionInfo;

use super::channel::{HostEvent, UpdateStatusChannel};
use super::delivery::{DeliveryEvents, NullDelivery, UpdateDelivery};
use super::feed::GitHubFeed;
use super::{
    DeliveryEvent, DownloadProgress, Operation, UpdateError, UpdateInfo, UpdateState,
    AVAILABLE_STATUS, NO_UPDATE_STATUS,
};

struct Shared {
    state: UpdateState,
    last_info: Option<UpdateInfo>,
}

/// Shared lifecycle state plus the handlers registered for delivery events
#[derive(Clone)]
pub(super) struct Lifecycle {
    shared: Arc<Mutex<Shared>>,
    channel: UpdateStatusChannel,
    app_version: Arc<str>,
}

/// Outcome of trying to start an operation
enum Begin {
    Started,
    Coalesced,
}

impl Lifecycle {
    fn new(channel: UpdateStatusChannel, app_version: &str) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: UpdateState::Idle,
                last_info: None,
            })),
            channel,
            app_version: Arc::from(app_version),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> UpdateState {
        self.lock().state
    }

    fn status(&self, text: impl Into<String>) {
        self.channel.send_status(text);
    }

    /// Move to `next` if the state table allows it. Staying put is a no-op.
    fn transition(&self, shared: &mut Shared, next: UpdateState) -> bool {
        let current = shared.state;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            tracing::warn!("Ignoring update state change {} -> {}", current, next);
            return false;
        }

        tracing::debug!("Update state: {} -> {}", current, next);
        shared.state = next;
        true
    }

    /// Handle one delivery event: state change, status line, typed event
    pub(super) fn handle(&self, event: DeliveryEvent) {
        tracing::debug!("Delivery event: {}", event.name());

        match event {
            DeliveryEvent::CheckingForUpdate => {
                let mut shared = self.lock();
                self.transition(&mut shared, UpdateState::Checking);
                drop(shared);
                self.status("Checking for update...");
            }
            DeliveryEvent::UpdateAvailable(info) => {
                let applied = {
                    let mut shared = self.lock();
                    let applied = self.transition(&mut shared, UpdateState::Available);
                    if applied {
                        shared.last_info = Some(info.clone());
                    }
                    applied
                };
                let version = if info.version.is_empty() {
                    "unknown"
                } else {
                    info.version.as_str()
                };
                self.status(format!(
                    "{}: {} (current {})",
                    AVAILABLE_STATUS, version, self.app_version
                ));
                if applied {
                    self.channel.emit(HostEvent::UpdateAvailable(info));
                }
            }
            DeliveryEvent::UpdateNotAvailable(_) => {
                let mut shared = self.lock();
                self.transition(&mut shared, UpdateState::NoUpdate);
                drop(shared);
                self.status(format!("{}. Current {}", NO_UPDATE_STATUS, self.app_version));
            }
            DeliveryEvent::Error(message) => {
                let mut shared = self.lock();
                self.transition(&mut shared, UpdateState::Error);
                drop(shared);
                self.status(format!("Error in auto-updater: {}", message));
            }
            DeliveryEvent::DownloadProgress(progress) => {
                self.status(progress_message(&progress));
            }
            DeliveryEvent::UpdateDownloaded(info) => {
                let applied = {
                    let mut shared = self.lock();
                    let applied = self.transition(&mut shared, UpdateState::Downloaded);
                    if applied && !info.version.is_empty() {
                        shared.last_info = Some(info.clone());
                    }
                    applied
                };
                self.status("Update downloaded; will install on quit");
                if applied {
                    self.channel.emit(HostEvent::UpdateDownloaded(info));
                }
            }
        }
    }

    /// Atomically check the source state and enter the operation's state
    fn begin(&self, operation: Operation) -> Result<Begin, UpdateError> {
        let mut shared = self.lock();
        let current = shared.state;

        let next = match operation {
            Operation::Check if current.is_busy() => return Ok(Begin::Coalesced),
            Operation::Check => UpdateState::Checking,
            Operation::Download => UpdateState::Downloading,
            Operation::Install => UpdateState::Installing,
        };

        if !current.can_transition_to(next) {
            return Err(UpdateError::InvalidState {
                operation,
                state: current,
            });
        }

        self.transition(&mut shared, next);
        Ok(Begin::Started)
    }

    /// Apply `event` only if the capability has not already settled the operation
    fn settle(&self, pending: UpdateState, event: DeliveryEvent) {
        if self.state() == pending {
            self.handle(event);
        } else {
            tracing::debug!("{} already settled by delivery events", pending);
        }
    }

    /// Record a failure unless the capability already reported one
    fn fail(&self, pending: UpdateState, error: &UpdateError) {
        let mut shared = self.lock();
        if shared.state != pending {
            tracing::debug!("Ignoring late failure: {}", error);
            return;
        }
        self.transition(&mut shared, UpdateState::Error);
        drop(shared);
        self.status(error.to_string());
    }

    /// The installer never started; keep the downloaded update installable
    fn rollback_install(&self, error: &UpdateError) {
        let mut shared = self.lock();
        if shared.state == UpdateState::Installing {
            tracing::debug!("Update state: {} -> {}", shared.state, UpdateState::Downloaded);
            shared.state = UpdateState::Downloaded;
        }
        drop(shared);
        self.status(error.to_string());
    }
}

/// Status line for a download progress report
fn progress_message(progress: &DownloadProgress) -> String {
    format!(
        "Download speed: {} - Downloaded {}% ({}/{})",
        progress.bytes_per_second,
        (progress.percent * 100.0).round() / 100.0,
        progress.transferred,
        progress.total
    )
}

/// Coordinates checking, downloading and installing application updates.
///
/// Created once by the entry point and shared by reference with the gateway.
pub struct UpdateCoordinator {
    context: RuntimeContext,
    versions: VersionInfo,
    delivery: Box<dyn UpdateDelivery>,
    events: DeliveryEvents,
    lifecycle: Lifecycle,
    channel: UpdateStatusChannel,
    auto_download: bool,
    /// Why the production feed could not be set up
    feed_error: Option<String>,
}

impl UpdateCoordinator {
    /// Wire the GitHub release feed in production and a null capability in
    /// development builds.
    pub fn initialize(context: RuntimeContext, versions: VersionInfo, config: &Config) -> Self {
        let mut feed_error = None;
        let delivery: Box<dyn UpdateDelivery> = match context {
            RuntimeContext::Production => {
                match GitHubFeed::new(&config.feed, config.updates.allow_prerelease, &versions.app_version) {
                    Ok(feed) => Box::new(feed),
                    Err(e) => {
                        tracing::error!("Failed to set up update feed: {:#}", e);
                        feed_error = Some(format!("{:#}", e));
                        Box::new(NullDelivery)
                    }
                }
            }
            RuntimeContext::Development => {
                tracing::info!("Development build, update feed disabled");
                Box::new(NullDelivery)
            }
        };

        let mut coordinator = Self::with_delivery(context, versions, delivery)
            .auto_download(config.updates.auto_download);
        coordinator.feed_error = feed_error;
        coordinator
    }

    /// Build a coordinator around an explicit delivery capability
    pub fn with_delivery(
        context: RuntimeContext,
        versions: VersionInfo,
        delivery: Box<dyn UpdateDelivery>,
    ) -> Self {
        let channel = UpdateStatusChannel::new();
        let lifecycle = Lifecycle::new(channel.clone(), &versions.app_version);
        let events = DeliveryEvents::new(lifecycle.clone());

        Self {
            context,
            versions,
            delivery,
            events,
            lifecycle,
            channel,
            auto_download: false,
            feed_error: None,
        }
    }

    /// Start downloading as soon as a check finds an update
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.auto_download = enabled;
        self
    }

    /// The event channel the display layer receives lifecycle events from
    pub fn channel(&self) -> &UpdateStatusChannel {
        &self.channel
    }

    pub fn state(&self) -> UpdateState {
        self.lifecycle.state()
    }

    /// Release found by the last successful check or download
    pub fn last_update_info(&self) -> Option<UpdateInfo> {
        self.lifecycle.lock().last_info.clone()
    }

    /// Versions resolved at startup
    pub fn resolve_version_info(&self) -> VersionInfo {
        self.versions.clone()
    }

    /// Error reported when there is no delivery capability to drive
    fn unavailable(&self) -> UpdateError {
        match &self.feed_error {
            Some(error) => UpdateError::FeedUnavailable(error.clone()),
            None => UpdateError::NotInitialized {
                context: self.context,
            },
        }
    }

    /// Check the feed for a newer release.
    ///
    /// Failures are reported as status messages; the returned error is for
    /// callers that want to log it.
    pub async fn check_for_updates(&self) -> Result<(), UpdateError> {
        if !self.delivery.is_available() {
            let error = self.unavailable();
            self.lifecycle.status(error.to_string());
            return Err(error);
        }

        match self.lifecycle.begin(Operation::Check) {
            Ok(Begin::Started) => {}
            Ok(Begin::Coalesced) => {
                tracing::debug!("Update check already in flight, coalescing request");
                return Ok(());
            }
            Err(error) => {
                self.lifecycle.status(error.to_string());
                return Err(error);
            }
        }

        match self.delivery.check_for_updates(&self.events).await {
            Ok(Some(info)) => {
                tracing::info!("Latest release: {}", info.version);
                self.lifecycle
                    .settle(UpdateState::Checking, DeliveryEvent::UpdateAvailable(info));
            }
            Ok(None) => {
                self.lifecycle
                    .settle(UpdateState::Checking, DeliveryEvent::UpdateNotAvailable(None));
            }
            Err(e) => {
                tracing::warn!("Update check failed: {:#}", e);
                let error = UpdateError::CheckFailed(format!("{:#}", e));
                self.lifecycle.fail(UpdateState::Checking, &error);
                return Err(error);
            }
        }

        if self.auto_download && self.state() == UpdateState::Available {
            return self.download_update().await;
        }
        Ok(())
    }

    /// Download the release found by the last check
    pub async fn download_update(&self) -> Result<(), UpdateError> {
        if !self.delivery.is_available() {
            let error = self.unavailable();
            self.lifecycle.status(error.to_string());
            return Err(error);
        }

        if let Err(error) = self.lifecycle.begin(Operation::Download) {
            self.lifecycle.status(error.to_string());
            return Err(error);
        }

        match self.delivery.download_update(&self.events).await {
            Ok(info) => {
                self.lifecycle
                    .settle(UpdateState::Downloading, DeliveryEvent::UpdateDownloaded(info));
                Ok(())
            }
            Err(e) => {
                tracing::error!("Update download failed: {:#}", e);
                let error = UpdateError::DownloadFailed(format!("{:#}", e));
                self.lifecycle.fail(UpdateState::Downloading, &error);
                Err(error)
            }
        }
    }

    /// Quit and run the downloaded installer. Does not return on success.
    pub fn install_update(&self) -> Result<(), UpdateError> {
        if !self.delivery.is_available() {
            tracing::debug!("Install requested without an update feed, ignoring");
            return Err(self.unavailable());
        }

        if let Err(error) = self.lifecycle.begin(Operation::Install) {
            tracing::warn!("{}", error);
            self.lifecycle.status(error.to_string());
            return Err(error);
        }

        match self.last_update_info() {
            Some(info) => self
                .lifecycle
                .status(format!("Restarting to install update {}", info.version)),
            None => self.lifecycle.status("Restarting to install update"),
        }

        if let Err(e) = self.delivery.quit_and_install() {
            tracing::error!("Failed to start installer: {:#}", e);
            let error = UpdateError::InstallFailed(format!("{:#}", e));
            self.lifecycle.rollback_install(&error);
            return Err(error);
        }
        Ok(())
    }
}
