//! Update panel state
//!
//! Talks to the coordinator only through the gateway client. Everything here
//! is a copy of what came across the boundary; the coordinator stays the
//! authority on what is allowed.

use chrono::{DateTime, Local};

use crate::gateway::{EventSubscription, GatewayClient, GatewayError, WireEvent};
use crate::state::StateEvent;
use crate::task::{PendingRequest, PollResult};
use crate::update::{reports_available, reports_no_update, EventChannel, UpdateInfo, UpdateState};
use crate::version::RUNTIME_VERSION;

/// Display-side controller for the update panel
#[derive(Default)]
pub struct UpdateUiController {
    client: Option<GatewayClient>,
    subscriptions: Vec<EventSubscription>,
    version_request: PendingRequest<Result<String, GatewayError>>,
    check_request: PendingRequest<Result<(), GatewayError>>,
    download_request: PendingRequest<Result<(), GatewayError>>,
    install_request: PendingRequest<Result<(), GatewayError>>,
    /// Fire the first check once the version request settles
    check_after_version: bool,
    /// Settled result of the last check or download when it left nothing
    /// to act on
    outcome: Option<UpdateState>,
    /// Last status line received
    pub status: Option<String>,
    /// When the last status line arrived
    pub status_at: Option<DateTime<Local>>,
    /// Release announced on `update-available`
    pub available: Option<UpdateInfo>,
    /// Release announced on `update-downloaded`
    pub downloaded: Option<UpdateInfo>,
    pub app_version: Option<String>,
    /// Runtime version resolved by the host at startup
    pub runtime_version: Option<String>,
}

impl UpdateUiController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to the gateway.
    ///
    /// Subscribes to every event channel first, then asks for the app
    /// version; when `auto_check` is set the initial check follows once the
    /// version request has settled, whatever its outcome.
    pub fn attach(&mut self, client: GatewayClient, auto_check: bool) {
        self.subscriptions = EventChannel::ALL
            .into_iter()
            .filter_map(|channel| match client.on(channel.name()) {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    tracing::error!("Failed to subscribe to {}: {}", channel.name(), e);
                    None
                }
            })
            .collect();

        let version_client = client.clone();
        self.version_request
            .spawn(async move { version_client.get_app_version().await });
        self.check_after_version = auto_check;
        self.client = Some(client);

        tracing::debug!("Update panel attached (auto check: {})", auto_check);
    }

    pub fn is_attached(&self) -> bool {
        self.client.is_some()
    }

    /// Display-side view of the update lifecycle
    pub fn state(&self) -> UpdateState {
        if self.install_request.is_running() {
            UpdateState::Installing
        } else if self.downloaded.is_some() {
            UpdateState::Downloaded
        } else if self.download_request.is_running() {
            UpdateState::Downloading
        } else if self.check_request.is_running() {
            UpdateState::Checking
        } else if let Some(outcome) = self.outcome {
            outcome
        } else if self.available.is_some() {
            UpdateState::Available
        } else {
            UpdateState::Idle
        }
    }

    /// Whether a request is still in flight
    pub fn is_busy(&self) -> bool {
        self.version_request.is_running()
            || self.check_request.is_running()
            || self.download_request.is_running()
            || self.install_request.is_running()
    }

    pub fn is_checking(&self) -> bool {
        self.check_request.is_running()
    }

    /// A downloaded update blocks re-checks until it is installed
    pub fn can_check(&self) -> bool {
        self.is_attached()
            && !matches!(
                self.state(),
                UpdateState::Checking
                    | UpdateState::Downloading
                    | UpdateState::Downloaded
                    | UpdateState::Installing
            )
    }

    pub fn can_download(&self) -> bool {
        self.state() == UpdateState::Available
    }

    pub fn can_install(&self) -> bool {
        self.state() == UpdateState::Downloaded
    }

    /// Runtime version to show, falling back to the build version
    pub fn runtime_version(&self) -> &str {
        self.runtime_version.as_deref().unwrap_or(RUNTIME_VERSION)
    }

    /// Status line to show, or the idle placeholder
    pub fn status_text(&self) -> &str {
        self.status
            .as_deref()
            .unwrap_or_else(|| UpdateState::Idle.description())
    }

    pub fn check_for_updates(&mut self) {
        if !self.can_check() {
            return;
        }
        let Some(client) = self.client.clone() else {
            return;
        };
        if self
            .check_request
            .spawn(async move { client.check_for_updates().await })
        {
            // A new check replaces whatever the last one found
            self.available = None;
            self.outcome = None;
            tracing::debug!("Requested update check");
        }
    }

    pub fn download_update(&mut self) {
        if !self.can_download() {
            return;
        }
        let Some(client) = self.client.clone() else {
            return;
        };
        if self
            .download_request
            .spawn(async move { client.download_update().await })
        {
            self.outcome = None;
            tracing::debug!("Requested update download");
        }
    }

    pub fn install_update(&mut self) {
        if !self.can_install() {
            return;
        }
        let Some(client) = self.client.clone() else {
            return;
        };
        if self
            .install_request
            .spawn(async move { client.install_update().await })
        {
            tracing::debug!("Requested update install");
        }
    }

    /// Drain events and finished requests
    pub fn poll(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();

        // Take finished requests before draining, so every event a finished
        // request caused is applied before its result
        let version = self.version_request.poll();
        let check = self.check_request.poll();
        let download = self.download_request.poll();
        let install = self.install_request.poll();

        let mut received = Vec::new();
        for subscription in &mut self.subscriptions {
            while let Some(event) = subscription.try_recv() {
                received.push(event);
            }
        }
        for event in received {
            self.apply(event, &mut events);
        }

        if let PollResult::Complete(result) = version {
            let version = match result {
                Ok(Ok(version)) if !version.is_empty() => version,
                Ok(Ok(_)) => self.runtime_version().to_string(),
                Ok(Err(e)) => {
                    events.push(StateEvent::LogError(format!(
                        "Version request failed, using build version: {}",
                        e
                    )));
                    self.runtime_version().to_string()
                }
                Err(e) => {
                    events.push(StateEvent::LogError(format!("Version task panicked: {}", e)));
                    self.runtime_version().to_string()
                }
            };
            events.push(StateEvent::LogInfo(format!("App version {}", version)));
            self.app_version = Some(version);
        }

        if let PollResult::Complete(result) = check {
            if self.request_finished(result, "Error checking for updates", &mut events) {
                self.settle_check();
            }
        }
        if let PollResult::Complete(result) = download {
            if self.request_finished(result, "Error downloading update", &mut events)
                && self.downloaded.is_none()
            {
                self.outcome = Some(UpdateState::Error);
            }
        }
        if let PollResult::Complete(result) = install {
            self.request_finished(result, "Error installing update", &mut events);
        }

        // The first check waits until the version request has settled
        if self.check_after_version && !self.version_request.is_running() {
            self.check_after_version = false;
            self.check_for_updates();
        }

        events
    }

    fn apply(&mut self, event: WireEvent, events: &mut Vec<StateEvent>) {
        match event {
            WireEvent::UpdateStatus(text) => {
                self.set_status(text.clone());
                events.push(StateEvent::StatusMessage(text));
            }
            WireEvent::UpdateAvailable(info) => {
                events.push(StateEvent::LogInfo(format!("Update available: {}", info.version)));
                self.available = Some(info);
                self.outcome = None;
            }
            WireEvent::UpdateDownloaded(info) => {
                events.push(StateEvent::LogInfo("Update downloaded".to_string()));
                // Payload may be partial; keep what the check announced
                let info = if info.version.is_empty() {
                    self.available.clone().unwrap_or(info)
                } else {
                    info
                };
                self.downloaded = Some(info);
                self.outcome = None;
            }
        }
    }

    /// Returns whether the request crossed the gateway. Only transport
    /// failures land here; update failures arrive as status lines.
    fn request_finished(
        &mut self,
        result: Result<Result<(), GatewayError>, tokio::task::JoinError>,
        failure_text: &str,
        events: &mut Vec<StateEvent>,
    ) -> bool {
        let error = match result {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("task panicked: {}", e),
        };
        events.push(StateEvent::LogError(format!("{}: {}", failure_text, error)));
        self.set_status(failure_text.to_string());
        events.push(StateEvent::StatusMessage(failure_text.to_string()));
        self.outcome = Some(UpdateState::Error);
        false
    }

    /// Read how a finished check ended from what it reported
    fn settle_check(&mut self) {
        if self.downloaded.is_some() {
            return;
        }
        let status = self.status.as_deref().unwrap_or_default();
        self.outcome = if self.available.is_some() && reports_available(status) {
            None
        } else if self.available.is_none() && reports_no_update(status) {
            Some(UpdateState::NoUpdate)
        } else {
            // Failed check, or a follow-up download that failed
            Some(UpdateState::Error)
        };
    }

    fn set_status(&mut self, text: String) {
        self.status = Some(text);
        self.status_at = Some(Local::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::gateway::BoundaryGateway;
    use crate::update::testing::{release, versions, Calls, ScriptedDelivery};
    use crate::update::{NullDelivery, UpdateCoordinator, UpdateDelivery};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        coordinator: Arc<UpdateCoordinator>,
        client: GatewayClient,
    }

    fn harness(context: RuntimeContext, delivery: Box<dyn UpdateDelivery>) -> Harness {
        let coordinator = Arc::new(UpdateCoordinator::with_delivery(context, versions(), delivery));
        let (gateway, client) = BoundaryGateway::new(Arc::clone(&coordinator));
        tokio::spawn(gateway.serve());
        Harness { coordinator, client }
    }

    /// Poll until `done` holds, collecting every emitted event
    async fn poll_until<F>(controller: &mut UpdateUiController, done: F) -> Vec<StateEvent>
    where
        F: Fn(&UpdateUiController) -> bool,
    {
        let mut events = Vec::new();
        for _ in 0..400 {
            events.extend(controller.poll());
            if done(controller) {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached; status = {:?}", controller.status);
    }

    fn statuses(events: &[StateEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                StateEvent::StatusMessage(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_attach_subscribes_then_checks_after_version() {
        let calls = Arc::new(Calls::default());
        let h = harness(
            RuntimeContext::Production,
            Box::new(ScriptedDelivery::announcing(calls.clone(), release("1.1.0"))),
        );
        let mut controller = UpdateUiController::new();

        controller.attach(h.client.clone(), true);
        assert_eq!(h.coordinator.channel().listener_count(), 3);
        assert_eq!(calls.checks.load(Ordering::SeqCst), 0);

        let events = poll_until(&mut controller, |c| c.available.is_some() && !c.is_busy()).await;

        assert_eq!(controller.app_version.as_deref(), Some("1.0.0"));
        assert_eq!(calls.checks.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses(&events),
            vec![
                "Checking for update...".to_string(),
                "Update available: 1.1.0 (current 1.0.0)".to_string(),
            ]
        );
        assert_eq!(controller.available, Some(release("1.1.0")));
        assert_eq!(controller.state(), UpdateState::Available);
        assert!(controller.status_at.is_some());
    }

    #[tokio::test]
    async fn test_no_auto_check_when_disabled() {
        let calls = Arc::new(Calls::default());
        let h = harness(
            RuntimeContext::Production,
            Box::new(ScriptedDelivery::announcing(calls.clone(), release("1.1.0"))),
        );
        let mut controller = UpdateUiController::new();
        controller.attach(h.client, false);

        poll_until(&mut controller, |c| c.app_version.is_some()).await;
        assert!(!controller.is_busy());
        assert_eq!(calls.checks.load(Ordering::SeqCst), 0);
        assert_eq!(controller.status_text(), "No updates checked");
    }

    #[tokio::test]
    async fn test_buttons_follow_lifecycle() {
        let calls = Arc::new(Calls::default());
        let h = harness(
            RuntimeContext::Production,
            Box::new(ScriptedDelivery::announcing(calls.clone(), release("1.1.0"))),
        );
        let mut controller = UpdateUiController::new();
        controller.attach(h.client, false);
        poll_until(&mut controller, |c| c.app_version.is_some()).await;

        assert!(!controller.can_download());
        assert!(!controller.can_install());
        controller.install_update();
        controller.download_update();
        assert!(!controller.is_busy());

        controller.check_for_updates();
        poll_until(&mut controller, |c| c.can_download()).await;
        assert!(!controller.can_install());

        controller.download_update();
        let events = poll_until(&mut controller, |c| c.can_install() && !c.is_busy()).await;
        assert_eq!(
            statuses(&events).last().map(String::as_str),
            Some("Update downloaded; will install on quit")
        );
        assert!(!controller.can_download());
        assert_eq!(controller.downloaded, Some(release("1.1.0")));

        controller.install_update();
        poll_until(&mut controller, |c| !c.is_busy()).await;
        assert_eq!(calls.installs.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.status.as_deref(),
            Some("Restarting to install update 1.1.0")
        );
    }

    #[tokio::test]
    async fn test_failed_download_disables_download() {
        let calls = Arc::new(Calls::default());
        let mut delivery = ScriptedDelivery::announcing(calls.clone(), release("1.1.0"));
        delivery.download_events.clear();
        delivery.download_outcome = Err("disk full".to_string());
        let h = harness(RuntimeContext::Production, Box::new(delivery));
        let mut controller = UpdateUiController::new();
        controller.attach(h.client, true);
        poll_until(&mut controller, |c| c.can_download()).await;

        controller.download_update();
        poll_until(&mut controller, |c| !c.is_busy()).await;

        assert_eq!(h.coordinator.state(), UpdateState::Error);
        assert_eq!(controller.state(), UpdateState::Error);
        assert!(!controller.can_download());
        assert!(!controller.can_install());
        assert!(controller.can_check());
        assert_eq!(controller.status_text(), "Download failed: disk full");
        assert_eq!(calls.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recheck_with_nothing_new_clears_release() {
        let calls = Arc::new(Calls::default());
        let mut delivery = ScriptedDelivery::announcing(calls.clone(), release("1.1.0"));
        delivery.nothing_on_recheck = true;
        let h = harness(RuntimeContext::Production, Box::new(delivery));
        let mut controller = UpdateUiController::new();
        controller.attach(h.client, true);
        poll_until(&mut controller, |c| c.can_download()).await;
        assert_eq!(controller.available, Some(release("1.1.0")));

        controller.check_for_updates();
        assert!(controller.available.is_none());
        poll_until(&mut controller, |c| !c.is_busy()).await;

        assert_eq!(calls.checks.load(Ordering::SeqCst), 2);
        assert_eq!(h.coordinator.state(), UpdateState::NoUpdate);
        assert_eq!(controller.state(), UpdateState::NoUpdate);
        assert!(controller.available.is_none());
        assert!(!controller.can_download());
        assert_eq!(controller.status_text(), "Update not available. Current 1.0.0");
    }

    #[test]
    fn test_runtime_version_prefers_resolved_value() {
        let mut controller = UpdateUiController::new();
        assert_eq!(controller.runtime_version(), RUNTIME_VERSION);

        controller.runtime_version = Some("2.0.0-host".to_string());
        assert_eq!(controller.runtime_version(), "2.0.0-host");
    }

    #[tokio::test]
    async fn test_development_build_shows_not_initialized() {
        let h = harness(RuntimeContext::Development, Box::new(NullDelivery));
        let mut controller = UpdateUiController::new();
        controller.attach(h.client, true);

        poll_until(&mut controller, |c| c.status.is_some() && !c.is_busy()).await;
        assert!(controller.status_text().starts_with("Updater not initialized"));
        assert!(!controller.can_download());
        assert_eq!(controller.state(), UpdateState::Error);
    }

    #[tokio::test]
    async fn test_version_falls_back_when_gateway_closed() {
        let coordinator = Arc::new(UpdateCoordinator::with_delivery(
            RuntimeContext::Production,
            versions(),
            Box::new(NullDelivery),
        ));
        let (gateway, client) = BoundaryGateway::new(coordinator);
        drop(gateway);

        let mut controller = UpdateUiController::new();
        controller.attach(client, true);
        let events = poll_until(&mut controller, |c| c.app_version.is_some() && !c.is_busy()).await;

        assert_eq!(controller.app_version.as_deref(), Some(RUNTIME_VERSION));
        assert_eq!(controller.status_text(), "Error checking for updates");
        assert!(events.iter().any(|e| matches!(e, StateEvent::LogError(_))));
    }

    #[tokio::test]
    async fn test_partial_downloaded_payload_keeps_announced_release() {
        let mut controller = UpdateUiController::new();
        let mut events = Vec::new();
        controller.apply(WireEvent::UpdateAvailable(release("1.1.0")), &mut events);
        controller.apply(WireEvent::UpdateDownloaded(UpdateInfo::default()), &mut events);

        assert_eq!(controller.downloaded, Some(release("1.1.0")));
        assert!(controller.can_install());
    }
}
