//! Scripted delivery capability shared by the update, gateway and display tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;

use crate::version::VersionInfo;

use super::channel::{HostEvent, Subscription};
use super::delivery::{DeliveryEvents, UpdateDelivery};
use super::{DeliveryEvent, DownloadProgress, UpdateInfo};

#[derive(Default)]
pub struct Calls {
    pub checks: AtomicUsize,
    pub downloads: AtomicUsize,
    pub installs: AtomicUsize,
}

/// Delivery capability that replays scripted events and outcomes
pub struct ScriptedDelivery {
    pub check_events: Vec<DeliveryEvent>,
    pub check_outcome: Result<Option<UpdateInfo>, String>,
    pub download_events: Vec<DeliveryEvent>,
    pub download_outcome: Result<UpdateInfo, String>,
    pub install_outcome: Result<(), String>,
    /// Every check after the first finds nothing newer
    pub nothing_on_recheck: bool,
    /// Holds a check until notified
    pub gate: Option<Arc<Notify>>,
    /// Holds a download until notified
    pub download_gate: Option<Arc<Notify>>,
    pub calls: Arc<Calls>,
}

impl ScriptedDelivery {
    pub fn new(calls: Arc<Calls>) -> Self {
        Self {
            check_events: Vec::new(),
            check_outcome: Ok(None),
            download_events: Vec::new(),
            download_outcome: Err("nothing to download".to_string()),
            install_outcome: Ok(()),
            nothing_on_recheck: false,
            gate: None,
            download_gate: None,
            calls,
        }
    }

    /// Behaves like a feed that announces every step through events
    pub fn announcing(calls: Arc<Calls>, info: UpdateInfo) -> Self {
        let mut delivery = Self::new(calls);
        delivery.check_events = vec![
            DeliveryEvent::CheckingForUpdate,
            DeliveryEvent::UpdateAvailable(info.clone()),
        ];
        delivery.check_outcome = Ok(Some(info.clone()));
        delivery.download_events = vec![
            DeliveryEvent::DownloadProgress(DownloadProgress {
                bytes_per_second: 1000,
                percent: 50.0,
                transferred: 500,
                total: 1000,
            }),
            DeliveryEvent::UpdateDownloaded(info.clone()),
        ];
        delivery.download_outcome = Ok(info);
        delivery
    }
}

impl UpdateDelivery for ScriptedDelivery {
    fn check_for_updates<'a>(
        &'a self,
        events: &'a DeliveryEvents,
    ) -> BoxFuture<'a, anyhow::Result<Option<UpdateInfo>>> {
        async move {
            let earlier = self.calls.checks.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if earlier > 0 && self.nothing_on_recheck {
                events.emit(DeliveryEvent::CheckingForUpdate);
                return Ok(None);
            }
            for event in &self.check_events {
                events.emit(event.clone());
            }
            self.check_outcome.clone().map_err(|e| anyhow::anyhow!(e))
        }
        .boxed()
    }

    fn download_update<'a>(
        &'a self,
        events: &'a DeliveryEvents,
    ) -> BoxFuture<'a, anyhow::Result<UpdateInfo>> {
        async move {
            self.calls.downloads.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.download_gate {
                gate.notified().await;
            }
            for event in &self.download_events {
                events.emit(event.clone());
            }
            self.download_outcome.clone().map_err(|e| anyhow::anyhow!(e))
        }
        .boxed()
    }

    fn quit_and_install(&self) -> anyhow::Result<()> {
        self.calls.installs.fetch_add(1, Ordering::SeqCst);
        self.install_outcome.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

pub fn versions() -> VersionInfo {
    VersionInfo {
        app_version: "1.0.0".to_string(),
        host_runtime_version: "1.0.0".to_string(),
    }
}

pub fn release(version: &str) -> UpdateInfo {
    UpdateInfo {
        version: version.to_string(),
        release_date: "2026-09-30T12:00:00Z".to_string(),
        release_notes: Some("Bug fixes".to_string()),
    }
}

/// Collect the status lines queued on an `update-status` subscription
pub fn drain_status(sub: &mut Subscription) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(event) = sub.try_recv() {
        if let HostEvent::Status(msg) = event {
            lines.push(msg.text);
        }
    }
    lines
}
