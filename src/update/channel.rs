//! One-directional event fan-out from the coordinator to the display layer.
//!
//! Events are fire-and-forget: nothing is retained for late subscribers, so a
//! listener attached after an event was emitted never sees it. A listener
//! subscribed before a request is issued sees every event that request causes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::UpdateInfo;

/// The closed set of event channels the display layer may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    UpdateStatus,
    UpdateAvailable,
    UpdateDownloaded,
}

impl EventChannel {
    pub const ALL: [EventChannel; 3] = [
        EventChannel::UpdateStatus,
        EventChannel::UpdateAvailable,
        EventChannel::UpdateDownloaded,
    ];

    /// Channel name as seen across the boundary
    pub fn name(&self) -> &'static str {
        match self {
            EventChannel::UpdateStatus => "update-status",
            EventChannel::UpdateAvailable => "update-available",
            EventChannel::UpdateDownloaded => "update-downloaded",
        }
    }

    /// Look up a channel by its boundary name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A status line, stamped when it is emitted
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub at: DateTime<Utc>,
}

impl StatusMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Events published by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Status(StatusMessage),
    UpdateAvailable(UpdateInfo),
    UpdateDownloaded(UpdateInfo),
}

impl HostEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            HostEvent::Status(_) => EventChannel::UpdateStatus,
            HostEvent::UpdateAvailable(_) => EventChannel::UpdateAvailable,
            HostEvent::UpdateDownloaded(_) => EventChannel::UpdateDownloaded,
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, (EventChannel, mpsc::UnboundedSender<HostEvent>)>,
}

/// Broadcast of lifecycle events, one queue per subscriber
#[derive(Clone, Default)]
pub struct UpdateStatusChannel {
    registry: Arc<Mutex<Registry>>,
}

impl UpdateStatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one channel. Dropping the subscription unsubscribes it.
    pub fn subscribe(&self, channel: EventChannel) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, (channel, tx));

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every subscriber of its channel
    pub fn emit(&self, event: HostEvent) {
        let channel = event.channel();
        let mut registry = lock(&self.registry);
        registry.listeners.retain(|_, (subscribed, tx)| {
            if *subscribed != channel {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }

    /// Emit a status line on `update-status`
    pub fn send_status(&self, text: impl Into<String>) {
        let message = StatusMessage::new(text);
        tracing::info!(target: "app_updater::status", at = %message.at, "{}", message.text);
        self.emit(HostEvent::Status(message));
    }

    /// Number of live subscriptions
    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

/// A live subscription to one event channel
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<HostEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next event; `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<HostEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(version: &str) -> UpdateInfo {
        UpdateInfo {
            version: version.to_string(),
            release_date: "2026-03-01T00:00:00Z".to_string(),
            release_notes: None,
        }
    }

    #[test]
    fn test_channel_names_round_trip() {
        for channel in EventChannel::ALL {
            assert_eq!(EventChannel::from_name(channel.name()), Some(channel));
        }
        assert_eq!(EventChannel::from_name("app-version"), None);
    }

    #[test]
    fn test_events_routed_by_channel() {
        let channel = UpdateStatusChannel::new();
        let mut status = channel.subscribe(EventChannel::UpdateStatus);
        let mut available = channel.subscribe(EventChannel::UpdateAvailable);

        channel.send_status("Checking for update...");
        channel.emit(HostEvent::UpdateAvailable(info("1.1.0")));

        match status.try_recv() {
            Some(HostEvent::Status(msg)) => assert_eq!(msg.text, "Checking for update..."),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(status.try_recv().is_none());

        assert_eq!(
            available.try_recv(),
            Some(HostEvent::UpdateAvailable(info("1.1.0")))
        );
        assert!(available.try_recv().is_none());
    }

    #[test]
    fn test_late_subscriber_sees_nothing_earlier() {
        let channel = UpdateStatusChannel::new();
        channel.send_status("before");

        let mut late = channel.subscribe(EventChannel::UpdateStatus);
        assert!(late.try_recv().is_none());

        channel.send_status("after");
        assert!(matches!(late.try_recv(), Some(HostEvent::Status(m)) if m.text == "after"));
    }

    #[test]
    fn test_dropped_subscription_disposes_listener() {
        let channel = UpdateStatusChannel::new();
        let first = channel.subscribe(EventChannel::UpdateStatus);
        let _second = channel.subscribe(EventChannel::UpdateDownloaded);
        assert_eq!(channel.listener_count(), 2);

        drop(first);
        assert_eq!(channel.listener_count(), 1);

        channel.send_status("nobody listening");
        assert_eq!(channel.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_recv_ends_when_channel_dropped() {
        let channel = UpdateStatusChannel::new();
        let mut sub = channel.subscribe(EventChannel::UpdateStatus);
        channel.send_status("last words");
        drop(channel);

        assert!(matches!(sub.recv().await, Some(HostEvent::Status(_))));
        assert!(sub.recv().await.is_none());
    }
}
