//! Boundary between the display layer and the update coordinator.
//!
//! The display side holds a [`GatewayClient`]; the host side runs
//! [`BoundaryGateway::serve`]. Only JSON crosses in either direction:
//!
//! - requests: `{"operation":"checkForUpdates"}`
//! - responses: `{"ok":...}` or `{"error":"..."}`
//! - events: `{"channel":"update-available","payload":{...}}`
//!
//! The operation and event sets are closed. Update failures are reported on
//! `update-status`, never through a response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::update::{
    EventChannel, HostEvent, Subscription, UpdateCoordinator, UpdateInfo, UpdateStatusChannel,
};

/// Operations the display layer may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    CheckForUpdates,
    DownloadUpdate,
    InstallUpdate,
    GetAppVersion,
}

impl GatewayOperation {
    pub const ALL: [GatewayOperation; 4] = [
        GatewayOperation::CheckForUpdates,
        GatewayOperation::DownloadUpdate,
        GatewayOperation::InstallUpdate,
        GatewayOperation::GetAppVersion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GatewayOperation::CheckForUpdates => "checkForUpdates",
            GatewayOperation::DownloadUpdate => "downloadUpdate",
            GatewayOperation::InstallUpdate => "installUpdate",
            GatewayOperation::GetAppVersion => "getAppVersion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

/// Errors at the boundary itself. Update failures never show up here.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unknown event channel: {0}")]
    UnknownChannel(String),

    #[error("Update gateway is closed")]
    Closed,

    #[error("Malformed gateway message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    operation: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Response {
    Ok(serde_json::Value),
    Error(String),
}

/// An event as seen on the display side of the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum WireEvent {
    UpdateStatus(String),
    UpdateAvailable(UpdateInfo),
    UpdateDownloaded(UpdateInfo),
}

impl From<HostEvent> for WireEvent {
    fn from(event: HostEvent) -> Self {
        match event {
            HostEvent::Status(message) => WireEvent::UpdateStatus(message.text),
            HostEvent::UpdateAvailable(info) => WireEvent::UpdateAvailable(info),
            HostEvent::UpdateDownloaded(info) => WireEvent::UpdateDownloaded(info),
        }
    }
}

/// Encode a host event as it travels across the boundary
pub fn encode_event(event: HostEvent) -> Result<String, GatewayError> {
    Ok(serde_json::to_string(&WireEvent::from(event))?)
}

/// Decode an event received from the boundary
pub fn decode_event(json: &str) -> Result<WireEvent, GatewayError> {
    Ok(serde_json::from_str(json)?)
}

struct Envelope {
    request: String,
    reply: oneshot::Sender<String>,
}

/// Host side of the boundary; owns the only reference to the coordinator
/// reachable from a request.
pub struct BoundaryGateway {
    coordinator: Arc<UpdateCoordinator>,
    requests: mpsc::UnboundedReceiver<Envelope>,
}

impl BoundaryGateway {
    pub fn new(coordinator: Arc<UpdateCoordinator>) -> (Self, GatewayClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = GatewayClient {
            requests: tx,
            events: coordinator.channel().clone(),
        };
        let gateway = Self {
            coordinator,
            requests: rx,
        };
        (gateway, client)
    }

    /// Dispatch requests until every client is gone. Each request runs on
    /// its own task so a long download never blocks a version query.
    pub async fn serve(mut self) {
        tracing::debug!("Update gateway serving");

        while let Some(envelope) = self.requests.recv().await {
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                let response = dispatch(&coordinator, &envelope.request).await;
                let encoded = match serde_json::to_string(&response) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::error!("Failed to encode gateway response: {}", e);
                        return;
                    }
                };
                if envelope.reply.send(encoded).is_err() {
                    tracing::debug!("Gateway caller went away before the response");
                }
            });
        }

        tracing::debug!("Update gateway closed");
    }
}

fn decode_request(raw: &str) -> Result<GatewayOperation, GatewayError> {
    let request: Request = serde_json::from_str(raw)?;
    GatewayOperation::from_name(&request.operation)
        .ok_or(GatewayError::UnknownOperation(request.operation))
}

async fn dispatch(coordinator: &UpdateCoordinator, raw: &str) -> Response {
    let operation = match decode_request(raw) {
        Ok(operation) => operation,
        Err(e) => {
            tracing::warn!("Rejected gateway request: {}", e);
            return Response::Error(e.to_string());
        }
    };
    tracing::debug!("Gateway request: {}", operation.name());

    let outcome = match operation {
        GatewayOperation::CheckForUpdates => coordinator.check_for_updates().await,
        GatewayOperation::DownloadUpdate => coordinator.download_update().await,
        GatewayOperation::InstallUpdate => coordinator.install_update(),
        GatewayOperation::GetAppVersion => {
            let version = coordinator.resolve_version_info().app_version;
            return Response::Ok(serde_json::Value::String(version));
        }
    };

    // Already reported on update-status
    if let Err(e) = outcome {
        tracing::debug!("{} finished with: {}", operation.name(), e);
    }
    Response::Ok(serde_json::Value::Null)
}

/// Display side of the boundary
#[derive(Clone)]
pub struct GatewayClient {
    requests: mpsc::UnboundedSender<Envelope>,
    events: UpdateStatusChannel,
}

impl GatewayClient {
    /// Send a raw JSON request and wait for the raw JSON response
    pub async fn send_raw(&self, request: impl Into<String>) -> Result<String, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope {
                request: request.into(),
                reply,
            })
            .map_err(|_| GatewayError::Closed)?;
        response.await.map_err(|_| GatewayError::Closed)
    }

    /// Invoke an operation by its boundary name
    pub async fn invoke(&self, operation: &str) -> Result<serde_json::Value, GatewayError> {
        let operation = GatewayOperation::from_name(operation)
            .ok_or_else(|| GatewayError::UnknownOperation(operation.to_string()))?;
        self.request(operation).await
    }

    async fn request(&self, operation: GatewayOperation) -> Result<serde_json::Value, GatewayError> {
        let request = serde_json::to_string(&Request {
            operation: operation.name().to_string(),
        })?;
        let response = self.send_raw(request).await?;
        match serde_json::from_str(&response)? {
            Response::Ok(value) => Ok(value),
            Response::Error(message) => Err(GatewayError::Rejected(message)),
        }
    }

    pub async fn check_for_updates(&self) -> Result<(), GatewayError> {
        self.invoke(GatewayOperation::CheckForUpdates.name()).await.map(|_| ())
    }

    pub async fn download_update(&self) -> Result<(), GatewayError> {
        self.invoke(GatewayOperation::DownloadUpdate.name()).await.map(|_| ())
    }

    /// Does not complete on success: the process exits to run the installer
    pub async fn install_update(&self) -> Result<(), GatewayError> {
        self.invoke(GatewayOperation::InstallUpdate.name()).await.map(|_| ())
    }

    pub async fn get_app_version(&self) -> Result<String, GatewayError> {
        let value = self.invoke(GatewayOperation::GetAppVersion.name()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribe to an event channel by its boundary name
    pub fn on(&self, channel: &str) -> Result<EventSubscription, GatewayError> {
        let channel = EventChannel::from_name(channel)
            .ok_or_else(|| GatewayError::UnknownChannel(channel.to_string()))?;
        Ok(EventSubscription {
            inner: self.events.subscribe(channel),
        })
    }
}

/// Display-side subscription; every event is carried across as JSON.
/// Dropping it unsubscribes.
pub struct EventSubscription {
    inner: Subscription,
}

impl EventSubscription {
    /// Wait for the next event; `None` once the host is gone
    pub async fn recv(&mut self) -> Option<WireEvent> {
        loop {
            let event = self.inner.recv().await?;
            if let Some(wire) = cross(event) {
                return Some(wire);
            }
        }
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<WireEvent> {
        while let Some(event) = self.inner.try_recv() {
            if let Some(wire) = cross(event) {
                return Some(wire);
            }
        }
        None
    }
}

fn cross(event: HostEvent) -> Option<WireEvent> {
    let decoded = encode_event(event).and_then(|json| decode_event(&json));
    match decoded {
        Ok(wire) => Some(wire),
        Err(e) => {
            tracing::error!("Dropping event that failed to cross the gateway: {}", e);
            None
        }
    }
}
