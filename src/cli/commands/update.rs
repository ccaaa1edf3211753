//! Update commands
//!
//! Each command drives the coordinator through the gateway client, exactly
//! like the window does, and prints every status line as it arrives.

use std::future::Future;

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{print_formatted, print_success, OutputFormat, StatusPrinter};
use crate::context::RuntimeContext;
use crate::gateway::{EventSubscription, GatewayClient, GatewayError, WireEvent};
use crate::update::{reports_no_update, UpdateInfo};
use crate::version::VersionInfo;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResult {
    current_version: String,
    update_available: bool,
    update: Option<UpdateInfo>,
    status: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResult {
    update: Option<UpdateInfo>,
    downloaded: bool,
    status: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionResult {
    app_version: String,
    host_runtime_version: String,
    context: RuntimeContext,
}

/// Subscriptions opened before the first request, so no event is missed
struct Session {
    client: GatewayClient,
    status: EventSubscription,
    available: EventSubscription,
    downloaded: EventSubscription,
    printer: StatusPrinter,
    lines: Vec<String>,
    update: Option<UpdateInfo>,
    update_downloaded: bool,
}

impl Session {
    fn open(client: GatewayClient, format: OutputFormat, quiet: bool) -> Result<Self, GatewayError> {
        Ok(Self {
            status: client.on("update-status")?,
            available: client.on("update-available")?,
            downloaded: client.on("update-downloaded")?,
            client,
            printer: StatusPrinter::new(format, quiet),
            lines: Vec::new(),
            update: None,
            update_downloaded: false,
        })
    }

    /// Run one request, printing status lines while it is in flight
    async fn run<F, Fut>(&mut self, request: F) -> Result<()>
    where
        F: FnOnce(GatewayClient) -> Fut,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let request = request(self.client.clone());
        tokio::pin!(request);

        let result = loop {
            let event = tokio::select! {
                result = &mut request => break result,
                Some(event) = self.status.recv() => event,
            };
            self.record(event);
        };

        while let Some(event) = self.status.try_recv() {
            self.record(event);
        }
        while let Some(event) = self.available.try_recv() {
            self.record(event);
        }
        while let Some(event) = self.downloaded.try_recv() {
            self.record(event);
        }
        self.printer.finish_progress();

        Ok(result?)
    }

    fn record(&mut self, event: WireEvent) {
        match event {
            WireEvent::UpdateStatus(text) => {
                self.printer.line(&text);
                self.lines.push(text);
            }
            WireEvent::UpdateAvailable(info) => self.update = Some(info),
            WireEvent::UpdateDownloaded(info) => {
                if !info.version.is_empty() || self.update.is_none() {
                    self.update = Some(info);
                }
                self.update_downloaded = true;
            }
        }
    }

    fn last_status(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("no status reported")
    }

    /// A check finished when it announced an update or reported none
    fn check_settled(&self) -> bool {
        self.update.is_some() || reports_no_update(self.last_status())
    }
}

pub async fn check(client: GatewayClient, format: OutputFormat, quiet: bool) -> Result<()> {
    let current_version = client.get_app_version().await?;
    let mut session = Session::open(client, format, quiet)?;

    session.run(|c| async move { c.check_for_updates().await }).await?;

    let settled = session.check_settled();
    let result = CheckResult {
        current_version,
        update_available: session.update.is_some(),
        update: session.update.clone(),
        status: session.lines.clone(),
    };

    if !settled {
        if format == OutputFormat::Json {
            print_formatted(&result, format, |_| String::new());
        }
        anyhow::bail!("Update check failed: {}", session.last_status());
    }

    print_formatted(&result, format, |r| match &r.update {
        Some(info) => {
            let mut text = format!(
                "\nUpdate available: {} -> {}",
                r.current_version, info.version
            );
            if let Some(notes) = &info.release_notes {
                text.push_str(&format!("\n\n{}", notes.trim()));
            }
            text.push_str("\n\nRun 'app-updater download' to fetch it.");
            text
        }
        None => format!("\nYou are running the latest version ({}).", r.current_version),
    });

    Ok(())
}

/// Check, then download whatever the check found
async fn fetch(session: &mut Session) -> Result<bool> {
    session.run(|c| async move { c.check_for_updates().await }).await?;
    if !session.check_settled() {
        anyhow::bail!("Update check failed: {}", session.last_status());
    }
    if session.update.is_none() {
        return Ok(false);
    }

    session.run(|c| async move { c.download_update().await }).await?;
    if !session.update_downloaded {
        anyhow::bail!("Download did not complete: {}", session.last_status());
    }
    Ok(true)
}

pub async fn download(client: GatewayClient, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut session = Session::open(client, format, quiet)?;
    let downloaded = fetch(&mut session).await?;

    let result = DownloadResult {
        update: session.update.clone(),
        downloaded,
        status: session.lines.clone(),
    };
    print_formatted(&result, format, |r| match (&r.update, r.downloaded) {
        (Some(info), true) => format!(
            "\nUpdate {} is ready. Run 'app-updater install' to install it.",
            info.version
        ),
        _ => "\nNo update available.".to_string(),
    });

    Ok(())
}

pub async fn install(client: GatewayClient, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut session = Session::open(client, format, quiet)?;
    if !fetch(&mut session).await? {
        print_success("No update available.", quiet);
        return Ok(());
    }

    // Only returns if the installer could not be started
    session.run(|c| async move { c.install_update().await }).await?;
    anyhow::bail!("Install did not start: {}", session.last_status())
}

pub async fn version(
    client: GatewayClient,
    context: RuntimeContext,
    versions: &VersionInfo,
    format: OutputFormat,
) -> Result<()> {
    let result = VersionResult {
        app_version: client.get_app_version().await?,
        host_runtime_version: versions.host_runtime_version.clone(),
        context,
    };

    print_formatted(&result, format, |r| {
        format!(
            "App version:     {}\nRuntime version: {}\nContext:         {}",
            r.app_version, r.host_runtime_version, r.context
        )
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::BoundaryGateway;
    use crate::update::testing::{release, versions, Calls, ScriptedDelivery};
    use crate::update::{NullDelivery, UpdateCoordinator, UpdateDelivery};
    use std::sync::Arc;

    fn client(context: RuntimeContext, delivery: Box<dyn UpdateDelivery>) -> GatewayClient {
        let coordinator = Arc::new(UpdateCoordinator::with_delivery(context, versions(), delivery));
        let (gateway, client) = BoundaryGateway::new(coordinator);
        tokio::spawn(gateway.serve());
        client
    }

    #[tokio::test]
    async fn test_fetch_downloads_announced_update() {
        let calls = Arc::new(Calls::default());
        let client = client(
            RuntimeContext::Production,
            Box::new(ScriptedDelivery::announcing(calls, release("1.1.0"))),
        );
        let mut session = Session::open(client, OutputFormat::Json, true).unwrap();

        assert!(fetch(&mut session).await.unwrap());
        assert_eq!(session.update, Some(release("1.1.0")));
        assert!(session.update_downloaded);
        assert_eq!(session.lines.first().map(String::as_str), Some("Checking for update..."));
        assert_eq!(
            session.last_status(),
            "Update downloaded; will install on quit"
        );
    }

    #[tokio::test]
    async fn test_fetch_with_nothing_new() {
        let calls = Arc::new(Calls::default());
        let mut delivery = ScriptedDelivery::new(calls.clone());
        delivery.check_outcome = Ok(None);
        let client = client(RuntimeContext::Production, Box::new(delivery));
        let mut session = Session::open(client, OutputFormat::Json, true).unwrap();

        assert!(!fetch(&mut session).await.unwrap());
        assert_eq!(session.last_status(), "Update not available. Current 1.0.0");
        assert_eq!(
            calls.downloads.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_fetch_in_development_fails_with_status() {
        let client = client(RuntimeContext::Development, Box::new(NullDelivery));
        let mut session = Session::open(client, OutputFormat::Json, true).unwrap();

        let err = fetch(&mut session).await.unwrap_err();
        assert!(err.to_string().contains("Updater not initialized"));
    }
}
