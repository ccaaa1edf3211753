// Hide console window in release builds when launched as a window (Windows GUI app)
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod cli;
mod config;
mod context;
mod gateway;
mod state;
mod task;
mod ui;
mod update;
mod version;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;
use crate::context::RuntimeContext;
use crate::gateway::{BoundaryGateway, GatewayClient};
use crate::update::UpdateCoordinator;
use crate::version::{VersionInfo, RUNTIME_VERSION};

/// Build the coordinator for this process and serve it behind the gateway
fn start_gateway(context: RuntimeContext, config: &Config, versions: VersionInfo) -> GatewayClient {
    let coordinator = Arc::new(UpdateCoordinator::initialize(context, versions, config));
    let (gateway, client) = BoundaryGateway::new(coordinator);
    tokio::spawn(gateway.serve());
    client
}

fn run_window(
    config: Config,
    context: RuntimeContext,
    versions: VersionInfo,
    client: GatewayClient,
) -> Result<()> {
    let auto_check = config.updates.startup_check(context.is_production());

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([560.0, 520.0])
        .with_min_inner_size([420.0, 360.0])
        .with_title(config.launcher.window_title.clone());

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "app-updater",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(app::UpdaterApp::new(
                cc,
                &config,
                client,
                versions.host_runtime_version,
                auto_check,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Headless commands keep stdout for their own output
    let default_filter = if cli.command.is_some() {
        "app_updater=warn"
    } else {
        "app_updater=debug,info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let context = cli.context.unwrap_or_else(RuntimeContext::detect);
    tracing::info!("Starting app-updater {} ({} context)", RUNTIME_VERSION, context);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load configuration, using defaults: {:#}", e);
            Config::default()
        }
    };

    let versions = VersionInfo::resolve(context, config.feed.manifest_path.as_deref());
    tracing::info!(
        "App version {} (runtime {})",
        versions.app_version,
        versions.host_runtime_version
    );

    let needs_gateway = cli
        .command
        .as_ref()
        .is_none_or(|command| command.needs_coordinator());
    let client = needs_gateway.then(|| start_gateway(context, &config, versions.clone()));

    match cli.command {
        Some(command) => {
            if let Err(e) = cli::run(command, &cli.output, context, &versions, client).await {
                cli::print_error(&format!("{:#}", e));
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            let client = client.context("Update gateway was not started")?;
            run_window(config, context, versions, client)
        }
    }
}
