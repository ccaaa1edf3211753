use std::time::Duration;

use eframe::egui;
use egui_commonmark::CommonMarkCache;

use crate::config::Config;
use crate::gateway::GatewayClient;
use crate::state::{StateEvent, UpdateUiController};
use crate::ui::{self, Theme};

/// Repaint interval while a request is in flight
const BUSY_REPAINT: Duration = Duration::from_millis(100);

/// Repaint interval when idle, so pushed events still show up
const IDLE_REPAINT: Duration = Duration::from_secs(1);

/// Main application state
pub struct UpdaterApp {
    /// Window theme
    theme: Theme,
    /// Update panel controller, connected to the gateway
    controller: UpdateUiController,
    /// Status message for the status bar
    status_message: String,
    /// Cache for release notes rendering
    markdown_cache: CommonMarkCache,
}

impl UpdaterApp {
    /// Create the window and attach the update panel to the gateway
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &Config,
        client: GatewayClient,
        runtime_version: String,
        auto_check: bool,
    ) -> Self {
        let theme = Theme::from_config(&config.launcher);
        theme.apply(&cc.egui_ctx);

        let mut controller = UpdateUiController::new();
        controller.runtime_version = Some(runtime_version);
        controller.attach(client, auto_check);

        Self {
            theme,
            controller,
            status_message: "Ready".to_string(),
            markdown_cache: CommonMarkCache::default(),
        }
    }

    fn apply_events(&mut self, events: Vec<StateEvent>) {
        for event in events {
            match event {
                StateEvent::StatusMessage(text) => self.status_message = text,
                StateEvent::LogError(text) => tracing::error!("{}", text),
                StateEvent::LogInfo(text) => tracing::info!("{}", text),
            }
        }
    }
}

impl eframe::App for UpdaterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let events = self.controller.poll();
        self.apply_events(events);

        if self.controller.is_busy() {
            ctx.request_repaint_after(BUSY_REPAINT);
        } else {
            ctx.request_repaint_after(IDLE_REPAINT);
        }

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui
                        .add_enabled(self.controller.can_check(), egui::Button::new("Check for Updates"))
                        .clicked()
                    {
                        self.controller.check_for_updates();
                    }
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            });
        });

        // Status bar at bottom
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status_message);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui::render_update_panel(
                    ui,
                    &mut self.controller,
                    &mut self.markdown_cache,
                    &self.theme,
                );
            });
        });
    }
}
