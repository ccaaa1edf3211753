//! The "App Updates" panel

use eframe::egui::{self, RichText};
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};

use crate::state::UpdateUiController;
use crate::ui::theme::Theme;
use crate::update::UpdateState;

/// Render version, status and the actions valid for the current state
pub fn render_update_panel(
    ui: &mut egui::Ui,
    controller: &mut UpdateUiController,
    markdown_cache: &mut CommonMarkCache,
    theme: &Theme,
) {
    ui.heading("App Updates");
    ui.add_space(10.0);

    let state = controller.state();
    let runtime_version = controller.runtime_version().to_string();

    egui::Grid::new("update_versions")
        .num_columns(2)
        .spacing([40.0, 6.0])
        .show(ui, |ui| {
            ui.label(RichText::new("App version:").color(theme.text_secondary));
            ui.monospace(controller.app_version.as_deref().unwrap_or("n/a"));
            ui.end_row();

            if controller
                .app_version
                .as_deref()
                .is_some_and(|v| v != runtime_version)
            {
                ui.label(RichText::new("Runtime version:").color(theme.text_secondary));
                ui.monospace(&runtime_version);
                ui.end_row();
            }

            ui.label(RichText::new("Status:").color(theme.text_secondary));
            ui.horizontal(|ui| {
                let status = RichText::new(controller.status_text()).strong();
                let status = if state == UpdateState::Error {
                    status.color(theme.error)
                } else {
                    status
                };
                ui.label(status);
                if let Some(at) = controller.status_at {
                    ui.label(
                        RichText::new(at.format("%H:%M:%S").to_string())
                            .small()
                            .color(theme.text_muted),
                    );
                }
            });
            ui.end_row();
        });

    let ready = matches!(state, UpdateState::Downloaded | UpdateState::Installing);
    let offered = matches!(state, UpdateState::Available | UpdateState::Downloading);

    if let Some(info) = controller.downloaded.clone().filter(|_| ready) {
        ui.add_space(10.0);
        egui::Frame::group(ui.style())
            .fill(theme.bg_medium)
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.label(RichText::new("Update Ready!").strong().color(theme.success));
                ui.label(format!(
                    "Version {} has been downloaded and is ready to install.",
                    display_version(&info.version)
                ));
                ui.add_space(4.0);
                if ui
                    .add_enabled(controller.can_install(), egui::Button::new("Install & Restart"))
                    .clicked()
                {
                    controller.install_update();
                }
            });
    } else if let Some(info) = controller.available.clone().filter(|_| offered) {
        ui.add_space(10.0);
        egui::Frame::group(ui.style())
            .fill(theme.bg_medium)
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.label(RichText::new("Update Available!").strong().color(theme.accent));
                ui.label(format!("Version: {}", display_version(&info.version)));
                if let Some(date) = info.release_date.get(..10) {
                    ui.label(RichText::new(format!("Released {}", date)).color(theme.text_muted));
                }

                if let Some(notes) = &info.release_notes {
                    ui.add_space(6.0);
                    let notes = link_bare_urls(notes);
                    egui::ScrollArea::vertical()
                        .max_height(150.0)
                        .show(ui, |ui| {
                            CommonMarkViewer::new().show(ui, markdown_cache, &notes);
                        });
                }

                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(controller.can_download(), egui::Button::new("Download Update"))
                        .clicked()
                    {
                        controller.download_update();
                    }
                    if state == UpdateState::Downloading {
                        ui.spinner();
                        ui.label("Downloading...");
                    }
                });
            });
    }

    ui.add_space(12.0);
    ui.horizontal(|ui| {
        let label = if controller.is_checking() {
            "Checking..."
        } else {
            "Check for Updates"
        };
        if ui
            .add_enabled(controller.can_check(), egui::Button::new(label))
            .clicked()
        {
            controller.check_for_updates();
        }
        if controller.is_checking() {
            ui.spinner();
        }
    });
}

fn display_version(version: &str) -> &str {
    if version.is_empty() { "unknown" } else { version }
}

/// Wrap bare URLs in `<...>` so the markdown renderer makes them clickable
fn link_bare_urls(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 16);
    let mut rest = text;

    while let Some(start) = rest.find("http") {
        let (before, candidate) = rest.split_at(start);
        result.push_str(before);

        let already_linked = before.ends_with("](") || before.ends_with('<');
        let is_url = candidate.starts_with("https://") || candidate.starts_with("http://");
        if already_linked || !is_url {
            result.push_str("http");
            rest = &candidate[4..];
            continue;
        }

        let end = candidate
            .find(|c: char| c.is_whitespace() || c == ')' || c == '>')
            .unwrap_or(candidate.len());
        result.push('<');
        result.push_str(&candidate[..end]);
        result.push('>');
        rest = &candidate[end..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_bare_urls() {
        assert_eq!(
            link_bare_urls("See https://example.com/notes for details"),
            "See <https://example.com/notes> for details"
        );
        assert_eq!(
            link_bare_urls("[notes](https://example.com/notes)"),
            "[notes](https://example.com/notes)"
        );
        assert_eq!(link_bare_urls("<https://example.com>"), "<https://example.com>");
        assert_eq!(link_bare_urls("httpd restarts"), "httpd restarts");
        assert_eq!(link_bare_urls("no links"), "no links");
    }

    #[test]
    fn test_display_version() {
        assert_eq!(display_version(""), "unknown");
        assert_eq!(display_version("1.2.0"), "1.2.0");
    }
}
