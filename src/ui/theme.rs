use eframe::egui::{self, Color32, Stroke, Visuals};

use crate::config::LauncherConfig;

/// Window colors
#[derive(Debug, Clone)]
pub struct Theme {
    dark: bool,

    pub bg_darkest: Color32,
    pub bg_dark: Color32,
    pub bg_medium: Color32,
    pub bg_light: Color32,

    pub text_primary: Color32,
    pub text_secondary: Color32,
    pub text_muted: Color32,

    pub accent: Color32,
    pub accent_muted: Color32,

    pub success: Color32,
    pub error: Color32,

    pub border: Color32,
}

impl Theme {
    pub fn from_config(config: &LauncherConfig) -> Self {
        if config.dark_theme {
            Self::dark()
        } else {
            Self::light()
        }
    }

    /// Slate background with a blue accent
    pub fn dark() -> Self {
        Self {
            dark: true,

            bg_darkest: Color32::from_rgb(12, 16, 24),
            bg_dark: Color32::from_rgb(17, 24, 39),
            bg_medium: Color32::from_rgb(31, 41, 55),
            bg_light: Color32::from_rgb(55, 65, 81),

            text_primary: Color32::from_rgb(243, 244, 246),
            text_secondary: Color32::from_rgb(209, 213, 219),
            text_muted: Color32::from_rgb(156, 163, 175),

            accent: Color32::from_rgb(59, 130, 246),       // Blue-500
            accent_muted: Color32::from_rgb(37, 99, 235),  // Blue-600

            success: Color32::from_rgb(34, 197, 94),
            error: Color32::from_rgb(239, 68, 68),

            border: Color32::from_rgb(75, 85, 99),
        }
    }

    pub fn light() -> Self {
        Self {
            dark: false,

            bg_darkest: Color32::from_rgb(229, 231, 235),
            bg_dark: Color32::from_rgb(243, 244, 246),
            bg_medium: Color32::from_rgb(249, 250, 251),
            bg_light: Color32::WHITE,

            text_primary: Color32::from_rgb(17, 24, 39),
            text_secondary: Color32::from_rgb(55, 65, 81),
            text_muted: Color32::from_rgb(107, 114, 128),

            accent: Color32::from_rgb(37, 99, 235),
            accent_muted: Color32::from_rgb(29, 78, 216),

            success: Color32::from_rgb(22, 163, 74),
            error: Color32::from_rgb(220, 38, 38),

            border: Color32::from_rgb(209, 213, 219),
        }
    }

    /// Apply this theme to egui's visuals
    pub fn apply(&self, ctx: &egui::Context) {
        let mut visuals = if self.dark {
            Visuals::dark()
        } else {
            Visuals::light()
        };

        visuals.window_fill = self.bg_dark;
        visuals.panel_fill = self.bg_dark;
        visuals.faint_bg_color = self.bg_medium;
        visuals.extreme_bg_color = self.bg_darkest;

        visuals.widgets.noninteractive.bg_fill = self.bg_medium;
        visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, self.border);
        visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text_secondary);

        visuals.widgets.inactive.bg_fill = self.bg_medium;
        visuals.widgets.inactive.weak_bg_fill = self.bg_light;
        visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, self.text_primary);

        visuals.widgets.hovered.bg_stroke = Stroke::new(1.0, self.accent);

        visuals.widgets.active.bg_fill = self.accent_muted;
        visuals.widgets.active.weak_bg_fill = self.accent_muted;

        visuals.selection.bg_fill = self.accent.gamma_multiply(0.3);
        visuals.selection.stroke = Stroke::new(1.0, self.accent);
        visuals.hyperlink_color = self.accent;

        visuals.window_stroke = Stroke::new(1.0, self.border);
        visuals.window_shadow = egui::epaint::Shadow::NONE;
        visuals.popup_shadow = egui::epaint::Shadow::NONE;

        ctx.set_visuals(visuals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_follows_config() {
        let mut config = LauncherConfig::default();
        assert!(Theme::from_config(&config).dark);

        config.dark_theme = false;
        assert!(!Theme::from_config(&config).dark);
    }
}
