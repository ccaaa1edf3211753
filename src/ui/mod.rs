//! UI modules for the updater window

pub mod theme;
mod update_panel;

pub use theme::Theme;
pub use update_panel::render_update_panel;
