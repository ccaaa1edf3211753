//! Output formatting utilities for CLI

use std::io::{IsTerminal, Write};

use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a serializable value as JSON or use custom text formatter
pub fn print_formatted<T, F>(value: &T, format: OutputFormat, text_formatter: F)
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => println!("{}", text_formatter(value)),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message (suppressed in quiet mode)
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Print an error message (never suppressed)
pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

/// Whether live progress should be drawn on stderr
pub fn should_show_progress(quiet: bool, format: OutputFormat) -> bool {
    !quiet && format == OutputFormat::Text && std::io::stderr().is_terminal()
}

/// Prints status lines as they arrive. Progress lines overwrite each other
/// on a terminal.
pub struct StatusPrinter {
    enabled: bool,
    live_progress: bool,
    progress_open: bool,
}

impl StatusPrinter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self {
            enabled: !quiet && format == OutputFormat::Text,
            live_progress: should_show_progress(quiet, format),
            progress_open: false,
        }
    }

    pub fn line(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        if self.live_progress && is_progress(text) {
            eprint!("\r{}   ", text);
            let _ = std::io::stderr().flush();
            self.progress_open = true;
            return;
        }
        self.finish_progress();
        println!("{}", text);
    }

    pub fn finish_progress(&mut self) {
        if self.progress_open {
            eprintln!();
            self.progress_open = false;
        }
    }
}

fn is_progress(text: &str) -> bool {
    text.starts_with("Download speed:")
}
