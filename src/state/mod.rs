//! Application state modules
//!
//! State structs own their fields and poll methods; the app applies the
//! returned events.

mod update;

pub use update::UpdateUiController;

/// Events that state poll methods can return.
/// These communicate results back to the app without direct mutation.
#[derive(Debug)]
pub enum StateEvent {
    /// Update the status message
    StatusMessage(String),

    /// Log an error message
    LogError(String),

    /// Log an info message
    LogInfo(String),
}
