//! Runtime context detection (installed build vs. development checkout)

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable that forces a runtime context
pub const CONTEXT_ENV_VAR: &str = "APP_UPDATER_ENV";

/// Whether the application runs as an installed build or from a dev checkout.
///
/// Only `Production` gets a real delivery capability; a development build has
/// no update feed to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeContext {
    Development,
    Production,
}

impl RuntimeContext {
    /// Detect the context from the environment override or the executable location
    pub fn detect() -> Self {
        if let Ok(value) = std::env::var(CONTEXT_ENV_VAR) {
            match value.parse() {
                Ok(context) => return context,
                Err(e) => tracing::warn!("Ignoring {}: {}", CONTEXT_ENV_VAR, e),
            }
        }

        match std::env::current_exe() {
            Ok(exe) if is_packaged(&exe) => RuntimeContext::Production,
            Ok(_) => RuntimeContext::Development,
            Err(e) => {
                tracing::warn!("Could not locate executable ({}), assuming development", e);
                RuntimeContext::Development
            }
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeContext::Production)
    }
}

impl fmt::Display for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeContext::Development => "development",
            RuntimeContext::Production => "production",
        })
    }
}

impl FromStr for RuntimeContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeContext::Development),
            "production" | "prod" => Ok(RuntimeContext::Production),
            other => Err(format!("unknown runtime context '{}'", other)),
        }
    }
}

/// An executable is considered packaged unless it sits in a cargo build
/// directory (`target/debug`, `target/release`, `target/<triple>/...`).
fn is_packaged(exe: &Path) -> bool {
    let Some(dir) = exe.parent() else {
        return true;
    };

    !dir.ancestors().any(|ancestor| {
        ancestor.file_name().is_some_and(|name| name == "target")
            && ancestor.parent().is_some_and(|p| p.join("Cargo.toml").exists())
    })
}
