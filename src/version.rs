//! Application version resolution.
//!
//! The packaged manifest carries the explicit application version. The
//! runtime-reported version (what the running binary was built as) is only a
//! fallback, so a stale cached string never wins over the manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::RuntimeContext;

/// Version reported by the running binary
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the manifest shipped next to an installed executable
const PACKAGED_MANIFEST: &str = "app-manifest.json";

/// Versions shown to the user, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub app_version: String,
    pub host_runtime_version: String,
}

impl VersionInfo {
    /// Resolve versions for the given context, honouring a configured manifest path
    pub fn resolve(context: RuntimeContext, manifest_override: Option<&Path>) -> Self {
        let manifest = manifest_override
            .map(Path::to_path_buf)
            .or_else(|| default_manifest_path(context));
        resolve_version_info(manifest.as_deref(), RUNTIME_VERSION)
    }
}

/// Resolve the application version with the manifest -> runtime fallback chain.
///
/// Never fails and never returns an empty string.
pub fn resolve_version_info(manifest: Option<&Path>, runtime_version: &str) -> VersionInfo {
    let runtime_version = match runtime_version.trim() {
        "" => RUNTIME_VERSION.to_string(),
        v => v.to_string(),
    };

    let app_version = match manifest.and_then(read_manifest_version) {
        Some(version) => version,
        None => {
            tracing::debug!(
                "Manifest version unavailable, using runtime version {}",
                runtime_version
            );
            runtime_version.clone()
        }
    };

    VersionInfo {
        app_version,
        host_runtime_version: runtime_version,
    }
}

/// Where the manifest lives for each context
fn default_manifest_path(context: RuntimeContext) -> Option<PathBuf> {
    match context {
        RuntimeContext::Production => {
            let exe = std::env::current_exe().ok()?;
            Some(exe.parent()?.join("resources").join(PACKAGED_MANIFEST))
        }
        RuntimeContext::Development => {
            Some(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml"))
        }
    }
}

#[derive(Deserialize)]
struct JsonManifest {
    version: Option<String>,
}

#[derive(Deserialize)]
struct CargoManifest {
    package: Option<JsonManifest>,
}

/// Read the explicit version from a JSON (`version`) or Cargo-style TOML
/// (`[package].version`) manifest.
fn read_manifest_version(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("Could not read manifest {:?}: {}", path, e);
            return None;
        }
    };

    let version = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str::<CargoManifest>(&content)
            .ok()
            .and_then(|m| m.package)
            .and_then(|p| p.version)
    } else {
        serde_json::from_str::<JsonManifest>(&content)
            .ok()
            .and_then(|m| m.version)
    };

    version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
