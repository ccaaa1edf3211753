//! Hand-over to a downloaded installer.
//!
//! The installer runs detached from this process; the caller exits right
//! after it starts so the installer can replace the running binary.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// How the installer at a path gets started
#[derive(Debug)]
pub enum Launch {
    /// Run a program directly
    Command(Command),
    /// Hand the file to the platform's default handler
    DefaultHandler,
}

/// Pick how to start the installer at `path`. Disk images, packages and
/// unknown formats go to the default handler.
pub fn installer_launch(path: &Path) -> Launch {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "msi" => {
            let mut cmd = Command::new("msiexec");
            cmd.arg("/i").arg(path);
            Launch::Command(cmd)
        }
        "exe" | "appimage" => Launch::Command(Command::new(path)),
        _ => Launch::DefaultHandler,
    }
}

/// Start the installer without waiting for it
pub fn launch_installer(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Installer not found at {}", path.display());
    }

    #[cfg(unix)]
    if path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("appimage"))
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(path, perms).context("Failed to mark AppImage executable")?;
    }

    match installer_launch(path) {
        Launch::Command(mut cmd) => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());

            tracing::info!("Launching installer: {:?}", cmd);
            cmd.spawn()
                .with_context(|| format!("Failed to launch installer {}", path.display()))?;
        }
        Launch::DefaultHandler => {
            tracing::info!("Opening installer with the default handler: {}", path.display());
            open::that_detached(path)
                .with_context(|| format!("Failed to open installer {}", path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn program(launch: Launch) -> Option<std::ffi::OsString> {
        match launch {
            Launch::Command(cmd) => Some(cmd.get_program().to_os_string()),
            Launch::DefaultHandler => None,
        }
    }

    #[test]
    fn test_installer_launch_by_extension() {
        let exe = PathBuf::from("/tmp/App-Setup-1.2.0.exe");
        assert_eq!(program(installer_launch(&exe)).as_deref(), Some(exe.as_os_str()));

        let msi = PathBuf::from("/tmp/App-1.2.0.msi");
        match installer_launch(&msi) {
            Launch::Command(cmd) => {
                assert_eq!(cmd.get_program(), OsStr::new("msiexec"));
                let args: Vec<_> = cmd.get_args().collect();
                assert_eq!(args, vec![OsStr::new("/i"), msi.as_os_str()]);
            }
            other => panic!("unexpected launch: {:?}", other),
        }

        let image = PathBuf::from("/tmp/App-1.2.0.AppImage");
        assert_eq!(program(installer_launch(&image)).as_deref(), Some(image.as_os_str()));

        for handled in ["/tmp/App-1.2.0.dmg", "/tmp/App-1.2.0.pkg", "/tmp/App-1.2.0.deb"] {
            assert!(
                matches!(installer_launch(Path::new(handled)), Launch::DefaultHandler),
                "{handled}"
            );
        }
    }

    #[test]
    fn test_launch_missing_installer_fails() {
        let err = launch_installer(Path::new("/nonexistent/App-Setup.exe")).unwrap_err();
        assert!(err.to_string().contains("Installer not found"));
    }
}
