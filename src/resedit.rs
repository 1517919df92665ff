//! Embedding icons and version information into Windows executables.

use crate::BoxFuture;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resources to write into an executable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceEdit {
    /// `.ico` file.
    pub icon: Option<PathBuf>,
    /// Version strings (`CompanyName`, `FileDescription`, ...).
    pub version_strings: BTreeMap<String, String>,
    /// Fixed file version.
    pub file_version: Option<String>,
    /// Fixed product version.
    pub product_version: Option<String>,
    /// Requested execution level.
    pub requested_execution_level: Option<String>,
    /// Application manifest to embed.
    pub application_manifest: Option<PathBuf>,
}

/// Edits the resources of an executable in place.
pub trait ResourceEditor: Send + Sync {
    /// Applies `edit` to `exe`.
    fn edit<'a>(&'a self, exe: &'a Path, edit: &'a ResourceEdit) -> BoxFuture<'a, Result<()>>;
}

/// Editor driving the `rcedit` tool, through `wine` on non-Windows hosts.
#[derive(Clone, Debug)]
pub struct RceditEditor {
    program: PathBuf,
}

impl Default for RceditEditor {
    fn default() -> Self {
        Self {
            program: PathBuf::from(if cfg!(windows) { "rcedit.exe" } else { "rcedit" }),
        }
    }
}

impl RceditEditor {
    /// Editor using `rcedit` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor using a specific `rcedit` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to `rcedit` for `exe`.
    pub fn args(exe: &Path, edit: &ResourceEdit) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![exe.into()];
        for (key, value) in &edit.version_strings {
            args.extend(["--set-version-string".into(), key.into(), value.into()]);
        }
        if let Some(version) = &edit.file_version {
            args.extend(["--set-file-version".into(), version.into()]);
        }
        if let Some(version) = &edit.product_version {
            args.extend(["--set-product-version".into(), version.into()]);
        }
        if let Some(icon) = &edit.icon {
            args.extend(["--set-icon".into(), icon.into()]);
        }
        if let Some(level) = &edit.requested_execution_level {
            args.extend(["--set-requested-execution-level".into(), level.into()]);
        }
        if let Some(manifest) = &edit.application_manifest {
            args.extend(["--application-manifest".into(), manifest.into()]);
        }
        args
    }

    fn command(&self) -> Result<tokio::process::Command> {
        let rcedit = which::which(&self.program)
            .map_err(|e| Error::ResourceEdit(format!("{} not found: {e}", self.program.display())))?;
        if cfg!(windows) {
            return Ok(tokio::process::Command::new(rcedit));
        }
        let wine = which::which("wine64")
            .or_else(|_| which::which("wine"))
            .map_err(|e| Error::ResourceEdit(format!("wine is required to run rcedit: {e}")))?;
        let mut cmd = tokio::process::Command::new(wine);
        cmd.arg(rcedit);
        Ok(cmd)
    }
}

impl ResourceEditor for RceditEditor {
    fn edit<'a>(&'a self, exe: &'a Path, edit: &'a ResourceEdit) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            log::info!("Editing resources of {}", exe.display());
            let output = self
                .command()?
                .args(Self::args(exe, edit))
                .output()
                .await
                .map_err(|error| Error::CommandFailed {
                    command: self.program.display().to_string(),
                    error,
                })?;

            if !output.status.success() {
                return Err(Error::ResourceEdit(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
            Ok(())
        })
    }
}
