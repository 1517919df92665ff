//! Code signing of mac bundles.
//!
//! Signing is best-effort: the pipeline turns any [`Error::Sign`] into a
//! warning and still reports the bundle as packaged.

use crate::BoxFuture;
use crate::error::{Error, Result};
use crate::options::Platform;
use std::path::PathBuf;

/// Everything a signer needs for one bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    /// Path of the `.app` bundle.
    pub bundle: PathBuf,
    /// `darwin` or `mas`.
    pub platform: Platform,
    /// Signing identity, or `-` for ad-hoc signing.
    pub identity: String,
    /// Entitlements property list.
    pub entitlements: Option<PathBuf>,
    /// Enable the hardened runtime.
    pub hardened_runtime: bool,
}

/// Signs a finished bundle.
pub trait Signer: Send + Sync {
    /// Signs `request.bundle` in place.
    fn sign<'a>(&'a self, request: &'a SignRequest) -> BoxFuture<'a, Result<()>>;
}

/// Signer driving Apple's `codesign` tool.
#[derive(Clone, Debug, Default)]
pub struct CodesignSigner;

impl CodesignSigner {
    /// Creates the signer.
    pub fn new() -> Self {
        Self
    }

    /// Arguments passed to `codesign` for `request`.
    pub fn args(request: &SignRequest) -> Vec<String> {
        let mut args = vec![
            "--sign".to_string(),
            request.identity.clone(),
            "--force".to_string(),
            "--deep".to_string(),
        ];
        if request.hardened_runtime {
            args.extend(["--options".to_string(), "runtime".to_string()]);
        }
        if let Some(entitlements) = &request.entitlements {
            args.push("--entitlements".to_string());
            args.push(entitlements.to_string_lossy().into_owned());
        }
        args.push(request.bundle.to_string_lossy().into_owned());
        args
    }
}

impl Signer for CodesignSigner {
    fn sign<'a>(&'a self, request: &'a SignRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let codesign = which::which("codesign")
                .map_err(|e| Error::Sign(format!("codesign not found: {e}")))?;
            log::info!(
                "Signing {} with identity '{}'",
                request.bundle.display(),
                request.identity
            );

            let output = tokio::process::Command::new(&codesign)
                .args(Self::args(request))
                .output()
                .await
                .map_err(|error| Error::CommandFailed {
                    command: codesign.display().to_string(),
                    error,
                })?;

            if !output.status.success() {
                return Err(Error::Sign(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
            log::info!("✓ Signed {}", request.bundle.display());
            Ok(())
        })
    }
}
