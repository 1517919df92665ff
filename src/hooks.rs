//! Lifecycle hooks run between pipeline phases.
//!
//! Hooks of one phase run strictly in order: each must complete before the
//! next one starts, and before the pipeline moves on. The first failing hook
//! aborts the remaining phases of that target.

use crate::BoxFuture;
use crate::error::{Error, Result};
use crate::options::{Arch, Platform};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Phase a hook is attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookPhase {
    /// Runtime template placed in the staging area.
    AfterExtract,
    /// App content copied into the resources directory.
    AfterCopy,
    /// Development dependencies removed.
    AfterPrune,
    /// Bundle moved to its final location.
    AfterComplete,
}

impl HookPhase {
    /// Name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::AfterExtract => "after_extract",
            HookPhase::AfterCopy => "after_copy",
            HookPhase::AfterPrune => "after_prune",
            HookPhase::AfterComplete => "after_complete",
        }
    }
}

/// Arguments passed to every hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookArgs {
    /// Directory the hook operates on (staged app, staging area or final bundle).
    pub path: PathBuf,
    /// Runtime version being packaged.
    pub runtime_version: String,
    /// Target platform.
    pub platform: Platform,
    /// Target architecture.
    pub arch: Arch,
}

/// An external step run at a fixed point of the pipeline.
pub trait Hook: Send + Sync {
    /// Runs the hook to completion.
    fn call<'a>(&'a self, args: &'a HookArgs) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "hook".to_string()
    }
}

/// Hooks grouped by phase.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Run after the runtime template is staged.
    pub after_extract: Vec<Arc<dyn Hook>>,
    /// Run after the app is copied, with the staged app directory.
    pub after_copy: Vec<Arc<dyn Hook>>,
    /// Run after pruning, with the staged app directory.
    pub after_prune: Vec<Arc<dyn Hook>>,
    /// Run after finalization, with the final bundle path.
    pub after_complete: Vec<Arc<dyn Hook>>,
}

impl Hooks {
    /// Returns the hooks of a phase.
    pub fn for_phase(&self, phase: HookPhase) -> &[Arc<dyn Hook>] {
        match phase {
            HookPhase::AfterExtract => &self.after_extract,
            HookPhase::AfterCopy => &self.after_copy,
            HookPhase::AfterPrune => &self.after_prune,
            HookPhase::AfterComplete => &self.after_complete,
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("after_extract", &self.after_extract.len())
            .field("after_copy", &self.after_copy.len())
            .field("after_prune", &self.after_prune.len())
            .field("after_complete", &self.after_complete.len())
            .finish()
    }
}

/// Runs the hooks of `phase` one after another.
pub async fn run_hooks(hooks: &Hooks, phase: HookPhase, args: &HookArgs) -> Result<()> {
    for hook in hooks.for_phase(phase) {
        log::debug!("Running {} hook: {}", phase.as_str(), hook.describe());
        hook.call(args).await.map_err(|error| Error::Hook {
            hook: phase.as_str(),
            error,
        })?;
    }
    Ok(())
}

/// Hook backed by an async closure.
struct FnHook<F>(F);

impl<F, Fut> Hook for FnHook<F>
where
    F: Fn(HookArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call<'a>(&'a self, args: &'a HookArgs) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin((self.0)(args.clone()))
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

/// Wraps an async closure as a hook.
///
/// ```no_run
/// use kodegen_bundler_package::hooks::{hook_fn, Hooks};
///
/// let hooks = Hooks {
///     after_copy: vec![hook_fn(|args| async move {
///         println!("copied into {}", args.path.display());
///         anyhow::Ok(())
///     })],
///     ..Default::default()
/// };
/// ```
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn Hook>
where
    F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHook(f))
}

/// Hook that runs a shell command.
///
/// The command runs in the hook's directory. The arguments are exported as
/// `PACKAGER_PATH`, `PACKAGER_RUNTIME_VERSION`, `PACKAGER_PLATFORM` and
/// `PACKAGER_ARCH`. A non-zero exit status fails the hook.
#[derive(Clone, Debug)]
pub struct CommandHook {
    command: String,
}

impl CommandHook {
    /// Creates a hook for a shell command line.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell(&self) -> tokio::process::Command {
        if cfg!(windows) {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        } else {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }
}

impl Hook for CommandHook {
    fn call<'a>(&'a self, args: &'a HookArgs) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let output = self
                .shell()
                .current_dir(&args.path)
                .env("PACKAGER_PATH", &args.path)
                .env("PACKAGER_RUNTIME_VERSION", &args.runtime_version)
                .env("PACKAGER_PLATFORM", args.platform.as_str())
                .env("PACKAGER_ARCH", args.arch.as_str())
                .output()
                .await
                .map_err(|e| anyhow::anyhow!("failed to spawn `{}`: {}", self.command, e))?;

            if !output.status.success() {
                anyhow::bail!(
                    "`{}` exited with {:?}: {}",
                    self.command,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(())
        })
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}
