//! Per-invocation state threaded through every pipeline step.

use crate::options::Target;
use crate::prune::ModuleClassification;
use std::fmt;
use std::path::PathBuf;

/// A non-fatal condition recorded during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Warning {
    /// An option has no effect in prebuilt-archive mode.
    IgnoredOption {
        /// Target being packaged.
        target: Target,
        /// Name of the disregarded option.
        option: &'static str,
    },
    /// No icon with the platform's extension exists.
    MissingIcon {
        /// Target being packaged.
        target: Target,
        /// Icon path that was looked up.
        path: PathBuf,
    },
    /// The runtime's own module is declared as a production dependency.
    RuntimeModuleInProduction {
        /// Target being packaged.
        target: Target,
        /// Module name.
        module: String,
    },
    /// Signing failed; the bundle is unsigned.
    SigningFailed {
        /// Target being packaged.
        target: Target,
        /// Failure reported by the signer.
        reason: String,
    },
    /// Executable resource editing failed; resources are unchanged.
    ResourceEditFailed {
        /// Target being packaged.
        target: Target,
        /// Failure reported by the resource editor.
        reason: String,
    },
    /// The requested pair has no official runtime distribution.
    UnsupportedTarget {
        /// Skipped pair.
        target: Target,
    },
}

impl Warning {
    /// Target the warning belongs to.
    pub fn target(&self) -> Target {
        match self {
            Warning::IgnoredOption { target, .. }
            | Warning::MissingIcon { target, .. }
            | Warning::RuntimeModuleInProduction { target, .. }
            | Warning::SigningFailed { target, .. }
            | Warning::ResourceEditFailed { target, .. }
            | Warning::UnsupportedTarget { target } => *target,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::IgnoredOption { target, option } => write!(
                f,
                "{target}: prebuilt archive is used as-is, ignoring the `{option}` option"
            ),
            Warning::MissingIcon { target, path } => {
                write!(f, "{target}: icon {} not found, skipping", path.display())
            }
            Warning::RuntimeModuleInProduction { target, module } => write!(
                f,
                "{target}: {module} is a production dependency; it belongs in devDependencies and was pruned"
            ),
            Warning::SigningFailed { target, reason } => {
                write!(f, "{target}: signing failed, bundle left unsigned: {reason}")
            }
            Warning::ResourceEditFailed { target, reason } => {
                write!(f, "{target}: could not edit executable resources: {reason}")
            }
            Warning::UnsupportedTarget { target } => {
                write!(f, "{target}: no official runtime distribution, skipping")
            }
        }
    }
}

/// State owned by one pipeline invocation.
///
/// Each target gets its own context, so the module classification is computed
/// once per invocation and never shared between concurrently running targets.
#[derive(Debug)]
pub struct RunContext {
    target: Target,
    warnings: Vec<Warning>,
    pub(crate) modules: Option<ModuleClassification>,
}

impl RunContext {
    /// Creates an empty context for `target`.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            warnings: Vec::new(),
            modules: None,
        }
    }

    /// Target of this invocation.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Logs and records a warning.
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Consumes the context, returning its warnings.
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
