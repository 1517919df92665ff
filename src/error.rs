//! Error types for packaging operations.
//!
//! Provides contextual error chaining, filesystem errors that carry the
//! offending path, and one variant family per failure class of the pipeline.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted staging errors
//! - **Categories**: [`Error::category`] names the failure class for reporting
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_package::error::{ErrorExt, Result};
//! use std::path::Path;
//!
//! fn read_manifest(path: &Path) -> Result<String> {
//!     let contents = std::fs::read_to_string(path)
//!         .fs_context("reading app manifest", path)?;
//!     Ok(contents)
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the packager.
///
/// Fatal classes abort the pipeline of the target they occur in. [`Error::Sign`]
/// and [`Error::ResourceEdit`] are produced by collaborators but the pipeline
/// records them as warnings instead of propagating them.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// Missing or invalid option, detected before any staging happens.
    #[error("invalid options: {0}")]
    Validation(String),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "copying runtime template")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// Staging area could not be claimed, populated or moved.
    #[error("{0}")]
    Staging(String),

    /// A lifecycle hook returned an error.
    #[error("{hook} hook failed: {error:#}")]
    Hook {
        /// Hook phase name (e.g., "after_copy")
        hook: &'static str,
        /// Error returned by the hook
        error: anyhow::Error,
    },

    /// Dependency resolution or module removal failed.
    #[error("failed to prune dependencies: {0}")]
    Prune(String),

    /// Packing the application directory into an archive failed.
    #[error("failed to create archive: {0}")]
    Archive(String),

    /// A platform metadata document could not be parsed or written.
    #[error("invalid metadata document {path}: {source}")]
    Metadata {
        /// Path of the metadata document
        path: PathBuf,
        /// The underlying property list error
        source: plist::Error,
    },

    /// A metadata document parsed but has an unexpected shape.
    #[error("invalid metadata document: {0}")]
    MetadataShape(String),

    /// Application signing failed.
    #[error("failed to sign app: {0}")]
    Sign(String),

    /// Executable resource editing failed.
    #[error("failed to edit executable resources: {0}")]
    ResourceEdit(String),

    /// Child process could not be spawned.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a directory tree.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// JSON parsing error (app manifests read before staging).
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid ignore pattern.
    #[error("{0}")]
    RegexError(#[from] regex::Error),

    /// Invalid glob pattern (archive unpack rules).
    #[error("{0}")]
    GlobPattern(#[from] glob::PatternError),

    /// Semantic version parsing error.
    #[error("{0}")]
    SemverError(#[from] semver::Error),

    /// A spawned packaging task panicked or was cancelled.
    #[error("packaging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Returns the failure class this error belongs to.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Context(_, inner) => inner.category(),
            Error::Validation(_)
            | Error::JsonError(_)
            | Error::RegexError(_)
            | Error::GlobPattern(_)
            | Error::SemverError(_) => "validation",
            Error::Hook { .. } => "hook",
            Error::Prune(_) => "prune",
            Error::Archive(_) => "archive",
            Error::Metadata { .. } | Error::MetadataShape(_) => "metadata",
            Error::Sign(_) => "signing",
            Error::ResourceEdit(_) => "resource-edit",
            _ => "staging",
        }
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the packager's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::Staging(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::Staging(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
///
/// ```no_run
/// use kodegen_bundler_package::error::{ErrorExt, Result};
/// use std::path::Path;
///
/// fn create_staging_dir(path: &Path) -> Result<()> {
///     std::fs::create_dir_all(path)
///         .fs_context("creating staging directory", path)?;
///     Ok(())
/// }
/// ```
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "renaming helper".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with a staging error.
///
/// ```ignore
/// bail!("staging path already in use");
/// bail!("{} is not a file", path.display());
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::Staging(format!($msg)))
    };
    ($err:expr $(,)?) => {
        return Err($crate::error::Error::Staging($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::Staging(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_inner_category() {
        let err: Result<()> = Err(Error::Archive("disk full".into()));
        let err = err.context("packing app").unwrap_err();
        assert_eq!(err.category(), "archive");
        assert_eq!(err.to_string(), "packing app: failed to create archive: disk full");
    }

    #[test]
    fn test_fs_context_records_path() {
        let io: std::io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = io.fs_context("reading template", "/tmp/template").unwrap_err();
        assert_eq!(err.category(), "staging");
        assert!(err.to_string().contains("/tmp/template"));
    }
}
