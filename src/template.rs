//! Runtime template lookup.
//!
//! Downloading and extracting runtime distributions happens elsewhere; the
//! packager only needs an extracted directory per target.

use crate::BoxFuture;
use crate::error::{Error, Result};
use crate::options::Target;
use std::path::{Path, PathBuf};

/// Yields the extracted runtime template for a target.
pub trait TemplateProvider: Send + Sync {
    /// Returns a directory holding the extracted template for `target` and
    /// runtime `version`. The directory is copied, never modified.
    fn template<'a>(&'a self, target: Target, version: &'a str) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Templates already extracted below a root directory.
///
/// Looks for `<root>/<version>/<platform>-<arch>`, then
/// `<root>/<platform>-<arch>`.
#[derive(Clone, Debug)]
pub struct DirectoryTemplateProvider {
    root: PathBuf,
    single: bool,
}

impl DirectoryTemplateProvider {
    /// Provider over a directory of per-target templates.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            single: false,
        }
    }

    /// Provider returning `dir` for every target.
    pub fn single(dir: impl AsRef<Path>) -> Self {
        Self {
            root: dir.as_ref().to_path_buf(),
            single: true,
        }
    }

    fn candidates(&self, target: Target, version: &str) -> Vec<PathBuf> {
        if self.single {
            return vec![self.root.clone()];
        }
        let leaf = target.to_string();
        vec![self.root.join(version).join(&leaf), self.root.join(&leaf)]
    }
}

impl TemplateProvider for DirectoryTemplateProvider {
    fn template<'a>(&'a self, target: Target, version: &'a str) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let candidates = self.candidates(target, version);
            candidates
                .iter()
                .find(|dir| dir.is_dir())
                .cloned()
                .ok_or_else(|| {
                    Error::Staging(format!(
                        "no runtime template for {target} {version} (looked in {})",
                        candidates
                            .iter()
                            .map(|dir| dir.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })
        })
    }
}
