//! Decides which source paths are copied into the staging area.
//!
//! Paths are matched in a normalized form: relative to the source root,
//! `/`-separated and with a leading `/` (e.g. `/node_modules/foo/index.js`),
//! so patterns are written once for every host platform.

use crate::error::Result;
use crate::options::{IgnorePredicate, IgnoreRules, PackageOptions, Target};
use regex::Regex;
use std::path::Path;

/// Junk files created by operating systems and package managers.
const JUNK_PATTERNS: &[&str] = &[
    r"(^|/)\.DS_Store$",
    r"(^|/)\.AppleDouble($|/)",
    r"(^|/)\.Spotlight-V100($|/)",
    r"(^|/)\.Trashes($|/)",
    r"(^|/)\._[^/]*$",
    r"(^|/)Thumbs\.db$",
    r"(^|/)ehthumbs\.db$",
    r"(^|/)desktop\.ini$",
    r"(^|/)npm-debug\.log$",
    r"(^|/)yarn-error\.log$",
    r"~$",
];

/// Returns the patterns applied to every build unless a predicate is used.
pub fn default_ignore_patterns(runtime_modules: &[String], junk: bool) -> Result<Vec<Regex>> {
    let mut patterns = vec![
        r"^/package-lock\.json$".to_string(),
        r"^/yarn\.lock$".to_string(),
        r"^/\.git($|/)".to_string(),
        r"^/node_modules/\.bin($|/)".to_string(),
        r"\.o(bj)?$".to_string(),
    ];
    patterns.extend(
        runtime_modules
            .iter()
            .map(|module| format!("^/node_modules/{}($|/)", regex::escape(module))),
    );
    if junk {
        patterns.extend(JUNK_PATTERNS.iter().map(|p| p.to_string()));
    }
    Ok(patterns
        .iter()
        .map(|p| Regex::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Converts a path to `/`-separated form without a trailing separator.
pub fn normalize_separators(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.trim_end_matches('/') {
        "" if normalized.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn is_absolute(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    normalized.starts_with('/')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

enum Rules {
    Patterns(Vec<Regex>),
    Predicate(IgnorePredicate),
}

/// Pure include/exclude predicate for one run.
///
/// Holds no mutable state; `include` may be called from any number of tasks.
pub struct IgnoreFilter {
    source_root: String,
    rules: Rules,
    out_dirs: Vec<String>,
}

impl IgnoreFilter {
    /// Builds the filter for `options`, resolving default output directories
    /// against the current directory.
    pub fn new(options: &PackageOptions) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::with_cwd(options, &cwd)
    }

    /// Builds the filter with an explicit working directory.
    pub fn with_cwd(options: &PackageOptions, cwd: &Path) -> Result<Self> {
        let rules = match &options.ignore {
            Some(IgnoreRules::Predicate(predicate)) => Rules::Predicate(predicate.clone()),
            Some(IgnoreRules::Patterns(user)) => {
                let mut patterns = default_ignore_patterns(&options.runtime.module_names, options.junk)?;
                patterns.extend(user.iter().cloned());
                Rules::Patterns(patterns)
            }
            None => Rules::Patterns(default_ignore_patterns(
                &options.runtime.module_names,
                options.junk,
            )?),
        };

        Ok(Self {
            source_root: normalize_separators(&options.dir.to_string_lossy()),
            rules,
            out_dirs: generate_out_dirs(&options.name, options.out.as_deref(), cwd)
                .iter()
                .map(|dir| normalize_separators(dir))
                .collect(),
        })
    }

    /// Normalized, root-relative form of `path` (leading `/`).
    ///
    /// Relative inputs are taken as relative to the source root.
    pub fn relative(&self, path: &Path) -> String {
        let normalized = normalize_separators(&path.to_string_lossy());
        if !is_absolute(&normalized) {
            return match normalized.trim_start_matches("./") {
                "." | "" => "/".to_string(),
                rest => format!("/{rest}"),
            };
        }
        match normalized.strip_prefix(&self.source_root) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => normalized,
        }
    }

    /// Returns whether `path` is copied into the staging area.
    pub fn include(&self, path: &Path) -> bool {
        let relative = self.relative(path);
        let full = if relative == "/" {
            self.source_root.clone()
        } else {
            format!("{}{}", self.source_root, relative)
        };
        if self.out_dirs.iter().any(|dir| *dir == full) {
            log::debug!("Ignoring output directory {}", full);
            return false;
        }

        let ignored = match &self.rules {
            Rules::Predicate(predicate) => predicate(&relative),
            Rules::Patterns(patterns) => patterns.iter().any(|p| p.is_match(&relative)),
        };
        if ignored {
            log::debug!("Ignoring {}", relative);
        }
        !ignored
    }
}

/// Output directories a copy must never descend into.
///
/// Without an explicit output directory (or with one equal to the working
/// directory) these are the default bundle paths of every official target;
/// otherwise the configured output directory itself.
pub fn generate_out_dirs(name: &str, out: Option<&Path>, cwd: &Path) -> Vec<String> {
    match out {
        Some(out) if out != cwd => vec![out.to_string_lossy().into_owned()],
        _ => Target::official()
            .iter()
            .map(|target| cwd.join(target.basename(name)).to_string_lossy().into_owned())
            .collect(),
    }
}
