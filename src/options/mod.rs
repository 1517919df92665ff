//! Configuration structures for packaging runs.
//!
//! [`PackageOptions`] is the validated, read-only configuration of one run. It
//! is only constructed through [`OptionsBuilder::build`], which fills in
//! defaults, infers missing metadata from the app manifest and rejects invalid
//! combinations before any staging happens.
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_package::options::{Arch, OptionsBuilder, Platform};
//!
//! # fn example() -> kodegen_bundler_package::Result<()> {
//! let options = OptionsBuilder::new("path/to/app")
//!     .name("Foo")
//!     .runtime_version("30.0.0")
//!     .platforms(vec![Platform::Win32])
//!     .arches(vec![Arch::X64])
//!     .out("dist")
//!     .archive(Default::default())
//!     .build()?;
//! assert_eq!(options.targets.len(), 1);
//! # Ok(())
//! # }
//! ```

mod config;
pub mod infer;
mod targets;

pub use config::{MacConfig, PackageConfig, TmpDirSetting};
pub use targets::{Arch, Platform, Target, expand_targets};

use crate::error::{Error, Result};
use crate::hooks::Hooks;
use path_absolutize::Absolutize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Predicate over a normalized source-relative path (`/`-separated, leading `/`).
///
/// Returns `true` when the path must be left out of the staged app.
pub type IgnorePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// User-supplied ignore rules.
#[derive(Clone)]
pub enum IgnoreRules {
    /// Regular expressions searched in the normalized relative path.
    Patterns(Vec<Regex>),
    /// Custom predicate; replaces pattern matching entirely.
    Predicate(IgnorePredicate),
}

impl fmt::Debug for IgnoreRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRules::Patterns(patterns) => f
                .debug_tuple("Patterns")
                .field(&patterns.iter().map(Regex::as_str).collect::<Vec<_>>())
                .finish(),
            IgnoreRules::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// Where the bundle is assembled before it reaches the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagingMode {
    /// Assemble in a fresh temporary directory, then rename into place.
    ///
    /// `root` overrides the system temporary directory.
    Ephemeral {
        /// Parent for the temporary staging directories.
        root: Option<PathBuf>,
    },
    /// Assemble directly at the final output path.
    Fixed,
}

impl Default for StagingMode {
    fn default() -> Self {
        StagingMode::Ephemeral { root: None }
    }
}

/// Options for packing the app directory into a single-file archive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveOptions {
    /// Glob of files left extracted beside the archive.
    ///
    /// A pattern without `/` is matched against file names, otherwise against
    /// the path relative to the app directory.
    pub unpack: Option<String>,

    /// Glob of directories whose whole contents stay extracted.
    pub unpack_dir: Option<String>,
}

/// A URL scheme registration for the mac bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Protocol {
    /// Descriptive name (`CFBundleURLName`).
    pub name: String,
    /// Schemes handled, without `://`.
    pub schemes: Vec<String>,
    /// Role (`CFBundleTypeRole`). Default: `Editor`.
    #[serde(default = "Protocol::default_role")]
    pub role: String,
}

impl Protocol {
    /// Creates a registration with the default `Editor` role.
    pub fn new(name: impl Into<String>, schemes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            schemes,
            role: Self::default_role(),
        }
    }

    fn default_role() -> String {
        "Editor".to_string()
    }
}

/// Source of keys merged into the main `Info.plist` before computed keys are set.
#[derive(Clone, Debug)]
pub enum ExtendInfo {
    /// Property list file on disk; must contain a dictionary.
    Path(PathBuf),
    /// In-memory dictionary.
    Dictionary(plist::Dictionary),
}

/// Code signing request for mac bundles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignOptions {
    /// Signing identity name, or `-` for ad-hoc signing.
    pub identity: String,
    /// Path to an entitlements property list.
    pub entitlements: Option<PathBuf>,
    /// Sign with the hardened runtime enabled.
    #[serde(default)]
    pub hardened_runtime: bool,
}

/// mac-specific configuration.
#[derive(Clone, Debug, Default)]
pub struct MacOptions {
    /// Bundle identifier. Default: derived from the app name.
    pub app_bundle_id: Option<String>,

    /// Helper bundle identifier. Default: `<app_bundle_id>.helper`.
    pub helper_bundle_id: Option<String>,

    /// Application category (`LSApplicationCategoryType`).
    pub app_category_type: Option<String>,

    /// Keys merged into the main `Info.plist` first.
    pub extend_info: Option<ExtendInfo>,

    /// URL scheme registrations.
    pub protocols: Vec<Protocol>,

    /// Signing request. Default: unsigned.
    pub sign: Option<SignOptions>,

    /// Opt into dark mode (`NSRequiresAquaSystemAppearance = false`).
    pub dark_mode_support: bool,

    /// Privacy usage descriptions, e.g. `Camera` → `NSCameraUsageDescription`.
    pub usage_descriptions: BTreeMap<String, String>,
}

/// Windows version-info fields embedded into the executable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Win32Metadata {
    /// `CompanyName` version string.
    pub company_name: Option<String>,
    /// `FileDescription` version string. Default: app name.
    pub file_description: Option<String>,
    /// `OriginalFilename` version string. Default: `<executable>.exe`.
    pub original_filename: Option<String>,
    /// `ProductName` version string. Default: app name.
    pub product_name: Option<String>,
    /// `InternalName` version string. Default: app name.
    pub internal_name: Option<String>,
    /// File version, used when no build version is given.
    pub file_version: Option<String>,
    /// Product version, used when no app version is given.
    pub product_version: Option<String>,
    /// Requested execution level (`asInvoker`, `highestAvailable`, `requireAdministrator`).
    pub requested_execution_level: Option<String>,
    /// Path to an application manifest to embed.
    pub application_manifest: Option<PathBuf>,
}

impl Win32Metadata {
    /// Returns whether no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Names of the runtime's own files inside the template.
///
/// The defaults describe the Electron distribution layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Product name: the mac `.app` stem, main executable and helper prefix.
    pub product_name: String,
    /// Executable stem on Windows and Linux.
    pub executable: String,
    /// Package names of the runtime module in the app's dependency tree.
    pub module_names: Vec<String>,
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            product_name: "Electron".to_string(),
            executable: "electron".to_string(),
            module_names: vec![
                "electron".to_string(),
                "electron-nightly".to_string(),
                "electron-prebuilt".to_string(),
                "electron-prebuilt-compile".to_string(),
            ],
        }
    }
}

/// Validated configuration for one packaging run.
///
/// Shared read-only between all target pipelines of the run.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PackageOptions {
    /// Absolute path of the application source directory.
    pub dir: PathBuf,
    /// Application name.
    pub name: String,
    /// Executable name. Default: `name`.
    pub executable_name: Option<String>,
    /// Targets to package, official combinations only.
    pub targets: Vec<Target>,
    /// Requested pairs without an official runtime distribution.
    pub skipped_targets: Vec<Target>,
    /// Runtime version (semver, no leading `v`).
    pub runtime_version: String,
    /// Explicitly configured output directory, absolute.
    pub out: Option<PathBuf>,
    /// Replace existing output bundles.
    pub overwrite: bool,
    /// Staging strategy.
    pub staging: StagingMode,
    /// Prune development dependencies. `None` means "not set" (enabled).
    pub prune: Option<bool>,
    /// Follow symlinks while copying. `None` means "not set" (enabled).
    pub deref_symlinks: Option<bool>,
    /// Ignore OS junk files.
    pub junk: bool,
    /// Pack the app into a single-file archive.
    pub archive: Option<ArchiveOptions>,
    /// User-supplied ignore rules.
    pub ignore: Option<IgnoreRules>,
    /// Icon path; the extension is substituted per platform.
    pub icon: Option<PathBuf>,
    /// Files or directories copied into the resources directory.
    pub extra_resources: Vec<PathBuf>,
    /// Application version.
    pub app_version: Option<String>,
    /// Build version.
    pub build_version: Option<String>,
    /// Copyright notice.
    pub app_copyright: Option<String>,
    /// mac settings.
    pub mac: MacOptions,
    /// Windows settings.
    pub win32: Win32Metadata,
    /// Pre-built archive used verbatim as the app payload.
    pub prebuilt_archive: Option<PathBuf>,
    /// Lifecycle hooks.
    pub hooks: Hooks,
    /// Runtime template naming.
    pub runtime: RuntimeLayout,
}

impl PackageOptions {
    /// Returns the executable name (defaults to the app name).
    pub fn executable_name(&self) -> &str {
        self.executable_name.as_deref().unwrap_or(&self.name)
    }

    /// Returns whether dependency pruning runs.
    pub fn prune_enabled(&self) -> bool {
        self.prune.unwrap_or(true)
    }

    /// Returns whether symlinks are dereferenced while copying.
    pub fn deref_symlinks_enabled(&self) -> bool {
        self.deref_symlinks.unwrap_or(true)
    }

    /// Returns the output directory (current directory when not configured).
    pub fn out_dir(&self) -> Result<PathBuf> {
        match &self.out {
            Some(out) => Ok(out.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Deterministic final location of a target's bundle.
    pub fn final_path(&self, target: Target) -> Result<PathBuf> {
        Ok(self.out_dir()?.join(target.basename(&self.name)))
    }
}

/// Builder for [`PackageOptions`].
///
/// Only the source directory is required up front; name and versions are
/// inferred from `<dir>/package.json` when not set.
#[derive(Clone, Default)]
pub struct OptionsBuilder {
    dir: PathBuf,
    name: Option<String>,
    executable_name: Option<String>,
    platforms: Vec<Platform>,
    arches: Vec<Arch>,
    runtime_version: Option<String>,
    out: Option<PathBuf>,
    overwrite: bool,
    staging: StagingMode,
    prune: Option<bool>,
    deref_symlinks: Option<bool>,
    junk: Option<bool>,
    archive: Option<ArchiveOptions>,
    ignore_patterns: Option<Vec<String>>,
    ignore_predicate: Option<IgnorePredicate>,
    icon: Option<PathBuf>,
    extra_resources: Vec<PathBuf>,
    app_version: Option<String>,
    build_version: Option<String>,
    app_copyright: Option<String>,
    mac: MacOptions,
    win32: Win32Metadata,
    prebuilt_archive: Option<PathBuf>,
    hooks: Hooks,
    runtime: RuntimeLayout,
}

impl OptionsBuilder {
    /// Starts a builder for the app in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Sets the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the executable name.
    pub fn executable_name(mut self, name: impl Into<String>) -> Self {
        self.executable_name = Some(name.into());
        self
    }

    /// Sets target platforms. Default: host platform.
    pub fn platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Sets target architectures. Default: host architecture.
    pub fn arches(mut self, arches: Vec<Arch>) -> Self {
        self.arches = arches;
        self
    }

    /// Sets the runtime version.
    pub fn runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    /// Sets the output directory. Default: current directory.
    pub fn out(mut self, out: impl AsRef<Path>) -> Self {
        self.out = Some(out.as_ref().to_path_buf());
        self
    }

    /// Replaces existing output bundles.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the staging mode. Default: ephemeral in the system temp dir.
    pub fn staging(mut self, staging: StagingMode) -> Self {
        self.staging = staging;
        self
    }

    /// Enables or disables dependency pruning. Default: enabled.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = Some(prune);
        self
    }

    /// Enables or disables symlink dereferencing. Default: enabled.
    pub fn deref_symlinks(mut self, deref: bool) -> Self {
        self.deref_symlinks = Some(deref);
        self
    }

    /// Enables or disables OS junk filtering. Default: enabled.
    pub fn junk(mut self, junk: bool) -> Self {
        self.junk = Some(junk);
        self
    }

    /// Packs the app into an archive with these options.
    pub fn archive(mut self, archive: ArchiveOptions) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Sets ignore patterns (regular expressions).
    pub fn ignore<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets a custom ignore predicate; overrides patterns.
    pub fn ignore_with<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.ignore_predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the icon path.
    pub fn icon(mut self, icon: impl AsRef<Path>) -> Self {
        self.icon = Some(icon.as_ref().to_path_buf());
        self
    }

    /// Adds an extra resource.
    pub fn extra_resource(mut self, path: impl AsRef<Path>) -> Self {
        self.extra_resources.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets the application version.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Sets the build version.
    pub fn build_version(mut self, version: impl Into<String>) -> Self {
        self.build_version = Some(version.into());
        self
    }

    /// Sets the copyright notice.
    pub fn app_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.app_copyright = Some(copyright.into());
        self
    }

    /// Sets mac options.
    pub fn mac(mut self, mac: MacOptions) -> Self {
        self.mac = mac;
        self
    }

    /// Sets Windows version-info fields.
    pub fn win32(mut self, win32: Win32Metadata) -> Self {
        self.win32 = win32;
        self
    }

    /// Uses a pre-built archive as the payload.
    pub fn prebuilt_archive(mut self, path: impl AsRef<Path>) -> Self {
        self.prebuilt_archive = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets lifecycle hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Overrides the runtime template naming.
    pub fn runtime(mut self, runtime: RuntimeLayout) -> Self {
        self.runtime = runtime;
        self
    }

    /// Validates and builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the source directory is missing, the
    /// name or runtime version cannot be determined, no official target
    /// remains, or a pattern does not compile.
    pub fn build(self) -> Result<PackageOptions> {
        let dir = absolute(&self.dir)?;
        if !dir.is_dir() {
            return Err(Error::Validation(format!(
                "source directory {} does not exist or is not a directory",
                dir.display()
            )));
        }

        let manifest = infer::AppManifest::load_if_present(&dir)?;

        let name = match self.name {
            Some(name) => name,
            None => manifest
                .as_ref()
                .and_then(infer::AppManifest::app_name)
                .ok_or_else(|| {
                    Error::Validation(
                        "name is required and could not be inferred from package.json".into(),
                    )
                })?,
        };
        if name.trim().is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }

        let app_version = self
            .app_version
            .or_else(|| manifest.as_ref().and_then(|m| m.version.clone()));

        let runtime_version = match self.runtime_version {
            Some(version) => infer::normalize_version(&version)?,
            None => infer::runtime_version(&dir, manifest.as_ref(), &self.runtime.module_names)?
                .ok_or_else(|| {
                    Error::Validation(
                        "runtime version is required and could not be inferred from the app's dependencies"
                            .into(),
                    )
                })?,
        };

        let platforms = if self.platforms.is_empty() {
            vec![Platform::host().ok_or_else(|| {
                Error::Validation("host platform is not supported; set platforms explicitly".into())
            })?]
        } else {
            self.platforms
        };
        let arches = if self.arches.is_empty() {
            vec![Arch::host().ok_or_else(|| {
                Error::Validation("host architecture is not supported; set arches explicitly".into())
            })?]
        } else {
            self.arches
        };
        let (targets, skipped_targets) = expand_targets(&platforms, &arches);
        if targets.is_empty() {
            return Err(Error::Validation(format!(
                "no official runtime distribution for platforms {:?} and arches {:?}",
                platforms, arches
            )));
        }

        let ignore = match (self.ignore_predicate, self.ignore_patterns) {
            (Some(predicate), _) => Some(IgnoreRules::Predicate(predicate)),
            (None, Some(patterns)) => Some(IgnoreRules::Patterns(
                patterns
                    .iter()
                    .map(|p| Regex::new(p))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            )),
            (None, None) => None,
        };

        if let Some(archive) = &self.archive {
            for pattern in [&archive.unpack, &archive.unpack_dir].into_iter().flatten() {
                glob::Pattern::new(pattern)?;
            }
        }

        let staging = match self.staging {
            StagingMode::Ephemeral { root: Some(root) } => StagingMode::Ephemeral {
                root: Some(absolute(&root)?),
            },
            other => other,
        };

        Ok(PackageOptions {
            dir,
            name,
            executable_name: self.executable_name,
            targets,
            skipped_targets,
            runtime_version,
            out: self.out.as_deref().map(absolute).transpose()?,
            overwrite: self.overwrite,
            staging,
            prune: self.prune,
            deref_symlinks: self.deref_symlinks,
            junk: self.junk.unwrap_or(true),
            archive: self.archive,
            ignore,
            icon: self.icon.as_deref().map(absolute).transpose()?,
            extra_resources: self
                .extra_resources
                .iter()
                .map(|p| absolute(p))
                .collect::<Result<Vec<_>>>()?,
            app_version,
            build_version: self.build_version,
            app_copyright: self.app_copyright,
            mac: self.mac,
            win32: self.win32,
            prebuilt_archive: self.prebuilt_archive.as_deref().map(absolute).transpose()?,
            hooks: self.hooks,
            runtime: self.runtime,
        })
    }
}

/// Resolves a path against the current directory without touching the filesystem.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path.absolutize()?.into_owned())
}
