//! File form of the packaging configuration.
//!
//! ```toml
//! dir = "app"
//! name = "Foo"
//! platforms = ["darwin", "win32"]
//! arches = ["x64"]
//! out = "dist"
//! ignore = ["^/test($|/)"]
//! after_copy = ["npm ci --omit=dev"]
//!
//! [archive]
//! unpack = "*.node"
//!
//! [mac]
//! app_bundle_id = "com.example.foo"
//!
//! [[mac.protocols]]
//! name = "Foo Link"
//! schemes = ["foo"]
//!
//! [win32]
//! company_name = "Example Inc."
//! ```
//!
//! Every table rejects unknown fields so typos fail loudly.

use super::{
    ArchiveOptions, Arch, ExtendInfo, MacOptions, OptionsBuilder, Platform, Protocol,
    SignOptions, StagingMode, Win32Metadata,
};
use crate::error::{Error, ErrorExt, Result};
use crate::hooks::{CommandHook, Hook, Hooks};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Staging directory setting: a path, or `false` for fixed-path staging.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TmpDirSetting {
    /// `false` stages at the output path; `true` uses the system temp dir.
    Enabled(bool),
    /// Parent directory for ephemeral staging areas.
    Path(PathBuf),
}

/// mac table of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacConfig {
    /// Bundle identifier.
    pub app_bundle_id: Option<String>,
    /// Helper bundle identifier.
    pub helper_bundle_id: Option<String>,
    /// Application category.
    pub app_category_type: Option<String>,
    /// Property list merged into the main `Info.plist`.
    pub extend_info: Option<PathBuf>,
    /// URL scheme registrations.
    #[serde(default)]
    pub protocols: Vec<Protocol>,
    /// Signing request.
    pub sign: Option<SignOptions>,
    /// Opt into dark mode.
    #[serde(default)]
    pub dark_mode_support: bool,
    /// Privacy usage descriptions.
    #[serde(default)]
    pub usage_descriptions: BTreeMap<String, String>,
}

/// Packaging configuration as written in a TOML file.
///
/// Relative paths are resolved against the directory containing the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Application source directory.
    pub dir: Option<PathBuf>,
    /// Application name.
    pub name: Option<String>,
    /// Executable name.
    pub executable_name: Option<String>,
    /// Target platforms.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    /// Target architectures.
    #[serde(default)]
    pub arches: Vec<Arch>,
    /// Runtime version.
    pub runtime_version: Option<String>,
    /// Output directory.
    pub out: Option<PathBuf>,
    /// Replace existing output bundles.
    #[serde(default)]
    pub overwrite: bool,
    /// Staging directory setting.
    pub tmpdir: Option<TmpDirSetting>,
    /// Prune development dependencies.
    pub prune: Option<bool>,
    /// Follow symlinks while copying.
    pub deref_symlinks: Option<bool>,
    /// Ignore OS junk files.
    pub junk: Option<bool>,
    /// Archive options; presence enables archiving.
    pub archive: Option<ArchiveOptions>,
    /// Ignore patterns.
    pub ignore: Option<Vec<String>>,
    /// Icon path.
    pub icon: Option<PathBuf>,
    /// Extra resources.
    #[serde(default)]
    pub extra_resources: Vec<PathBuf>,
    /// Application version.
    pub app_version: Option<String>,
    /// Build version.
    pub build_version: Option<String>,
    /// Copyright notice.
    pub app_copyright: Option<String>,
    /// Pre-built archive.
    pub prebuilt_archive: Option<PathBuf>,
    /// Shell commands run after the template is staged.
    #[serde(default)]
    pub after_extract: Vec<String>,
    /// Shell commands run after the app is copied.
    #[serde(default)]
    pub after_copy: Vec<String>,
    /// Shell commands run after pruning.
    #[serde(default)]
    pub after_prune: Vec<String>,
    /// Shell commands run after the bundle reaches its final path.
    #[serde(default)]
    pub after_complete: Vec<String>,
    /// mac settings.
    #[serde(default)]
    pub mac: MacConfig,
    /// Windows version-info fields.
    #[serde(default)]
    pub win32: Win32Metadata,
}

impl PackageConfig {
    /// Parses a config file and resolves its relative paths.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).fs_context("reading config file", path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Validation(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.relative_to(base))
    }

    /// Parses a config document without resolving paths.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Validation(e.to_string()))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for path in [
            self.dir.as_mut(),
            self.out.as_mut(),
            self.icon.as_mut(),
            self.prebuilt_archive.as_mut(),
            self.mac.extend_info.as_mut(),
            self.win32.application_manifest.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            rebase(path);
        }
        if let Some(TmpDirSetting::Path(path)) = self.tmpdir.as_mut() {
            rebase(path);
        }
        if let Some(sign) = self.mac.sign.as_mut()
            && let Some(entitlements) = sign.entitlements.as_mut()
        {
            rebase(entitlements);
        }
        self.extra_resources.iter_mut().for_each(rebase);
        self
    }

    /// Converts the file form into a builder.
    ///
    /// `dir` falls back to `default_dir` when the file does not set it.
    pub fn into_builder(self, default_dir: &Path) -> OptionsBuilder {
        let mut builder = OptionsBuilder::new(self.dir.as_deref().unwrap_or(default_dir))
            .platforms(self.platforms)
            .arches(self.arches)
            .overwrite(self.overwrite)
            .mac(MacOptions {
                app_bundle_id: self.mac.app_bundle_id,
                helper_bundle_id: self.mac.helper_bundle_id,
                app_category_type: self.mac.app_category_type,
                extend_info: self.mac.extend_info.map(ExtendInfo::Path),
                protocols: self.mac.protocols,
                sign: self.mac.sign,
                dark_mode_support: self.mac.dark_mode_support,
                usage_descriptions: self.mac.usage_descriptions,
            })
            .win32(self.win32)
            .hooks(Hooks {
                after_extract: command_hooks(self.after_extract),
                after_copy: command_hooks(self.after_copy),
                after_prune: command_hooks(self.after_prune),
                after_complete: command_hooks(self.after_complete),
            });

        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(name) = self.executable_name {
            builder = builder.executable_name(name);
        }
        if let Some(version) = self.runtime_version {
            builder = builder.runtime_version(version);
        }
        if let Some(out) = self.out {
            builder = builder.out(out);
        }
        match self.tmpdir {
            Some(TmpDirSetting::Enabled(false)) => builder = builder.staging(StagingMode::Fixed),
            Some(TmpDirSetting::Path(root)) => {
                builder = builder.staging(StagingMode::Ephemeral { root: Some(root) })
            }
            Some(TmpDirSetting::Enabled(true)) | None => {}
        }
        if let Some(prune) = self.prune {
            builder = builder.prune(prune);
        }
        if let Some(deref) = self.deref_symlinks {
            builder = builder.deref_symlinks(deref);
        }
        if let Some(junk) = self.junk {
            builder = builder.junk(junk);
        }
        if let Some(archive) = self.archive {
            builder = builder.archive(archive);
        }
        if let Some(patterns) = self.ignore {
            builder = builder.ignore(patterns);
        }
        if let Some(icon) = self.icon {
            builder = builder.icon(icon);
        }
        for resource in self.extra_resources {
            builder = builder.extra_resource(resource);
        }
        if let Some(version) = self.app_version {
            builder = builder.app_version(version);
        }
        if let Some(version) = self.build_version {
            builder = builder.build_version(version);
        }
        if let Some(copyright) = self.app_copyright {
            builder = builder.app_copyright(copyright);
        }
        if let Some(archive) = self.prebuilt_archive {
            builder = builder.prebuilt_archive(archive);
        }
        builder
    }
}

fn command_hooks(commands: Vec<String>) -> Vec<Arc<dyn Hook>> {
    commands
        .into_iter()
        .map(|command| Arc::new(CommandHook::new(command)) as Arc<dyn Hook>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = PackageConfig::parse("name = \"Foo\"\nplatfrom = \"linux\"\n").unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("platfrom"));
    }

    #[test]
    fn test_unknown_nested_field_is_rejected() {
        let err = PackageConfig::parse("[mac]\nbundle = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("bundle"));
    }

    #[test]
    fn test_parse_full_document() {
        let config = PackageConfig::parse(
            r#"
name = "Foo"
platforms = ["darwin", "win32"]
arches = ["x64"]
tmpdir = false
after_copy = ["true"]

[archive]
unpack = "*.node"

[[mac.protocols]]
name = "Foo Link"
schemes = ["foo"]

[win32]
company_name = "Example Inc."
"#,
        )
        .unwrap();

        assert_eq!(config.platforms, vec![Platform::Darwin, Platform::Win32]);
        assert!(matches!(config.tmpdir, Some(TmpDirSetting::Enabled(false))));
        assert_eq!(config.mac.protocols[0].role, "Editor");
        assert_eq!(config.archive.unwrap().unpack.as_deref(), Some("*.node"));
        assert_eq!(config.after_copy.len(), 1);
    }
}
