//! Command line argument parsing and validation.
//!
//! Arguments are overlaid on an optional TOML config file: anything given on
//! the command line wins over the file.

use crate::error::{Error, Result};
use crate::options::{Arch, ArchiveOptions, PackageConfig, Platform, TmpDirSetting};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Packages an app directory into per-platform bundles
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_package",
    version,
    about = "Package an application directory into per-platform bundles",
    long_about = "Combine an application source tree with prebuilt runtime templates and
produce one bundle directory per target: <out>/<name>-<platform>-<arch>.

Usage:
  kodegen_bundler_package ./app
  kodegen_bundler_package ./app Foo --platform win32 --arch x64 --archive
  kodegen_bundler_package ./app --platform all --arch all --out dist
  kodegen_bundler_package --config package.toml"
)]
pub struct Args {
    /// Application source directory
    #[arg(index = 1, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Application name (default: productName or name from package.json)
    #[arg(index = 2, value_name = "NAME")]
    pub name: Option<String>,

    /// TOML config file; command line arguments override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target platforms (darwin, mas, linux, win32 or all)
    #[arg(long, value_name = "PLATFORM", value_delimiter = ',')]
    pub platform: Vec<String>,

    /// Target architectures (ia32, x64, armv7l, arm64, mips64el or all)
    #[arg(long, value_name = "ARCH", value_delimiter = ',')]
    pub arch: Vec<String>,

    /// Output directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Replace existing bundles
    #[arg(long)]
    pub overwrite: bool,

    /// Parent directory for temporary staging areas
    #[arg(long, value_name = "DIR", conflicts_with = "no_tmpdir")]
    pub tmpdir: Option<PathBuf>,

    /// Stage directly at the output path
    #[arg(long)]
    pub no_tmpdir: bool,

    /// Pack the app into a single archive
    #[arg(long)]
    pub archive: bool,

    /// Glob of files left outside the archive
    #[arg(long, value_name = "GLOB", requires = "archive")]
    pub unpack: Option<String>,

    /// Keep development dependencies
    #[arg(long)]
    pub no_prune: bool,

    /// Copy symlinks as symlinks
    #[arg(long)]
    pub no_deref_symlinks: bool,

    /// Regular expression of source paths to leave out (repeatable)
    #[arg(long, value_name = "REGEX")]
    pub ignore: Vec<String>,

    /// Use an existing archive as the app payload
    #[arg(long, value_name = "FILE")]
    pub prebuilt_archive: Option<PathBuf>,

    /// Icon path; the extension is chosen per platform
    #[arg(long, value_name = "PATH")]
    pub icon: Option<PathBuf>,

    /// File or directory copied into the resources directory (repeatable)
    #[arg(long, value_name = "PATH")]
    pub extra_resource: Vec<PathBuf>,

    /// Application version
    #[arg(long, value_name = "VERSION")]
    pub app_version: Option<String>,

    /// Build version
    #[arg(long, value_name = "VERSION")]
    pub build_version: Option<String>,

    /// Copyright notice
    #[arg(long, value_name = "TEXT")]
    pub app_copyright: Option<String>,

    /// mac bundle identifier
    #[arg(long, value_name = "ID")]
    pub app_bundle_id: Option<String>,

    /// Executable name (default: the app name)
    #[arg(long, value_name = "NAME")]
    pub executable_name: Option<String>,

    /// Runtime version (default: inferred from the app's dependencies)
    #[arg(long, value_name = "VERSION")]
    pub runtime_version: Option<String>,

    /// Directory holding extracted runtime templates
    #[arg(
        long,
        value_name = "DIR",
        env = "PACKAGER_TEMPLATE_DIR",
        default_value = "templates"
    )]
    pub template_dir: PathBuf,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dir.is_none() && self.config.is_none() {
            return Err("An application directory or --config is required".to_string());
        }
        parse_platforms(&self.platform)?;
        parse_arches(&self.arch)?;
        Ok(())
    }

    /// Loads the config file (if any) and overlays these arguments on it.
    ///
    /// Returns the merged config and the directory used when neither the
    /// arguments nor the file name a source directory.
    pub fn into_config(self) -> Result<(PackageConfig, PathBuf)> {
        self.validate().map_err(Error::Validation)?;

        let mut config = match &self.config {
            Some(path) => PackageConfig::from_file(path)?,
            None => PackageConfig::default(),
        };
        let default_dir = self
            .config
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(dir) = self.dir {
            config.dir = Some(dir);
        }
        overlay(&mut config.name, self.name);
        overlay(&mut config.executable_name, self.executable_name);
        overlay(&mut config.runtime_version, self.runtime_version);
        overlay(&mut config.out, self.out);
        overlay(&mut config.icon, self.icon);
        overlay(&mut config.prebuilt_archive, self.prebuilt_archive);
        overlay(&mut config.app_version, self.app_version);
        overlay(&mut config.build_version, self.build_version);
        overlay(&mut config.app_copyright, self.app_copyright);
        overlay(&mut config.mac.app_bundle_id, self.app_bundle_id);

        let platforms = parse_platforms(&self.platform).map_err(Error::Validation)?;
        if !platforms.is_empty() {
            config.platforms = platforms;
        }
        let arches = parse_arches(&self.arch).map_err(Error::Validation)?;
        if !arches.is_empty() {
            config.arches = arches;
        }

        if self.overwrite {
            config.overwrite = true;
        }
        if self.no_tmpdir {
            config.tmpdir = Some(TmpDirSetting::Enabled(false));
        } else if let Some(root) = self.tmpdir {
            config.tmpdir = Some(TmpDirSetting::Path(root));
        }
        if self.archive {
            let archive = config.archive.get_or_insert_with(ArchiveOptions::default);
            overlay(&mut archive.unpack, self.unpack);
        }
        if self.no_prune {
            config.prune = Some(false);
        }
        if self.no_deref_symlinks {
            config.deref_symlinks = Some(false);
        }
        if !self.ignore.is_empty() {
            config.ignore = Some(self.ignore);
        }
        config.extra_resources.extend(self.extra_resource);

        Ok((config, default_dir))
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Parses platform names; `all` selects every platform.
pub fn parse_platforms(values: &[String]) -> std::result::Result<Vec<Platform>, String> {
    if values.iter().any(|v| v.eq_ignore_ascii_case("all")) {
        return Ok(Platform::ALL.to_vec());
    }
    values.iter().map(|v| v.parse()).collect()
}

/// Parses architecture names; `all` selects every architecture.
pub fn parse_arches(values: &[String]) -> std::result::Result<Vec<Arch>, String> {
    if values.iter().any(|v| v.eq_ignore_ascii_case("all")) {
        return Ok(Arch::ALL.to_vec());
    }
    values.iter().map(|v| v.parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kodegen_bundler_package").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_all_expands() {
        assert_eq!(parse_platforms(&["all".into()]).unwrap(), Platform::ALL.to_vec());
        assert_eq!(parse_arches(&["x64".into(), "ALL".into()]).unwrap(), Arch::ALL.to_vec());
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        let err = parse_platforms(&["beos".into()]).unwrap_err();
        assert!(err.contains("beos"));
    }

    #[test]
    fn test_requires_dir_or_config() {
        let args = parse(&[]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_overlay_on_empty_config() {
        let args = parse(&[
            "app",
            "Foo",
            "--platform",
            "win32,linux",
            "--arch",
            "x64",
            "--archive",
            "--unpack",
            "*.node",
            "--no-prune",
            "--no-tmpdir",
            "--ignore",
            "^/test",
        ]);
        let (config, default_dir) = args.into_config().unwrap();

        assert_eq!(config.dir.as_deref(), Some(Path::new("app")));
        assert_eq!(config.name.as_deref(), Some("Foo"));
        assert_eq!(config.platforms, vec![Platform::Win32, Platform::Linux]);
        assert_eq!(config.arches, vec![Arch::X64]);
        assert_eq!(config.archive.unwrap().unpack.as_deref(), Some("*.node"));
        assert_eq!(config.prune, Some(false));
        assert!(matches!(config.tmpdir, Some(TmpDirSetting::Enabled(false))));
        assert_eq!(config.ignore, Some(vec!["^/test".to_string()]));
        assert_eq!(default_dir, PathBuf::from("."));
    }

    #[test]
    fn test_unknown_arch_is_validation_error() {
        let err = parse(&["app", "--arch", "sparc"]).into_config().unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("sparc"));
    }

    #[test]
    fn test_arguments_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("package.toml");
        std::fs::write(
            &file,
            "name = \"FromFile\"\narches = [\"arm64\"]\n[mac]\napp_bundle_id = \"com.file\"\n",
        )
        .unwrap();

        let args = parse(&[
            "--config",
            file.to_str().unwrap(),
            "--app-bundle-id",
            "com.cli",
        ]);
        let (config, default_dir) = args.into_config().unwrap();

        assert_eq!(config.name.as_deref(), Some("FromFile"));
        assert_eq!(config.arches, vec![Arch::Arm64]);
        assert_eq!(config.mac.app_bundle_id.as_deref(), Some("com.cli"));
        assert_eq!(default_dir, dir.path().to_path_buf());
    }
}
