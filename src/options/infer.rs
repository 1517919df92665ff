//! Inference of missing options from the app manifest (`package.json`).

use crate::error::{Error, ErrorExt, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Fields of `package.json` the packager reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppManifest {
    /// Package name.
    pub name: Option<String>,
    /// Human readable product name; preferred over `name`.
    #[serde(rename = "productName")]
    pub product_name: Option<String>,
    /// Package version.
    pub version: Option<String>,
    /// Production dependencies (name → range).
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,
    /// Optional dependencies (name → range).
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: BTreeMap<String, serde_json::Value>,
    /// Development dependencies (name → range).
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, serde_json::Value>,
}

impl AppManifest {
    /// Reads and parses `<dir>/package.json`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("package.json");
        let contents = std::fs::read_to_string(&path).fs_context("reading app manifest", &path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Reads `<dir>/package.json` if it exists.
    pub fn load_if_present(dir: &Path) -> Result<Option<Self>> {
        if dir.join("package.json").is_file() {
            Self::load(dir)
                .map(Some)
                .map_err(|e| Error::Validation(format!("unreadable package.json: {e}")))
        } else {
            Ok(None)
        }
    }

    /// Name to use for the bundle: `productName`, falling back to `name`.
    pub fn app_name(&self) -> Option<String> {
        self.product_name
            .clone()
            .or_else(|| self.name.clone())
            .filter(|n| !n.trim().is_empty())
    }
}

/// Strips a leading `v` and validates the version as semver.
pub fn normalize_version(version: &str) -> Result<String> {
    let trimmed = version.trim().trim_start_matches('v');
    semver::Version::parse(trimmed)
        .map(|v| v.to_string())
        .map_err(|e| Error::Validation(format!("invalid runtime version '{version}': {e}")))
}

/// Determines the runtime version the app was developed against.
///
/// Prefers the version of the installed runtime module, then the lowest
/// version satisfying the declared dependency range.
pub fn runtime_version(
    dir: &Path,
    manifest: Option<&AppManifest>,
    module_names: &[String],
) -> Result<Option<String>> {
    for module in module_names {
        let installed = dir.join("node_modules").join(module);
        if installed.join("package.json").is_file() {
            let manifest = AppManifest::load(&installed).map_err(|e| {
                Error::Validation(format!("installed {module} manifest: {e}"))
            })?;
            if let Some(version) = manifest.version {
                log::debug!("Inferred runtime version {} from installed {}", version, module);
                return normalize_version(&version).map(Some);
            }
        }
    }

    let Some(manifest) = manifest else {
        return Ok(None);
    };

    for module in module_names {
        let declared = manifest
            .dev_dependencies
            .get(module)
            .or_else(|| manifest.dependencies.get(module))
            .and_then(serde_json::Value::as_str);
        if let Some(range) = declared
            && let Some(version) = version_from_range(range)
        {
            log::debug!("Inferred runtime version {} from range '{}'", version, range);
            return Ok(Some(version));
        }
    }

    Ok(None)
}

/// Extracts the base version of a simple range such as `^30.1.0` or `~29.0.0`.
fn version_from_range(range: &str) -> Option<String> {
    let first = range.split_whitespace().next()?;
    let bare = first.trim_start_matches(['^', '~', '=', '>', 'v']);
    semver::Version::parse(bare).ok().map(|v| v.to_string())
}
