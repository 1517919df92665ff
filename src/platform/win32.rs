//! Windows executable naming and resource embedding.

use super::{PlatformCustomizer, StagedBundle};
use crate::BoxFuture;
use crate::context::{RunContext, Warning};
use crate::error::{ErrorExt, Result};
use crate::options::PackageOptions;
use crate::resedit::ResourceEdit;
use crate::staging::resolve_icon;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Windows customizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Win32Customizer;

impl Win32Customizer {
    /// Builds the resource edit for `options`, or `None` when neither an icon
    /// nor any version-info field is supplied.
    pub fn resource_edit(options: &PackageOptions, icon: Option<PathBuf>) -> Option<ResourceEdit> {
        let metadata = &options.win32;
        let wanted = options.icon.is_some()
            || options.app_version.is_some()
            || options.build_version.is_some()
            || options.app_copyright.is_some()
            || !metadata.is_empty();
        if !wanted {
            return None;
        }

        let name = || options.name.clone();
        let mut strings = BTreeMap::new();
        if let Some(company) = &metadata.company_name {
            strings.insert("CompanyName".to_string(), company.clone());
        }
        strings.insert(
            "FileDescription".to_string(),
            metadata.file_description.clone().unwrap_or_else(name),
        );
        strings.insert(
            "InternalName".to_string(),
            metadata.internal_name.clone().unwrap_or_else(name),
        );
        strings.insert(
            "OriginalFilename".to_string(),
            metadata
                .original_filename
                .clone()
                .unwrap_or_else(|| format!("{}.exe", options.executable_name())),
        );
        strings.insert(
            "ProductName".to_string(),
            metadata.product_name.clone().unwrap_or_else(name),
        );
        if let Some(copyright) = &options.app_copyright {
            strings.insert("LegalCopyright".to_string(), copyright.clone());
        }

        Some(ResourceEdit {
            icon,
            version_strings: strings,
            file_version: options
                .build_version
                .clone()
                .or_else(|| metadata.file_version.clone()),
            product_version: options
                .app_version
                .clone()
                .or_else(|| metadata.product_version.clone()),
            requested_execution_level: metadata.requested_execution_level.clone(),
            application_manifest: metadata.application_manifest.clone(),
        })
    }
}

impl PlatformCustomizer for Win32Customizer {
    fn resources_dir(&self, staging: &Path, _options: &PackageOptions) -> PathBuf {
        staging.join("resources")
    }

    fn customize<'a>(
        &'a self,
        bundle: &'a StagedBundle<'a>,
        ctx: &'a mut RunContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let options = bundle.options;
            let from = bundle
                .staging
                .join(format!("{}.exe", options.runtime.executable));
            let exe = bundle
                .staging
                .join(format!("{}.exe", options.executable_name()));
            if from != exe {
                log::debug!("Renaming {} to {}", from.display(), exe.display());
                tokio::fs::rename(&from, &exe)
                    .await
                    .fs_context("renaming executable", &from)?;
            }

            let icon = match &options.icon {
                Some(icon) => {
                    let resolved = resolve_icon(icon, "ico");
                    if resolved.is_none() {
                        ctx.warn(Warning::MissingIcon {
                            target: bundle.target,
                            path: icon.with_extension("ico"),
                        });
                    }
                    resolved
                }
                None => None,
            };

            let Some(edit) = Self::resource_edit(options, icon) else {
                log::debug!("No icon or version information, skipping resource editing");
                return Ok(());
            };
            if let Err(e) = bundle.collaborators.resource_editor.edit(&exe, &edit).await {
                ctx.warn(Warning::ResourceEditFailed {
                    target: bundle.target,
                    reason: e.to_string(),
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Arch, OptionsBuilder, Platform, Win32Metadata};

    fn builder(dir: &Path) -> OptionsBuilder {
        OptionsBuilder::new(dir)
            .name("Foo")
            .runtime_version("30.0.0")
            .platforms(vec![Platform::Win32])
            .arches(vec![Arch::X64])
    }

    #[test]
    fn test_no_fields_skips_editing() {
        let dir = tempfile::tempdir().unwrap();
        let options = builder(dir.path()).build().unwrap();
        assert!(Win32Customizer::resource_edit(&options, None).is_none());
    }

    #[test]
    fn test_version_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let options = builder(dir.path())
            .app_version("1.2.3")
            .executable_name("foo-app")
            .win32(Win32Metadata {
                file_version: Some("9.9.9".into()),
                product_version: Some("8.8.8".into()),
                company_name: Some("Foo Inc.".into()),
                ..Default::default()
            })
            .build()
            .unwrap();

        let edit = Win32Customizer::resource_edit(&options, None).unwrap();
        assert_eq!(edit.file_version.as_deref(), Some("9.9.9"));
        assert_eq!(edit.product_version.as_deref(), Some("1.2.3"));
        assert_eq!(edit.version_strings["OriginalFilename"], "foo-app.exe");
        assert_eq!(edit.version_strings["ProductName"], "Foo");
        assert_eq!(edit.version_strings["CompanyName"], "Foo Inc.");
        assert!(!edit.version_strings.contains_key("LegalCopyright"));
    }

    #[test]
    fn test_build_version_overrides_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let options = builder(dir.path())
            .build_version("1.0.0.42")
            .app_copyright("(c) Foo")
            .win32(Win32Metadata {
                file_version: Some("9.9.9".into()),
                ..Default::default()
            })
            .build()
            .unwrap();

        let edit = Win32Customizer::resource_edit(&options, None).unwrap();
        assert_eq!(edit.file_version.as_deref(), Some("1.0.0.42"));
        assert_eq!(edit.product_version, None);
        assert_eq!(edit.version_strings["LegalCopyright"], "(c) Foo");
    }
}
