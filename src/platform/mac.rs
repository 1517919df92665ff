//! mac `.app` bundle customization.
//!
//! The runtime template ships as `<Product>.app` with three helper apps in
//! `Contents/Frameworks`. Customization rewrites the four `Info.plist`
//! documents, renames every executable and bundle directory to the app name,
//! places the icon and finally signs the result.

use super::{PlatformCustomizer, StagedBundle};
use crate::BoxFuture;
use crate::archive::{ARCHIVE_NAME, sha256_hex};
use crate::context::{RunContext, Warning};
use crate::error::{Error, ErrorExt, Result};
use crate::options::{ExtendInfo, PackageOptions, Protocol};
use crate::sign::SignRequest;
use crate::staging::{Payload, resolve_icon};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

/// Helper suffixes, in rename order, with their bundle identifier suffix.
const HELPERS: [(&str, &str); 3] = [(" Helper", ""), (" Helper EH", ".EH"), (" Helper NP", ".NP")];

/// mac customizer (darwin and mas).
#[derive(Clone, Copy, Debug, Default)]
pub struct MacCustomizer;

/// Keeps only `[A-Za-z0-9.-]`, mapping spaces to `-`.
pub fn sanitize_bundle_identifier(id: &str) -> String {
    id.chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' => Some(c),
            _ => None,
        })
        .collect()
}

/// Collapses registrations sharing (name, role) into one, uniting their
/// schemes in first-seen order.
pub fn merge_protocols(protocols: &[Protocol]) -> Vec<Protocol> {
    let mut merged: Vec<Protocol> = Vec::new();
    for protocol in protocols {
        match merged
            .iter_mut()
            .find(|p| p.name == protocol.name && p.role == protocol.role)
        {
            Some(existing) => {
                for scheme in &protocol.schemes {
                    if !existing.schemes.contains(scheme) {
                        existing.schemes.push(scheme.clone());
                    }
                }
            }
            None => {
                let mut entry = protocol.clone();
                let mut seen = Vec::new();
                entry.schemes.retain(|s| {
                    let first = !seen.contains(s);
                    seen.push(s.clone());
                    first
                });
                merged.push(entry);
            }
        }
    }
    merged
}

/// Bundle identifier of the app: explicit, or derived from the name.
pub fn app_bundle_id(options: &PackageOptions) -> String {
    let id = options
        .mac
        .app_bundle_id
        .clone()
        .unwrap_or_else(|| format!("com.electron.{}", options.name.to_lowercase()));
    sanitize_bundle_identifier(&id)
}

fn read_plist(path: &Path) -> Result<Dictionary> {
    Value::from_file(path)
        .map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })?
        .into_dictionary()
        .ok_or_else(|| {
            Error::MetadataShape(format!("{} is not a dictionary", path.display()))
        })
}

fn write_plist(path: &Path, dict: Dictionary) -> Result<()> {
    Value::Dictionary(dict)
        .to_file_xml(path)
        .map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })
}

fn extend_info(extend: &ExtendInfo) -> Result<Dictionary> {
    match extend {
        ExtendInfo::Path(path) => read_plist(path),
        ExtendInfo::Dictionary(dict) => Ok(dict.clone()),
    }
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn url_types(protocols: &[Protocol]) -> Value {
    Value::Array(
        merge_protocols(protocols)
            .into_iter()
            .map(|protocol| {
                let mut entry = Dictionary::new();
                entry.insert("CFBundleURLName".into(), protocol.name.into());
                entry.insert("CFBundleURLSchemes".into(), string_array(&protocol.schemes));
                entry.insert("CFBundleTypeRole".into(), protocol.role.into());
                Value::Dictionary(entry)
            })
            .collect(),
    )
}

async fn rename(from: &Path, to: &Path) -> Result<()> {
    log::debug!("Renaming {} to {}", from.display(), to.display());
    tokio::fs::rename(from, to)
        .await
        .fs_context("renaming bundle entry", from)
}

impl MacCustomizer {
    fn app_dir(staging: &Path, options: &PackageOptions) -> PathBuf {
        staging.join(format!("{}.app", options.runtime.product_name))
    }

    /// Computes the main `Info.plist` from the template's document.
    async fn main_plist(
        bundle: &StagedBundle<'_>,
        mut plist: Dictionary,
        bundle_id: &str,
    ) -> Result<Dictionary> {
        let options = bundle.options;
        let mac = &options.mac;

        if let Some(extend) = &mac.extend_info {
            for (key, value) in extend_info(extend)? {
                plist.insert(key, value);
            }
        }

        plist.insert("CFBundleDisplayName".into(), options.name.clone().into());
        plist.insert("CFBundleName".into(), options.name.clone().into());
        plist.insert(
            "CFBundleExecutable".into(),
            options.executable_name().to_string().into(),
        );
        plist.insert("CFBundleIdentifier".into(), bundle_id.to_string().into());
        plist.insert("CFBundlePackageType".into(), "APPL".into());

        if let Some(version) = &options.app_version {
            plist.insert("CFBundleShortVersionString".into(), version.clone().into());
            plist.insert("CFBundleVersion".into(), version.clone().into());
        }
        if let Some(version) = &options.build_version {
            plist.insert("CFBundleVersion".into(), version.clone().into());
        }

        if !mac.protocols.is_empty() {
            plist.insert("CFBundleURLTypes".into(), url_types(&mac.protocols));
        }
        if let Some(category) = &mac.app_category_type {
            plist.insert("LSApplicationCategoryType".into(), category.clone().into());
        }
        if let Some(copyright) = &options.app_copyright {
            plist.insert("NSHumanReadableCopyright".into(), copyright.clone().into());
        }
        if mac.dark_mode_support {
            plist.insert("NSRequiresAquaSystemAppearance".into(), false.into());
        }
        for (kind, description) in &mac.usage_descriptions {
            plist.insert(format!("NS{kind}UsageDescription"), description.clone().into());
        }

        if bundle.payload == Payload::Archive {
            let archive = bundle.resources_dir().join(ARCHIVE_NAME);
            let mut entry = Dictionary::new();
            entry.insert("algorithm".into(), "SHA256".into());
            entry.insert("hash".into(), sha256_hex(&archive).await?.into());
            let mut integrity = Dictionary::new();
            integrity.insert(format!("Resources/{ARCHIVE_NAME}"), Value::Dictionary(entry));
            plist.insert("ElectronAsarIntegrity".into(), Value::Dictionary(integrity));
        }

        Ok(plist)
    }

    async fn place_icon(
        bundle: &StagedBundle<'_>,
        ctx: &mut RunContext,
        icon_file: Option<&str>,
    ) -> Result<()> {
        let Some(icon) = &bundle.options.icon else {
            return Ok(());
        };
        match resolve_icon(icon, "icns") {
            Some(resolved) => {
                let dest = bundle
                    .resources_dir()
                    .join(icon_file.unwrap_or("electron.icns"));
                tokio::fs::copy(&resolved, &dest)
                    .await
                    .fs_context("copying icon", &resolved)?;
            }
            None => ctx.warn(Warning::MissingIcon {
                target: bundle.target,
                path: icon.with_extension("icns"),
            }),
        }
        Ok(())
    }

    async fn customize_bundle(bundle: &StagedBundle<'_>, ctx: &mut RunContext) -> Result<()> {
        let options = bundle.options;
        let product = &options.runtime.product_name;
        let name = &options.name;
        let app = Self::app_dir(bundle.staging, options);
        let contents = app.join("Contents");
        let frameworks = contents.join("Frameworks");

        let bundle_id = app_bundle_id(options);
        let helper_id = sanitize_bundle_identifier(
            &options
                .mac
                .helper_bundle_id
                .clone()
                .unwrap_or_else(|| format!("{bundle_id}.helper")),
        );

        let info_path = contents.join("Info.plist");
        let template_plist = read_plist(&info_path)?;
        let icon_file = template_plist
            .get("CFBundleIconFile")
            .and_then(Value::as_string)
            .map(str::to_string);
        let plist = Self::main_plist(bundle, template_plist, &bundle_id).await?;

        let mut helpers = Vec::new();
        for (suffix, id_suffix) in HELPERS {
            let helper_app = frameworks.join(format!("{product}{suffix}.app"));
            let helper_info = helper_app.join("Contents/Info.plist");
            if !helper_info.is_file() {
                log::debug!("Template has no {}{} helper", product, suffix);
                continue;
            }
            let mut helper_plist = read_plist(&helper_info)?;
            let helper_name = format!("{name}{suffix}");
            helper_plist.insert("CFBundleName".into(), helper_name.clone().into());
            helper_plist.insert("CFBundleDisplayName".into(), helper_name.clone().into());
            helper_plist.insert("CFBundleExecutable".into(), helper_name.clone().into());
            helper_plist.insert(
                "CFBundleIdentifier".into(),
                format!("{helper_id}{id_suffix}").into(),
            );
            helpers.push((helper_app, helper_info, helper_plist, suffix));
        }

        write_plist(&info_path, plist)?;
        for (_, helper_info, helper_plist, _) in &helpers {
            write_plist(helper_info, helper_plist.clone())?;
        }

        let macos = contents.join("MacOS");
        let exe = macos.join(options.executable_name());
        let template_exe = macos.join(product);
        if template_exe != exe {
            rename(&template_exe, &exe).await?;
        }

        for (helper_app, _, _, suffix) in &helpers {
            let helper_macos = helper_app.join("Contents/MacOS");
            let from_exe = helper_macos.join(format!("{product}{suffix}"));
            let to_exe = helper_macos.join(format!("{name}{suffix}"));
            if from_exe != to_exe {
                rename(&from_exe, &to_exe).await?;
            }
            let to_app = frameworks.join(format!("{name}{suffix}.app"));
            if *helper_app != to_app {
                rename(helper_app, &to_app).await?;
            }
        }

        Self::place_icon(bundle, ctx, icon_file.as_deref()).await?;

        let final_app = bundle.staging.join(format!("{name}.app"));
        if app != final_app {
            rename(&app, &final_app).await?;
        }

        if let Some(sign) = &options.mac.sign {
            let request = SignRequest {
                bundle: final_app,
                platform: bundle.target.platform,
                identity: sign.identity.clone(),
                entitlements: sign.entitlements.clone(),
                hardened_runtime: sign.hardened_runtime,
            };
            if let Err(e) = bundle.collaborators.signer.sign(&request).await {
                ctx.warn(Warning::SigningFailed {
                    target: bundle.target,
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl PlatformCustomizer for MacCustomizer {
    fn resources_dir(&self, staging: &Path, options: &PackageOptions) -> PathBuf {
        Self::app_dir(staging, options).join("Contents/Resources")
    }

    fn customize<'a>(
        &'a self,
        bundle: &'a StagedBundle<'a>,
        ctx: &'a mut RunContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Self::customize_bundle(bundle, ctx))
    }
}
