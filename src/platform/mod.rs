//! Platform-specific bundle finalization.
//!
//! Every target platform has one customizer, selected through
//! [`customizer_for`]. Customizers run after the staging area is populated and
//! before it is moved to the output directory.
//!
//! | Platform | Customizer | Work |
//! |----------|------------|------|
//! | darwin, mas | [`mac::MacCustomizer`] | `Info.plist` rewriting, helper renames, icon, signing |
//! | win32 | [`win32::Win32Customizer`] | executable rename, resource editing |
//! | linux | [`linux::LinuxCustomizer`] | executable rename only |

pub mod linux;
pub mod mac;
pub mod win32;

use crate::BoxFuture;
use crate::context::RunContext;
use crate::error::Result;
use crate::options::{PackageOptions, Platform, Target};
use crate::staging::{Collaborators, Payload};
use std::path::{Path, PathBuf};

/// A populated staging area handed to a customizer.
pub struct StagedBundle<'a> {
    /// Target being packaged.
    pub target: Target,
    /// Root of the staging area.
    pub staging: &'a Path,
    /// Run configuration.
    pub options: &'a PackageOptions,
    /// External collaborators.
    pub collaborators: &'a Collaborators,
    /// Form of the app payload in the resources directory.
    pub payload: Payload,
}

impl StagedBundle<'_> {
    /// Resources directory of the staged bundle.
    pub fn resources_dir(&self) -> PathBuf {
        customizer_for(self.target.platform).resources_dir(self.staging, self.options)
    }
}

/// Finalizes naming and metadata for one platform.
pub trait PlatformCustomizer: Send + Sync {
    /// Resources directory inside a staging area with the template's layout.
    fn resources_dir(&self, staging: &Path, options: &PackageOptions) -> PathBuf;

    /// Applies platform naming, metadata and signing to the staged bundle.
    fn customize<'a>(
        &'a self,
        bundle: &'a StagedBundle<'a>,
        ctx: &'a mut RunContext,
    ) -> BoxFuture<'a, Result<()>>;
}

static MAC: mac::MacCustomizer = mac::MacCustomizer;
static WIN32: win32::Win32Customizer = win32::Win32Customizer;
static LINUX: linux::LinuxCustomizer = linux::LinuxCustomizer;

/// Returns the customizer for `platform`.
pub fn customizer_for(platform: Platform) -> &'static dyn PlatformCustomizer {
    match platform {
        Platform::Darwin | Platform::Mas => &MAC,
        Platform::Win32 => &WIN32,
        Platform::Linux => &LINUX,
    }
}
