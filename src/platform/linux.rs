//! Linux needs no metadata changes; only the runtime executable is renamed.

use super::{PlatformCustomizer, StagedBundle};
use crate::BoxFuture;
use crate::context::RunContext;
use crate::error::{ErrorExt, Result};
use crate::options::PackageOptions;
use std::path::{Path, PathBuf};

/// Linux customizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxCustomizer;

impl PlatformCustomizer for LinuxCustomizer {
    fn resources_dir(&self, staging: &Path, _options: &PackageOptions) -> PathBuf {
        staging.join("resources")
    }

    fn customize<'a>(
        &'a self,
        bundle: &'a StagedBundle<'a>,
        _ctx: &'a mut RunContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let from = bundle.staging.join(&bundle.options.runtime.executable);
            let to = bundle.staging.join(bundle.options.executable_name());
            if from != to && from.is_file() {
                log::debug!("Renaming {} to {}", from.display(), to.display());
                tokio::fs::rename(&from, &to)
                    .await
                    .fs_context("renaming executable", &from)?;
            }
            Ok(())
        })
    }
}
