//! The per-target staging pipeline.
//!
//! One [`StagingPipeline`] assembles one bundle:
//!
//! ```text
//! Created → TemplateStaged → DefaultPayloadRemoved → ContentPopulated
//!         → Pruned → Archived → PlatformCustomized → Finalized
//! ```
//!
//! Pruning and archiving are skipped when not configured. Each transition is a
//! single fallible step; the first failure aborts the pipeline and is returned
//! as-is. Nothing already done is rolled back: a failed staging area is left
//! for the caller to inspect or remove, including an ephemeral one.

use crate::archive::{ARCHIVE_NAME, Archiver, TarArchiver, archive_app, copy_prebuilt};
use crate::context::{RunContext, Warning};
use crate::error::{Context, Error, ErrorExt, Result};
use crate::hooks::{HookArgs, HookPhase, run_hooks};
use crate::ignore::IgnoreFilter;
use crate::options::{PackageOptions, StagingMode, Target};
use crate::platform::{PlatformCustomizer, StagedBundle, customizer_for};
use crate::prune::{DependencyResolver, NodeModulesResolver, Pruner};
use crate::resedit::{RceditEditor, ResourceEditor};
use crate::sign::{CodesignSigner, Signer};
use crate::template::TemplateProvider;
use crate::utils::fs::{copy_dir, copy_dir_filtered, copy_path, remove_if_present};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Directory name of the expanded app payload inside the resources directory.
pub const APP_DIR_NAME: &str = "app";

/// Default payloads shipped with the runtime template.
const DEFAULT_PAYLOADS: [&str; 2] = ["default_app", "default_app.archive"];

/// External services used by the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    /// Runtime template source.
    pub templates: Arc<dyn TemplateProvider>,
    /// Archive packer.
    pub archiver: Arc<dyn Archiver>,
    /// Dependency resolver for pruning.
    pub resolver: Arc<dyn DependencyResolver>,
    /// mac signer.
    pub signer: Arc<dyn Signer>,
    /// Windows resource editor.
    pub resource_editor: Arc<dyn ResourceEditor>,
}

impl Collaborators {
    /// Default collaborators around a template provider.
    pub fn new(templates: impl TemplateProvider + 'static) -> Self {
        Self {
            templates: Arc::new(templates),
            archiver: Arc::new(TarArchiver::new()),
            resolver: Arc::new(NodeModulesResolver::new()),
            signer: Arc::new(CodesignSigner::new()),
            resource_editor: Arc::new(RceditEditor::new()),
        }
    }

    /// Replaces the archiver.
    pub fn with_archiver(mut self, archiver: impl Archiver + 'static) -> Self {
        self.archiver = Arc::new(archiver);
        self
    }

    /// Replaces the dependency resolver.
    pub fn with_resolver(mut self, resolver: impl DependencyResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replaces the signer.
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    /// Replaces the resource editor.
    pub fn with_resource_editor(mut self, editor: impl ResourceEditor + 'static) -> Self {
        self.resource_editor = Arc::new(editor);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Pipeline state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Stage {
    /// Staging path computed, nothing on disk.
    Created,
    /// Runtime template copied into the staging path.
    TemplateStaged,
    /// Template's default payload removed.
    DefaultPayloadRemoved,
    /// App payload placed in the resources directory.
    ContentPopulated,
    /// Development modules removed.
    Pruned,
    /// App directory packed into an archive.
    Archived,
    /// Platform naming and metadata applied.
    PlatformCustomized,
    /// Bundle at its final path.
    Finalized,
}

/// Form of the app payload once population is complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Payload {
    /// `resources/app/`.
    Directory,
    /// `resources/app.archive`.
    Archive,
}

/// Replaces the extension of `icon` with `ext` and returns it if it exists.
pub fn resolve_icon(icon: &Path, ext: &str) -> Option<PathBuf> {
    let candidate = if icon.extension().is_some_and(|e| e == ext) {
        icon.to_path_buf()
    } else {
        icon.with_extension(ext)
    };
    if candidate.is_file() {
        Some(candidate)
    } else {
        log::debug!("Icon {} not found", candidate.display());
        None
    }
}

/// Assembles the bundle of one target.
pub struct StagingPipeline<'a> {
    target: Target,
    options: &'a PackageOptions,
    collaborators: &'a Collaborators,
    filter: &'a IgnoreFilter,
    customizer: &'static dyn PlatformCustomizer,
    staging_path: PathBuf,
    final_path: PathBuf,
    stage: Stage,
    payload: Option<Payload>,
    ctx: RunContext,
    // Only set for ephemeral staging. Removed on drop once finalized, kept
    // otherwise.
    workdir: Option<TempDir>,
}

impl<'a> StagingPipeline<'a> {
    /// Computes the staging and final paths for `target`.
    ///
    /// Ephemeral staging gets a fresh temporary directory per pipeline, so
    /// concurrent targets never share a staging path.
    pub fn new(
        target: Target,
        options: &'a PackageOptions,
        collaborators: &'a Collaborators,
        filter: &'a IgnoreFilter,
    ) -> Result<Self> {
        let final_path = options.final_path(target)?;
        let (staging_path, workdir) = match &options.staging {
            StagingMode::Fixed => (final_path.clone(), None),
            StagingMode::Ephemeral { root } => {
                let mut builder = tempfile::Builder::new();
                builder.prefix("packager-");
                let workdir = match root {
                    Some(root) => {
                        std::fs::create_dir_all(root).fs_context("creating staging root", root)?;
                        builder.tempdir_in(root).fs_context("creating staging directory", root)?
                    }
                    None => builder
                        .tempdir()
                        .fs_context("creating staging directory", std::env::temp_dir())?,
                };
                (workdir.path().join(target.basename(&options.name)), Some(workdir))
            }
        };

        Ok(Self {
            target,
            options,
            collaborators,
            filter,
            customizer: customizer_for(target.platform),
            staging_path,
            final_path,
            stage: Stage::Created,
            payload: None,
            ctx: RunContext::new(target),
            workdir,
        })
    }

    /// Current state.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Where the bundle is being assembled.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Where the finished bundle will be.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        self.ctx.warnings()
    }

    fn resources_dir(&self) -> PathBuf {
        self.customizer.resources_dir(&self.staging_path, self.options)
    }

    fn app_dir(&self) -> PathBuf {
        self.resources_dir().join(APP_DIR_NAME)
    }

    fn hook_args(&self, path: PathBuf) -> HookArgs {
        HookArgs {
            path,
            runtime_version: self.options.runtime_version.clone(),
            platform: self.target.platform,
            arch: self.target.arch,
        }
    }

    /// Claims the output path, stages the runtime template and removes its
    /// default payload.
    pub async fn initialize(&mut self) -> Result<()> {
        if tokio::fs::symlink_metadata(&self.final_path).await.is_ok() {
            if !self.options.overwrite {
                return Err(Error::Staging(format!(
                    "{} already exists; enable overwrite to replace it",
                    self.final_path.display()
                )));
            }
            log::info!("Removing existing bundle {}", self.final_path.display());
            remove_if_present(&self.final_path).await?;
        }

        let template = self
            .collaborators
            .templates
            .template(self.target, &self.options.runtime_version)
            .await?;
        log::info!(
            "Staging {} template from {}",
            self.target,
            template.display()
        );
        copy_dir(&template, &self.staging_path, false)
            .await
            .context("staging runtime template")?;
        self.stage = Stage::TemplateStaged;

        let args = self.hook_args(self.staging_path.clone());
        run_hooks(&self.options.hooks, HookPhase::AfterExtract, &args).await?;

        let resources = self.resources_dir();
        for payload in DEFAULT_PAYLOADS {
            remove_if_present(&resources.join(payload)).await?;
        }
        self.stage = Stage::DefaultPayloadRemoved;
        Ok(())
    }

    /// Places the app payload, prunes and archives it, then copies extra
    /// resources.
    pub async fn populate(&mut self) -> Result<()> {
        let resources = self.resources_dir();
        match &self.options.prebuilt_archive {
            Some(archive) => {
                self.warn_ignored_options();
                copy_prebuilt(archive, &resources.join(ARCHIVE_NAME)).await?;
                self.payload = Some(Payload::Archive);
                self.stage = Stage::ContentPopulated;
            }
            None => self.build_from_source().await?,
        }

        for resource in &self.options.extra_resources {
            let name = resource.file_name().with_context(|| {
                format!("extra resource {} has no file name", resource.display())
            })?;
            copy_path(
                resource,
                &resources.join(name),
                self.options.deref_symlinks_enabled(),
            )
            .await
            .with_context(|| format!("copying extra resource {}", resource.display()))?;
        }
        Ok(())
    }

    fn warn_ignored_options(&mut self) {
        let options = self.options;
        let hooks = &options.hooks;
        let ignored = [
            ("ignore", options.ignore.is_some()),
            ("after_copy", !hooks.after_copy.is_empty()),
            ("after_prune", !hooks.after_prune.is_empty()),
            ("prune", options.prune.is_some()),
            ("deref_symlinks", options.deref_symlinks.is_some()),
            ("archive", options.archive.is_some()),
        ];
        for (option, set) in ignored {
            if set {
                self.ctx.warn(Warning::IgnoredOption {
                    target: self.target,
                    option,
                });
            }
        }
    }

    async fn build_from_source(&mut self) -> Result<()> {
        let app_dir = self.app_dir();
        let filter = self.filter;
        log::info!(
            "Copying {} into {}",
            self.options.dir.display(),
            app_dir.display()
        );
        copy_dir_filtered(
            &self.options.dir,
            &app_dir,
            &|path: &Path| filter.include(path),
            self.options.deref_symlinks_enabled(),
        )
        .await
        .context("copying app")?;
        self.payload = Some(Payload::Directory);
        self.stage = Stage::ContentPopulated;

        let args = self.hook_args(app_dir.clone());
        run_hooks(&self.options.hooks, HookPhase::AfterCopy, &args).await?;

        if self.options.prune_enabled() {
            Pruner::new(
                &app_dir,
                self.collaborators.resolver.as_ref(),
                &self.options.runtime.module_names,
            )
            .prune(&mut self.ctx)
            .await?;
            self.stage = Stage::Pruned;
            run_hooks(&self.options.hooks, HookPhase::AfterPrune, &args).await?;
        }

        if let Some(archive) = &self.options.archive {
            let dest = self.resources_dir().join(ARCHIVE_NAME);
            archive_app(self.collaborators.archiver.as_ref(), &app_dir, &dest, archive).await?;
            self.payload = Some(Payload::Archive);
            self.stage = Stage::Archived;
        }
        Ok(())
    }

    /// Applies the platform customizer.
    pub async fn customize(&mut self) -> Result<()> {
        let payload = self
            .payload
            .context("customizing a bundle that has not been populated")?;
        let bundle = StagedBundle {
            target: self.target,
            staging: &self.staging_path,
            options: self.options,
            collaborators: self.collaborators,
            payload,
        };
        log::info!("Customizing {} bundle", self.target);
        self.customizer.customize(&bundle, &mut self.ctx).await?;
        self.stage = Stage::PlatformCustomized;
        Ok(())
    }

    /// Moves the bundle to its final path and runs the completion hooks.
    ///
    /// A failed move (for example across file systems) is not retried.
    pub async fn finalize(&mut self) -> Result<PathBuf> {
        if self.staging_path != self.final_path {
            if let Some(out) = self.final_path.parent() {
                tokio::fs::create_dir_all(out)
                    .await
                    .fs_context("creating output directory", out)?;
            }
            tokio::fs::rename(&self.staging_path, &self.final_path)
                .await
                .fs_context("moving bundle to output directory", &self.staging_path)?;
        }
        self.stage = Stage::Finalized;
        log::info!("Packaged {} at {}", self.target, self.final_path.display());

        let args = self.hook_args(self.final_path.clone());
        run_hooks(&self.options.hooks, HookPhase::AfterComplete, &args).await?;
        Ok(self.final_path.clone())
    }

    /// Runs every step; returns the final path and the recorded warnings.
    pub async fn run(mut self) -> Result<(PathBuf, Vec<Warning>)> {
        self.initialize().await?;
        self.populate().await?;
        self.customize().await?;
        let path = self.finalize().await?;
        let ctx = std::mem::replace(&mut self.ctx, RunContext::new(self.target));
        Ok((path, ctx.into_warnings()))
    }
}

impl Drop for StagingPipeline<'_> {
    fn drop(&mut self) {
        if self.stage == Stage::Finalized || std::fs::symlink_metadata(&self.staging_path).is_err() {
            return;
        }
        if let Some(workdir) = self.workdir.take() {
            let kept = workdir.keep();
            log::warn!(
                "Leaving unfinished {} staging area at {}",
                self.target,
                kept.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_icon_substitutes_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("icon.ico"), "").unwrap();

        assert_eq!(
            resolve_icon(&dir.path().join("icon.png"), "ico"),
            Some(dir.path().join("icon.ico"))
        );
        assert_eq!(
            resolve_icon(&dir.path().join("icon"), "ico"),
            Some(dir.path().join("icon.ico"))
        );
        assert_eq!(resolve_icon(&dir.path().join("icon.ico"), "icns"), None);
    }
}
