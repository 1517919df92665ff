//! Runs one staging pipeline per target.

use crate::context::Warning;
use crate::error::Result;
use crate::ignore::IgnoreFilter;
use crate::options::{PackageOptions, Target};
use crate::staging::{Collaborators, StagingPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

/// One finished bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagedBundle {
    /// Target the bundle was built for.
    pub target: Target,
    /// Final bundle path.
    pub path: PathBuf,
}

/// Outcome of a successful run.
#[derive(Clone, Debug, Default)]
pub struct PackageReport {
    /// Bundles in target order.
    pub bundles: Vec<PackagedBundle>,
    /// Warnings from every target, skipped targets first.
    pub warnings: Vec<Warning>,
}

impl PackageReport {
    /// Paths of the produced bundles.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.bundles.iter().map(|b| b.path.clone()).collect()
    }
}

/// Packages an app for every configured target.
///
/// # Example
///
/// ```no_run
/// use kodegen_bundler_package::options::OptionsBuilder;
/// use kodegen_bundler_package::packager::Packager;
/// use kodegen_bundler_package::staging::Collaborators;
/// use kodegen_bundler_package::template::DirectoryTemplateProvider;
///
/// # async fn example() -> kodegen_bundler_package::Result<()> {
/// let options = OptionsBuilder::new("app").build()?;
/// let collaborators = Collaborators::new(DirectoryTemplateProvider::new("templates"));
/// let report = Packager::new(options, collaborators).package().await?;
/// for bundle in &report.bundles {
///     println!("{}", bundle.path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Packager {
    options: Arc<PackageOptions>,
    collaborators: Arc<Collaborators>,
}

impl Packager {
    /// Creates a packager.
    pub fn new(options: PackageOptions, collaborators: Collaborators) -> Self {
        Self {
            options: Arc::new(options),
            collaborators: Arc::new(collaborators),
        }
    }

    /// Runs configuration.
    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    /// Packages every target concurrently.
    ///
    /// Targets share only the read-only options; each pipeline owns its
    /// staging area and module classification. Returns the first error in
    /// target order, or every bundle and warning.
    pub async fn package(&self) -> Result<PackageReport> {
        let filter = Arc::new(IgnoreFilter::new(&self.options)?);
        let mut report = PackageReport::default();
        for target in &self.options.skipped_targets {
            let warning = Warning::UnsupportedTarget { target: *target };
            log::warn!("{}", warning);
            report.warnings.push(warning);
        }

        let mut tasks = JoinSet::new();
        for (index, target) in self.options.targets.iter().copied().enumerate() {
            let options = Arc::clone(&self.options);
            let collaborators = Arc::clone(&self.collaborators);
            let filter = Arc::clone(&filter);
            tasks.spawn(async move {
                let result = match StagingPipeline::new(target, &options, &collaborators, &filter) {
                    Ok(pipeline) => pipeline.run().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    log::error!("{} failed: {}", target, e);
                }
                (index, target, result)
            });
        }

        let mut results = Vec::with_capacity(self.options.targets.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(index, ..)| *index);

        for (_, target, result) in results {
            let (path, warnings) = result?;
            report.bundles.push(PackagedBundle { target, path });
            report.warnings.extend(warnings);
        }
        Ok(report)
    }
}
