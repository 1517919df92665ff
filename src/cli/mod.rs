//! Command line interface for the packager.

mod args;
mod output;

pub use args::{Args, parse_arches, parse_platforms};
pub use output::OutputManager;

use crate::error::Result;
use crate::packager::Packager;
use crate::staging::Collaborators;
use crate::template::DirectoryTemplateProvider;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    execute(Args::parse_args()).await
}

/// Packages according to already parsed arguments.
///
/// Prints every produced bundle and warning; returns the process exit code.
pub async fn execute(args: Args) -> Result<i32> {
    let output = OutputManager::new(args.quiet);
    let template_dir = args.template_dir.clone();
    let (config, default_dir) = args.into_config()?;
    let options = config.into_builder(&default_dir).build()?;

    output.progress(&format!(
        "Packaging {} for {} target(s)",
        options.name,
        options.targets.len()
    ))?;
    let collaborators = Collaborators::new(DirectoryTemplateProvider::new(template_dir));
    let report = Packager::new(options, collaborators).package().await?;

    for warning in &report.warnings {
        output.warning(warning)?;
    }
    for bundle in &report.bundles {
        output.bundle(bundle)?;
    }
    Ok(0)
}
