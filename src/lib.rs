//! # Kodegen Bundler Package
//!
//! Packages a built application tree and a prebuilt runtime template into
//! distributable per-platform bundles.
//!
//! One run takes a source directory and a set of (platform, arch) targets. Each
//! target is staged independently: the runtime template is copied, the app is
//! copied through the ignore filter, development dependencies are pruned, the
//! payload is optionally archived, platform metadata is rewritten and the
//! finished bundle is moved to `<out>/<name>-<platform>-<arch>`.
//!
//! ## Features
//!
//! - **Concurrent targets**: every target runs its own pipeline on tokio
//! - **Dependency pruning**: only production `node_modules` survive
//! - **Archiving**: deterministic tar payload with an unpacked side directory
//! - **Platform metadata**: `Info.plist` rewriting, Windows resources, signing
//! - **Lifecycle hooks**: async callbacks or shell commands between stages
//!
//! ## Usage
//!
//! ```bash
//! kodegen_bundler_package ./app --platform win32 --arch x64 --archive
//! kodegen_bundler_package ./app --platform all --arch all --out dist
//! kodegen_bundler_package --config package.toml
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive;
pub mod cli;
pub mod context;
pub mod error;
pub mod hooks;
pub mod ignore;
pub mod options;
pub mod packager;
pub mod platform;
pub mod prune;
pub mod resedit;
pub mod sign;
pub mod staging;
pub mod template;
pub mod utils;

pub use context::Warning;
pub use error::{Error, Result};
pub use hooks::{Hook, HookArgs, HookPhase, Hooks};
pub use options::{Arch, OptionsBuilder, PackageOptions, Platform, Target};
pub use packager::{PackageReport, PackagedBundle, Packager};
pub use staging::Collaborators;
pub use template::{DirectoryTemplateProvider, TemplateProvider};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by the collaborator traits.
///
/// The traits stay object safe so they can be shared as `Arc<dyn _>` between
/// target pipelines.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
