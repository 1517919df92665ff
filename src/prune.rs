//! Removal of development-only modules from the staged app.
//!
//! The [`DependencyResolver`] produces every on-disk module together with how
//! it is reached from the app root. [`Pruner`] turns that into a per-run
//! [`ModuleClassification`] on the first query, caches it in the
//! [`RunContext`] and removes the modules it does not keep.

use crate::BoxFuture;
use crate::context::{RunContext, Warning};
use crate::error::{Error, Result};
use crate::ignore::normalize_separators;
use crate::options::infer::AppManifest;
use crate::utils::fs::remove_if_present;
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::{Bfs, EdgeFiltered};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Normalized module path (`/node_modules/...`) → keep.
pub type ModuleClassification = HashMap<String, bool>;

/// How a module is reached from the app root.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DepType {
    /// Reachable through production dependency edges.
    Prod,
    /// Reachable through optional dependency edges only.
    Optional,
    /// Only reachable through development dependencies, or not at all.
    Dev,
}

impl DepType {
    /// Returns whether modules of this type ship with the app.
    pub fn is_production(&self) -> bool {
        !matches!(self, DepType::Dev)
    }
}

/// One module found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedModule {
    /// Absolute module directory.
    pub path: PathBuf,
    /// Package name (`left-pad`, `@scope/pkg`).
    pub name: String,
    /// Reachability from the root.
    pub dep_type: DepType,
}

/// Walks the dependency graph of a project.
pub trait DependencyResolver: Send + Sync {
    /// Returns every module installed below `root`, excluding `root` itself.
    fn resolve<'a>(&'a self, root: &'a Path) -> BoxFuture<'a, Result<Vec<ResolvedModule>>>;
}

/// Resolver over an installed `node_modules` tree.
///
/// Dependencies are resolved the way the runtime loads them: from the
/// requiring module's own `node_modules`, then each parent's, up to the root.
#[derive(Clone, Debug, Default)]
pub struct NodeModulesResolver;

impl NodeModulesResolver {
    /// Creates the resolver.
    pub fn new() -> Self {
        Self
    }

    fn resolve_blocking(root: &Path) -> Result<Vec<ResolvedModule>> {
        let module_dirs = find_module_dirs(root)?;

        let mut graph: DiGraph<PathBuf, DepType> = DiGraph::new();
        let root_index = graph.add_node(root.to_path_buf());
        let mut indices: HashMap<PathBuf, NodeIndex> = HashMap::new();
        indices.insert(root.to_path_buf(), root_index);
        for dir in &module_dirs {
            indices.insert(dir.clone(), graph.add_node(dir.clone()));
        }

        for (dir, index) in indices.clone() {
            let manifest = read_manifest(&dir)?;
            let mut edges: Vec<(&String, DepType)> = manifest
                .dependencies
                .keys()
                .map(|name| (name, DepType::Prod))
                .chain(manifest.optional_dependencies.keys().map(|name| (name, DepType::Optional)))
                .collect();
            if index == root_index {
                edges.extend(manifest.dev_dependencies.keys().map(|name| (name, DepType::Dev)));
            }

            for (name, dep_type) in edges {
                match locate(root, &dir, name, &indices) {
                    Some(target) => {
                        graph.add_edge(index, target, dep_type);
                    }
                    None if dep_type == DepType::Prod => {
                        log::debug!("{} requires {} but it is not installed", dir.display(), name);
                    }
                    None => {}
                }
            }
        }

        let production = EdgeFiltered::from_fn(&graph, |edge: EdgeReference<'_, DepType>| {
            edge.weight().is_production()
        });
        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&production, root_index);
        while let Some(node) = bfs.next(&production) {
            reachable.insert(node);
        }

        let required: HashSet<NodeIndex> = graph
            .edges_directed(root_index, petgraph::Direction::Outgoing)
            .filter(|edge| *edge.weight() == DepType::Prod)
            .map(|edge| petgraph::visit::EdgeRef::target(&edge))
            .collect();

        Ok(module_dirs
            .into_iter()
            .map(|path| {
                let index = indices[&path];
                let dep_type = if !reachable.contains(&index) {
                    DepType::Dev
                } else if required.contains(&index) || !only_optional(&graph, index, &reachable) {
                    DepType::Prod
                } else {
                    DepType::Optional
                };
                ResolvedModule {
                    name: module_name(&path),
                    path,
                    dep_type,
                }
            })
            .collect())
    }
}

impl DependencyResolver for NodeModulesResolver {
    fn resolve<'a>(&'a self, root: &'a Path) -> BoxFuture<'a, Result<Vec<ResolvedModule>>> {
        Box::pin(async move {
            let root = root.to_path_buf();
            tokio::task::spawn_blocking(move || Self::resolve_blocking(&root)).await?
        })
    }
}

/// Whether every production-reachable edge into `index` is optional.
fn only_optional(graph: &DiGraph<PathBuf, DepType>, index: NodeIndex, reachable: &HashSet<NodeIndex>) -> bool {
    graph
        .edges_directed(index, petgraph::Direction::Incoming)
        .filter(|edge| reachable.contains(&petgraph::visit::EdgeRef::source(edge)))
        .all(|edge| *edge.weight() != DepType::Prod)
}

fn read_manifest(dir: &Path) -> Result<AppManifest> {
    AppManifest::load(dir).map_err(|e| Error::Prune(format!("{}: {}", dir.display(), e)))
}

/// Finds `name` as seen from `from`, walking up to `root`.
fn locate(
    root: &Path,
    from: &Path,
    name: &str,
    indices: &HashMap<PathBuf, NodeIndex>,
) -> Option<NodeIndex> {
    from.ancestors()
        .take_while(|dir| dir.starts_with(root))
        .filter(|dir| !dir.ends_with("node_modules"))
        .find_map(|dir| indices.get(&dir.join("node_modules").join(name)).copied())
}

fn module_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(Path::file_name) {
        Some(scope) if scope.to_string_lossy().starts_with('@') => {
            format!("{}/{}", scope.to_string_lossy(), file_name)
        }
        _ => file_name,
    }
}

fn is_module_dir(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let parent_is = |dir: &Path, name: &str| dir.file_name().is_some_and(|n| n == name);
    let in_node_modules = parent_is(parent, "node_modules")
        || (parent
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('@'))
            && parent.parent().is_some_and(|p| parent_is(p, "node_modules")));
    in_node_modules && path.join("package.json").is_file()
}

/// Lists every module directory below `root`, outermost first.
///
/// A symlinked module is listed but not descended into.
pub fn find_module_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let file_type = entry.file_type();
            (file_type.is_dir() || file_type.is_symlink()) && entry.file_name() != ".bin"
        });
    for entry in walker {
        let entry = entry?;
        if is_module_dir(entry.path()) {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// Prunes one staged app directory.
pub struct Pruner<'a> {
    app_dir: &'a Path,
    resolver: &'a dyn DependencyResolver,
    runtime_modules: &'a [String],
}

impl<'a> Pruner<'a> {
    /// Creates a pruner for the app at `app_dir`.
    pub fn new(
        app_dir: &'a Path,
        resolver: &'a dyn DependencyResolver,
        runtime_modules: &'a [String],
    ) -> Self {
        Self {
            app_dir,
            resolver,
            runtime_modules,
        }
    }

    fn key(&self, module: &Path) -> String {
        let relative = module.strip_prefix(self.app_dir).unwrap_or(module);
        let normalized = normalize_separators(&relative.to_string_lossy());
        if normalized.starts_with('/') {
            normalized
        } else {
            format!("/{normalized}")
        }
    }

    async fn classification<'c>(&self, ctx: &'c mut RunContext) -> Result<&'c ModuleClassification> {
        if ctx.modules.is_none() {
            let resolved = self
                .resolver
                .resolve(self.app_dir)
                .await
                .map_err(|e| match e {
                    Error::Prune(_) => e,
                    other => Error::Prune(other.to_string()),
                })?;

            let mut modules = ModuleClassification::new();
            for module in resolved {
                let is_runtime = self.runtime_modules.contains(&module.name);
                if is_runtime && module.dep_type.is_production() {
                    let target = ctx.target();
                    ctx.warn(Warning::RuntimeModuleInProduction {
                        target,
                        module: module.name.clone(),
                    });
                }
                let keep = module.dep_type.is_production() && !is_runtime;
                modules.insert(self.key(&module.path), keep);
            }
            log::debug!("Classified {} modules", modules.len());
            ctx.modules = Some(modules);
        }
        Ok(ctx.modules.get_or_insert_default())
    }

    /// Returns whether the module at `module` ships with the app.
    ///
    /// The app root is never kept. Modules unknown to the resolver are not
    /// reachable from the root and are dropped.
    pub async fn classify(&self, ctx: &mut RunContext, module: &Path) -> Result<bool> {
        let key = self.key(module);
        if key == "/" {
            return Ok(false);
        }
        let modules = self.classification(ctx).await?;
        Ok(modules.get(&key).copied().unwrap_or(false))
    }

    /// Removes every module that is not kept; returns the number removed.
    pub async fn prune(&self, ctx: &mut RunContext) -> Result<usize> {
        let candidates = find_module_dirs(self.app_dir)?;
        if candidates.is_empty() {
            log::debug!("No installed modules in {}", self.app_dir.display());
            return Ok(0);
        }

        let mut removed: Vec<PathBuf> = Vec::new();
        for module in candidates {
            if removed.iter().any(|dir| module.starts_with(dir)) {
                continue;
            }
            if !self.classify(ctx, &module).await? {
                log::debug!("Pruning {}", self.key(&module));
                remove_if_present(&module)
                    .await
                    .map_err(|e| Error::Prune(e.to_string()))?;
                removed.push(module);
            }
        }
        log::info!("Pruned {} modules", removed.len());
        Ok(removed.len())
    }
}
