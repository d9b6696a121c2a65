//! Bulk registration from files
//!
//! Files below a working directory are matched against glob patterns, each
//! one is turned into a [Module] by a [ModuleSource] and handed to an
//! [ImportLoader] that decides what to register.

use std::{
    collections::HashSet,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::{
    container::Container, dynamic::into_value, errors::ContainerError, producer::Export,
    types::DynError,
};

mod json;
pub use json::JsonModuleSource;

/// Named exports of one loaded file
#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub exports: Vec<(String, Export)>,
}

/// Turns a discovered file into a [Module]
pub trait ModuleSource: Send + Sync {
    fn load(&self, path: &Path) -> BoxFuture<'static, Result<Module, DynError>>;
}

/// Registers the exports of a loaded [Module]
///
/// Loading may suspend, the import waits for it before the next file.
pub trait ImportLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        container: &'a mut Container,
        module: Module,
    ) -> BoxFuture<'a, Result<(), DynError>>;
}
impl<F> ImportLoader for F
where
    F: for<'a> Fn(&'a mut Container, Module) -> BoxFuture<'a, Result<(), DynError>> + Send + Sync,
{
    fn load<'a>(
        &'a self,
        container: &'a mut Container,
        module: Module,
    ) -> BoxFuture<'a, Result<(), DynError>> {
        self(container, module)
    }
}

/// Registers every export as a producer, failing on plain values
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterExports;
impl ImportLoader for RegisterExports {
    fn load<'a>(
        &'a self,
        container: &'a mut Container,
        module: Module,
    ) -> BoxFuture<'a, Result<(), DynError>> {
        let registered = container.register_exports(module.exports);
        future::ready(registered.map_err(DynError::from)).boxed()
    }
}

/// Registers every export as a literal value
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterLiterals;
impl ImportLoader for RegisterLiterals {
    fn load<'a>(
        &'a self,
        container: &'a mut Container,
        module: Module,
    ) -> BoxFuture<'a, Result<(), DynError>> {
        let registered = container.literal_all(
            module
                .exports
                .into_iter()
                .map(|(key, export)| (key, into_value(export))),
        );
        future::ready(registered.map_err(DynError::from)).boxed()
    }
}

/// What to import and how
#[derive(Clone)]
pub struct ImportOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub cwd: PathBuf,
    pub source: Arc<dyn ModuleSource>,
    pub loader: Arc<dyn ImportLoader>,
}
impl Debug for ImportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl ImportOptions {
    /// No patterns, the process working directory and the [RegisterExports] loader
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        ImportOptions {
            include: Vec::new(),
            exclude: Vec::new(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            source: Arc::new(source),
            loader: Arc::new(RegisterExports),
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn loader(mut self, loader: impl ImportLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Like [ImportOptions::loader], spelling out the signature so closures
    /// borrowing the container infer their lifetimes
    pub fn loader_fn<F>(self, loader: F) -> Self
    where
        F: for<'a> Fn(&'a mut Container, Module) -> BoxFuture<'a, Result<(), DynError>>
            + Send
            + Sync
            + 'static,
    {
        self.loader(loader)
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ContainerError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|error| {
                ContainerError::InvalidImport(format!("Invalid pattern '{pattern}': {error}"))
            })
        })
        .collect()
}

/// Files below `cwd` matching the options, as absolute paths
///
/// Files are listed per include pattern in the order the patterns are given,
/// sorted within each pattern. A file matched by several patterns is listed once.
pub fn discover(options: &ImportOptions) -> Result<Vec<PathBuf>, ContainerError> {
    if options.include.is_empty() {
        return Err(ContainerError::InvalidImport(
            "Must provide at least one include pattern".to_string(),
        ));
    }
    let include = compile(&options.include)?;
    let exclude = compile(&options.exclude)?;

    let cwd = options.cwd.canonicalize().map_err(|error| {
        ContainerError::InvalidImport(format!("Cannot read '{}': {error}", options.cwd.display()))
    })?;

    let mut candidates = Vec::new();
    for entry in WalkDir::new(&cwd).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!("Skipping unreadable entry during import: {error}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&cwd) else {
            continue;
        };
        if exclude
            .iter()
            .any(|pattern| pattern.matches_path_with(relative, MATCH_OPTIONS))
        {
            continue;
        }
        candidates.push(relative.to_path_buf());
    }
    candidates.sort();

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for pattern in &include {
        for relative in &candidates {
            if pattern.matches_path_with(relative, MATCH_OPTIONS) && seen.insert(relative) {
                files.push(cwd.join(relative));
            }
        }
    }

    Ok(files)
}

impl Container {
    /// Loads and registers every file matched by `options`
    ///
    /// Files are processed one after another. The first failure stops the
    /// import; modules loaded before it stay registered. Returns the imported
    /// files in load order.
    pub async fn import(&mut self, options: ImportOptions) -> Result<Vec<PathBuf>, ContainerError> {
        let files = discover(&options)?;
        tracing::debug!(
            "Importing {} modules from {}",
            files.len(),
            options.cwd.display()
        );

        for path in &files {
            let failed = |error: DynError| ContainerError::ImportFailed {
                path: path.clone(),
                error: Arc::new(error),
            };

            let module = options.source.load(path).await.map_err(failed)?;
            tracing::debug!("Loaded {} with {} exports", path.display(), module.exports.len());
            options.loader.load(self, module).await.map_err(failed)?;
        }

        Ok(files)
    }
}
