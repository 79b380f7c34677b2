// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template source loading.
//!
//! # Loader Implementations
//!
//! - [`FileSystemLoader`]: Loads templates below one directory
//! - [`ChoiceLoader`]: Tries several loaders in order, first hit wins
//! - [`MemoryLoader`]: Serves templates from memory (testing, embedding)
//!
//! Implement [`TemplateLoader`] for other sources.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::error::Result;

/// Template source returned by a loader.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    /// Template markup.
    pub source: String,
    /// File the source was read from, if any.
    pub path: Option<PathBuf>,
    /// Modification time at load, used to detect stale cache entries.
    pub mtime: Option<SystemTime>,
}

/// Trait for locating template sources by name.
pub trait TemplateLoader: Send + Sync {
    /// Loads `name`, returning `Ok(None)` when this loader does not have it.
    fn load(&self, name: &str) -> Result<Option<LoadedSource>>;

    /// Current modification time of `name`, if it is known.
    fn mtime(&self, name: &str) -> Option<SystemTime> {
        let _ = name;
        None
    }
}

/// Loads templates from files below a directory.
///
/// Names use `/` separators. Names containing `..` are never resolved.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    /// Creates a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory templates are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<Option<LoadedSource>> {
        let Some(path) = self.path_for(name) else {
            return Ok(None);
        };
        let source = fs::read_to_string(&path)?;
        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Some(LoadedSource {
            source,
            path: Some(path),
            mtime,
        }))
    }

    fn mtime(&self, name: &str) -> Option<SystemTime> {
        let path = self.path_for(name)?;
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// Tries each loader in order.
#[derive(Default, Clone)]
pub struct ChoiceLoader {
    loaders: Vec<Arc<dyn TemplateLoader>>,
}

impl ChoiceLoader {
    /// Creates a loader over `loaders`.
    pub fn new(loaders: Vec<Arc<dyn TemplateLoader>>) -> Self {
        Self { loaders }
    }

    /// One filesystem loader per directory, searched in order.
    pub fn from_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(
            dirs.into_iter()
                .map(|d| Arc::new(FileSystemLoader::new(d)) as Arc<dyn TemplateLoader>)
                .collect(),
        )
    }

    /// Appends a loader with the lowest priority.
    pub fn push(&mut self, loader: Arc<dyn TemplateLoader>) {
        self.loaders.push(loader);
    }
}

impl TemplateLoader for ChoiceLoader {
    fn load(&self, name: &str) -> Result<Option<LoadedSource>> {
        for loader in &self.loaders {
            if let Some(found) = loader.load(name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn mtime(&self, name: &str) -> Option<SystemTime> {
        self.loaders.iter().find_map(|l| l.mtime(name))
    }
}

/// In-memory templates.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    templates: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a template.
    pub fn add(&self, name: impl Into<String>, source: impl Into<String>) {
        if let Ok(mut templates) = self.templates.write() {
            templates.insert(name.into(), source.into());
        }
    }

    /// Builder form of [`MemoryLoader::add`].
    pub fn with(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Option<LoadedSource>> {
        let templates = match self.templates.read() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(templates.get(name).map(|source| LoadedSource {
            source: source.clone(),
            path: None,
            mtime: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filesystem_loader_reads_nested_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(dir.path().join("partials/nav.html"), "<nav/>").unwrap();

        let loader = FileSystemLoader::new(dir.path());
        let loaded = loader.load("partials/nav.html").unwrap().unwrap();
        assert_eq!(loaded.source, "<nav/>");
        assert!(loaded.mtime.is_some());
        assert!(loader.load("missing.html").unwrap().is_none());
    }

    #[test]
    fn filesystem_loader_rejects_parent_traversal() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("templates");
        fs::create_dir_all(&inner).unwrap();
        fs::write(dir.path().join("secret.html"), "secret").unwrap();

        let loader = FileSystemLoader::new(&inner);
        assert!(loader.load("../secret.html").unwrap().is_none());
    }

    #[test]
    fn choice_loader_prefers_earlier_loaders() {
        let first = MemoryLoader::new().with("a.html", "first");
        let second = MemoryLoader::new()
            .with("a.html", "second")
            .with("b.html", "only second");
        let loader = ChoiceLoader::new(vec![Arc::new(first), Arc::new(second)]);

        assert_eq!(loader.load("a.html").unwrap().unwrap().source, "first");
        assert_eq!(loader.load("b.html").unwrap().unwrap().source, "only second");
        assert!(loader.load("c.html").unwrap().is_none());
    }

    #[test]
    fn choice_loader_from_dirs_searches_in_order() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        fs::write(two.path().join("page.html"), "two").unwrap();

        let loader = ChoiceLoader::from_dirs([one.path(), two.path()]);
        assert_eq!(loader.load("page.html").unwrap().unwrap().source, "two");
    }
}
