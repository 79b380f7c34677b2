// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static asset pipeline.
//!
//! A [`Bundle`] concatenates input files through a chain of
//! [`AssetFilter`]s into one output file below the static directory. The
//! [`AssetEnvironment`] keeps bundles by name, rebuilds them when their
//! inputs change, and hands out cache-busting URLs:
//!
//! ```text
//! static/scss/styles.scss ─▶ sass ─▶ autoprefixer ─▶ static/css/styles.css
//!                                                    /static/css/styles.css?1a2b3c4d
//! ```

mod extension;
mod filters;

pub use extension::{register_functions, AssetsExtension};
pub use filters::{AssetFilter, AutoprefixerFilter, JsMinFilter, SassFilter};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::app::find_file;
use crate::config::Config;
use crate::error::{EaError, Result};

/// A set of input files built into one output file.
#[derive(Clone)]
pub struct Bundle {
    /// Input files, concatenated in order.
    pub inputs: Vec<PathBuf>,
    /// Output path relative to the static directory.
    pub output: String,
    /// Filters applied to inputs and output, in order.
    pub filters: Vec<Arc<dyn AssetFilter>>,
    /// Extra files whose changes make the bundle stale (SCSS partials).
    pub depends: Vec<PathBuf>,
}

impl Bundle {
    /// Creates a bundle without filters.
    pub fn new(inputs: Vec<PathBuf>, output: impl Into<String>) -> Self {
        Self {
            inputs,
            output: output.into(),
            filters: Vec::new(),
            depends: Vec::new(),
        }
    }

    /// Appends a filter.
    pub fn filter(mut self, filter: impl AssetFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Replaces the filter chain.
    pub fn with_filters(mut self, filters: Vec<Arc<dyn AssetFilter>>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the files the bundle depends on besides its inputs.
    pub fn with_depends(mut self, depends: Vec<PathBuf>) -> Self {
        self.depends = depends;
        self
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("filters", &self.filters.iter().map(|x| x.name()).collect::<Vec<_>>())
            .field("depends", &self.depends)
            .finish()
    }
}

/// Registry of named bundles.
#[derive(Debug)]
pub struct AssetEnvironment {
    directory: PathBuf,
    url: String,
    url_expire: bool,
    auto_build: bool,
    bundles: BTreeMap<String, Bundle>,
    build_lock: Mutex<()>,
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| EaError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    Ok(paths.filter_map(|entry| entry.ok()).collect())
}

impl AssetEnvironment {
    /// Creates an empty environment writing below `directory` and serving
    /// under `url`.
    pub fn new(directory: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            url: url.into(),
            url_expire: true,
            auto_build: true,
            bundles: BTreeMap::new(),
            build_lock: Mutex::new(()),
        }
    }

    /// Builds the environment described by the `[assets]` and `[folders]`
    /// configuration.
    ///
    /// - Every `[[assets.js]]` entry becomes `<name>.js`, written to
    ///   `js/<name>.js`. Glob patterns are expanded in descending order;
    ///   plain names are looked up in the JS folders, then the root.
    /// - Every `*.scss` file not starting with `_` in the SCSS folders
    ///   becomes `<stem>.css`, written to `css/<stem>.css`. It depends on
    ///   all `*.scss` files of every SCSS folder, since imports resolve
    ///   across them.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut assets = Self::new(config.static_dir(), config.folders.static_url.clone());
        assets.set_url_expire(config.assets.url_expire);
        assets.set_auto_build(config.assets.auto_build);

        let mut js_folders: Vec<PathBuf> = config.folders.js.iter().map(|f| config.resolve(f)).collect();
        js_folders.push(config.app.root.clone());
        let mut js_filters: Vec<Arc<dyn AssetFilter>> = Vec::new();
        if config.assets.jsmin {
            js_filters.push(Arc::new(JsMinFilter));
        }

        for asset in &config.assets.js {
            let mut inputs = Vec::new();
            for entry in &asset.files {
                if has_glob_chars(entry) {
                    let pattern = config.resolve(entry).to_string_lossy().into_owned();
                    let mut matches = expand_glob(&pattern)?;
                    matches.sort_by(|a, b| b.cmp(a));
                    inputs.extend(matches);
                } else {
                    inputs.push(find_file(entry, &js_folders)?);
                }
            }
            let bundle = Bundle::new(inputs, format!("js/{}.js", asset.name))
                .with_filters(js_filters.clone());
            assets.register(format!("{}.js", asset.name), bundle);
        }

        let scss_folders: Vec<PathBuf> = config.folders.scss.iter().map(|f| config.resolve(f)).collect();
        let includes = config
            .assets
            .scss_libs
            .iter()
            .map(|lib| find_file(lib, &scss_folders))
            .collect::<Result<Vec<_>>>()?;
        let mut css_filters: Vec<Arc<dyn AssetFilter>> = vec![Arc::new(SassFilter::new(includes))];
        if config.assets.autoprefixer {
            css_filters.push(Arc::new(AutoprefixerFilter::new(config.assets.browsers.clone())));
        }

        let mut folder_sources = Vec::new();
        for folder in &scss_folders {
            if !folder.is_dir() {
                tracing::debug!("SCSS folder {} does not exist, skipping", folder.display());
                continue;
            }
            let pattern = folder.join("*.scss").to_string_lossy().into_owned();
            let mut sources = expand_glob(&pattern)?;
            sources.sort();
            folder_sources.push(sources);
        }
        let all_sources: Vec<PathBuf> = folder_sources.iter().flatten().cloned().collect();

        for sources in &folder_sources {
            for source in sources {
                let Some(stem) = source.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if stem.starts_with('_') {
                    continue;
                }
                let bundle = Bundle::new(vec![source.clone()], format!("css/{}.css", stem))
                    .with_filters(css_filters.clone())
                    .with_depends(all_sources.clone());
                assets.register(format!("{}.css", stem), bundle);
            }
        }

        tracing::debug!("Registered {} asset bundles", assets.bundles.len());
        Ok(assets)
    }

    /// Appends a content hash to URLs.
    pub fn set_url_expire(&mut self, enabled: bool) {
        self.url_expire = enabled;
    }

    /// Rebuilds stale bundles when their URL is requested.
    pub fn set_auto_build(&mut self, enabled: bool) {
        self.auto_build = enabled;
    }

    /// Directory outputs are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Registers `bundle` under `name`, replacing any previous bundle.
    pub fn register(&mut self, name: impl Into<String>, bundle: Bundle) {
        let name = name.into();
        if self.bundles.contains_key(&name) {
            tracing::warn!("Asset bundle {} registered twice, keeping the last one", name);
        }
        self.bundles.insert(name, bundle);
    }

    /// Looks a bundle up.
    pub fn get(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }

    /// Registered bundle names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    fn bundle(&self, name: &str) -> Result<&Bundle> {
        self.bundles
            .get(name)
            .ok_or_else(|| EaError::AssetNotFound(name.to_string()))
    }

    /// Absolute path of a bundle's output file.
    pub fn output_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.directory.join(&self.bundle(name)?.output))
    }

    /// Whether the output is missing or older than any input or dependency.
    pub fn is_stale(&self, name: &str) -> Result<bool> {
        let bundle = self.bundle(name)?;
        let Some(built) = mtime(&self.directory.join(&bundle.output)) else {
            return Ok(true);
        };
        Ok(bundle
            .inputs
            .iter()
            .chain(&bundle.depends)
            .any(|p| mtime(p).is_some_and(|m| m > built)))
    }

    /// Builds one bundle. Returns whether it was written.
    ///
    /// Without `force`, fresh bundles are left alone.
    pub fn build(&self, name: &str, force: bool) -> Result<bool> {
        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !force && !self.is_stale(name)? {
            return Ok(false);
        }
        let bundle = self.bundle(name)?;

        let mut parts = Vec::with_capacity(bundle.inputs.len());
        for input in &bundle.inputs {
            let mut source = fs::read_to_string(input)
                .map_err(|_| EaError::FileNotFound(input.display().to_string()))?;
            for filter in &bundle.filters {
                source = filter.input(source, input)?;
            }
            parts.push(source);
        }
        let mut output = parts.join("\n");
        for filter in &bundle.filters {
            output = filter.output(output)?;
        }

        let path = self.directory.join(&bundle.output);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, output)?;
        tracing::info!("Built asset {} -> {}", name, path.display());
        Ok(true)
    }

    /// Builds every bundle. Returns how many were written.
    pub fn build_all(&self, force: bool) -> Result<usize> {
        let mut built = 0;
        for name in self.bundles.keys() {
            if self.build(name, force)? {
                built += 1;
            }
        }
        Ok(built)
    }

    /// Rebuilds stale bundles, returning their names.
    pub fn rebuild_stale(&self) -> Result<Vec<String>> {
        let mut rebuilt = Vec::new();
        for name in self.bundles.keys() {
            if self.build(name, false)? {
                rebuilt.push(name.clone());
            }
        }
        Ok(rebuilt)
    }

    /// Public URL of a bundle.
    ///
    /// Builds the bundle first when auto build is on. With URL expiry the
    /// first 8 hex digits of the output's SHA-256 are appended as a query.
    pub fn url(&self, name: &str) -> Result<String> {
        if self.auto_build {
            self.build(name, false)?;
        }
        let bundle = self.bundle(name)?;
        let mut url = format!("{}/{}", self.url.trim_end_matches('/'), bundle.output);
        if self.url_expire {
            if let Ok(content) = fs::read(self.directory.join(&bundle.output)) {
                let digest = format!("{:x}", Sha256::digest(&content));
                url.push('?');
                url.push_str(&digest[..8]);
            }
        }
        Ok(url)
    }

    /// URLs for several bundles, in order.
    pub fn urls<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        names.iter().map(|n| self.url(n.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsAsset;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Upper;

    impl AssetFilter for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn input(&self, source: String, _: &Path) -> Result<String> {
            Ok(source.to_uppercase())
        }

        fn output(&self, source: String) -> Result<String> {
            Ok(format!("/*bundle*/{}", source))
        }
    }

    fn touch_later(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(10);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn builds_concatenated_filtered_output() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "one").unwrap();
        fs::write(&b, "two").unwrap();

        let mut assets = AssetEnvironment::new(dir.path().join("static"), "/static");
        assets.register("all.txt", Bundle::new(vec![a, b], "gen/all.txt").filter(Upper));

        assert!(assets.build("all.txt", false).unwrap());
        let out = fs::read_to_string(dir.path().join("static/gen/all.txt")).unwrap();
        assert_eq!(out, "/*bundle*/ONE\nTWO");
        assert!(!assets.build("all.txt", false).unwrap());
        assert!(assets.build("all.txt", true).unwrap());
    }

    #[test]
    fn dependency_changes_make_bundles_stale() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("main.txt");
        let partial = dir.path().join("_partial.txt");
        fs::write(&main, "main").unwrap();
        fs::write(&partial, "partial").unwrap();

        let mut assets = AssetEnvironment::new(dir.path(), "/static");
        assets.register(
            "main",
            Bundle::new(vec![main], "out/main.txt").with_depends(vec![partial.clone()]),
        );
        assert!(assets.is_stale("main").unwrap());
        assets.build("main", false).unwrap();
        assert!(!assets.is_stale("main").unwrap());

        touch_later(&partial);
        assert!(assets.is_stale("main").unwrap());
        assert_eq!(assets.rebuild_stale().unwrap(), vec!["main".to_string()]);
    }

    #[test]
    fn urls_carry_a_content_hash() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("app.js");
        fs::write(&input, "var a = 1;").unwrap();

        let mut assets = AssetEnvironment::new(dir.path().join("static"), "/static/");
        assets.register("app.js", Bundle::new(vec![input], "js/app.js"));

        let url = assets.url("app.js").unwrap();
        let (path, hash) = url.split_once('?').unwrap();
        assert_eq!(path, "/static/js/app.js");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        assets.set_url_expire(false);
        assert_eq!(assets.url("app.js").unwrap(), "/static/js/app.js");
    }

    #[test]
    fn missing_bundles_and_inputs_are_errors() {
        let dir = TempDir::new().unwrap();
        let mut assets = AssetEnvironment::new(dir.path(), "/static");
        assert!(matches!(assets.url("nope.css"), Err(EaError::AssetNotFound(_))));

        assets.register("gone.js", Bundle::new(vec![dir.path().join("gone.js")], "js/gone.js"));
        assert!(matches!(assets.build("gone.js", true), Err(EaError::FileNotFound(_))));
    }

    #[test]
    fn from_config_registers_scss_and_js_bundles() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("static/scss")).unwrap();
        fs::create_dir_all(root.join("static/js_src/lib")).unwrap();
        fs::write(root.join("static/scss/styles.scss"), "@import 'vars';\nbody { color: $c; }").unwrap();
        fs::write(root.join("static/scss/_vars.scss"), "$c: red;").unwrap();
        fs::write(root.join("static/js_src/Main.js"), "var main = 1;").unwrap();
        fs::write(root.join("static/js_src/lib/a.js"), "var a = 1;").unwrap();
        fs::write(root.join("static/js_src/lib/b.js"), "var b = 2;").unwrap();

        let mut config = Config::with_root(root);
        config.assets.autoprefixer = false;
        config.assets.jsmin = false;
        config.assets.js = vec![JsAsset {
            name: "app".to_string(),
            files: vec!["static/js_src/lib/*.js".to_string(), "Main.js".to_string()],
        }];

        let assets = AssetEnvironment::from_config(&config).unwrap();
        let names: Vec<&str> = assets.names().collect();
        assert_eq!(names, vec!["app.js", "styles.css"]);

        let app = assets.get("app.js").unwrap();
        assert_eq!(app.output, "js/app.js");
        let inputs: Vec<_> = app.inputs.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(inputs, vec!["b.js", "a.js", "Main.js"]);

        let styles = assets.get("styles.css").unwrap();
        assert_eq!(styles.output, "css/styles.css");
        assert_eq!(styles.depends.len(), 2);

        assert_eq!(assets.build_all(false).unwrap(), 2);
        let css = fs::read_to_string(root.join("static/css/styles.css")).unwrap();
        assert!(css.contains("color: red"));
    }

    #[test]
    fn scss_bundles_depend_on_every_scss_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/styles.scss"), "@import 'shared';").unwrap();
        fs::write(root.join("b/_shared.scss"), "a { color: red; }").unwrap();

        let mut config = Config::with_root(root);
        config.folders.scss = vec!["a".to_string(), "b".to_string()];
        config.assets.autoprefixer = false;

        let assets = AssetEnvironment::from_config(&config).unwrap();
        let styles = assets.get("styles.css").unwrap();
        let depends: Vec<_> = styles.depends.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(depends, vec!["styles.scss", "_shared.scss"]);
        assert!(assets.get("_shared.css").is_none());
    }

    #[test]
    fn from_config_reports_missing_js_files() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_root(dir.path());
        config.assets.js = vec![JsAsset {
            name: "app".to_string(),
            files: vec!["Nope.js".to_string()],
        }];
        assert!(matches!(
            AssetEnvironment::from_config(&config),
            Err(EaError::FileNotFound(_))
        ));
    }
}
