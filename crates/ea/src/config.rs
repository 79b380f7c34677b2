// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Application configuration.
//!
//! Configuration is loaded from `ea.toml` at the project root. Every
//! section is optional; missing values fall back to the defaults below.
//!
//! # Example Configuration
//!
//! ```toml
//! [app]
//! name = "my-site"
//! debug = true
//!
//! [folders]
//! templates = ["templates", "shared/templates"]
//!
//! [jinja.filters]
//! money = "format_currency"
//!
//! [[assets.js]]
//! name = "main"
//! files = ["vendor/*.js", "Main.js"]
//!
//! [assets.groups.home]
//! css = "styles.css"
//! js = ["main.js"]
//!
//! [livereload]
//! port = 8080
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EaError, Result};

/// Name of the configuration file looked up by [`Config::load`].
pub const CONFIG_FILE: &str = "ea.toml";

/// Main configuration structure loaded from `ea.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings.
    pub app: AppConfig,
    /// Project folder layout.
    pub folders: FoldersConfig,
    /// Template environment settings.
    pub jinja: JinjaConfig,
    /// Asset pipeline settings.
    pub assets: AssetsConfig,
    /// Development live reload settings.
    pub livereload: LiveReloadConfig,
}

/// Application settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name (default: "enhanced-app").
    pub name: String,
    /// Project root all relative paths are resolved against (default: ".").
    pub root: PathBuf,
    /// Debug mode: template auto reload and asset auto build.
    pub debug: bool,
    /// Host for `serve` (default: "127.0.0.1").
    pub host: String,
    /// Port for `serve` (default: 5000).
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "enhanced-app".to_string(),
            root: PathBuf::from("."),
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Project folder layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FoldersConfig {
    /// Entries created by `create_folder_structure`.
    ///
    /// An entry whose last component contains a `.` is created as an
    /// empty file, everything else as a directory.
    pub structure: Vec<String>,
    /// Directory served under `static_url` and receiving built assets.
    pub static_dir: String,
    /// URL prefix for static files (default: "/static").
    pub static_url: String,
    /// Folders searched for JS sources.
    pub js: Vec<String>,
    /// Folders searched for SCSS sources.
    pub scss: Vec<String>,
    /// Template folders, searched in order.
    pub templates: Vec<String>,
}

impl Default for FoldersConfig {
    fn default() -> Self {
        Self {
            structure: vec![
                "static/".to_string(),
                "static/scss/styles.scss".to_string(),
                "static/js_src/Main.js".to_string(),
                "static/images/".to_string(),
                "static/fonts/".to_string(),
                "templates/".to_string(),
            ],
            static_dir: "static".to_string(),
            static_url: "/static".to_string(),
            js: vec!["static/js_src".to_string()],
            scss: vec!["static/scss".to_string()],
            templates: vec!["templates".to_string()],
        }
    }
}

/// Template environment settings.
///
/// The three maps go from the name used inside templates to the name of
/// a built-in helper (see [`crate::helpers`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JinjaConfig {
    /// Filters registered on the environment.
    pub filters: BTreeMap<String, String>,
    /// Global functions registered on the environment.
    pub functions: BTreeMap<String, String>,
    /// Functions that depend on the current request.
    pub context: BTreeMap<String, String>,
    /// Remove the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip leading whitespace before a block tag.
    pub lstrip_blocks: bool,
    /// Number of parsed templates kept in the cache.
    pub cache_size: usize,
}

fn identity_map(names: &[&str]) -> BTreeMap<String, String> {
    names
        .iter()
        .map(|n| (n.to_string(), n.to_string()))
        .collect()
}

impl Default for JinjaConfig {
    fn default() -> Self {
        Self {
            filters: identity_map(&[
                "leading_zero",
                "human_number",
                "add_br",
                "format_datetime",
                "format_currency",
                "add_p",
                "format_date",
                "gen_slug",
                "copyright_year",
                "remove_linebreaks",
                "add_http",
                "add_https",
            ]),
            functions: BTreeMap::new(),
            context: identity_map(&[
                "relative_years",
                "highlight_link",
                "next_year",
                "random_string",
            ]),
            trim_blocks: true,
            lstrip_blocks: true,
            cache_size: 200,
        }
    }
}

/// A JS bundle declared in `[[assets.js]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsAsset {
    /// Bundle name; registered as `<name>.js`, written to `js/<name>.js`.
    pub name: String,
    /// Input files or glob patterns.
    #[serde(deserialize_with = "one_or_many")]
    pub files: Vec<String>,
}

/// A named group of assets exposed to templates as `asset_groups`.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, PartialEq)]
#[serde(default)]
pub struct AssetGroup {
    /// CSS bundle names.
    #[serde(deserialize_with = "one_or_many")]
    pub css: Vec<String>,
    /// JS bundle names.
    #[serde(deserialize_with = "one_or_many")]
    pub js: Vec<String>,
    /// External URLs.
    #[serde(deserialize_with = "one_or_many")]
    pub ext: Vec<String>,
}

/// Asset pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// JS bundles.
    pub js: Vec<JsAsset>,
    /// SCSS include directories, looked up in the scss folders.
    pub scss_libs: Vec<String>,
    /// Minify JS bundles.
    pub jsmin: bool,
    /// Add vendor prefixes to compiled CSS.
    pub autoprefixer: bool,
    /// Browserslist queries used by the autoprefixer.
    pub browsers: Vec<String>,
    /// Append a content hash to asset URLs.
    pub url_expire: bool,
    /// Rebuild stale bundles when their URL is requested.
    pub auto_build: bool,
    /// Asset groups.
    pub groups: BTreeMap<String, AssetGroup>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            js: Vec::new(),
            scss_libs: Vec::new(),
            jsmin: true,
            autoprefixer: true,
            browsers: vec!["last 2 versions".to_string()],
            url_expire: true,
            auto_build: true,
            groups: BTreeMap::new(),
        }
    }
}

/// Development live reload settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Glob patterns (relative to the root) that trigger a reload.
    pub watch: Vec<String>,
    /// Host to bind to (default: "0.0.0.0").
    pub host: String,
    /// Port to bind to (default: 8080).
    pub port: u16,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            watch: vec![
                "static/scss/*.scss".to_string(),
                "static/js_src/*.js".to_string(),
                "templates/*.html".to_string(),
            ],
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Accepts either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl Config {
    /// Loads configuration from `ea.toml` in the current directory.
    ///
    /// If no configuration file exists, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("No {} found, using default configuration", CONFIG_FILE);
            return Ok(Config::default());
        }
        Self::from_path(path)
    }

    /// Loads configuration from an explicit file.
    ///
    /// A relative `app.root` is resolved against the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        if config.app.root.is_relative() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                config.app.root = dir.join(&config.app.root);
            }
        }
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the router cannot mount.
    ///
    /// `folders.static_url` must start with `/` and name a path below the
    /// root.
    pub fn validate(&self) -> Result<()> {
        let url = &self.folders.static_url;
        if !url.starts_with('/') || url.trim_end_matches('/').is_empty() {
            return Err(EaError::Config(format!(
                "folders.static_url must be an absolute path below \"/\", got {:?}",
                url
            )));
        }
        Ok(())
    }

    /// Returns a default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.app.root = root.into();
        config
    }

    /// Resolves a root-relative path.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.app.root.join(relative)
        }
    }

    /// Directory receiving built assets and served under `static_url`.
    pub fn static_dir(&self) -> PathBuf {
        self.resolve(&self.folders.static_dir)
    }
}
