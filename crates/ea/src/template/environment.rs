// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The template environment: loader, registries, options and cache.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use lru::LruCache;
use serde::Serialize;

use super::ast::Node;
use super::builtins;
use super::extension::Extension;
use super::lexer::LexerOptions;
use super::loader::TemplateLoader;
use super::parser::Parser;
use super::render::{render_template, Context};
use super::value::{Args, CallResult, Value};
use crate::error::{EaError, Result};

/// A filter: `value | name(args)`.
pub type Filter = Arc<dyn Fn(&Value, &Args) -> CallResult + Send + Sync>;
/// A global function: `name(args)`. Receives the render context.
pub type Function = Arc<dyn Fn(&Context, &Args) -> CallResult + Send + Sync>;
/// A test: `value is name(args)`.
pub type Test = Arc<dyn Fn(&Value, &[Value]) -> bool + Send + Sync>;

const DEFAULT_CACHE_SIZE: usize = 200;

/// A parsed template.
#[derive(Debug)]
pub struct Template {
    /// Name the template was loaded under.
    pub name: String,
    /// Parsed nodes.
    pub nodes: Vec<Node>,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
    mtime: Option<SystemTime>,
}

/// Template environment.
///
/// Owns the loader, filters, tests, global functions and variables, parser
/// extensions and a cache of parsed templates. Changing any option that
/// affects parsing clears the cache.
///
/// # Examples
///
/// ```rust
/// use ea::template::{Environment, MemoryLoader};
/// use serde_json::json;
///
/// let loader = MemoryLoader::new().with("hello.html", "Hello {{ name | upper }}!");
/// let env = Environment::new(loader);
/// let html = env.render("hello.html", &json!({"name": "world"})).unwrap();
/// assert_eq!(html, "Hello WORLD!");
/// ```
pub struct Environment {
    loader: Arc<dyn TemplateLoader>,
    filters: HashMap<String, Filter>,
    tests: HashMap<String, Test>,
    functions: HashMap<String, Function>,
    globals: BTreeMap<String, Value>,
    extensions: Vec<Arc<dyn Extension>>,
    options: LexerOptions,
    auto_reload: bool,
    autoescape: Vec<String>,
    cache: Mutex<LruCache<String, Arc<Template>>>,
}

impl Environment {
    /// Creates an environment with the built-in filters and tests.
    pub fn new(loader: impl TemplateLoader + 'static) -> Self {
        Self::with_loader(Arc::new(loader))
    }

    /// Creates an environment over a shared loader.
    pub fn with_loader(loader: Arc<dyn TemplateLoader>) -> Self {
        let mut env = Self {
            loader,
            filters: HashMap::new(),
            tests: HashMap::new(),
            functions: HashMap::new(),
            globals: BTreeMap::new(),
            extensions: Vec::new(),
            options: LexerOptions::default(),
            auto_reload: false,
            autoescape: vec!["html".to_string(), "htm".to_string(), "xml".to_string()],
            cache: Mutex::new(LruCache::new(cache_capacity(DEFAULT_CACHE_SIZE))),
        };
        builtins::register(&mut env);
        env
    }

    /// Replaces the loader.
    pub fn set_loader(&mut self, loader: Arc<dyn TemplateLoader>) {
        self.loader = loader;
        self.clear_cache();
    }

    /// Removes the first newline after a block tag.
    pub fn set_trim_blocks(&mut self, enabled: bool) {
        self.options.trim_blocks = enabled;
        self.clear_cache();
    }

    /// Strips whitespace from the start of a line up to a block tag.
    pub fn set_lstrip_blocks(&mut self, enabled: bool) {
        self.options.lstrip_blocks = enabled;
        self.clear_cache();
    }

    /// Re-parses templates whose source changed since they were cached.
    pub fn set_auto_reload(&mut self, enabled: bool) {
        self.auto_reload = enabled;
    }

    /// Whether templates are checked for changes on every lookup.
    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    /// File extensions whose templates escape output by default.
    pub fn set_autoescape<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.autoescape = extensions.into_iter().map(Into::into).collect();
    }

    /// Resizes the parsed template cache.
    pub fn set_cache_size(&mut self, size: usize) {
        self.cache = Mutex::new(LruCache::new(cache_capacity(size)));
    }

    /// Registers a filter.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &Args) -> CallResult + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Registers a global function.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&Context, &Args) -> CallResult + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Registers a test.
    pub fn add_test<F>(&mut self, name: impl Into<String>, test: F)
    where
        F: Fn(&Value, &[Value]) -> bool + Send + Sync + 'static,
    {
        self.tests.insert(name.into(), Arc::new(test));
    }

    /// Sets a global variable visible in every template.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    /// Registers a parser extension.
    pub fn add_extension(&mut self, extension: impl Extension + 'static) {
        self.extensions.push(Arc::new(extension));
        self.clear_cache();
    }

    /// Looks a filter up.
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    /// Looks a global function up.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Looks a test up.
    pub fn test(&self, name: &str) -> Option<&Test> {
        self.tests.get(name)
    }

    /// Global variables.
    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    /// Whether output of template `name` is escaped.
    pub fn autoescape_for(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| self.autoescape.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Drops all parsed templates.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Parses `source` with this environment's options and extensions.
    pub fn parse(&self, name: &str, source: &str) -> Result<Vec<Node>> {
        Parser::new(name, source, self.options, &self.extensions)?.parse()
    }

    /// Loads, parses and caches a template.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(cached) = self.cached(name) {
            return Ok(cached);
        }

        let loaded = self
            .loader
            .load(name)?
            .ok_or_else(|| EaError::TemplateNotFound(name.to_string()))?;
        tracing::debug!("Parsing template {}", name);
        let template = Arc::new(Template {
            name: name.to_string(),
            nodes: self.parse(name, &loaded.source)?,
            path: loaded.path,
            mtime: loaded.mtime,
        });

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(name.to_string(), Arc::clone(&template));
        }
        Ok(template)
    }

    fn cached(&self, name: &str) -> Option<Arc<Template>> {
        let mut cache = self.cache.lock().ok()?;
        let template = Arc::clone(cache.get(name)?);
        if self.auto_reload && template.mtime.is_some() && self.loader.mtime(name) != template.mtime {
            tracing::debug!("Template {} changed on disk, reloading", name);
            cache.pop(name);
            return None;
        }
        Some(template)
    }

    /// Renders template `name` with a serializable context.
    ///
    /// The context must serialize to a map (a struct, a `HashMap`, a JSON
    /// object).
    pub fn render<S: Serialize + ?Sized>(&self, name: &str, context: &S) -> Result<String> {
        let vars = context_vars(name, context)?;
        self.render_vars(name, vars)
    }

    /// Renders template `name` with already converted variables.
    pub fn render_vars(&self, name: &str, vars: BTreeMap<String, Value>) -> Result<String> {
        let template = self.get_template(name)?;
        let mut ctx = self.context(vars);
        render_template(self, &template, &mut ctx, 0)
    }

    /// Renders a template given as a string. Output is never escaped.
    pub fn render_str<S: Serialize + ?Sized>(&self, source: &str, context: &S) -> Result<String> {
        let name = "<string>";
        let template = Template {
            name: name.to_string(),
            nodes: self.parse(name, source)?,
            path: None,
            mtime: None,
        };
        let mut ctx = self.context(context_vars(name, context)?);
        render_template(self, &template, &mut ctx, 0)
    }

    fn context(&self, vars: BTreeMap<String, Value>) -> Context {
        let mut ctx = Context::new(self.globals.clone());
        ctx.push_with(vars);
        ctx
    }
}

fn cache_capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

pub(crate) fn context_vars<S: Serialize + ?Sized>(name: &str, context: &S) -> Result<BTreeMap<String, Value>> {
    match Value::from_serialize(context)? {
        Value::Dict(map) => Ok(map),
        Value::None | Value::Undefined => Ok(BTreeMap::new()),
        other => Err(EaError::render(
            name,
            format!("template context must be a map, got {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ChoiceLoader, MemoryLoader, RequiredVariablesExtension};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn globals_functions_and_filters() {
        let mut env = Environment::new(MemoryLoader::new().with(
            "g.txt",
            "{{ site }} {{ twice(3) }} {{ 'x' | wrap('[', ']') }}",
        ));
        env.add_global("site", "ea");
        env.add_function("twice", |_, args| Ok(Value::Int(args.int_or(0, "n", 0) * 2)));
        env.add_filter("wrap", |v, args| {
            Ok(Value::String(format!("{}{}{}", args.str_or(0, "l", ""), v, args.str_or(1, "r", ""))))
        });
        assert_eq!(env.render("g.txt", &json!({})).unwrap(), "ea 6 [x]");
    }

    #[test]
    fn context_shadows_globals() {
        let mut env = Environment::new(MemoryLoader::new().with("g.txt", "{{ site }}"));
        env.add_global("site", "global");
        assert_eq!(env.render("g.txt", &json!({"site": "local"})).unwrap(), "local");
    }

    #[test]
    fn required_extension_renders_when_all_truthy() {
        let mut env = Environment::new(MemoryLoader::new().with(
            "r.html",
            "{% required u=user, n=user.name %}Hi {{ n }}{% endrequired %}",
        ));
        env.add_extension(RequiredVariablesExtension);
        assert_eq!(env.render("r.html", &json!({"user": {"name": "Ann"}})).unwrap(), "Hi Ann");
        assert_eq!(env.render("r.html", &json!({"user": {"name": ""}})).unwrap(), "");
        assert_eq!(env.render("r.html", &json!({})).unwrap(), "");
    }

    #[test]
    fn trim_and_lstrip_blocks() {
        let source = "<ul>\n    {% for x in items %}\n    <li>{{ x }}</li>\n    {% endfor %}\n</ul>";
        let mut env = Environment::new(MemoryLoader::new().with("l.html", source));
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        let out = env.render("l.html", &json!({"items": [1, 2]})).unwrap();
        assert_eq!(out, "<ul>\n    <li>1</li>\n    <li>2</li>\n</ul>");
    }

    #[test]
    fn missing_template() {
        let env = Environment::new(MemoryLoader::new());
        assert!(matches!(
            env.render("nope.html", &json!({})),
            Err(EaError::TemplateNotFound(name)) if name == "nope.html"
        ));
    }

    #[test]
    fn context_must_be_a_map() {
        let env = Environment::new(MemoryLoader::new().with("a.txt", "x"));
        assert!(env.render("a.txt", &vec![1, 2]).is_err());
    }

    #[test]
    fn auto_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "one").unwrap();

        let mut env = Environment::new(ChoiceLoader::from_dirs([dir.path()]));
        env.set_auto_reload(true);
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "one");

        fs::write(&path, "two").unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "two");
    }

    #[test]
    fn cache_is_used_without_auto_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "one").unwrap();

        let env = Environment::new(ChoiceLoader::from_dirs([dir.path()]));
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "one");
        fs::write(&path, "two").unwrap();
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "one");
        env.clear_cache();
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "two");
    }
}
