// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Application bootstrap on top of axum.
//!
//! [`EnhancedApp`] wires the template environment, the asset pipeline,
//! static file serving and error pages together:
//!
//! ```rust,no_run
//! use axum::{extract::State, response::Html, routing::get, Router};
//! use ea::{Config, EnhancedApp, HttpError, RequestInfo, SharedState};
//! use serde_json::json;
//!
//! async fn index(
//!     State(state): State<SharedState>,
//!     request: RequestInfo,
//! ) -> Result<Html<String>, HttpError> {
//!     state.render_template(&request, "index.html", &json!({"title": "Home"}))
//! }
//!
//! # async fn run() -> ea::Result<()> {
//! let app = EnhancedApp::new(Config::load()?)?;
//! app.serve(Router::new().route("/", get(index))).await
//! # }
//! ```

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, Request, State},
    handler::HandlerWithoutStateExt,
    http::{request::Parts, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    Router,
};
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::assets::{register_functions, AssetEnvironment};
use crate::config::Config;
use crate::error::{EaError, Result};
use crate::helpers;
use crate::template::{context_vars, ChoiceLoader, Environment, RequiredVariablesExtension, Value};

/// Statuses rendered through `<code>.html` error templates.
pub const ERROR_PAGES: &[u16] = &[403, 404, 410, 500];

/// Shared state handed to handlers.
pub type SharedState = Arc<AppState>;

/// Everything a request handler needs to render pages.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Template environment.
    pub templates: Environment,
    /// Asset bundles.
    pub assets: Arc<AssetEnvironment>,
}

/// Request details exposed to templates as `request`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: String,
    /// Path without query.
    pub path: String,
    /// Path and query as requested.
    pub url: String,
    /// Raw query string.
    pub query: String,
    /// Decoded query parameters.
    pub args: BTreeMap<String, String>,
}

impl RequestInfo {
    /// Builds request details from a method and URI.
    pub fn new(method: &Method, uri: &Uri) -> Self {
        let args = Query::<BTreeMap<String, String>>::try_from_uri(uri)
            .map(|q| q.0)
            .unwrap_or_default();
        Self {
            method: method.to_string(),
            path: uri.path().to_string(),
            url: uri
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            query: uri.query().unwrap_or_default().to_string(),
            args,
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(RequestInfo::new(&parts.method, &parts.uri))
    }
}

/// An HTTP error a handler returns to get the matching error page.
///
/// The response carries the error in its extensions; the error page
/// middleware replaces the body with the rendered `<code>.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Response status.
    pub status: StatusCode,
    /// Text shown on the error page instead of the default description.
    pub description: Option<String>,
}

impl HttpError {
    /// Error with the default description for `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            description: None,
        }
    }

    /// 403 Forbidden.
    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    /// 404 Not Found.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// 410 Gone.
    pub fn gone() -> Self {
        Self::new(StatusCode::GONE)
    }

    /// 500 Internal Server Error.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Overrides the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Reason phrase such as `Not Found`.
    pub fn name(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Error")
    }

    /// Description shown to users.
    pub fn description(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match self.status.as_u16() {
            403 => "You don't have the permission to access the requested resource. \
                    It is either read-protected or not readable by the server."
                .to_string(),
            404 => "The requested URL was not found on the server. \
                    If you entered the URL manually please check your spelling and try again."
                .to_string(),
            410 => "The requested URL is no longer available on this server \
                    and there is no forwarding address."
                .to_string(),
            500 => "The server encountered an internal error and was unable \
                    to complete your request."
                .to_string(),
            _ => self.name().to_string(),
        }
    }

    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("code".to_string(), Value::Int(self.status.as_u16() as i64));
        map.insert("name".to_string(), Value::from(self.name()));
        map.insert("description".to_string(), Value::String(self.description()));
        Value::Dict(map)
    }

    fn plain_text(&self) -> Response {
        let body = format!("{} {}\n\n{}", self.status.as_u16(), self.name(), self.description());
        (self.status, body).into_response()
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = self.plain_text();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<EaError> for HttpError {
    fn from(err: EaError) -> Self {
        tracing::error!("{}", err);
        HttpError::internal()
    }
}

impl AppState {
    /// Renders `name` with `context` plus `request` and `config`.
    pub fn render<S: Serialize + ?Sized>(
        &self,
        request: &RequestInfo,
        name: &str,
        context: &S,
    ) -> Result<String> {
        let mut vars = context_vars(name, context)?;
        vars.insert("request".to_string(), Value::from_serialize(request)?);
        vars.insert("config".to_string(), config_value(&self.config));
        self.templates.render_vars(name, vars)
    }

    /// Renders `name` into an HTML response; failures become a 500 page.
    pub fn render_template<S: Serialize + ?Sized>(
        &self,
        request: &RequestInfo,
        name: &str,
        context: &S,
    ) -> std::result::Result<Html<String>, HttpError> {
        Ok(Html(self.render(request, name, context)?))
    }

    /// Renders the error page for `error`.
    ///
    /// A missing `/favicon.ico` is answered with a bare `Not found`. When
    /// the `<code>.html` template is missing or fails, the page falls back
    /// to plain text.
    pub fn error_page(&self, request: &RequestInfo, error: &HttpError) -> Response {
        if error.status == StatusCode::NOT_FOUND && request.path == "/favicon.ico" {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }

        let template = format!("{}.html", error.status.as_u16());
        let mut context = BTreeMap::new();
        context.insert("error".to_string(), error.to_value());
        match self.render(request, &template, &context) {
            Ok(html) => (error.status, Html(html)).into_response(),
            Err(EaError::TemplateNotFound(_)) => error.plain_text(),
            Err(e) => {
                tracing::error!("Rendering error page {} failed: {}", template, e);
                error.plain_text()
            }
        }
    }
}

fn config_value(config: &Config) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::from(config.app.name.as_str()));
    map.insert("debug".to_string(), Value::Bool(config.app.debug));
    map.insert(
        "static_url".to_string(),
        Value::from(config.folders.static_url.as_str()),
    );
    Value::Dict(map)
}

async fn error_pages(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let info = RequestInfo::new(request.method(), request.uri());
    let response = next.run(request).await;
    let Some(error) = response.extensions().get::<HttpError>().cloned() else {
        return response;
    };
    if !ERROR_PAGES.contains(&error.status.as_u16()) {
        return response;
    }
    tracing::debug!("{} {} -> {}", info.method, info.path, error.status);
    state.error_page(&info, &error)
}

async fn not_found() -> HttpError {
    HttpError::not_found()
}

/// Searches `folders` for `name`, then tries `name` itself.
///
/// Returns the first existing path, canonicalized.
pub fn find_file<P: AsRef<Path>>(name: &str, folders: &[P]) -> Result<PathBuf> {
    let candidates = folders
        .iter()
        .map(|f| f.as_ref().join(name))
        .chain(std::iter::once(PathBuf::from(name)));
    for candidate in candidates {
        if candidate.exists() {
            return Ok(fs::canonicalize(&candidate).unwrap_or(candidate));
        }
    }
    Err(EaError::FileNotFound(name.to_string()))
}

/// Creates `path` as an empty file when its last component contains a
/// `.`, as a directory otherwise. Parents are created as needed.
fn create_path(path: &Path) -> Result<()> {
    let is_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains('.'));
    if is_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(path)?;
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// The application: configuration, templates and assets.
pub struct EnhancedApp {
    config: Config,
    templates: Environment,
    assets: Arc<AssetEnvironment>,
}

impl EnhancedApp {
    /// Builds the template environment and registers asset bundles.
    ///
    /// # Errors
    ///
    /// Fails when a configured helper name is unknown, a JS input or SCSS
    /// library cannot be found, or a glob pattern is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let mut templates = Environment::new(ChoiceLoader::default());
        enhance_jinja(&mut templates, &config)?;
        let assets = Arc::new(AssetEnvironment::from_config(&config)?);
        enhance_assets(&mut templates, &config, Arc::clone(&assets))?;
        tracing::debug!("Initialized {}", config.app.name);
        Ok(Self {
            config,
            templates,
            assets,
        })
    }

    /// Loads `ea.toml` from the current directory and builds the app.
    pub fn load() -> Result<Self> {
        Self::new(Config::load()?)
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration, for settings read at serve time.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Template environment.
    pub fn templates(&self) -> &Environment {
        &self.templates
    }

    /// Mutable template environment, for registering extra filters.
    pub fn templates_mut(&mut self) -> &mut Environment {
        &mut self.templates
    }

    /// Asset bundles.
    pub fn assets(&self) -> &Arc<AssetEnvironment> {
        &self.assets
    }

    /// Creates missing entries of `[folders] structure`.
    ///
    /// Existing entries are left untouched. Returns the created paths.
    pub fn create_folder_structure(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for entry in &self.config.folders.structure {
            let path = self.config.resolve(entry.trim_end_matches('/'));
            if path.exists() {
                continue;
            }
            create_path(&path)?;
            tracing::info!("Created {}", path.display());
            created.push(path);
        }
        Ok(created)
    }

    /// [`find_file`] with folders relative to the project root, which is
    /// searched last.
    pub fn find_file<P: AsRef<Path>>(&self, name: &str, folders: &[P]) -> Result<PathBuf> {
        let mut folders: Vec<PathBuf> = folders.iter().map(|f| self.config.resolve(f)).collect();
        folders.push(self.config.app.root.clone());
        find_file(name, &folders)
    }

    /// Turns the app into shared handler state.
    pub fn state(self) -> SharedState {
        Arc::new(AppState {
            config: self.config,
            templates: self.templates,
            assets: self.assets,
        })
    }

    /// Merges `routes` with static file serving, error pages and a 404
    /// fallback.
    pub fn router(self, routes: Router<SharedState>) -> Router {
        build_router(self.state(), routes)
    }

    /// Serves `routes` on `[app] host:port`.
    pub async fn serve(self, routes: Router<SharedState>) -> Result<()> {
        let addr = format!("{}:{}", self.config.app.host, self.config.app.port);
        serve_router(self.router(routes), &addr).await
    }
}

/// Applies template settings, extensions, helpers and loaders.
pub fn enhance_jinja(env: &mut Environment, config: &Config) -> Result<()> {
    env.set_trim_blocks(config.jinja.trim_blocks);
    env.set_lstrip_blocks(config.jinja.lstrip_blocks);
    env.set_cache_size(config.jinja.cache_size);
    env.set_auto_reload(config.app.debug);
    env.add_extension(RequiredVariablesExtension);

    for (name, helper) in &config.jinja.filters {
        let filter = helpers::filter(helper)
            .ok_or_else(|| EaError::Config(format!("unknown filter helper '{}'", helper)))?;
        env.add_filter(name.clone(), filter);
    }
    for (name, helper) in config.jinja.functions.iter().chain(&config.jinja.context) {
        let function = helpers::context_function(helper)
            .ok_or_else(|| EaError::Config(format!("unknown function helper '{}'", helper)))?;
        env.add_function(name.clone(), function);
    }

    let dirs: Vec<PathBuf> = config.folders.templates.iter().map(|d| config.resolve(d)).collect();
    env.set_loader(Arc::new(ChoiceLoader::from_dirs(dirs)));
    Ok(())
}

/// Exposes asset URLs and groups to templates.
pub fn enhance_assets(env: &mut Environment, config: &Config, assets: Arc<AssetEnvironment>) -> Result<()> {
    register_functions(env, assets);
    env.add_global("asset_groups", Value::from_serialize(&config.assets.groups)?);
    Ok(())
}

/// Adds static files, error pages and the 404 fallback to `routes`.
pub fn build_router(state: SharedState, routes: Router<SharedState>) -> Router {
    let static_dir = state.config.static_dir();
    let static_url = state.config.folders.static_url.clone();
    routes
        .nest_service(
            &static_url,
            ServeDir::new(static_dir).fallback(not_found.into_service()),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), error_pages))
        .with_state(state)
}

/// Binds `addr` and serves `router` until the process stops.
pub async fn serve_router(router: Router, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum_test::TestServer;
    use serde_json::json;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(
            templates.join("index.html"),
            "{{ title }} at {{ request.path }} [{{ highlight_link('/') }}] {{ config.name }}",
        )
        .unwrap();
        fs::write(
            templates.join("404.html"),
            "<h1>{{ error.code }} {{ error.name }}</h1>",
        )
        .unwrap();
        dir
    }

    fn app(dir: &TempDir) -> EnhancedApp {
        EnhancedApp::new(Config::with_root(dir.path())).unwrap()
    }

    async fn get_response(router: Router, uri: &str) -> (StatusCode, String) {
        let server = TestServer::new(router).unwrap();
        let response = server.get(uri).await;
        (response.status_code(), response.text())
    }

    async fn index(
        State(state): State<SharedState>,
        request: RequestInfo,
    ) -> std::result::Result<Html<String>, HttpError> {
        state.render_template(&request, "index.html", &json!({"title": "Home"}))
    }

    async fn secret() -> HttpError {
        HttpError::forbidden()
    }

    #[test]
    fn creates_missing_structure_entries() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("static/scss")).unwrap();
        fs::write(dir.path().join("static/scss/styles.scss"), "body{}").unwrap();

        let app = app(&dir);
        let created = app.create_folder_structure().unwrap();
        assert!(dir.path().join("static/js_src/Main.js").is_file());
        assert!(dir.path().join("static/images").is_dir());
        assert!(dir.path().join("templates").is_dir());
        assert_eq!(
            fs::read_to_string(dir.path().join("static/scss/styles.scss")).unwrap(),
            "body{}"
        );
        assert!(!created.contains(&dir.path().join("static/scss/styles.scss")));
        assert!(app.create_folder_structure().unwrap().is_empty());
    }

    #[test]
    fn finds_files_in_folders_first() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/x.js"), "").unwrap();

        let found = find_file("x.js", &[dir.path().join("a"), dir.path().join("b")]).unwrap();
        assert_eq!(found, fs::canonicalize(dir.path().join("b/x.js")).unwrap());
        assert!(matches!(
            find_file("y.js", &[dir.path().join("a")]),
            Err(EaError::FileNotFound(name)) if name == "y.js"
        ));

        let app = app(&dir);
        assert!(app.find_file("x.js", &["a", "b"]).is_ok());
    }

    #[test]
    fn unknown_helper_names_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_root(dir.path());
        config.jinja.filters.insert("money".to_string(), "no_such_helper".to_string());
        assert!(matches!(EnhancedApp::new(config), Err(EaError::Config(_))));
    }

    #[test]
    fn root_static_url_is_rejected_before_routing() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_root(dir.path());
        config.folders.static_url = "/".to_string();
        assert!(matches!(EnhancedApp::new(config), Err(EaError::Config(_))));
    }

    #[tokio::test]
    async fn renders_with_request_and_config() {
        let dir = project();
        let router = app(&dir).router(Router::new().route("/", get(index)));
        let (status, body) = get_response(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Home at / [active] enhanced-app");
    }

    #[tokio::test]
    async fn unknown_routes_render_the_404_template() {
        let dir = project();
        let router = app(&dir).router(Router::new());
        let (status, body) = get_response(router, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "<h1>404 Not Found</h1>");
    }

    #[tokio::test]
    async fn missing_error_template_falls_back_to_text() {
        let dir = project();
        let router = app(&dir).router(Router::new().route("/secret", get(secret)));
        let (status, body) = get_response(router, "/secret").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.starts_with("403 Forbidden"));
    }

    #[tokio::test]
    async fn favicon_is_a_plain_not_found() {
        let dir = project();
        let router = app(&dir).router(Router::new());
        let (status, body) = get_response(router, "/favicon.ico").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");
    }

    #[tokio::test]
    async fn serves_static_files() {
        let dir = project();
        fs::create_dir_all(dir.path().join("static/images")).unwrap();
        fs::write(dir.path().join("static/images/logo.svg"), "<svg/>").unwrap();
        let router = app(&dir).router(Router::new());

        let (status, body) = get_response(router.clone(), "/static/images/logo.svg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<svg/>");

        let (status, body) = get_response(router, "/static/nope.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "<h1>404 Not Found</h1>");
    }

    #[test]
    fn request_info_decodes_query() {
        let uri: Uri = "/search?q=rust%20lang&page=2".parse().unwrap();
        let info = RequestInfo::new(&Method::GET, &uri);
        assert_eq!(info.path, "/search");
        assert_eq!(info.url, "/search?q=rust%20lang&page=2");
        assert_eq!(info.args.get("q").map(String::as_str), Some("rust lang"));
    }
}
