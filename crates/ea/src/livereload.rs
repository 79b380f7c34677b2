// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server with live reload.
//!
//! Files matching `[livereload] watch` are watched under the project root.
//! On change, stale asset bundles are rebuilt and every connected browser
//! receives a `reload` message over `/__livereload`. HTML responses get a
//! small client script injected before `</body>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket},
        Request, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use crate::app::{serve_router, EnhancedApp, SharedState};
use crate::assets::AssetEnvironment;
use crate::config::Config;
use crate::error::{EaError, Result};

/// WebSocket endpoint browsers connect to.
pub const LIVERELOAD_PATH: &str = "/__livereload";

const DEBOUNCE: Duration = Duration::from_millis(750);

const CLIENT_SCRIPT: &str = r#"
<script>
(function() {
    const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
    const ws = new WebSocket(protocol + '//' + window.location.host + '/__livereload');
    ws.onmessage = function(event) {
        if (event.data === 'reload') {
            console.log('[ea] Reloading...');
            window.location.reload();
        }
    };
    ws.onclose = function() {
        console.log('[ea] Connection lost, attempting to reconnect...');
        setTimeout(function() {
            window.location.reload();
        }, 1000);
    };
})();
</script>
"#;

/// Inserts the live reload client before the last `</body>`, else before
/// `</html>`, else at the end.
pub fn inject_livereload_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let pos = lower.rfind("</body>").or_else(|| lower.rfind("</html>"));
    match pos {
        Some(pos) => {
            let mut result = String::with_capacity(html.len() + CLIENT_SCRIPT.len());
            result.push_str(&html[..pos]);
            result.push_str(CLIENT_SCRIPT);
            result.push_str(&html[pos..]);
            result
        }
        None => format!("{}{}", html, CLIENT_SCRIPT),
    }
}

/// Reload broadcaster shared by the watcher and WebSocket clients.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<()>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    /// Creates a broadcaster with no clients.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Receiver notified on every reload.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tells connected browsers to reload. Returns the number notified.
    pub fn reload(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Adds the WebSocket endpoint and script injection to `router`.
    pub fn attach(&self, router: Router) -> Router {
        let tx = self.tx.clone();
        router
            .route(
                LIVERELOAD_PATH,
                get(move |ws: WebSocketUpgrade| {
                    let rx = tx.subscribe();
                    async move { ws.on_upgrade(move |socket| handle_websocket(socket, rx)) }
                }),
            )
            .layer(middleware::from_fn(inject_script))
    }

    /// Watches the configured patterns, rebuilding stale assets and then
    /// reloading browsers. `on_change` sees the changed root-relative paths.
    pub fn watch<F>(&self, config: &Config, assets: Arc<AssetEnvironment>, on_change: F) -> Result<FileWatcher>
    where
        F: Fn(&[PathBuf]) + Send + 'static,
    {
        let reload = self.clone();
        FileWatcher::new(&config.app.root, &config.livereload.watch, move |paths| {
            match assets.rebuild_stale() {
                Ok(rebuilt) if !rebuilt.is_empty() => tracing::info!("Rebuilt {}", rebuilt.join(", ")),
                Ok(_) => {}
                Err(e) => tracing::error!("Asset rebuild failed: {}", e),
            }
            on_change(&paths);
            reload.reload();
        })
    }
}

/// Sends `reload` to one browser whenever the broadcaster fires.
pub async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(()) => {
                        if socket.send(Message::Text("reload".to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn inject_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Reading response body failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let html = inject_livereload_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| EaError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| EaError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Debounced recursive watcher filtered by glob patterns.
///
/// Events are collapsed over 750ms. Watching stops when dropped.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watches `root` recursively; `on_change` receives root-relative
    /// paths matching any of `patterns`.
    pub fn new<F>(root: &Path, patterns: &[String], on_change: F) -> Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let globs = build_globset(patterns)?;
        let base = root.canonicalize()?;
        let prefix = base.clone();

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: std::result::Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    let mut changed: Vec<PathBuf> = events
                        .iter()
                        .flat_map(|e| e.paths.iter())
                        .filter_map(|p| p.strip_prefix(&prefix).ok())
                        .filter(|p| globs.is_match(p))
                        .map(Path::to_path_buf)
                        .collect();
                    changed.sort();
                    changed.dedup();
                    if !changed.is_empty() {
                        tracing::debug!("Changed: {:?}", changed);
                        on_change(changed);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::warn!("Watch error: {}", e);
                    }
                }
            },
        )?;
        debouncer.watch(&base, RecursiveMode::Recursive)?;
        tracing::debug!("Watching {} for {}", base.display(), patterns.join(", "));

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

impl EnhancedApp {
    /// Switches to development mode.
    ///
    /// Turns on debug and template auto reload, exposes `livereload = true`
    /// to templates and creates the folder structure.
    pub fn enable_livereload(&mut self) -> Result<()> {
        self.config_mut().app.debug = true;
        let templates = self.templates_mut();
        templates.set_auto_reload(true);
        templates.add_global("livereload", true);
        self.create_folder_structure()?;
        Ok(())
    }

    /// Runs the development server on `[livereload] host` and `port`.
    ///
    /// Blocks until the server stops.
    pub async fn run_livereload(mut self, routes: Router<SharedState>, port: u16) -> Result<()> {
        self.enable_livereload()?;
        let addr = format!("{}:{}", self.config().livereload.host, port);
        let reload = LiveReload::new();
        let _watcher = reload.watch(self.config(), Arc::clone(self.assets()), |paths| {
            for path in paths {
                tracing::info!("Changed {}", path.display());
            }
        })?;
        let router = reload.attach(self.router(routes));
        serve_router(router, &addr).await
    }
}
