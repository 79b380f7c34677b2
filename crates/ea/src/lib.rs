// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

//! # ea
//!
//! Bootstrap for axum web applications.
//!
//! ## Features
//!
//! - Jinja-style templates with a `required` tag and extra filters
//! - Asset pipeline: SCSS, vendor prefixes, JS bundling and minification
//! - Error pages rendered from `403.html`, `404.html`, `410.html`
//! - Development server with live reload
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::{routing::get, Router};
//! use ea::{EnhancedApp, RequestInfo, SharedState};
//!
//! let app = EnhancedApp::load()?;
//! let routes = Router::new().route("/", get(index));
//! app.run_livereload(routes, 8080).await?;
//! ```
//!
//! Templates can guard markup on values being present:
//!
//! ```text
//! {% required user=current_user, title=page.title %}
//!   <h1>{{ title }}</h1> by {{ user.name }}
//! {% endrequired %}
//! ```

/// Application bootstrap, routing and error pages.
pub mod app;
/// Asset bundles and filters.
pub mod assets;
/// Configuration from `ea.toml`.
pub mod config;
/// Error types.
pub mod error;
/// Extra template filters and context functions.
pub mod helpers;
/// Development server with live reload.
pub mod livereload;
/// Jinja-style template engine.
pub mod template;

pub use app::{find_file, AppState, EnhancedApp, HttpError, RequestInfo, SharedState};
pub use assets::{AssetEnvironment, Bundle};
pub use config::Config;
pub use error::{EaError, Result};
pub use livereload::{inject_livereload_script, LiveReload};
pub use template::{Environment, RequiredVariablesExtension, Value};
