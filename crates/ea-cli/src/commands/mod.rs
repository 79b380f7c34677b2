// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `build`: Build asset bundles
//! - `dev`: Development server with live reload
//! - `init`: Scaffold a new project
//! - `serve`: Server without live reload
//! - `watch`: Rebuild assets on changes

use std::path::Path;

use ea::Config;

/// Asset build command.
pub mod build;
/// Development server command.
pub mod dev;
/// Project initialization command.
pub mod init;
/// Server command.
pub mod serve;
/// Asset watch command.
pub mod watch;

/// Loads `path`, or the default configuration when it does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::debug!("{} not found, using default configuration", path.display());
        return Ok(Config::default());
    }
    Ok(Config::from_path(path)?)
}
