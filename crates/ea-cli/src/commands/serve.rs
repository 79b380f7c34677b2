// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server command without live reload.

use std::path::Path;

use console::style;
use ea::EnhancedApp;

use super::load_config;
use crate::pages;

/// Serves templates and static files on `[app] host:port`.
pub async fn run(config_path: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.app.host = host;
    }
    if let Some(port) = port {
        config.app.port = port;
    }

    let app = EnhancedApp::new(config)?;
    let built = app.assets().build_all(false)?;
    tracing::info!("Built {} bundles", built);

    println!(
        "{} {}",
        style("Server:").cyan(),
        style(format!("http://{}:{}", app.config().app.host, app.config().app.port)).green().bold()
    );
    app.serve(pages::routes()).await?;
    Ok(())
}
