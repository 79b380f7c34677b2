// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with live reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use ea::{app::serve_router, EnhancedApp, LiveReload};
use indicatif::{ProgressBar, ProgressStyle};

use super::load_config;
use crate::pages;

/// Runs the development server until interrupted.
pub async fn run(config_path: &Path, host: Option<String>, port: Option<u16>, quiet: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.livereload.host = host;
    }
    let port = port.unwrap_or(config.livereload.port);

    let mut app = EnhancedApp::new(config)?;
    app.enable_livereload()?;

    let start = Instant::now();
    match app.assets().build_all(false) {
        Ok(built) if !quiet => println!(
            "  {} {} {}",
            style("✓").green(),
            style(format!("Built {} bundles", built)).dim(),
            style(format!("{}ms", start.elapsed().as_millis())).dim()
        ),
        Ok(_) => {}
        Err(e) => eprintln!(
            "  {} {}",
            style("✗").red(),
            style(format!("Initial build failed: {}", e)).red()
        ),
    }

    let reload = LiveReload::new();
    let _watcher = reload.watch(app.config(), Arc::clone(app.assets()), move |paths| {
        if !quiet {
            show_reload(paths);
        }
    })?;

    let addr = format!("{}:{}", app.config().livereload.host, port);
    if !quiet {
        println!(
            "{} {}",
            style("Server:").cyan(),
            style(format!("http://{}", addr)).green().bold()
        );
        println!(
            "{} {}",
            style("Status:").cyan(),
            style("Watching for changes...").dim()
        );
        println!();
    }

    let router = reload.attach(app.router(pages::routes()));
    serve_router(router, &addr).await?;
    Ok(())
}

fn show_reload(paths: &[PathBuf]) {
    let start = Instant::now();
    let display = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let pb = ProgressBar::new_spinner();
    if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} reload {msg}") {
        pb.set_style(spinner);
    }
    pb.set_message(display.clone());
    pb.enable_steady_tick(Duration::from_millis(80));

    // Keep spinner visible for at least 400ms
    let elapsed = start.elapsed();
    if elapsed < Duration::from_millis(400) {
        std::thread::sleep(Duration::from_millis(400) - elapsed);
    }

    pb.finish_with_message(format!(
        "{} {} {}",
        style("✓").green(),
        style(&display).dim(),
        style(format!("{}ms", start.elapsed().as_millis())).dim()
    ));
}
