// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Watch command: rebuilds assets on change without serving.

use std::path::{Path, PathBuf};

use ea::{livereload::FileWatcher, AssetEnvironment};
use tokio::signal;

use super::load_config;

/// Rebuilds stale bundles whenever a watched file changes.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let assets = AssetEnvironment::from_config(&config)?;
    assets.build_all(false)?;

    println!("Watching: {}", config.livereload.watch.join(", "));
    println!("Press Ctrl+C to stop...");
    println!();

    let _watcher = FileWatcher::new(&config.app.root, &config.livereload.watch, move |paths: Vec<PathBuf>| {
        let files = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match assets.rebuild_stale() {
            Ok(rebuilt) if rebuilt.is_empty() => println!("  File changed: {} - nothing to rebuild", files),
            Ok(rebuilt) => println!("  File changed: {} - rebuilt {}", files, rebuilt.join(", ")),
            Err(e) => eprintln!("  File changed: {} - rebuild failed: {}", files, e),
        }
    })?;

    signal::ctrl_c().await?;

    println!("\nStopping file watcher...");
    Ok(())
}
