// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Asset build command.

use std::path::Path;
use std::time::Instant;

use console::style;
use ea::AssetEnvironment;

use super::load_config;

/// Builds every registered bundle into the static directory.
pub async fn run(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let assets = AssetEnvironment::from_config(&config)?;

    let start = Instant::now();
    let built = assets.build_all(force)?;
    let total = assets.names().count();

    println!(
        "  {} {} {}",
        style("✓").green(),
        style(format!("Built {} of {} bundles into {}", built, total, assets.directory().display())).dim(),
        style(format!("{}ms", start.elapsed().as_millis())).dim()
    );
    Ok(())
}
