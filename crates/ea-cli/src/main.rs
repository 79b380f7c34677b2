// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ea_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ea")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Templates, assets and live reload for axum apps", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = ea::config::CONFIG_FILE)]
    config: PathBuf,

    /// Quiet mode: only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project
    Init {
        /// Project directory (defaults to the current directory)
        name: Option<String>,
    },
    /// Start the development server with live reload
    Dev {
        /// Port (defaults to [livereload] port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host (defaults to [livereload] host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Build all asset bundles
    Build {
        /// Rebuild bundles that are up to date
        #[arg(short, long)]
        force: bool,
    },
    /// Serve templates and static files without live reload
    Serve {
        /// Port (defaults to [app] port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host (defaults to [app] host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Rebuild assets on change (no server)
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init { name } => commands::init::run(name).await,
        Commands::Dev { port, host } => commands::dev::run(&cli.config, host, port, cli.quiet).await,
        Commands::Build { force } => commands::build::run(&cli.config, force).await,
        Commands::Serve { port, host } => commands::serve::run(&cli.config, host, port).await,
        Commands::Watch => commands::watch::run(&cli.config).await,
    }
}
