// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! ea CLI library.
//!
//! Command-line front end for the `ea` crate: project scaffolding, asset
//! builds and servers that render templates straight from URL paths.
//!
//! # Usage
//!
//! ```bash
//! ea init my-site   # Create a project
//! ea dev            # Development server with live reload
//! ea build          # Build asset bundles
//! ea serve          # Serve without live reload
//! ea watch          # Rebuild assets on change
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `ea.toml` at the project root.

/// CLI commands (init, dev, build, serve, watch).
pub mod commands;
/// Routes mapping URL paths to templates.
pub mod pages;
