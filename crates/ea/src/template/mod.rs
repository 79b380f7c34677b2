// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Jinja-style template engine.
//!
//! Supports `{{ }}` output with filters and tests, `{% if %}`, `{% for %}`
//! with `loop` variables, `{% set %}`, `{% with %}`, block inheritance
//! through `{% extends %}`, `{% include %}`, whitespace control and
//! custom tags through [`Extension`].
//!
//! # Pipeline
//!
//! ```text
//! source ─▶ lexer ─▶ tokens ─▶ parser (+ extensions) ─▶ nodes ─▶ renderer ─▶ String
//! ```

pub mod ast;
mod builtins;
mod environment;
mod extension;
pub mod lexer;
mod loader;
mod parser;
mod render;
mod value;

pub use builtins::html_escape;
pub(crate) use environment::context_vars;
pub use environment::{Environment, Filter, Function, Template, Test};
pub use extension::{Extension, RequiredVariablesExtension};
pub use lexer::LexerOptions;
pub use loader::{ChoiceLoader, FileSystemLoader, LoadedSource, MemoryLoader, TemplateLoader};
pub use parser::Parser;
pub use render::Context;
pub use value::{Args, CallResult, Value};
