// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the ea application bootstrap.
//!
//! This module defines [`EaError`], the main error enum, and
//! [`SourceContext`] for rich template syntax errors.
//!
//! # Error Categories
//!
//! - **Syntax errors**: Invalid template markup, with a source snippet
//! - **Render errors**: Unknown filters, bad operands, missing templates
//! - **Config errors**: Unparseable `ea.toml`, unknown helper names
//! - **Asset errors**: Missing bundles or input files, compiler failures
//! - **IO errors**: Filesystem access

use std::fmt;
use thiserror::Error;

/// Source context for enhanced error messages.
///
/// Captures a snippet of template source around an error line so syntax
/// errors can point at the offending markup.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from template source and an error line.
    ///
    /// Captures 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len());

        Self {
            lines,
            error_line: line,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the snippet with line numbers, marking the error line.
    ///
    /// ```text
    ///    3 | <ul>
    ///  > 4 |   {% for %}
    ///    5 | </ul>
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();
        for line_num in self.snippet_start..=self.snippet_end {
            let Some(line) = self.lines.get(line_num - 1) else {
                break;
            };
            let marker = if line_num == self.error_line { ">" } else { " " };
            result.push_str(&format!(" {} {:3} | {}\n", marker, line_num, line));
        }
        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// Helper struct for displaying optional source context.
pub struct OptSourceContextDisplay<'a>(pub &'a Option<SourceContext>);

impl fmt::Display for OptSourceContextDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ctx) => write!(f, "{}", ctx),
            None => Ok(()),
        }
    }
}

/// Helper trait for formatting optional source context.
pub trait AsDisplay<'a> {
    /// Wraps self for Display formatting.
    fn as_display(&'a self) -> OptSourceContextDisplay<'a>;
}

impl<'a> AsDisplay<'a> for Option<SourceContext> {
    fn as_display(&'a self) -> OptSourceContextDisplay<'a> {
        OptSourceContextDisplay(self)
    }
}

/// The main error type for ea operations.
#[derive(Error, Debug)]
pub enum EaError {
    /// Template markup could not be parsed.
    #[error("Syntax error in {template}: {message} at line {line}\n{}", source_context.as_display())]
    Syntax {
        /// Name of the template being parsed.
        template: String,
        /// Description of the problem.
        message: String,
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Source snippet, when the source is available.
        source_context: Option<SourceContext>,
    },

    /// Rendering a parsed template failed.
    #[error("Render error in {template}: {message}")]
    Render {
        /// Name of the template being rendered.
        template: String,
        /// Description of the problem.
        message: String,
    },

    /// No loader could provide the requested template.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A file searched for in the configured folders does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// No bundle is registered under the requested name.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// An asset filter (sass, autoprefixer, jsmin) failed.
    #[error("Asset filter {filter} failed on {path}: {message}")]
    AssetFilter {
        /// Name of the failing filter.
        filter: String,
        /// Input or output path being processed.
        path: String,
        /// Compiler message.
        message: String,
    },

    /// A glob pattern could not be compiled.
    #[error("Invalid pattern {pattern}: {message}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        message: String,
    },

    /// The filesystem watcher failed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// `ea.toml` could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON conversion of a template context failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EaError {
    /// Builds a render error for `template`.
    pub fn render(template: impl Into<String>, message: impl Into<String>) -> Self {
        EaError::Render {
            template: template.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with [`EaError`].
pub type Result<T> = std::result::Result<T, EaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_marks_error_line() {
        let source = "one\ntwo\nthree\nfour\nfive\nsix";
        let ctx = SourceContext::from_source(source, 4);
        let snippet = ctx.format_snippet();
        assert!(snippet.contains(">   4 | four"));
        assert!(snippet.contains("    2 | two"));
        assert!(snippet.contains("    6 | six"));
        assert!(!snippet.contains("one"));
    }

    #[test]
    fn syntax_error_display_includes_snippet() {
        let err = EaError::Syntax {
            template: "page.html".to_string(),
            message: "unexpected end of template".to_string(),
            line: 1,
            source_context: Some(SourceContext::from_source("{% if x %}", 1)),
        };
        let text = err.to_string();
        assert!(text.contains("page.html"));
        assert!(text.contains("{% if x %}"));
    }
}
