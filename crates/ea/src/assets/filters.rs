// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Asset filters: SCSS compilation, vendor prefixing and JS minification.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::error::{EaError, Result};

/// A transformation applied while building a bundle.
///
/// [`AssetFilter::input`] runs on every input file before concatenation,
/// [`AssetFilter::output`] on the concatenated bundle. Both default to
/// passing the source through.
pub trait AssetFilter: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transforms one input file.
    fn input(&self, source: String, path: &Path) -> Result<String> {
        let _ = path;
        Ok(source)
    }

    /// Transforms the concatenated output.
    fn output(&self, source: String) -> Result<String> {
        Ok(source)
    }
}

fn filter_error(filter: &str, path: &Path, message: impl ToString) -> EaError {
    EaError::AssetFilter {
        filter: filter.to_string(),
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Compiles SCSS to CSS with grass.
///
/// Imports resolve against the input file's directory first, then the
/// configured include paths.
#[derive(Debug, Clone, Default)]
pub struct SassFilter {
    include_paths: Vec<PathBuf>,
}

impl SassFilter {
    /// Creates a filter with extra `@import`/`@use` search paths.
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }
}

impl AssetFilter for SassFilter {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn input(&self, source: String, path: &Path) -> Result<String> {
        let mut options = grass::Options::default().load_paths(self.include_paths.as_slice());
        if let Some(parent) = path.parent() {
            options = options.load_path(parent);
        }
        grass::from_string(source, &options).map_err(|e| filter_error(self.name(), path, e))
    }
}

/// Adds vendor prefixes for the configured browsers using lightningcss.
#[derive(Debug, Clone)]
pub struct AutoprefixerFilter {
    browsers: Vec<String>,
}

impl AutoprefixerFilter {
    /// Creates a filter for browserslist queries such as `"last 2 versions"`.
    pub fn new(browsers: Vec<String>) -> Self {
        Self { browsers }
    }

    fn targets(&self) -> Result<Targets> {
        let browsers = Browsers::from_browserslist(self.browsers.iter().map(String::as_str))
            .map_err(|e| EaError::Config(format!("invalid browsers query: {}", e)))?;
        Ok(browsers.map(Targets::from).unwrap_or_default())
    }
}

impl AssetFilter for AutoprefixerFilter {
    fn name(&self) -> &'static str {
        "autoprefixer"
    }

    fn output(&self, source: String) -> Result<String> {
        let targets = self.targets()?;
        let bundle = Path::new("<bundle>");
        let mut stylesheet = StyleSheet::parse(&source, ParserOptions::default())
            .map_err(|e| filter_error(self.name(), bundle, e))?;
        stylesheet
            .minify(MinifyOptions {
                targets,
                ..Default::default()
            })
            .map_err(|e| filter_error(self.name(), bundle, e))?;
        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                targets,
                ..Default::default()
            })
            .map_err(|e| filter_error(self.name(), bundle, e))?;
        Ok(printed.code)
    }
}

/// Removes whitespace and comments from JavaScript.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsMinFilter;

impl JsMinFilter {
    fn minify(source: &str, source_type: SourceType) -> std::result::Result<String, String> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();
        if parsed.panicked || !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
            return Err(messages.join("; "));
        }
        let options = CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        };
        Ok(Codegen::new().with_options(options).build(&parsed.program).code)
    }
}

impl AssetFilter for JsMinFilter {
    fn name(&self) -> &'static str {
        "jsmin"
    }

    fn output(&self, source: String) -> Result<String> {
        // Module syntax first, then sloppy-mode scripts.
        Self::minify(&source, SourceType::mjs())
            .or_else(|_| Self::minify(&source, SourceType::cjs()))
            .map_err(|e| filter_error(self.name(), Path::new("<bundle>"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn sass_compiles_with_include_paths() {
        let dir = TempDir::new().unwrap();
        let libs = dir.path().join("libs");
        fs::create_dir_all(&libs).unwrap();
        fs::write(libs.join("_colors.scss"), "$brand: #336699;").unwrap();
        let main = dir.path().join("main.scss");
        let source = "@import 'colors';\n.nav { a { color: $brand; } }";

        let css = SassFilter::new(vec![libs]).input(source.to_string(), &main).unwrap();
        assert!(css.contains(".nav a"));
        assert!(css.contains("#336699"));
    }

    #[test]
    fn sass_resolves_siblings_of_the_input() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_vars.scss"), "$gap: 4px;").unwrap();
        let main = dir.path().join("styles.scss");

        let css = SassFilter::default()
            .input("@import 'vars';\np { margin: $gap; }".to_string(), &main)
            .unwrap();
        assert!(css.contains("margin: 4px"));
    }

    #[test]
    fn sass_errors_name_the_file() {
        let err = SassFilter::default()
            .input("p { color: $missing; }".to_string(), Path::new("broken.scss"))
            .unwrap_err();
        assert!(matches!(err, EaError::AssetFilter { ref path, .. } if path == "broken.scss"));
    }

    #[test]
    fn autoprefixer_adds_vendor_prefixes() {
        let filter = AutoprefixerFilter::new(vec!["safari 12".to_string()]);
        let css = filter.output(".x { user-select: none; }".to_string()).unwrap();
        assert!(css.contains("-webkit-user-select"));
    }

    #[test]
    fn autoprefixer_rejects_bad_queries() {
        let filter = AutoprefixerFilter::new(vec!["not a real query ???".to_string()]);
        assert!(filter.output("a{}".to_string()).is_err());
    }

    #[test]
    fn jsmin_strips_whitespace() {
        let source = "function add(a, b) {\n    return a + b;\n}\n";
        let out = JsMinFilter.output(source.to_string()).unwrap();
        assert!(out.len() < source.len());
        assert!(out.contains("return a+b"));
    }

    #[test]
    fn jsmin_accepts_sloppy_scripts() {
        let source = "with (obj) { x = 1; }";
        assert!(JsMinFilter.output(source.to_string()).is_ok());
    }

    #[test]
    fn jsmin_reports_syntax_errors() {
        assert!(JsMinFilter.output("function (".to_string()).is_err());
    }
}
