// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template integration for the asset pipeline.

use std::sync::Arc;

use super::AssetEnvironment;
use crate::error::Result;
use crate::template::ast::{Expr, ForNode, Node};
use crate::template::lexer::TokenKind;
use crate::template::{Args, Environment, Extension, Parser, Value};

/// The `assets` tag.
///
/// ```text
/// {% assets "styles.css", "extra.css" %}
///   <link rel="stylesheet" href="{{ ASSET_URL }}">
/// {% endassets %}
/// ```
///
/// The body is repeated once per bundle with `ASSET_URL` bound to its URL.
/// Requires the `asset_urls` function from [`register_functions`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetsExtension;

impl Extension for AssetsExtension {
    fn tags(&self) -> &'static [&'static str] {
        &["assets"]
    }

    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node> {
        parser.next_token();
        let mut names = Vec::new();
        while !parser.check(&TokenKind::BlockEnd) {
            if !names.is_empty() {
                parser.expect(&TokenKind::Comma)?;
            }
            names.push(parser.parse_expression()?);
        }
        let body = parser.parse_statements(&["endassets"], true)?;
        Ok(Node::For(ForNode {
            targets: vec!["ASSET_URL".to_string()],
            iter: Expr::Call {
                func: Box::new(Expr::Name("asset_urls".to_string())),
                args: names,
                kwargs: Vec::new(),
            },
            body,
            else_: Vec::new(),
        }))
    }
}

/// Bundle names from call arguments; list arguments are flattened.
fn bundle_names(args: &Args) -> Vec<String> {
    let mut names = Vec::new();
    for arg in &args.positional {
        match arg {
            Value::List(items) => names.extend(items.iter().map(|i| i.to_string())),
            other => names.push(other.to_string()),
        }
    }
    names
}

/// Registers `asset_urls(names...)` and `asset_url(name)` on `env`.
pub fn register_functions(env: &mut Environment, assets: Arc<AssetEnvironment>) {
    let shared = Arc::clone(&assets);
    env.add_function("asset_urls", move |_, args| {
        let urls = shared.urls(&bundle_names(args)).map_err(|e| e.to_string())?;
        Ok(Value::List(urls.into_iter().map(Value::String).collect()))
    });
    env.add_function("asset_url", move |_, args| {
        let name = args.str_or(0, "name", "");
        assets.url(&name).map(Value::String).map_err(|e| e.to_string())
    });
    env.add_extension(AssetsExtension);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Bundle;
    use crate::template::MemoryLoader;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn setup(template: &str) -> (TempDir, Environment) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.css"), "a{}").unwrap();
        fs::write(dir.path().join("b.js"), "b()").unwrap();

        let mut assets = AssetEnvironment::new(dir.path().join("static"), "/static");
        assets.set_url_expire(false);
        assets.register("a.css", Bundle::new(vec![dir.path().join("a.css")], "css/a.css"));
        assets.register("b.js", Bundle::new(vec![dir.path().join("b.js")], "js/b.js"));

        let mut env = Environment::new(MemoryLoader::new().with("page.html", template));
        register_functions(&mut env, Arc::new(assets));
        (dir, env)
    }

    #[test]
    fn assets_tag_loops_over_urls() {
        let (_dir, env) = setup("{% assets 'a.css', 'b.js' %}[{{ ASSET_URL }}]{% endassets %}");
        let out = env.render("page.html", &json!({})).unwrap();
        assert_eq!(out, "[/static/css/a.css][/static/js/b.js]");
    }

    #[test]
    fn assets_tag_accepts_group_lists() {
        let (_dir, env) = setup("{% assets group.css %}{{ ASSET_URL }}{% endassets %}");
        let out = env.render("page.html", &json!({"group": {"css": ["a.css"]}})).unwrap();
        assert_eq!(out, "/static/css/a.css");
    }

    #[test]
    fn asset_url_function_builds_on_demand() {
        let (dir, env) = setup("{{ asset_url('b.js') }}");
        assert_eq!(env.render("page.html", &json!({})).unwrap(), "/static/js/b.js");
        assert!(dir.path().join("static/js/b.js").exists());
    }

    #[test]
    fn unknown_bundles_fail_rendering() {
        let (_dir, env) = setup("{{ asset_url('nope.css') }}");
        let err = env.render("page.html", &json!({})).unwrap_err();
        assert!(err.to_string().contains("nope.css"));
    }
}
