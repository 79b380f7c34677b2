// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests serving a freshly scaffolded project.

use std::fs;
use std::path::Path;

use axum::http::StatusCode;
use axum_test::TestServer;
use tempfile::tempdir;

use ea::{Config, EnhancedApp, LiveReload};
use ea_cli::commands::{init, load_config};
use ea_cli::pages;

fn scaffolded_app(dir: &Path) -> EnhancedApp {
    init::scaffold(dir, "demo-site").unwrap();
    let config = Config::from_path(dir.join("ea.toml")).unwrap();
    EnhancedApp::new(config).unwrap()
}

#[tokio::test]
async fn renders_index_with_assets() {
    let dir = tempdir().unwrap();
    let server = TestServer::new(scaffolded_app(dir.path()).router(pages::routes())).unwrap();

    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains("<h1>demo-site</h1>"));
    assert!(html.contains("href=\"/static/css/styles.css?"));
    assert!(html.contains("src=\"/static/js/main.js?"));
    assert!(html.contains("class=\"active\""));
    assert!(!html.contains("You searched for"));

    let css = server.get("/static/css/styles.css").await;
    assert_eq!(css.status_code(), StatusCode::OK);
    assert!(css.text().contains("a.active"));
}

#[tokio::test]
async fn required_block_renders_when_query_is_present() {
    let dir = tempdir().unwrap();
    let server = TestServer::new(scaffolded_app(dir.path()).router(pages::routes())).unwrap();

    let html = server.get("/").add_query_param("q", "rust").await.text();
    assert!(html.contains("You searched for rust."));
}

#[tokio::test]
async fn unknown_pages_use_the_404_template() {
    let dir = tempdir().unwrap();
    let server = TestServer::new(scaffolded_app(dir.path()).router(pages::routes())).unwrap();

    let response = server.get("/does-not-exist").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let html = response.text();
    assert!(html.contains("<title>404 Not Found</title>"));
    assert!(html.contains("The requested URL was not found on the server."));

    let direct = server.get("/404.html").await;
    assert_eq!(direct.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nested_pages_resolve_to_index_templates() {
    let dir = tempdir().unwrap();
    let app = scaffolded_app(dir.path());
    fs::create_dir_all(dir.path().join("templates/docs")).unwrap();
    fs::write(
        dir.path().join("templates/docs/index.html"),
        "{% extends 'base.html' %}{% block content %}Docs home{% endblock %}",
    )
    .unwrap();
    let server = TestServer::new(app.router(pages::routes())).unwrap();

    let html = server.get("/docs").await.text();
    assert!(html.contains("Docs home"));
}

#[tokio::test]
async fn livereload_injects_the_client() {
    let dir = tempdir().unwrap();
    let mut app = scaffolded_app(dir.path());
    app.enable_livereload().unwrap();
    let router = LiveReload::new().attach(app.router(pages::routes()));
    let server = TestServer::new(router).unwrap();

    let html = server.get("/").await.text();
    assert!(html.contains("/__livereload"));
    let body_end = html.rfind("</body>").unwrap();
    assert!(html.rfind("<script>").unwrap() < body_end);

    let css = server.get("/static/css/styles.css").await.text();
    assert!(!css.contains("__livereload"));
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let config = load_config(&dir.path().join("ea.toml")).unwrap();
    assert_eq!(config.app.port, 5000);
}

#[test]
fn init_runs_in_a_named_directory() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("site");
    tokio_test::block_on(init::run(Some(target.to_string_lossy().into_owned()))).unwrap();
    assert!(target.join("ea.toml").is_file());
    assert!(target.join(".gitignore").is_file());
}
