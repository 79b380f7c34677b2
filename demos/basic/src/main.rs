// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Demo shop: `cargo run -p ea-demo-basic` serves with live reload on
//! port 8080, `-- --serve` without it on port 5000.

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use ea::{Config, EnhancedApp, HttpError, RequestInfo, SharedState};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Product {
    slug: &'static str,
    name: &'static str,
    price: f64,
    discontinued: bool,
}

const PRODUCTS: &[Product] = &[
    Product { slug: "kettle", name: "Kettle", price: 39.5, discontinued: false },
    Product { slug: "toaster", name: "Toaster", price: 1249.0, discontinued: false },
    Product { slug: "percolator", name: "Percolator", price: 18.0, discontinued: true },
];

async fn index(State(state): State<SharedState>, request: RequestInfo) -> Result<Html<String>, HttpError> {
    let products: Vec<&Product> = PRODUCTS.iter().filter(|p| !p.discontinued).collect();
    state.render_template(&request, "index.html", &json!({ "products": products }))
}

async fn product(
    State(state): State<SharedState>,
    request: RequestInfo,
    Path(slug): Path<String>,
) -> Result<Html<String>, HttpError> {
    let product = PRODUCTS
        .iter()
        .find(|p| p.slug == slug)
        .ok_or_else(HttpError::not_found)?;
    if product.discontinued {
        return Err(HttpError::gone().with_description(format!("{} is no longer sold.", product.name)));
    }
    state.render_template(&request, "product.html", &json!({ "product": product }))
}

async fn admin() -> HttpError {
    HttpError::forbidden()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/ea.toml"))?;
    let app = EnhancedApp::new(config)?;
    let routes = Router::new()
        .route("/", get(index))
        .route("/products/:slug", get(product))
        .route("/admin", get(admin));

    if std::env::args().any(|a| a == "--serve") {
        app.serve(routes).await?;
    } else {
        let port = app.config().livereload.port;
        app.run_livereload(routes, port).await?;
    }
    Ok(())
}
