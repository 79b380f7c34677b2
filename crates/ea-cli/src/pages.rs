// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Routes that render templates by URL path.
//!
//! `/` renders `index.html`, `/about` renders `about.html` or
//! `about/index.html`, `/blog/post.html` renders `blog/post.html`.
//! Partials (`_nav.html`), hidden files and error pages (`404.html`) are
//! never served directly.

use axum::{extract::State, response::Html, routing::get, Router};
use ea::{EaError, HttpError, RequestInfo, SharedState};

/// Router answering every GET with a matching template.
pub fn routes() -> Router<SharedState> {
    Router::new().route("/", get(page)).route("/*path", get(page))
}

/// Candidate template names for a URL path, in lookup order.
///
/// Returns `None` for paths that never map to a page.
pub fn template_names(path: &str) -> Option<Vec<String>> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Some(vec!["index.html".to_string()]);
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || s.starts_with('_') || s.starts_with('.'))
    {
        return None;
    }

    let last = segments.last()?;
    let stem = last.strip_suffix(".html").unwrap_or(last);
    if stem.contains('.') || stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    if last.ends_with(".html") {
        Some(vec![path.to_string()])
    } else {
        Some(vec![format!("{}.html", path), format!("{}/index.html", path)])
    }
}

async fn page(State(state): State<SharedState>, request: RequestInfo) -> Result<Html<String>, HttpError> {
    let names = template_names(&request.path).ok_or_else(HttpError::not_found)?;
    for name in &names {
        match state.render(&request, name, &()) {
            Ok(html) => return Ok(Html(html)),
            Err(EaError::TemplateNotFound(missing)) if &missing == name => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(HttpError::not_found())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_paths_to_templates() {
        assert_eq!(template_names("/"), Some(vec!["index.html".to_string()]));
        assert_eq!(
            template_names("/about/"),
            Some(vec!["about.html".to_string(), "about/index.html".to_string()])
        );
        assert_eq!(
            template_names("/blog/post.html"),
            Some(vec!["blog/post.html".to_string()])
        );
    }

    #[test]
    fn hides_partials_and_error_pages() {
        assert_eq!(template_names("/_nav.html"), None);
        assert_eq!(template_names("/partials/_footer"), None);
        assert_eq!(template_names("/404.html"), None);
        assert_eq!(template_names("/410"), None);
        assert_eq!(template_names("/.env"), None);
        assert_eq!(template_names("/favicon.ico"), None);
        assert_eq!(template_names("/a//b"), None);
    }
}
