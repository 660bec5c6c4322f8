//! Categorizer pages and their static assets, embedded in the binary

use crate::error::ApiError;
use crate::state::Backend;
use axum::{
    extract::Path,
    http::header,
    response::{Html, IntoResponse, Response},
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "assets"]
struct Assets;

const TEMPLATE: &str = "categorizer.html";

/// Render the categorizer page for a backend
pub fn render_categorizer(backend: Backend) -> Result<String, ApiError> {
    let template = <Assets as Embed>::get(TEMPLATE)
        .ok_or_else(|| ApiError::Internal(format!("Missing page template {}", TEMPLATE)))?;
    let template = String::from_utf8_lossy(&template.data);

    Ok(template
        .replace("{{ model_name }}", &escape_html(backend.display_name()))
        .replace("{{ endpoint }}", &escape_html(backend.endpoint())))
}

pub async fn bert_home() -> Result<Html<String>, ApiError> {
    render_categorizer(Backend::Bert).map(Html)
}

pub async fn linear_svc_home() -> Result<Html<String>, ApiError> {
    render_categorizer(Backend::LinearSvc).map(Html)
}

/// Serve `/static/*path` from the embedded assets
pub async fn static_asset(Path(path): Path<String>) -> Response {
    if path == TEMPLATE {
        return ApiError::NotFound.into_response();
    }

    match <Assets as Embed>::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => ApiError::NotFound.into_response(),
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
