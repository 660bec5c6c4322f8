//! HTTP routes and handlers

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Form, Json, Router,
};
use finquery_core::Error;
use serde::Serialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{ApiError, REDACTED_ERROR};
use crate::pages;
use crate::state::{AppState, Backend};

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(pages::bert_home))
        .route("/bert/", get(pages::bert_home))
        .route("/linear-svc/", get(pages::linear_svc_home))
        .route("/static/*path", get(pages::static_asset))
        .route("/api/categorize/", any(categorize_bert))
        .route("/api/linear-svc/categorize/", any(categorize_linear_svc))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Form field carrying the text to classify
const QUERY_FIELD: &str = "query";

#[derive(Debug, Serialize)]
struct CategoryResponse {
    category: String,
}

async fn categorize_bert(State(state): State<AppState>, method: Method, request: Request) -> Response {
    categorize(state, Backend::Bert, method, request).await
}

async fn categorize_linear_svc(
    State(state): State<AppState>,
    method: Method,
    request: Request,
) -> Response {
    categorize(state, Backend::LinearSvc, method, request).await
}

/// Shared categorize handler: POST-only, form field `query`, JSON reply
async fn categorize(state: AppState, backend: Backend, method: Method, request: Request) -> Response {
    let request_id = Uuid::new_v4();
    let result = handle_categorize(&state, backend, method, request, request_id).await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    metrics::counter!(
        "finquery_requests_total",
        "backend" => backend.label(),
        "status" => status.as_str().to_owned()
    )
    .increment(1);

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_categorize(
    state: &AppState,
    backend: Backend,
    method: Method,
    request: Request,
    request_id: Uuid,
) -> Result<CategoryResponse, ApiError> {
    if method != Method::POST {
        debug!(%request_id, %backend, %method, "Rejected non-POST categorize request");
        return Err(ApiError::MethodNotAllowed);
    }

    let query = read_query(state, request, request_id).await?;
    if query.is_empty() {
        return Err(ApiError::MissingQuery);
    }

    let classifier = state.classifier(backend);
    let outcome = match state.config.inference_timeout() {
        Some(limit) => tokio::time::timeout(limit, classifier.classify(&query))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout)),
        None => classifier.classify(&query).await,
    };

    match outcome {
        Ok(result) => {
            metrics::histogram!(
                "finquery_classification_latency_us",
                "backend" => backend.label()
            )
            .record(result.latency_us as f64);

            info!(
                %request_id,
                %backend,
                category = %result.label,
                score = result.score,
                latency_us = result.latency_us,
                "Categorized query"
            );

            Ok(CategoryResponse {
                category: result.label,
            })
        }
        Err(e) => {
            error!(%request_id, %backend, error = %e, "Categorization failed");

            let message = if state.config.expose_error_details {
                e.to_string()
            } else {
                REDACTED_ERROR.to_string()
            };
            Err(ApiError::Internal(message))
        }
    }
}

/// Extract the `query` field from a urlencoded or multipart form body.
///
/// When the field repeats, the last value wins. A body that is neither form
/// kind, or is malformed, yields an empty query.
async fn read_query(
    state: &AppState,
    request: Request,
    request_id: Uuid,
) -> Result<String, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        return read_multipart_query(state, request, request_id).await;
    }

    match Form::<Vec<(String, String)>>::from_request(request, state).await {
        Ok(Form(pairs)) => Ok(pairs
            .into_iter()
            .rev()
            .find(|(name, _)| name == QUERY_FIELD)
            .map(|(_, value)| value)
            .unwrap_or_default()),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ApiError::PayloadTooLarge)
        }
        Err(rejection) => {
            debug!(%request_id, "Unreadable form body: {}", rejection);
            Ok(String::new())
        }
    }
}

async fn read_multipart_query(
    state: &AppState,
    request: Request,
    request_id: Uuid,
) -> Result<String, ApiError> {
    let mut multipart = match Multipart::from_request(request, state).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(%request_id, "Unreadable multipart body: {}", rejection);
            return Ok(String::new());
        }
    };

    let mut query = String::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(ApiError::PayloadTooLarge),
            Err(e) => {
                debug!(%request_id, "Malformed multipart body: {}", e);
                return Ok(String::new());
            }
        };

        if field.name() != Some(QUERY_FIELD) {
            continue;
        }
        match field.text().await {
            Ok(text) => query = text,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(ApiError::PayloadTooLarge),
            Err(e) => {
                debug!(%request_id, "Malformed multipart field: {}", e);
                return Ok(String::new());
            }
        }
    }

    Ok(query)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "models": {
            "bert": state.bert.is_ready(),
            "linear_svc": state.linear.is_ready(),
        }
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics exporter not installed").into_response(),
    }
}

async fn fallback() -> ApiError {
    ApiError::NotFound
}
