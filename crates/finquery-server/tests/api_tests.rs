//! HTTP API tests driving the router in-process

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use finquery_classifiers::{
    ArtifactLoader, ClassificationResult, Classifier, LazyClassifier, LinearArtifactLoader, LinearConfig,
    LinearPipeline,
};
use finquery_core::{Error, Result};
use finquery_server::{create_router, AppState, ServerConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Classifier returning a fixed label or a fixed error
struct MockClassifier {
    name: String,
    outcome: std::result::Result<String, String>,
    latency: Option<Duration>,
    call_count: AtomicU32,
    last_query: std::sync::Mutex<Option<String>>,
}

impl MockClassifier {
    fn labelling(label: &str) -> Self {
        Self {
            name: "mock".to_string(),
            outcome: Ok(label.to_string()),
            latency: None,
            call_count: AtomicU32::new(0),
            last_query: std::sync::Mutex::new(None),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::labelling("unused")
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(text.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match &self.outcome {
            Ok(label) => Ok(ClassificationResult::new(label.clone(), 1.0)),
            Err(message) => Err(Error::artifact(message.clone())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn router_with(
    config: ServerConfig,
    bert: Arc<MockClassifier>,
    linear: Arc<MockClassifier>,
) -> Router {
    create_router(AppState::with_classifiers(config, bert, linear))
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_categorize_routes_to_backend() {
    let bert = Arc::new(MockClassifier::labelling("card_payment"));
    let linear = Arc::new(MockClassifier::labelling("balance"));
    let app = router_with(ServerConfig::default(), bert.clone(), linear.clone());

    let response = app
        .clone()
        .oneshot(post_form("/api/categorize/", "query=How+do+I+pay+my+credit+card+bill"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({"category": "card_payment"}));
    assert_eq!(bert.last_query().as_deref(), Some("How do I pay my credit card bill"));

    let response = app
        .oneshot(post_form("/api/linear-svc/categorize/", "query=what%27s+my+balance"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["category"], "balance");

    assert_eq!(bert.call_count(), 1);
    assert_eq!(linear.call_count(), 1);
}

#[tokio::test]
async fn test_non_post_is_405() {
    let bert = Arc::new(MockClassifier::labelling("card_payment"));
    let app = router_with(
        ServerConfig::default(),
        bert.clone(),
        Arc::new(MockClassifier::labelling("balance")),
    );

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let request = Request::builder()
            .method(method)
            .uri("/api/categorize/?query=pay+my+bill")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(response).await["error"], "Only POST requests allowed");
    }

    assert_eq!(bert.call_count(), 0);
}

#[tokio::test]
async fn test_missing_or_empty_query_is_400() {
    let linear = Arc::new(MockClassifier::labelling("balance"));
    let app = router_with(
        ServerConfig::default(),
        Arc::new(MockClassifier::labelling("card_payment")),
        linear.clone(),
    );

    for body in ["", "query=", "other=pay+my+bill"] {
        let response = app
            .clone()
            .oneshot(post_form("/api/linear-svc/categorize/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {:?}", body);
        assert_eq!(json_body(response).await["error"], "No query provided");
    }

    // JSON bodies are not form data
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/linear-svc/categorize/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query": "pay my bill"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(linear.call_count(), 0);
}

#[tokio::test]
async fn test_whitespace_query_reaches_classifier() {
    let bert = Arc::new(MockClassifier::labelling("card_payment"));
    let app = router_with(
        ServerConfig::default(),
        bert.clone(),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app
        .oneshot(post_form("/api/categorize/", "query=+++"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bert.call_count(), 1);
}

#[tokio::test]
async fn test_repeated_query_field_uses_last_value() {
    let bert = Arc::new(MockClassifier::labelling("card_payment"));
    let app = router_with(
        ServerConfig::default(),
        bert.clone(),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app
        .clone()
        .oneshot(post_form("/api/categorize/", "query=a&query=pay+my+bill"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bert.last_query().as_deref(), Some("pay my bill"));

    let response = app
        .oneshot(post_form("/api/categorize/", "query=pay+my+bill&query="))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(bert.call_count(), 1);
}

fn post_multipart(uri: &str, boundary: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_multipart_form_query() {
    let linear = Arc::new(MockClassifier::labelling("card_payment"));
    let app = router_with(
        ServerConfig::default(),
        Arc::new(MockClassifier::labelling("balance")),
        linear.clone(),
    );

    let body = "--XYZ\r\n\
        Content-Disposition: form-data; name=\"source\"\r\n\r\n\
        web\r\n\
        --XYZ\r\n\
        Content-Disposition: form-data; name=\"query\"\r\n\r\n\
        How do I pay my credit card bill\r\n\
        --XYZ--\r\n";
    let response = app
        .clone()
        .oneshot(post_multipart("/api/linear-svc/categorize/", "XYZ", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["category"], "card_payment");
    assert_eq!(
        linear.last_query().as_deref(),
        Some("How do I pay my credit card bill")
    );

    let body = "--XYZ\r\n\
        Content-Disposition: form-data; name=\"source\"\r\n\r\n\
        web\r\n\
        --XYZ--\r\n";
    let response = app
        .oneshot(post_multipart("/api/linear-svc/categorize/", "XYZ", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(linear.call_count(), 1);
}

#[tokio::test]
async fn test_classifier_error_is_500_and_server_keeps_serving() {
    let bert = Arc::new(MockClassifier::failing("Model file not found: models/missing.json"));
    let app = router_with(
        ServerConfig::default(),
        bert,
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app
        .clone()
        .oneshot(post_form("/api/categorize/", "query=pay+my+bill"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("Model file not found: models/missing.json"), "{}", error);

    let response = app
        .oneshot(post_form("/api/linear-svc/categorize/", "query=pay+my+bill"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_error_details_can_be_hidden() {
    let config = ServerConfig {
        expose_error_details: false,
        ..Default::default()
    };
    let app = router_with(
        config,
        Arc::new(MockClassifier::failing("secret path /srv/models")),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app
        .oneshot(post_form("/api/categorize/", "query=pay+my+bill"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Internal server error");
}

#[tokio::test]
async fn test_inference_timeout() {
    let config = ServerConfig {
        inference_timeout_ms: Some(20),
        ..Default::default()
    };
    let app = router_with(
        config,
        Arc::new(MockClassifier::labelling("card_payment").with_latency(Duration::from_secs(5))),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app
        .oneshot(post_form("/api/categorize/", "query=pay+my+bill"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "operation timed out");
}

#[tokio::test]
async fn test_body_limit() {
    let config = ServerConfig {
        max_body_bytes: 32,
        ..Default::default()
    };
    let bert = Arc::new(MockClassifier::labelling("card_payment"));
    let app = router_with(config, bert.clone(), Arc::new(MockClassifier::labelling("balance")));

    let body = format!("query={}", "a".repeat(100));
    let response = app.oneshot(post_form("/api/categorize/", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(bert.call_count(), 0);
}

#[tokio::test]
async fn test_pages() {
    let app = router_with(
        ServerConfig::default(),
        Arc::new(MockClassifier::labelling("card_payment")),
        Arc::new(MockClassifier::labelling("balance")),
    );

    for (uri, model, endpoint) in [
        ("/", "BERT", "/api/categorize/"),
        ("/bert/", "BERT", "/api/categorize/"),
        ("/linear-svc/", "LinearSVC", "/api/linear-svc/categorize/"),
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = text_body(response).await;
        assert!(html.contains(&format!("<strong>{}</strong>", model)), "{}", uri);
        assert!(html.contains(&format!("data-endpoint=\"{}\"", endpoint)), "{}", uri);
    }

    let response = app.clone().oneshot(get("/static/categorizer.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.contains("javascript"), "{}", content_type);

    let response = app.oneshot(get("/static/missing.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let app = router_with(
        ServerConfig::default(),
        Arc::new(MockClassifier::labelling("card_payment")),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app.oneshot(get("/api/unknown/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Not found");
}

#[tokio::test]
async fn test_metrics_without_exporter() {
    let app = router_with(
        ServerConfig::default(),
        Arc::new(MockClassifier::labelling("card_payment")),
        Arc::new(MockClassifier::labelling("balance")),
    );

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

fn fixture_artifact() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../finquery-classifiers/tests/fixtures/intent_svc.json")
}

#[tokio::test]
async fn test_end_to_end_linear_svc() {
    let config = ServerConfig {
        classifiers: finquery_classifiers::ClassifierConfig {
            linear: LinearConfig {
                artifact: fixture_artifact(),
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let app = create_router(AppState::new(config));

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    let health = json_body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["models"]["linear_svc"], false);
    assert_eq!(health["models"]["bert"], false);

    let response = app
        .clone()
        .oneshot(post_form(
            "/api/linear-svc/categorize/",
            "query=How+do+I+pay+my+credit+card+bill",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["category"], "card_payment");

    let response = app.oneshot(get("/health")).await.unwrap();
    let health = json_body(response).await;
    assert_eq!(health["models"]["linear_svc"], true);
}

#[tokio::test]
async fn test_end_to_end_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        classifiers: finquery_classifiers::ClassifierConfig {
            linear: LinearConfig {
                artifact: dir.path().join("tuned_linear_svc_model.json"),
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let app = create_router(AppState::new(config));

    let response = app
        .oneshot(post_form("/api/linear-svc/categorize/", "query=pay+my+bill"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("Model file not found"), "{}", error);
}

/// Linear artifact loader that takes its time
struct SlowLinearLoader {
    inner: LinearArtifactLoader,
    delay: Duration,
    loads: Arc<AtomicUsize>,
}

impl ArtifactLoader for SlowLinearLoader {
    type Model = LinearPipeline;

    fn load(&self) -> Result<LinearPipeline> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.load()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_requests_do_not_restart_model_load() {
    let loads = Arc::new(AtomicUsize::new(0));
    let linear = Arc::new(LazyClassifier::new(
        "linear-svc",
        SlowLinearLoader {
            inner: LinearArtifactLoader::new(fixture_artifact()),
            delay: Duration::from_millis(300),
            loads: Arc::clone(&loads),
        },
    ));
    let config = ServerConfig {
        inference_timeout_ms: Some(100),
        ..Default::default()
    };
    let app = create_router(AppState::with_classifiers(
        config,
        Arc::new(MockClassifier::labelling("card_payment")),
        linear.clone(),
    ));

    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(post_form("/api/linear-svc/categorize/", "query=pay+my+bill"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "operation timed out");
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(linear.is_loaded());

    let response = app
        .oneshot(post_form(
            "/api/linear-svc/categorize/",
            "query=How+do+I+pay+my+credit+card+bill",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["category"], "card_payment");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
