//! Linear pipeline tests against a small exported artifact

use finquery_classifiers::{linear_classifier, Classifier, LinearConfig, LinearPipeline, Predictor};
use std::path::PathBuf;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/intent_svc.json")
}

fn fixture_classifier() -> finquery_classifiers::LinearClassifier {
    linear_classifier(&LinearConfig {
        artifact: fixture_path(),
    })
}

#[tokio::test]
async fn test_predicts_intents() {
    let classifier = fixture_classifier();

    let cases = [
        ("How do I pay my credit card bill", "card_payment"),
        ("What is my account balance?", "balance"),
        ("current interest rates on a loan", "loan_rates"),
    ];

    for (query, expected) in cases {
        let result = classifier.classify(query).await.unwrap();
        assert_eq!(result.label, expected, "query: {}", query);
    }
}

#[tokio::test]
async fn test_label_is_one_of_classes() {
    let pipeline = LinearPipeline::from_file(fixture_path()).unwrap();
    let classes = pipeline.labels().to_vec();
    let classifier = fixture_classifier();

    for query in ["", "   ", "zzz qqq", "pay", "!!! ???", "balance loan card"] {
        let result = classifier.classify(query).await.unwrap();
        assert!(classes.contains(&result.label), "unexpected label {}", result.label);
    }
}

#[tokio::test]
async fn test_whitespace_and_case_do_not_change_prediction() {
    let classifier = fixture_classifier();

    let a = classifier.classify("Pay   MY Bill").await.unwrap();
    let b = classifier.classify("pay my bill").await.unwrap();
    let c = classifier.classify("\tPAY my\nbill  ").await.unwrap();

    assert_eq!(a.label, b.label);
    assert_eq!(b.label, c.label);
    assert!((a.score - b.score).abs() < 1e-6);
}

#[tokio::test]
async fn test_no_known_terms_falls_back_to_intercepts() {
    let classifier = fixture_classifier();
    let result = classifier.classify("zzz qqq").await.unwrap();
    // Highest intercept in the fixture
    assert_eq!(result.label, "balance");
}

#[tokio::test]
async fn test_missing_artifact() {
    let classifier = linear_classifier(&LinearConfig {
        artifact: PathBuf::from("/nonexistent/tuned_linear_svc_model.json"),
    });

    let err = classifier.classify("pay my bill").await.unwrap_err();
    assert!(err.to_string().contains("Model file not found"));
    assert!(!classifier.is_ready());
}

#[tokio::test]
async fn test_corrupt_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, b"{\"vectorizer\": ").unwrap();

    let classifier = linear_classifier(&LinearConfig { artifact: path });
    let err = classifier.classify("pay my bill").await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse linear artifact"));
}

#[tokio::test]
async fn test_incompatible_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(
        &path,
        r#"{
            "vectorizer": {"vocabulary": {"pay": 0, "bill": 1}, "idf": [1.0, 1.0]},
            "classifier": {"classes": ["a", "b", "c"], "coef": [[1.0], [1.0], [1.0]], "intercept": [0.0, 0.0, 0.0]}
        }"#,
    )
    .unwrap();

    let classifier = linear_classifier(&LinearConfig { artifact: path });
    assert!(classifier.classify("pay my bill").await.is_err());
}

#[tokio::test]
async fn test_warm_up_loads_model() {
    let classifier = fixture_classifier();
    assert!(!classifier.is_ready());
    classifier.warm_up().await.unwrap();
    assert!(classifier.is_ready());
    assert_eq!(classifier.name(), "linear-svc");
}
