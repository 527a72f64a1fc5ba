use super::*;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn mock_config(server: &MockServer) -> OllamaConfig {
    OllamaConfig {
        protocol: "http".to_string(),
        host: server.address().ip().to_string(),
        port: server.address().port(),
        model: "test-model".to_string(),
        batch_size: 2,
        embedding_dimension: 64,
    }
}

fn mock_client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&mock_config(server))
        .expect("should create client")
        .with_retry_attempts(2)
        .with_retry_delay(Duration::from_millis(1))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model_name(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.expected_dimension, 384);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_retry_delay(Duration::from_millis(10));

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.retry_base_delay, Duration::from_millis(10));

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1, "at least one attempt is always made");
}

#[tokio::test]
async fn embed_returns_vector_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-model", "input": ["hello"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.5, 0.25, 1.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let embedding = client.embed("hello").await.expect("embedding should succeed");

    assert_eq!(embedding, vec![0.5, 0.25, 1.0]);
}

#[tokio::test]
async fn embed_rejects_empty_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[]] })))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = client.embed("hello").await;

    assert!(matches!(result, Err(ProviderError::EmptyEmbedding)));
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = client.embed("hello").await;

    assert!(matches!(result, Err(ProviderError::Request(_))));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = client.embed("hello").await;

    assert!(result.is_err());
}

#[tokio::test]
async fn batch_requests_are_split_by_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["a", "b"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0], [2.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["c"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[3.0]] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let embeddings = client
        .embed_batch(&texts)
        .await
        .expect("batch should succeed");

    assert_eq!(embeddings, vec![vec![1.0], vec![2.0], vec![3.0]]);
}

#[tokio::test]
async fn batch_fails_when_a_request_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let err = client
        .embed_batch(&texts)
        .await
        .expect_err("rejected request should fail the batch");

    assert!(matches!(err, ProviderError::Request(_)));
}

#[tokio::test]
async fn ping_reaches_version_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "0.5.1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = tokio::task::spawn_blocking(move || client.ping())
        .await
        .expect("task should join");

    assert!(result.is_ok());
}

#[tokio::test]
async fn ping_fails_without_a_server() {
    let server = MockServer::start().await;
    let client = mock_client(&server);
    drop(server);

    let result = tokio::task::spawn_blocking(move || client.ping())
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test]
async fn health_check_requires_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "other-model" }]
        })))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    assert!(result.is_err(), "missing model should fail the health check");
}

#[tokio::test]
async fn health_check_accepts_implicit_latest_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "test-model:latest", "size": 1024 }]
        })))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    assert!(result.is_ok(), "test-model should match test-model:latest");
}

#[tokio::test]
async fn list_models_returns_installed_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "a:latest" }, { "name": "b:7b" }]
        })))
        .mount(&server)
        .await;

    let client = mock_client(&server);
    let models = tokio::task::spawn_blocking(move || client.list_models())
        .await
        .expect("task should join")
        .expect("listing should succeed");

    assert_eq!(models, vec!["a:latest", "b:7b"]);
}

#[test]
fn model_names_ignore_the_latest_tag() {
    assert!(same_model("nomic-embed-text:latest", "nomic-embed-text"));
    assert!(same_model("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(!same_model("nomic-embed-text:v1.5", "nomic-embed-text"));
}
