use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn provider_for(server: &MockServer, batch_size: u32) -> OllamaProvider {
    let address = server.address();
    let config = ProviderConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-model".to_string(),
        batch_size,
        ..ProviderConfig::default()
    };

    OllamaProvider::new(&config)
        .expect("Failed to create provider")
        .with_retry_attempts(1)
}

/// Answer each `/api/embed` call with `[len(text), index]` per input
fn echo_lengths(request: &Request) -> ResponseTemplate {
    let body: serde_json::Value =
        serde_json::from_slice(&request.body).expect("request should be json");
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .expect("input should be an array")
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let len = text.as_str().map_or(0, str::len);
            vec![len as f32, i as f32]
        })
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
}

#[test]
fn provider_configuration() {
    let config = ProviderConfig {
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..ProviderConfig::default()
    };
    let provider = OllamaProvider::new(&config).expect("Failed to create provider");

    assert_eq!(provider.model, "test-model");
    assert_eq!(provider.batch_size, 128);
    assert_eq!(provider.base_url.host_str(), Some("test-host"));
    assert_eq!(provider.base_url.port(), Some(1234));
    assert_eq!(provider.model_name(), "test-model");
}

#[test]
fn builder_methods() {
    let provider = OllamaProvider::new(&ProviderConfig::default())
        .expect("Failed to create provider")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(provider.http.retry_attempts(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_sends_model_and_inputs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "input": ["alpha", "beta"]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, 16);
    let embeddings = provider
        .embed(&["alpha".to_string(), "beta".to_string()])
        .await
        .expect("embedding should succeed");

    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sub_batches_preserve_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(echo_lengths)
        .expect(3)
        .mount(&server)
        .await;

    let provider = provider_for(&server, 2);
    let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
    let embeddings = provider
        .embed(&texts)
        .await
        .expect("embedding should succeed");

    let lengths: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
    assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batch_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider_for(&server, 4);
    let embeddings = provider.embed(&[]).await.expect("empty batch is fine");
    assert!(embeddings.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_fails_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = provider_for(&server, 4);
    let result = provider.embed(&["alpha".to_string()]).await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, 4).with_retry_attempts(3);
    let result = provider.embed(&["alpha".to_string()]).await;

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0]] })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, 4);
    let result = provider
        .embed(&["alpha".to_string(), "beta".to_string()])
        .await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "other-model" }, { "name": "test-model", "size": 42 }]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, 4);
    let checked = tokio::task::spawn_blocking(move || {
        let ok = provider.health_check();
        let missing = OllamaProvider {
            model: "absent".to_string(),
            ..provider
        }
        .health_check();
        (ok, missing)
    })
    .await
    .expect("task should not panic");

    assert!(checked.0.is_ok());
    assert!(checked.1.is_err());
}
