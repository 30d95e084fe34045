use super::*;
use serde_json::json;
use serial_test::serial;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ProviderConfig {
    let address = server.address();
    ProviderConfig {
        kind: crate::config::ProviderKind::OpenAi,
        host: address.ip().to_string(),
        port: address.port(),
        model: "text-embedding-ada-002".to_string(),
        batch_size: 8,
        ..ProviderConfig::default()
    }
}

#[test]
fn reorders_by_index() {
    let data = vec![
        EmbeddingData {
            index: 1,
            embedding: vec![2.0],
        },
        EmbeddingData {
            index: 0,
            embedding: vec![1.0],
        },
    ];

    let ordered = order_by_index(data, 2).expect("indices are complete");
    assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
}

#[test]
fn rejects_duplicate_or_missing_indices() {
    let duplicate = vec![
        EmbeddingData {
            index: 0,
            embedding: vec![1.0],
        },
        EmbeddingData {
            index: 0,
            embedding: vec![2.0],
        },
    ];
    assert!(order_by_index(duplicate, 2).is_err());

    let out_of_range = vec![EmbeddingData {
        index: 3,
        embedding: vec![1.0],
    }];
    assert!(order_by_index(out_of_range, 1).is_err());

    assert!(order_by_index(Vec::new(), 1).is_err());
}

#[test]
#[serial]
fn missing_api_key_is_an_error() {
    let config = ProviderConfig {
        api_key_env: "KNOWLEDGE_RAG_TEST_MISSING_KEY".to_string(),
        ..ProviderConfig::default()
    };
    // SAFETY: serialized with every other test that touches the environment
    unsafe { env::remove_var(&config.api_key_env) };

    assert!(OpenAiProvider::new(&config).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_bearer_token_and_orders_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
            ],
            "model": "text-embedding-ada-002"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_api_key(&config_for(&server), "sk-test".to_string())
        .expect("provider should build")
        .with_retry_attempts(1);

    let embeddings = provider
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .expect("embedding should succeed");

    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_fails_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_api_key(&config_for(&server), "bad".to_string())
        .expect("provider should build")
        .with_retry_attempts(3);

    let result = provider.embed(&["first".to_string()]).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}
