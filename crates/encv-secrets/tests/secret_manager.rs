//! Integration tests for `SecretManagerClient` using wiremock HTTP mocks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use encv_secrets::{SecretError, SecretManagerClient, SecretStore, StaticToken};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> SecretManagerClient<StaticToken> {
    SecretManagerClient::with_base_url(
        StaticToken("test-token".to_string()),
        Some("encv-prod".to_string()),
        30,
        base_url,
    )
    .expect("client construction should not fail")
}

#[tokio::test]
async fn access_secret_decodes_latest_payload() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "name": "projects/encv-prod/secrets/encv-api/versions/4",
        "payload": {"data": STANDARD.encode(r#"{"api_key":"abc"}"#)}
    });

    Mock::given(method("GET"))
        .and(path("/projects/encv-prod/secrets/encv-api/versions/latest:access"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let payload = client.access_secret("encv-api").await.expect("should read secret");

    assert_eq!(payload, r#"{"api_key":"abc"}"#);
}

#[tokio::test]
async fn missing_secret_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.access_secret("nope").await.unwrap_err();

    assert!(matches!(err, SecretError::NotFound(ref n) if n == "nope"), "got: {err:?}");
}

#[tokio::test]
async fn permission_denied_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.access_secret("encv-api").await.unwrap_err();

    assert!(matches!(err, SecretError::Auth(_)), "got: {err:?}");
}

#[tokio::test]
async fn invalid_base64_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"payload": {"data": "%%% not base64"}})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.access_secret("encv-api").await.unwrap_err();

    assert!(matches!(err, SecretError::Decode { .. }), "got: {err:?}");
}
