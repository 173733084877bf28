//! Token exchange and installation lookup against a stubbed GitHub.

use chrono::{Duration, Utc};
use factory_github_app::{
    AppIdentity, AuthError, ClientConfig, CredentialClient, PrivateKey, TokenCache,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRIVATE_KEY: &[u8] = include_bytes!("fixtures/app_key.pem");

fn client_for(server: &MockServer) -> CredentialClient {
    let identity = AppIdentity::new("12345", Some(PrivateKey::Pem(PRIVATE_KEY.to_vec())));
    CredentialClient::new(
        identity,
        Arc::new(TokenCache::default()),
        ClientConfig::default().with_api_url(server.uri()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_token_exchange_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/app/installations/42/access_tokens"))
        .and(header_regex("authorization", "^Bearer [^.]+\\.[^.]+\\.[^.]+$"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "ghs_first",
            "expires_at": (Utc::now() + Duration::hours(1)).to_rfc3339()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let first = client.installation_token("42").await.unwrap();
    let second = client.installation_token("42").await.unwrap();

    assert_eq!(first.token, "ghs_first");
    assert_eq!(first, second);
    assert_eq!(first.installation_id, "42");
}

#[tokio::test]
async fn test_explicit_expiry_is_used() {
    let server = MockServer::start().await;
    let expires_at = "2035-06-01T10:00:00Z";

    Mock::given(method("POST"))
        .and(path("/app/installations/7/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "ghs_explicit",
            "expires_at": expires_at
        })))
        .mount(&server)
        .await;

    let token = client_for(&server).installation_token("7").await.unwrap();
    assert_eq!(token.expires_at.to_rfc3339(), "2035-06-01T10:00:00+00:00");
}

#[tokio::test]
async fn test_fallback_lifetime_without_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/app/installations/7/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": "ghs_x" })))
        .mount(&server)
        .await;

    let identity = AppIdentity::new("12345", Some(PrivateKey::Pem(PRIVATE_KEY.to_vec())));
    let client = CredentialClient::new(
        identity,
        Arc::new(TokenCache::default()),
        ClientConfig::default()
            .with_api_url(server.uri())
            .with_fallback_token_lifetime(Duration::seconds(1800)),
    )
    .unwrap();

    let before = Utc::now();
    let token = client.installation_token("7").await.unwrap();
    let after = Utc::now();

    assert!(token.expires_at >= before + Duration::seconds(1800));
    assert!(token.expires_at <= after + Duration::seconds(1800));
}

#[tokio::test]
async fn test_short_lived_token_is_refetched() {
    let server = MockServer::start().await;

    // Expires inside the renewal margin, so never served from cache
    Mock::given(method("POST"))
        .and(path("/app/installations/9/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "ghs_short",
            "expires_at": (Utc::now() + Duration::seconds(120)).to_rfc3339()
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.installation_token("9").await.unwrap();
    client.installation_token("9").await.unwrap();
}

#[tokio::test]
async fn test_expired_token_rejected() {
    for expires_at in ["2001-01-01T00:00:00Z", "-262143-01-01T00:00:00Z"] {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/app/installations/9/access_tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_stale",
                "expires_at": expires_at
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.installation_token("9").await.unwrap_err();

        assert!(
            matches!(err, AuthError::InvalidResponse { .. }),
            "{expires_at}: {err:?}"
        );
        assert!(client.cache().is_empty().await);
    }
}

#[tokio::test]
async fn test_fallback_lifetime_out_of_range() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/app/installations/7/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": "ghs_x" })))
        .mount(&server)
        .await;

    let identity = AppIdentity::new("12345", Some(PrivateKey::Pem(PRIVATE_KEY.to_vec())));
    let client = CredentialClient::new(
        identity,
        Arc::new(TokenCache::default()),
        ClientConfig::default()
            .with_api_url(server.uri())
            .with_fallback_token_lifetime(Duration::days(365 * 1_000_000)),
    )
    .unwrap();

    let err = client.installation_token("7").await.unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)));
    assert!(client.cache().is_empty().await);
}

#[tokio::test]
async fn test_failed_exchange_leaves_cache_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/app/installations/42/access_tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "A JSON web token could not be decoded"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client.installation_token("42").await.unwrap_err();
    match &err {
        AuthError::RemoteAuth { status, body, .. } => {
            assert_eq!(status.as_u16(), 401);
            assert!(body.contains("could not be decoded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.cache().is_empty().await);

    // Not retried internally; the next call goes back to GitHub
    assert!(client.installation_token("42").await.is_err());
}

#[tokio::test]
async fn test_missing_identity_is_configuration_error() {
    let server = MockServer::start().await;
    let client = CredentialClient::new(
        AppIdentity::new("", None),
        Arc::new(TokenCache::default()),
        ClientConfig::default().with_api_url(server.uri()),
    )
    .unwrap();

    let err = client.installation_token("42").await.unwrap_err();
    assert!(matches!(err, AuthError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_cache_forces_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/app/installations/42/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "ghs_again",
            "expires_at": (Utc::now() + Duration::hours(1)).to_rfc3339()
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.installation_token("42").await.unwrap();
    client.clear_cache().await;
    client.installation_token("42").await.unwrap();
}

#[tokio::test]
async fn test_resolve_installation() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/ohdsi/factory/installation"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 987654,
            "account": { "login": "ohdsi" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server)
        .resolve_installation("ohdsi/factory")
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some("987654"));
}

#[tokio::test]
async fn test_resolve_uninstalled_repository() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/ohdsi/elsewhere/installation"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found"
        })))
        .mount(&server)
        .await;

    let id = client_for(&server)
        .resolve_installation("ohdsi/elsewhere")
        .await
        .unwrap();
    assert_eq!(id, None);
}

#[tokio::test]
async fn test_resolve_server_error_carries_context() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/ohdsi/factory/installation"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .resolve_installation("ohdsi/factory")
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    assert!(err.to_string().contains("ohdsi/factory"));
}
