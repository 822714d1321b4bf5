//! Contract tests for the HTTP provider client against a mock token
//! endpoint.
//!
//! Verifies the form fields each grant type sends and the error-body
//! handling on the way back.

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenforge_core::{
    Authority, DeviceCodePoll, HttpProviderClient, ProviderClient, RawProviderError, ScopeSet,
};

fn authority_for(server: &MockServer) -> Authority {
    Authority::new(server.uri(), "contoso.example", "client-1")
}

fn confidential_for(server: &MockServer) -> Authority {
    Authority::confidential(server.uri(), "contoso.example", "client-1", "s3cr3t")
}

fn token_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": "issued-token",
        "refresh_token": "issued-refresh",
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "User.Read openid"
    })
}

/// The refresh grant posts the expected form fields and parses the
/// response.
#[tokio::test]
async fn refresh_grant_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("refresh_token=rt-1"))
        .and(body_string_contains("scope=User.Read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let response = provider
        .redeem_refresh_token(&authority_for(&server), &ScopeSet::new(["User.Read"]), "rt-1")
        .await
        .unwrap();

    assert_eq!(response.access_token, "issued-token");
    assert_eq!(response.refresh_token.as_deref(), Some("issued-refresh"));
    assert_eq!(response.expires_in, 3600);
}

/// Provider error bodies surface as protocol errors with all fields.
#[tokio::test]
async fn error_body_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: The refresh token has expired.",
            "suberror": "bad_token"
        })))
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let err = provider
        .redeem_refresh_token(&authority_for(&server), &ScopeSet::new(["User.Read"]), "rt-1")
        .await
        .unwrap_err();

    match err {
        RawProviderError::Protocol { error, error_description, suberror } => {
            assert_eq!(error, "invalid_grant");
            assert!(error_description.unwrap().contains("AADSTS70008"));
            assert_eq!(suberror.as_deref(), Some("bad_token"));
        }
        RawProviderError::Transport(other) => panic!("expected protocol error, got {other}"),
    }
}

/// The device authorization endpoint returns a parsed challenge.
#[tokio::test]
async fn device_code_request_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/devicecode"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "dc-1",
            "user_code": "ABC-123",
            "verification_uri": "https://example/devicelogin",
            "expires_in": 900,
            "interval": 5,
            "message": "Go sign in."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let challenge = provider
        .request_device_code(&authority_for(&server), &ScopeSet::new(["User.Read"]))
        .await
        .unwrap();

    assert_eq!(challenge.user_code, "ABC-123");
    assert_eq!(challenge.verification_uri, "https://example/devicelogin");
    assert_eq!(challenge.expires_in, 900);
    assert_eq!(challenge.interval, 5);
}

/// Pending and slow-down poll responses map to poll outcomes, not errors.
#[tokio::test]
async fn device_poll_pending_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .and(body_string_contains("device_code"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "authorization_pending",
            "error_description": "The user has not yet completed sign-in."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "slow_down"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let authority = authority_for(&server);

    assert!(matches!(
        provider.poll_device_code(&authority, "dc-1").await.unwrap(),
        DeviceCodePoll::AuthorizationPending
    ));
    assert!(matches!(
        provider.poll_device_code(&authority, "dc-1").await.unwrap(),
        DeviceCodePoll::SlowDown
    ));
    assert!(matches!(
        provider.poll_device_code(&authority, "dc-1").await.unwrap(),
        DeviceCodePoll::Issued(_)
    ));
}

/// The authorization-code grant carries the PKCE verifier and redirect.
#[tokio::test]
async fn authorization_code_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains("code_verifier=verifier-1"))
        .and(body_string_contains("redirect_uri="))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let response = provider
        .redeem_authorization_code(
            &authority_for(&server),
            &ScopeSet::new(["User.Read"]),
            "auth-code-1",
            "verifier-1",
            "http://localhost:8400/callback",
        )
        .await
        .unwrap();

    assert_eq!(response.access_token, "issued-token");
}

/// The client-credentials grant sends the secret and the app-only scope.
#[tokio::test]
async fn client_credentials_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_secret=s3cr3t"))
        .and(body_string_contains("scope=https"))
        .and(body_string_contains(".default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let response = provider
        .client_credentials(&confidential_for(&server), "https://api.example.com/.default")
        .await
        .unwrap();

    assert_eq!(response.access_token, "issued-token");
}

/// The on-behalf-of grant sends the jwt-bearer assertion shape.
#[tokio::test]
async fn on_behalf_of_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso.example/oauth2/v2.0/token"))
        .and(body_string_contains("jwt-bearer"))
        .and(body_string_contains("assertion=inbound-token"))
        .and(body_string_contains("requested_token_use=on_behalf_of"))
        .and(body_string_contains("client_secret=s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProviderClient::new();
    let response = provider
        .on_behalf_of(
            &confidential_for(&server),
            &ScopeSet::new(["https://graph.example.com/.default"]),
            "inbound-token",
        )
        .await
        .unwrap();

    assert_eq!(response.access_token, "issued-token");
}

/// An unreachable provider surfaces a transport error.
#[tokio::test]
async fn unreachable_provider_is_transport_error() {
    // Port from a server that has already shut down.
    let server = MockServer::start().await;
    let authority = authority_for(&server);
    drop(server);

    let provider = HttpProviderClient::new();
    let err = provider
        .redeem_refresh_token(&authority, &ScopeSet::new(["User.Read"]), "rt-1")
        .await
        .unwrap_err();

    assert!(matches!(err, RawProviderError::Transport(_)));
}
