//! Interactive authorization integration tests
//!
//! Drives a real `OAuthAuthorizer` (portal bound to an OS-assigned port)
//! end to end, with the provider's token endpoint mocked by wiremock and
//! the operator's browser simulated with reqwest:
//!
//! - absent credential, portal, callback with the matching state, credential
//!   persisted, tool invoked, response correlated by id
//! - two requests while a session is pending share one listener
//! - a callback with the wrong state never exchanges or saves anything
//! - the authorization timeout holds even while the token endpoint hangs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use google_mcp::auth::authorizer::{generate_state, AuthorizationSession};
use google_mcp::auth::portal::Portal;
use google_mcp::auth::{
    Authorizer, Credential, CredentialManager, CredentialStore, OAuthAuthorizer, TokenClient,
};
use google_mcp::config::{AuthConfig, ClientCredentials};
use google_mcp::error::{kind_of, ErrorKind, Result};
use google_mcp::server::Dispatcher;
use google_mcp::tools::{ToolDescriptor, ToolHandler, ToolRegistry};

const SCOPE_A: &str = "https://www.googleapis.com/auth/drive";
const SCOPE_B: &str = "https://www.googleapis.com/auth/calendar";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct WhoAmI;

#[async_trait]
impl ToolHandler for WhoAmI {
    async fn invoke(&self, _arguments: Value, credential: &Credential) -> Result<Value> {
        Ok(json!({"token": credential.access_token}))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    token_path: std::path::PathBuf,
    authorizer: Arc<OAuthAuthorizer>,
    dispatcher: Arc<Dispatcher>,
}

fn harness(token_endpoint: &str) -> Harness {
    harness_with_timeout(token_endpoint, 20)
}

fn harness_with_timeout(token_endpoint: &str, authorization_timeout_seconds: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join(".token.json");
    let config = AuthConfig {
        listener_port: 0,
        open_browser: false,
        authorization_timeout_seconds,
        credential_path: token_path.clone(),
        authorization_endpoint: "https://accounts.example.test/o/oauth2/auth".to_string(),
        ..AuthConfig::default()
    };

    let mut registry = ToolRegistry::new();
    registry
        .register(ToolDescriptor::new(
            "drive_tool",
            "Needs drive",
            json!({"type": "object"}),
            [SCOPE_A],
            Arc::new(WhoAmI),
        ))
        .unwrap();
    registry
        .register(ToolDescriptor::new(
            "calendar_tool",
            "Needs calendar",
            json!({"type": "object"}),
            [SCOPE_B],
            Arc::new(WhoAmI),
        ))
        .unwrap();
    let registry = Arc::new(registry);

    let store = Arc::new(CredentialStore::from_config(&config));
    let token_client = TokenClient::new(
        token_endpoint,
        ClientCredentials {
            client_id: "test-client-id".to_string(),
            client_secret: None,
        },
    );
    let authorizer = Arc::new(OAuthAuthorizer::new(
        &config,
        token_client.clone(),
        Arc::clone(&store),
        registry.required_scopes(),
    ));
    let manager = Arc::new(CredentialManager::new(
        &config,
        store,
        token_client,
        authorizer.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        manager,
        Duration::from_secs(5),
    ));

    Harness {
        _dir: dir,
        token_path,
        authorizer,
        dispatcher,
    }
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "portal-access",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "portal-refresh",
            "scope": format!("{SCOPE_A} {SCOPE_B}")
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Waits until the portal is listening and returns its port.
async fn wait_for_portal(authorizer: &OAuthAuthorizer) -> u16 {
    for _ in 0..200 {
        if let Some(port) = authorizer.active_port() {
            return port;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("authorization portal never started");
}

/// Plays the operator: follows `/login` to learn the state, then delivers
/// the provider redirect to `/callback`.
async fn complete_consent(port: u16) -> reqwest::Response {
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let index = http
        .get(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap();
    assert!(index.text().await.unwrap().contains("/login"));

    let login = http
        .get(format!("http://127.0.0.1:{port}/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), reqwest::StatusCode::FOUND);
    let location = login
        .headers()
        .get(reqwest::header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let location = url::Url::parse(&location).unwrap();
    assert_eq!(location.host_str(), Some("accounts.example.test"));
    let query: std::collections::HashMap<String, String> =
        location.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "test-client-id");
    assert_eq!(query["redirect_uri"], format!("http://localhost:{port}/callback"));
    assert_eq!(query["access_type"], "offline");
    assert!(query["scope"].contains(SCOPE_A) && query["scope"].contains(SCOPE_B));

    http.get(format!("http://127.0.0.1:{port}/callback"))
        .query(&[("code", "the-code"), ("state", query["state"].as_str())])
        .send()
        .await
        .unwrap()
}

fn call(id: Value, tool: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": {}}
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_absent_credential_full_authorization_scenario() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    let h = harness(&format!("{}/token", server.uri()));

    let dispatcher = Arc::clone(&h.dispatcher);
    let pending = tokio::spawn(async move {
        dispatcher
            .handle_message(&call(json!("req-42"), "drive_tool"))
            .await
    });

    let port = wait_for_portal(&h.authorizer).await;
    let callback = complete_consent(port).await;
    assert_eq!(callback.status(), reqwest::StatusCode::OK);

    let line = tokio::time::timeout(Duration::from_secs(10), pending)
        .await
        .expect("tool call did not finish")
        .unwrap()
        .expect("expected a response");
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], "req-42");
    assert_eq!(
        response["result"]["structuredContent"]["token"],
        "portal-access"
    );

    let persisted = CredentialStore::file(&h.token_path)
        .load()
        .await
        .unwrap()
        .expect("credential should be persisted");
    assert_eq!(persisted.access_token, "portal-access");
    assert_eq!(persisted.refresh_token.as_deref(), Some("portal-refresh"));

    // The portal is torn down once the session resolves.
    assert_eq!(h.authorizer.active_port(), None);
}

#[tokio::test]
async fn test_two_requests_share_one_pending_session() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    let h = harness(&format!("{}/token", server.uri()));

    let first = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.handle_message(&call(json!(1), "drive_tool")).await })
    };
    let port = wait_for_portal(&h.authorizer).await;

    let second = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(
            async move { dispatcher.handle_message(&call(json!(2), "calendar_tool")).await },
        )
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.authorizer.active_port(), Some(port));

    assert_eq!(complete_consent(port).await.status(), reqwest::StatusCode::OK);

    let mut ids = Vec::new();
    for handle in [first, second] {
        let line = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert!(response.get("error").is_none(), "unexpected error: {response}");
        ids.push(response["id"].clone());
    }
    assert_eq!(ids, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges_or_saves() {
    use tower::ServiceExt;

    let server = MockServer::start().await;
    mount_token_endpoint(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join(".token.json");
    let store = Arc::new(CredentialStore::file(&token_path));
    let token_client = TokenClient::new(
        format!("{}/token", server.uri()),
        ClientCredentials {
            client_id: "test-client-id".to_string(),
            client_secret: None,
        },
    );
    let session = AuthorizationSession::new(
        generate_state(),
        "http://localhost:3838/callback".to_string(),
    );
    let (portal, outcome) = Portal::new(
        session,
        "https://accounts.example.test/auth".to_string(),
        token_client,
        store,
        [SCOPE_A.to_string()].into(),
    );

    let response = portal
        .router()
        .oneshot(
            axum::http::Request::builder()
                .uri("/callback?code=the-code&state=forged")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);

    let err = outcome.await.unwrap().unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::AuthorizationStateMismatch);
    assert!(!token_path.exists());
}

#[tokio::test]
async fn test_authorization_timeout_is_reported_to_caller() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuthConfig {
        listener_port: 0,
        open_browser: false,
        authorization_timeout_seconds: 1,
        credential_path: dir.path().join(".token.json"),
        ..AuthConfig::default()
    };
    let store = Arc::new(CredentialStore::from_config(&config));
    let token_client = TokenClient::new(
        "http://127.0.0.1:1/token",
        ClientCredentials {
            client_id: "id".to_string(),
            client_secret: None,
        },
    );
    let authorizer = Arc::new(OAuthAuthorizer::new(
        &config,
        token_client.clone(),
        Arc::clone(&store),
        [SCOPE_A.to_string()].into(),
    ));
    let manager = CredentialManager::new(&config, store, token_client, authorizer.clone());

    let err = manager
        .get_valid_credential(&[SCOPE_A.to_string()].into())
        .await
        .unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::AuthorizationTimeout);
    assert_eq!(authorizer.active_port(), None);
}

#[tokio::test]
async fn test_authorization_timeout_holds_while_token_endpoint_hangs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "too-late",
                    "expires_in": 3600,
                    "refresh_token": "too-late-refresh"
                }))
                .set_delay(Duration::from_secs(8)),
        )
        .mount(&server)
        .await;
    let h = harness_with_timeout(&format!("{}/token", server.uri()), 1);

    let started = std::time::Instant::now();
    let authorizer = Arc::clone(&h.authorizer);
    let pending = tokio::spawn(async move { authorizer.authorize().await });

    let port = wait_for_portal(&h.authorizer).await;
    let consent = tokio::spawn(complete_consent(port));

    let err = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("authorize ignored its timeout")
        .unwrap()
        .unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::AuthorizationTimeout);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(h.authorizer.active_port(), None);

    // The in-flight exchange is cancelled rather than persisted late.
    let _ = tokio::time::timeout(Duration::from_secs(5), consent).await;
    assert!(!h.token_path.exists());
}
