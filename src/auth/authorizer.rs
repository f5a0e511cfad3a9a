//! Interactive OAuth2 authorization-code flow
//!
//! [`OAuthAuthorizer`] binds the loopback [`Portal`], presents the
//! authorization URL to the operator, and waits (bounded) for the provider
//! to redirect back with a code. The portal is torn down on every exit path,
//! including when the waiting future is dropped.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::credential::Credential;
use super::portal::Portal;
use super::store::CredentialStore;
use super::token_client::TokenClient;
use crate::config::AuthConfig;
use crate::error::{GoogleMcpError, Result};

// ---------------------------------------------------------------------------
// AuthorizationSession
// ---------------------------------------------------------------------------

/// Completion state of an [`AuthorizationSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the provider redirect.
    Pending,
    /// A valid callback arrived and its code is being exchanged.
    Exchanging,
    /// A credential was obtained and persisted.
    Succeeded,
    /// The session was rejected, timed out, or the exchange failed.
    Failed(String),
}

/// One browser-driven authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    /// Random nonce the provider must echo back unchanged.
    pub state: String,
    /// Redirect URI registered with the provider for this attempt.
    pub redirect_uri: String,
    /// When the session began.
    pub started_at: DateTime<Utc>,
    /// Completion state.
    pub status: SessionStatus,
}

impl AuthorizationSession {
    /// Starts a pending session.
    pub fn new(state: String, redirect_uri: String) -> Self {
        Self {
            state,
            redirect_uri,
            started_at: Utc::now(),
            status: SessionStatus::Pending,
        }
    }
}

/// Generates a fresh `state` nonce: 16 random bytes, base64url without padding.
pub fn generate_state() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Authorizer
// ---------------------------------------------------------------------------

/// Produces a brand-new credential when none exists or none can be refreshed.
#[async_trait]
pub trait Authorizer: Send + Sync + Debug {
    /// Runs one authorization attempt and returns the persisted credential.
    async fn authorize(&self) -> Result<Credential>;
}

/// Authorization-code flow against Google with a loopback redirect.
#[derive(Debug)]
pub struct OAuthAuthorizer {
    token_client: TokenClient,
    store: Arc<CredentialStore>,
    scopes: BTreeSet<String>,
    authorization_endpoint: String,
    listener_port: u16,
    timeout: Duration,
    open_browser: bool,
    active: Mutex<()>,
    bound_port: AtomicU16,
}

impl OAuthAuthorizer {
    /// Creates an authorizer requesting `scopes`.
    ///
    /// `scopes` is the fixed superset covering every registered tool.
    pub fn new(
        config: &AuthConfig,
        token_client: TokenClient,
        store: Arc<CredentialStore>,
        scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            token_client,
            store,
            scopes,
            authorization_endpoint: config.authorization_endpoint.clone(),
            listener_port: config.listener_port,
            timeout: config.authorization_timeout(),
            open_browser: config.open_browser,
            active: Mutex::new(()),
            bound_port: AtomicU16::new(0),
        }
    }

    /// Port of the currently running portal, if a session is pending.
    ///
    /// Useful when the configured port is `0` and the OS picks one.
    pub fn active_port(&self) -> Option<u16> {
        match self.bound_port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    /// Builds the provider authorization URL for one session.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        build_authorization_url(
            &self.authorization_endpoint,
            self.token_client.client_id(),
            redirect_uri,
            &self.scopes,
            state,
        )
    }
}

/// Builds the provider authorization URL.
///
/// # Examples
///
/// ```
/// use google_mcp::auth::authorizer::build_authorization_url;
///
/// let url = build_authorization_url(
///     "https://accounts.google.com/o/oauth2/auth",
///     "client",
///     "http://localhost:3838/callback",
///     &["scope-a".to_string()].into(),
///     "nonce",
/// )
/// .unwrap();
/// assert!(url.contains("state=nonce"));
/// assert!(url.contains("access_type=offline"));
/// ```
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &BTreeSet<String>,
    state: &str,
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint).map_err(|e| {
        GoogleMcpError::Config(format!("invalid authorization endpoint URL: {e}"))
    })?;

    let scope = scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("response_type", "code");
        query.append_pair("scope", &scope);
        query.append_pair("state", state);
        query.append_pair("access_type", "offline");
        query.append_pair("prompt", "consent");
    }

    Ok(url.to_string())
}

/// Stops the portal when dropped.
struct PortalGuard<'a> {
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    bound_port: &'a AtomicU16,
}

impl Drop for PortalGuard<'_> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.server.abort();
        self.bound_port.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Authorizer for OAuthAuthorizer {
    async fn authorize(&self) -> Result<Credential> {
        let _active = self
            .active
            .try_lock()
            .map_err(|_| GoogleMcpError::AuthorizationInProgress)?;

        let listener = TcpListener::bind(("127.0.0.1", self.listener_port))
            .await
            .map_err(|e| {
                GoogleMcpError::Authorization(format!(
                    "failed to bind authorization listener on port {}: {e}",
                    self.listener_port
                ))
            })?;
        let port = listener.local_addr()?.port();

        let redirect_uri = format!("http://localhost:{port}/callback");
        let session = AuthorizationSession::new(generate_state(), redirect_uri.clone());
        let authorization_url = self.authorization_url(&redirect_uri, &session.state)?;

        let (portal, outcome) = Portal::new(
            session,
            authorization_url.clone(),
            self.token_client.clone(),
            self.store.clone(),
            self.scopes.clone(),
        );

        let shutdown = CancellationToken::new();
        let app = portal.router();
        let server_shutdown = shutdown.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "Authorization portal stopped");
            }
        });
        self.bound_port.store(port, Ordering::SeqCst);
        let _guard = PortalGuard {
            shutdown,
            server,
            bound_port: &self.bound_port,
        };

        let portal_url = format!("http://localhost:{port}/");
        tracing::info!(port, "Authorization required, portal started");
        eprintln!(
            "Authorization required. Open {} in your browser, or visit:\n{}",
            portal_url, authorization_url
        );
        if self.open_browser {
            try_open_browser(&portal_url);
        }

        match tokio::time::timeout(self.timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GoogleMcpError::Authorization(
                "authorization portal closed before completion".to_string(),
            )
            .into()),
            Err(_) => {
                portal.abandon();
                tracing::warn!(
                    seconds = self.timeout.as_secs(),
                    "Authorization session timed out"
                );
                Err(GoogleMcpError::AuthorizationTimeout {
                    seconds: self.timeout.as_secs(),
                }
                .into())
            }
        }
    }
}

/// Attempts to open `url` in the default browser. Failures are ignored;
/// the URL is also printed to stderr.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientCredentials;
    use crate::error::{kind_of, ErrorKind};

    fn authorizer(dir: &tempfile::TempDir, timeout_secs: u64) -> OAuthAuthorizer {
        let config = AuthConfig {
            listener_port: 0,
            authorization_timeout_seconds: timeout_secs,
            open_browser: false,
            ..AuthConfig::default()
        };
        let token_client = TokenClient::new(
            "http://127.0.0.1:1/token",
            ClientCredentials {
                client_id: "client-id".to_string(),
                client_secret: None,
            },
        );
        OAuthAuthorizer::new(
            &config,
            token_client,
            Arc::new(CredentialStore::file(dir.path().join("token.json"))),
            ["https://www.googleapis.com/auth/drive".to_string()].into(),
        )
    }

    #[test]
    fn test_generate_state_is_random_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = build_authorization_url(
            "https://accounts.google.com/o/oauth2/auth",
            "my-client",
            "http://localhost:3838/callback",
            &["b".to_string(), "a".to_string()].into(),
            "nonce-123",
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "my-client");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3838/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "a b");
        assert_eq!(pairs["state"], "nonce-123");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = build_authorization_url("not a url", "c", "r", &BTreeSet::new(), "s");
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_authorize_times_out_and_releases_listener() {
        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer(&dir, 1);

        let err = authorizer.authorize().await.unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::AuthorizationTimeout);
        assert_eq!(authorizer.active_port(), None);
    }

    #[tokio::test]
    async fn test_second_concurrent_authorize_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let authorizer = Arc::new(authorizer(&dir, 2));

        let first = {
            let authorizer = authorizer.clone();
            tokio::spawn(async move { authorizer.authorize().await })
        };
        while authorizer.active_port().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GoogleMcpError>(),
            Some(GoogleMcpError::AuthorizationInProgress)
        ));

        let first = first.await.unwrap().unwrap_err();
        assert_eq!(kind_of(&first), ErrorKind::AuthorizationTimeout);
    }
}
