//! Loopback authorization portal
//!
//! A short-lived axum application serving the operator-facing pages of an
//! interactive authorization:
//!
//! - `GET /` shows the session status and an "Authorize with Google" link
//! - `GET /login` redirects (302) to the provider's consent page
//! - `GET /callback` receives the provider redirect, checks `state`,
//!   exchanges the code, and persists the credential
//!
//! The outcome of the session is delivered exactly once through the
//! receiver returned by [`Portal::new`]. The session lock is never held
//! across the token exchange, so abandoning a session never waits on the
//! provider.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::authorizer::{AuthorizationSession, SessionStatus};
use super::credential::Credential;
use super::store::CredentialStore;
use super::token_client::TokenClient;
use crate::error::{GoogleMcpError, Result};

/// Outcome of one authorization session.
pub type SessionOutcome = Result<Credential>;

struct PortalInner {
    session: AuthorizationSession,
    notify: Option<oneshot::Sender<SessionOutcome>>,
}

impl PortalInner {
    fn finish(&mut self, outcome: SessionOutcome) {
        match &outcome {
            Ok(_) => self.session.status = SessionStatus::Succeeded,
            Err(e) => self.session.status = SessionStatus::Failed(e.to_string()),
        }
        if let Some(tx) = self.notify.take() {
            let _ = tx.send(outcome);
        }
    }
}

struct PortalState {
    inner: Mutex<PortalInner>,
    abandoned: CancellationToken,
    authorization_url: String,
    token_client: TokenClient,
    store: Arc<CredentialStore>,
    scopes: BTreeSet<String>,
}

/// Handle to the portal of one [`AuthorizationSession`].
#[derive(Clone)]
pub struct Portal {
    state: Arc<PortalState>,
}

impl std::fmt::Debug for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portal")
            .field("authorization_url", &self.state.authorization_url)
            .finish_non_exhaustive()
    }
}

impl Portal {
    /// Creates the portal for `session`.
    ///
    /// The returned receiver resolves once the callback succeeds or fails.
    pub fn new(
        session: AuthorizationSession,
        authorization_url: String,
        token_client: TokenClient,
        store: Arc<CredentialStore>,
        scopes: BTreeSet<String>,
    ) -> (Self, oneshot::Receiver<SessionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let state = PortalState {
            inner: Mutex::new(PortalInner {
                session,
                notify: Some(tx),
            }),
            abandoned: CancellationToken::new(),
            authorization_url,
            token_client,
            store,
            scopes,
        };
        (
            Self {
                state: Arc::new(state),
            },
            rx,
        )
    }

    /// Builds the router serving the portal pages.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/login", get(login))
            .route("/callback", get(callback))
            .with_state(self.state.clone())
    }

    /// Current session status.
    pub async fn status(&self) -> SessionStatus {
        self.state.current_status().await
    }

    /// Marks the session as given up, e.g. when the caller stopped waiting.
    ///
    /// Does not block: an exchange already in flight is cancelled and its
    /// credential is never persisted.
    pub fn abandon(&self) {
        self.state.abandoned.cancel();
    }
}

impl PortalState {
    async fn current_status(&self) -> SessionStatus {
        let status = self.inner.lock().await.session.status.clone();
        match status {
            SessionStatus::Pending | SessionStatus::Exchanging if self.abandoned.is_cancelled() => {
                SessionStatus::Failed("abandoned".to_string())
            }
            other => other,
        }
    }

    /// Exchanges `code` and persists the credential, unless the session is
    /// abandoned first.
    async fn exchange_and_save(&self, code: &str, redirect_uri: &str) -> Result<Credential> {
        let exchange = self.token_client.exchange_code(code, redirect_uri, &self.scopes);
        let credential = tokio::select! {
            _ = self.abandoned.cancelled() => return Err(abandoned()),
            credential = exchange => credential?,
        };
        if self.abandoned.is_cancelled() {
            return Err(abandoned());
        }
        self.store.save(&credential).await?;
        Ok(credential)
    }
}

fn abandoned() -> anyhow::Error {
    GoogleMcpError::Authorization("session abandoned before completion".to_string()).into()
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn index(State(state): State<Arc<PortalState>>) -> Html<String> {
    let body = match state.current_status().await {
        SessionStatus::Exchanging => "<p>Completing authorization.</p>".to_string(),
        SessionStatus::Pending => {
            "<p>Waiting for authorization.</p>\
             <p><a href=\"/login\">Authorize with Google</a></p>"
                .to_string()
        }
        SessionStatus::Succeeded => {
            "<p>Authorization complete. You may close this tab.</p>".to_string()
        }
        SessionStatus::Failed(reason) => format!(
            "<p>Authorization failed: {}</p><p>Restart the request to try again.</p>",
            escape_html(&reason)
        ),
    };
    page("google-mcp authorization", &body)
}

async fn login(State(state): State<Arc<PortalState>>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, state.authorization_url.clone())],
    )
        .into_response()
}

async fn callback(
    State(state): State<Arc<PortalState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (code, redirect_uri) = {
        let mut inner = state.inner.lock().await;

        if inner.session.status != SessionStatus::Pending || state.abandoned.is_cancelled() {
            return error_page(
                StatusCode::CONFLICT,
                "This authorization session has already completed.",
            );
        }

        if params.state.as_deref() != Some(inner.session.state.as_str()) {
            tracing::warn!("Rejected OAuth callback with mismatched state");
            inner.finish(Err(GoogleMcpError::AuthorizationStateMismatch.into()));
            return error_page(
                StatusCode::BAD_REQUEST,
                "The authorization response did not match this session and was rejected.",
            );
        }

        if let Some(error) = params.error {
            let message = format!("provider returned error: {error}");
            inner.finish(Err(GoogleMcpError::Authorization(message.clone()).into()));
            return error_page(StatusCode::BAD_REQUEST, &message);
        }

        let Some(code) = params.code.filter(|code| !code.is_empty()) else {
            let message = "authorization code missing from callback";
            inner.finish(Err(GoogleMcpError::Authorization(message.to_string()).into()));
            return error_page(StatusCode::BAD_REQUEST, message);
        };

        inner.session.status = SessionStatus::Exchanging;
        (code, inner.session.redirect_uri.clone())
    };

    let outcome = state.exchange_and_save(&code, &redirect_uri).await;
    let response = match &outcome {
        Ok(_) => {
            tracing::info!("Authorization completed");
            (
                StatusCode::OK,
                page(
                    "Authorization complete",
                    "<p>google-mcp is now authorized. You may close this tab.</p>",
                ),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Authorization code exchange failed");
            error_page(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    };
    state.inner.lock().await.finish(outcome);
    response
}

fn error_page(status: StatusCode, message: &str) -> Response {
    (
        status,
        page(
            "Authorization failed",
            &format!("<p>{}</p>", escape_html(message)),
        ),
    )
        .into_response()
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1>{body}</body></html>"
    ))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
