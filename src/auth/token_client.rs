//! Provider token endpoint client
//!
//! Performs the two grants the credential lifecycle needs: exchanging an
//! authorization code and exchanging a refresh token.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;

use super::credential::{parse_scopes, Credential};
use crate::config::ClientCredentials;
use crate::error::{GoogleMcpError, Result};

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Upper bound on one token endpoint round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Token endpoint response
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Converts the response into a [`Credential`].
    ///
    /// Refresh responses usually omit `refresh_token` and `scope`; the values
    /// from `previous` are carried over in that case.
    fn into_credential(
        self,
        previous: Option<&Credential>,
        requested_scopes: &BTreeSet<String>,
    ) -> Credential {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let scopes = match (self.scope, previous) {
            (Some(scope), _) => parse_scopes(&scope),
            (None, Some(previous)) => previous.scopes.clone(),
            (None, None) => requested_scopes.clone(),
        };

        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expiry: Utc::now() + chrono::Duration::seconds(expires_in),
            scopes,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenClient
// ---------------------------------------------------------------------------

/// Client for the OAuth2 token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_endpoint: String,
    client: ClientCredentials,
}

impl TokenClient {
    /// Creates a client posting to `token_endpoint` as `client`.
    pub fn new(token_endpoint: impl Into<String>, client: ClientCredentials) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            token_endpoint: token_endpoint.into(),
            client,
        }
    }

    /// The OAuth2 client id.
    pub fn client_id(&self) -> &str {
        &self.client.client_id
    }

    /// Exchanges an authorization code for a new credential.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::Authorization`] when the endpoint rejects
    /// the code or the response cannot be parsed.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        requested_scopes: &BTreeSet<String>,
    ) -> Result<Credential> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);

        let resp = self.post(params).await.map_err(|e| {
            GoogleMcpError::Authorization(format!("token exchange request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GoogleMcpError::Authorization(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            GoogleMcpError::Authorization(format!("failed to parse token response: {e}"))
        })?;

        Ok(raw.into_credential(None, requested_scopes))
    }

    /// Exchanges the refresh token of `credential` for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::RefreshFailed`] only when the credential has
    /// no refresh token or the provider rejects it (400 or 401). Transport
    /// failures, unreadable bodies and other statuses (5xx, 429) are
    /// reported as [`GoogleMcpError::Http`] or [`GoogleMcpError::Upstream`]:
    /// they say nothing about the validity of the refresh token.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GoogleMcpError::RefreshFailed("no refresh token".to_string()))?;

        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);

        let resp = self.post(params).await.map_err(GoogleMcpError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(refresh_error(status, body).into());
        }

        let raw: TokenResponse = resp.json().await.map_err(GoogleMcpError::Http)?;

        Ok(raw.into_credential(Some(credential), &credential.scopes))
    }

    async fn post<'a>(
        &'a self,
        mut params: HashMap<&'a str, &'a str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        params.insert("client_id", &self.client.client_id);
        if let Some(secret) = self.client.client_secret.as_deref() {
            params.insert("client_secret", secret);
        }

        self.http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
    }
}

/// Classifies a non-success refresh response.
fn refresh_error(status: StatusCode, body: String) -> GoogleMcpError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            GoogleMcpError::RefreshFailed(format!("token endpoint returned {status}: {body}"))
        }
        _ => GoogleMcpError::Upstream {
            status: status.as_u16(),
            message: format!("token endpoint unavailable: {body}"),
        },
    }
}
