//! Credential lifecycle facade
//!
//! [`CredentialManager`] is the only owner of the current credential. Tool
//! calls ask it for a credential covering their scopes; it answers from a
//! shared cache when the cached credential is fresh and otherwise serializes
//! the slow path (load, refresh, or interactive authorization) so that
//! concurrent calls never start two refreshes or two authorization sessions.
//! Calls that queued behind a renewal share its outcome, failure included.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::authorizer::Authorizer;
use super::credential::Credential;
use super::store::CredentialStore;
use super::token_client::TokenClient;
use crate::config::AuthConfig;
use crate::error::{kind_of, ErrorKind, GoogleMcpError, Result};

// ---------------------------------------------------------------------------
// CredentialManager
// ---------------------------------------------------------------------------

/// State guarded by the renewal lock.
#[derive(Debug, Default)]
struct RenewState {
    /// Outcome of the most recent renewal when it failed.
    last_failure: Option<(ErrorKind, String)>,
}

/// Returns currently-valid credentials, refreshing or re-authorizing as needed.
///
/// Decision table for the slow path:
///
/// | stored credential                  | action                                  |
/// |------------------------------------|-----------------------------------------|
/// | absent or corrupt                  | interactive authorization               |
/// | fresh                              | use as-is                               |
/// | expiring, refresh token present    | refresh, persist; on rejection delete and authorize |
/// | expiring, no refresh token         | interactive authorization               |
///
/// With interactive authorization disabled the authorization fallbacks fail
/// with `AuthRequired` (or `RefreshFailed` after a rejected refresh).
#[derive(Debug)]
pub struct CredentialManager {
    store: Arc<CredentialStore>,
    token_client: TokenClient,
    authorizer: Arc<dyn Authorizer>,
    margin: chrono::Duration,
    interactive: bool,
    cache: RwLock<Option<Credential>>,
    renew: Mutex<RenewState>,
    renewals: AtomicU64,
}

impl CredentialManager {
    /// Creates a manager.
    pub fn new(
        config: &AuthConfig,
        store: Arc<CredentialStore>,
        token_client: TokenClient,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            store,
            token_client,
            authorizer,
            margin: config.refresh_margin(),
            interactive: config.interactive,
            cache: RwLock::new(None),
            renew: Mutex::new(RenewState::default()),
            renewals: AtomicU64::new(0),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Returns a valid credential that carries every scope in `required`.
    ///
    /// May block on a token refresh or, when no usable credential exists, on
    /// the operator completing interactive authorization.
    ///
    /// # Errors
    ///
    /// - [`GoogleMcpError::AuthRequired`] when no credential exists and
    ///   interactive authorization is disabled
    /// - [`GoogleMcpError::RefreshFailed`] when the refresh token was rejected
    ///   and interactive authorization is disabled
    /// - [`GoogleMcpError::InsufficientScope`] when the credential lacks a
    ///   required scope
    /// - any error from the authorizer (timeout, state mismatch)
    pub async fn get_valid_credential(&self, required: &BTreeSet<String>) -> Result<Credential> {
        let credential = self.current().await?;

        let missing = credential.missing_scopes(required);
        if !missing.is_empty() {
            return Err(GoogleMcpError::InsufficientScope { missing }.into());
        }

        Ok(credential)
    }

    async fn current(&self) -> Result<Credential> {
        if let Some(credential) = self.fresh_cached().await {
            return Ok(credential);
        }

        let seen = self.renewals.load(Ordering::SeqCst);
        let mut renew = self.renew.lock().await;

        // Another task may have renewed the credential while we waited.
        if let Some(credential) = self.fresh_cached().await {
            return Ok(credential);
        }
        if self.renewals.load(Ordering::SeqCst) != seen {
            if let Some((kind, message)) = &renew.last_failure {
                return Err(GoogleMcpError::Renewal {
                    kind: *kind,
                    message: message.clone(),
                }
                .into());
            }
        }

        let outcome = self.renew_locked().await;
        self.renewals.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(credential) => {
                renew.last_failure = None;
                *self.cache.write().await = Some(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                renew.last_failure = Some((kind_of(&e), format!("{e:#}")));
                Err(e)
            }
        }
    }

    /// Loads the stored credential and refreshes or replaces it as needed.
    /// Must be called with the renewal lock held.
    async fn renew_locked(&self) -> Result<Credential> {
        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) if kind_of(&e) == ErrorKind::DataCorruption => {
                tracing::warn!(error = %e, "Stored credential is corrupt, treating as absent");
                None
            }
            Err(e) => return Err(e),
        };

        match stored {
            None => self.authorize("no stored credential").await,
            Some(credential) if !credential.is_expiring(self.margin) => Ok(credential),
            Some(credential) if credential.can_refresh() => self.refresh(credential).await,
            Some(_) => {
                self.authorize("credential expired and has no refresh token")
                    .await
            }
        }
    }

    async fn fresh_cached(&self) -> Option<Credential> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|credential| !credential.is_expiring(self.margin))
            .cloned()
    }

    async fn refresh(&self, credential: Credential) -> Result<Credential> {
        tracing::debug!(expiry = %credential.expiry, "Refreshing access token");
        match self.token_client.refresh(&credential).await {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                tracing::info!(expiry = %refreshed.expiry, "Access token refreshed");
                Ok(refreshed)
            }
            Err(e) if kind_of(&e) == ErrorKind::RefreshFailed => {
                tracing::warn!(error = %e, "Refresh token rejected, discarding stored credential");
                *self.cache.write().await = None;
                self.store.delete().await?;
                if !self.interactive {
                    return Err(e);
                }
                self.authorize("refresh token rejected").await
            }
            Err(e) => Err(e),
        }
    }

    async fn authorize(&self, reason: &str) -> Result<Credential> {
        if !self.interactive {
            return Err(GoogleMcpError::AuthRequired(format!(
                "{reason} and interactive authorization is disabled"
            ))
            .into());
        }

        tracing::info!(reason, "Starting interactive authorization");
        self.authorizer.authorize().await
    }

    /// Deletes the stored credential and clears the cache.
    pub async fn sign_out(&self) -> Result<()> {
        let _renew = self.renew.lock().await;
        *self.cache.write().await = None;
        self.store.delete().await
    }
}
