//! The OAuth2 credential and its persisted layout

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Access credential for the Google account the tools act on.
///
/// Serialized as a flat JSON record. `token` is accepted as an alias of
/// `access_token` so token files written by Google's client libraries load
/// unchanged.
///
/// A credential without a `refresh_token` cannot be renewed silently and
/// must be re-authorized interactively once it expires.
///
/// # Examples
///
/// ```
/// use google_mcp::auth::Credential;
/// use chrono::{Duration, Utc};
///
/// let credential = Credential {
///     access_token: "ya29.token".to_string(),
///     refresh_token: None,
///     expiry: Utc::now() + Duration::hours(1),
///     scopes: ["https://www.googleapis.com/auth/drive".to_string()].into(),
///     token_type: "Bearer".to_string(),
/// };
///
/// assert!(!credential.is_expiring(Duration::seconds(60)));
/// assert!(!credential.can_refresh());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token sent to Google APIs.
    #[serde(alias = "token")]
    pub access_token: String,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Instant the access token stops being accepted.
    pub expiry: DateTime<Utc>,

    /// Scopes granted to the access token.
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Token type, always `Bearer` for Google.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Returns `true` when the token expires within `margin` (or already has).
    pub fn is_expiring(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expiry
    }

    /// Whether a refresh-token exchange is possible.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Scopes in `required` that this credential was not granted.
    ///
    /// # Examples
    ///
    /// ```
    /// use google_mcp::auth::Credential;
    /// use std::collections::BTreeSet;
    ///
    /// let credential = Credential {
    ///     access_token: "t".to_string(),
    ///     refresh_token: None,
    ///     expiry: chrono::Utc::now(),
    ///     scopes: ["a".to_string()].into(),
    ///     token_type: "Bearer".to_string(),
    /// };
    /// let required: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
    /// assert_eq!(credential.missing_scopes(&required), vec!["b".to_string()]);
    /// ```
    pub fn missing_scopes(&self, required: &BTreeSet<String>) -> Vec<String> {
        required.difference(&self.scopes).cloned().collect()
    }

    /// Value of the `Authorization` header for this credential.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Splits a space-delimited OAuth `scope` string into a set.
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expiry: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry,
            scopes: parse_scopes("s1 s2"),
            token_type: "Bearer".to_string(),
        }
    }

    #[test]
    fn test_is_expiring_respects_margin() {
        let margin = Duration::seconds(60);
        assert!(!credential(Utc::now() + Duration::hours(1)).is_expiring(margin));
        assert!(credential(Utc::now() + Duration::seconds(30)).is_expiring(margin));
        assert!(credential(Utc::now() - Duration::seconds(10)).is_expiring(margin));
    }

    #[test]
    fn test_zero_margin_only_flags_expired() {
        let cred = credential(Utc::now() + Duration::seconds(30));
        assert!(!cred.is_expiring(Duration::zero()));
    }

    #[test]
    fn test_can_refresh() {
        let mut cred = credential(Utc::now());
        assert!(cred.can_refresh());
        cred.refresh_token = Some(String::new());
        assert!(!cred.can_refresh());
        cred.refresh_token = None;
        assert!(!cred.can_refresh());
    }

    #[test]
    fn test_missing_scopes_empty_when_covered() {
        let cred = credential(Utc::now());
        assert!(cred.missing_scopes(&parse_scopes("s1")).is_empty());
        assert_eq!(
            cred.missing_scopes(&parse_scopes("s1 s3")),
            vec!["s3".to_string()]
        );
    }

    #[test]
    fn test_serde_round_trip_is_exact() {
        let cred = credential(Utc::now());
        let json = serde_json::to_string(&cred).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cred);
    }

    #[test]
    fn test_deserialize_google_library_layout() {
        let json = r#"{
            "token": "ya29.abc",
            "refresh_token": "1//refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id",
            "scopes": ["https://www.googleapis.com/auth/drive"],
            "expiry": "2030-01-01T00:00:00Z"
        }"#;
        let cred: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.access_token, "ya29.abc");
        assert_eq!(cred.token_type, "Bearer");
        assert!(cred.scopes.contains("https://www.googleapis.com/auth/drive"));
    }

    #[test]
    fn test_authorization_header() {
        let cred = credential(Utc::now());
        assert_eq!(cred.authorization_header(), "Bearer access");
    }
}
