//! Configuration management for google-mcp
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Precedence, lowest to highest: defaults, YAML file, environment, CLI.

use crate::error::{Result, GoogleMcpError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Google's OAuth2 authorization endpoint.
pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Main configuration structure for google-mcp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth2 client and credential storage settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Dispatch runtime settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Google REST API base URLs
    #[serde(default)]
    pub google: GoogleApiConfig,
}

/// OAuth2 client and credential lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth2 client identifier
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Google client secrets JSON used when `client_id` is not set directly
    #[serde(default = "default_client_secrets_path")]
    pub client_secrets_path: PathBuf,

    /// File the credential is persisted to
    #[serde(default = "default_credential_path")]
    pub credential_path: PathBuf,

    /// Pre-supplied serialized credential; takes precedence over the file
    #[serde(default)]
    pub inline_credential: Option<String>,

    /// Loopback port for the authorization portal
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,

    /// How long an interactive authorization session may stay pending
    #[serde(default = "default_authorization_timeout")]
    pub authorization_timeout_seconds: u64,

    /// Credentials expiring within this window are refreshed before use
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: u64,

    /// Whether a missing credential may trigger the interactive flow
    #[serde(default = "default_true")]
    pub interactive: bool,

    /// Attempt to open the portal in the system browser
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Provider authorization endpoint
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,

    /// Provider token endpoint
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
}

fn default_client_secrets_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_credential_path() -> PathBuf {
    PathBuf::from(".token.json")
}

fn default_listener_port() -> u16 {
    3838
}

fn default_authorization_timeout() -> u64 {
    300
}

fn default_refresh_margin() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_authorization_endpoint() -> String {
    GOOGLE_AUTHORIZATION_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    GOOGLE_TOKEN_ENDPOINT.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secrets_path: default_client_secrets_path(),
            credential_path: default_credential_path(),
            inline_credential: None,
            listener_port: default_listener_port(),
            authorization_timeout_seconds: default_authorization_timeout(),
            refresh_margin_seconds: default_refresh_margin(),
            interactive: true,
            open_browser: true,
            authorization_endpoint: default_authorization_endpoint(),
            token_endpoint: default_token_endpoint(),
        }
    }
}

impl AuthConfig {
    /// Interactive session timeout as a [`Duration`].
    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_seconds)
    }

    /// Refresh safety margin as a [`chrono::Duration`].
    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.refresh_margin_seconds).unwrap_or(i64::MAX))
    }

    /// Resolves the OAuth2 client identity.
    ///
    /// Explicit `client_id`/`client_secret` win; otherwise the client secrets
    /// file downloaded from the Google Cloud console is read.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::Config`] when neither source provides a
    /// client id.
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        if let Some(client_id) = &self.client_id {
            return Ok(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: self.client_secret.clone(),
            });
        }

        if self.client_secrets_path.exists() {
            return ClientCredentials::from_secrets_file(&self.client_secrets_path);
        }

        Err(GoogleMcpError::Config(format!(
            "no OAuth client configured: set GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET or provide {}",
            self.client_secrets_path.display()
        ))
        .into())
    }
}

/// OAuth2 client identity sent to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client identifier
    pub client_id: String,
    /// Client secret, absent for public clients
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(alias = "web")]
    installed: ClientSecretsEntry,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsEntry {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

impl ClientCredentials {
    /// Reads a Google client secrets file (`installed` or `web` layout).
    pub fn from_secrets_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let parsed: ClientSecretsFile = serde_json::from_str(&contents).map_err(|e| {
            GoogleMcpError::Config(format!(
                "invalid client secrets file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            client_id: parsed.installed.client_id,
            client_secret: parsed.installed.client_secret,
        })
    }
}

/// Dispatch runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Per-handler deadline
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Upper bound on tool handlers running concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

fn default_call_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    16
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: default_call_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl ServerConfig {
    /// Per-handler deadline as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

/// Base URLs of the Google REST APIs used by the tool handlers.
///
/// Overridable so tests can point handlers at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleApiConfig {
    /// Gmail API base
    #[serde(default = "default_gmail_base")]
    pub gmail_base: String,
    /// Drive API base
    #[serde(default = "default_drive_base")]
    pub drive_base: String,
    /// Calendar API base
    #[serde(default = "default_calendar_base")]
    pub calendar_base: String,
    /// Sheets API base
    #[serde(default = "default_sheets_base")]
    pub sheets_base: String,
    /// Docs API base
    #[serde(default = "default_docs_base")]
    pub docs_base: String,
    /// Slides API base
    #[serde(default = "default_slides_base")]
    pub slides_base: String,
}

fn default_gmail_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_drive_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_calendar_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_sheets_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_docs_base() -> String {
    "https://docs.googleapis.com/v1".to_string()
}

fn default_slides_base() -> String {
    "https://slides.googleapis.com/v1".to_string()
}

impl Default for GoogleApiConfig {
    fn default() -> Self {
        Self {
            gmail_base: default_gmail_base(),
            drive_base: default_drive_base(),
            calendar_base: default_calendar_base(),
            sheets_base: default_sheets_base(),
            docs_base: default_docs_base(),
            slides_base: default_slides_base(),
        }
    }
}

impl GoogleApiConfig {
    /// Points every API at the same base URL.
    pub fn with_common_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            gmail_base: base.clone(),
            drive_base: base.clone(),
            calendar_base: base.clone(),
            sheets_base: base.clone(),
            docs_base: base.clone(),
            slides_base: base,
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("GOOGLE_CLIENT_ID") {
            self.auth.client_id = Some(client_id);
        }

        if let Ok(client_secret) = std::env::var("GOOGLE_CLIENT_SECRET") {
            self.auth.client_secret = Some(client_secret);
        }

        if let Ok(path) = std::env::var("GOOGLE_CREDENTIALS_PATH") {
            self.auth.client_secrets_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GOOGLE_TOKEN_PATH") {
            self.auth.credential_path = PathBuf::from(path);
        }

        if let Ok(token_json) = std::env::var("GOOGLE_TOKEN_JSON") {
            if !token_json.trim().is_empty() {
                self.auth.inline_credential = Some(token_json);
            }
        }

        if let Ok(port) = std::env::var("AUTH_PORT") {
            if let Ok(value) = port.parse() {
                self.auth.listener_port = value;
            } else {
                tracing::warn!("Invalid AUTH_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("GOOGLE_MCP_AUTH_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.auth.authorization_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid GOOGLE_MCP_AUTH_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(margin) = std::env::var("GOOGLE_MCP_REFRESH_MARGIN_SECONDS") {
            if let Ok(value) = margin.parse() {
                self.auth.refresh_margin_seconds = value;
            } else {
                tracing::warn!("Invalid GOOGLE_MCP_REFRESH_MARGIN_SECONDS: {}", margin);
            }
        }

        if let Ok(interactive) = std::env::var("GOOGLE_MCP_INTERACTIVE") {
            match interactive.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.auth.interactive = true,
                "0" | "false" | "no" => self.auth.interactive = false,
                _ => tracing::warn!("Invalid GOOGLE_MCP_INTERACTIVE: {}", interactive),
            }
        }

        if let Ok(timeout) = std::env::var("GOOGLE_MCP_CALL_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.server.call_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid GOOGLE_MCP_CALL_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(max) = std::env::var("GOOGLE_MCP_MAX_CONCURRENT") {
            if let Ok(value) = max.parse() {
                self.server.max_concurrent_requests = value;
            } else {
                tracing::warn!("Invalid GOOGLE_MCP_MAX_CONCURRENT: {}", max);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(port) = cli.port_override() {
            tracing::debug!(port, "CLI override: listener port");
            self.auth.listener_port = port;
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`GoogleMcpError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.auth.authorization_timeout_seconds == 0 {
            return Err(GoogleMcpError::Config(
                "auth.authorization_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.call_timeout_seconds == 0 {
            return Err(GoogleMcpError::Config(
                "server.call_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err(GoogleMcpError::Config(
                "server.max_concurrent_requests must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, endpoint) in [
            ("auth.authorization_endpoint", &self.auth.authorization_endpoint),
            ("auth.token_endpoint", &self.auth.token_endpoint),
        ] {
            url::Url::parse(endpoint).map_err(|e| {
                GoogleMcpError::Config(format!("{} is not a valid URL: {}", name, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.listener_port, 3838);
        assert_eq!(config.auth.credential_path, PathBuf::from(".token.json"));
        assert_eq!(config.auth.refresh_margin_seconds, 60);
        assert_eq!(config.auth.authorization_timeout_seconds, 300);
        assert_eq!(config.server.call_timeout_seconds, 60);
        assert!(config.auth.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
auth:
  client_id: "abc.apps.googleusercontent.com"
  listener_port: 9000
  refresh_margin_seconds: 120
server:
  call_timeout_seconds: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.auth.client_id.as_deref(),
            Some("abc.apps.googleusercontent.com")
        );
        assert_eq!(config.auth.listener_port, 9000);
        assert_eq!(config.auth.refresh_margin(), chrono::Duration::seconds(120));
        assert_eq!(config.server.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.max_concurrent_requests, 16);
        assert_eq!(config.auth.token_endpoint, GOOGLE_TOKEN_ENDPOINT);
    }

    #[test]
    fn test_config_validation_zero_call_timeout() {
        let mut config = Config::default();
        config.server.call_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = Config::default();
        config.server.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_token_endpoint() {
        let mut config = Config::default();
        config.auth.token_endpoint = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.token_endpoint"));
    }

    #[test]
    fn test_client_credentials_prefers_explicit_values() {
        let auth = AuthConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..AuthConfig::default()
        };
        let creds = auth.client_credentials().unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_client_credentials_from_installed_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"file-id","client_secret":"file-secret","auth_uri":"x"}}"#,
        )
        .unwrap();

        let auth = AuthConfig {
            client_secrets_path: path,
            ..AuthConfig::default()
        };
        let creds = auth.client_credentials().unwrap();
        assert_eq!(creds.client_id, "file-id");
        assert_eq!(creds.client_secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn test_client_credentials_from_web_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"web":{"client_id":"web-id"}}"#).unwrap();

        let creds = ClientCredentials::from_secrets_file(&path).unwrap();
        assert_eq!(creds.client_id, "web-id");
        assert!(creds.client_secret.is_none());
    }

    #[test]
    fn test_client_credentials_missing_is_config_error() {
        let auth = AuthConfig {
            client_secrets_path: PathBuf::from("/nonexistent/credentials.json"),
            ..AuthConfig::default()
        };
        let err = auth.client_credentials().unwrap_err();
        assert!(err.to_string().contains("no OAuth client configured"));
    }

    #[test]
    fn test_common_base_trims_trailing_slash() {
        let api = GoogleApiConfig::with_common_base("http://127.0.0.1:9999/");
        assert_eq!(api.gmail_base, "http://127.0.0.1:9999");
        assert_eq!(api.docs_base, "http://127.0.0.1:9999");
        assert_eq!(api.slides_base, "http://127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_auth_fields() {
        std::env::set_var("GOOGLE_CLIENT_ID", "env-client");
        std::env::set_var("GOOGLE_TOKEN_PATH", "/tmp/env-token.json");
        std::env::set_var("GOOGLE_TOKEN_JSON", r#"{"access_token":"x"}"#);
        std::env::set_var("AUTH_PORT", "4545");
        std::env::set_var("GOOGLE_MCP_INTERACTIVE", "false");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("GOOGLE_CLIENT_ID");
        std::env::remove_var("GOOGLE_TOKEN_PATH");
        std::env::remove_var("GOOGLE_TOKEN_JSON");
        std::env::remove_var("AUTH_PORT");
        std::env::remove_var("GOOGLE_MCP_INTERACTIVE");

        assert_eq!(config.auth.client_id.as_deref(), Some("env-client"));
        assert_eq!(
            config.auth.credential_path,
            PathBuf::from("/tmp/env-token.json")
        );
        assert!(config.auth.inline_credential.is_some());
        assert_eq!(config.auth.listener_port, 4545);
        assert!(!config.auth.interactive);
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_ignores_invalid_numbers() {
        std::env::set_var("AUTH_PORT", "not-a-port");
        std::env::set_var("GOOGLE_MCP_CALL_TIMEOUT_SECONDS", "soon");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("AUTH_PORT");
        std::env::remove_var("GOOGLE_MCP_CALL_TIMEOUT_SECONDS");

        assert_eq!(config.auth.listener_port, 3838);
        assert_eq!(config.server.call_timeout_seconds, 60);
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = crate::cli::Cli::default();
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        assert_eq!(config.server.max_concurrent_requests, 16);
    }
}
