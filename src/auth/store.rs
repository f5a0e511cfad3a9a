//! Credential persistence
//!
//! [`CredentialStore`] evaluates an ordered list of [`CredentialSource`]s,
//! fixed at construction time, and writes credentials atomically so an
//! interrupted save never leaves a truncated file behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use super::credential::Credential;
use crate::config::AuthConfig;
use crate::error::{GoogleMcpError, Result};

/// One place a credential may be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Serialized credential supplied through configuration. Never touches disk.
    Inline(String),
    /// JSON file on disk.
    File(PathBuf),
}

impl CredentialSource {
    fn describe(&self) -> String {
        match self {
            Self::Inline(_) => "inline credential".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Loads, saves, and deletes the persisted [`Credential`].
///
/// Lookup order on [`load`](Self::load):
///
/// 1. the credential most recently saved by this process,
/// 2. each configured source in order,
/// 3. absent.
///
/// A store that was given an inline credential is ephemeral: saves update
/// the in-memory slot only and never write to disk.
#[derive(Debug)]
pub struct CredentialStore {
    sources: Vec<CredentialSource>,
    memory: RwLock<Option<Credential>>,
    inline_retired: AtomicBool,
    ephemeral: bool,
}

impl CredentialStore {
    /// Creates a store over `sources`, evaluated in the given order.
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        let ephemeral = sources
            .iter()
            .any(|source| matches!(source, CredentialSource::Inline(_)));
        Self {
            sources,
            memory: RwLock::new(None),
            inline_retired: AtomicBool::new(false),
            ephemeral,
        }
    }

    /// Creates a file-backed store.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(vec![CredentialSource::File(path.into())])
    }

    /// Builds the source list from configuration: inline credential first
    /// (when configured), then the credential file.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut sources = Vec::with_capacity(2);
        if let Some(inline) = &config.inline_credential {
            sources.push(CredentialSource::Inline(inline.clone()));
        }
        sources.push(CredentialSource::File(config.credential_path.clone()));
        Self::new(sources)
    }

    /// The configured sources, in evaluation order.
    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Whether saves stay in memory.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    fn file_path(&self) -> Option<&Path> {
        self.sources.iter().find_map(|source| match source {
            CredentialSource::File(path) => Some(path.as_path()),
            CredentialSource::Inline(_) => None,
        })
    }

    /// Loads the current credential.
    ///
    /// Returns `Ok(None)` when no source holds a credential. A source with
    /// malformed content is skipped with a warning; if no later source
    /// yields a credential the [`GoogleMcpError::DataCorruption`] is returned.
    pub async fn load(&self) -> Result<Option<Credential>> {
        if let Some(credential) = self.memory.read().await.clone() {
            return Ok(Some(credential));
        }

        let mut failure = None;
        for source in &self.sources {
            match self.read_source(source).await {
                Ok(Some(credential)) => {
                    tracing::debug!(source = %source.describe(), "Loaded credential");
                    return Ok(Some(credential));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(source = %source.describe(), error = %e, "Skipping unreadable credential source");
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn read_source(&self, source: &CredentialSource) -> Result<Option<Credential>> {
        let contents = match source {
            CredentialSource::Inline(json) => {
                if self.inline_retired.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                json.clone()
            }
            CredentialSource::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(GoogleMcpError::Io(e).into()),
            },
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            GoogleMcpError::DataCorruption(format!("{}: {}", source.describe(), e)).into()
        })
    }

    /// Persists `credential`.
    ///
    /// File-backed stores write a uniquely named temporary file next to the
    /// target (mode `0600` on Unix) and rename it into place.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if !self.ephemeral {
            if let Some(path) = self.file_path() {
                write_atomic(path, credential).await?;
                tracing::info!(path = %path.display(), "Saved credential");
            }
        } else {
            tracing::debug!("Inline credential configured, keeping credential in memory");
        }

        *self.memory.write().await = Some(credential.clone());
        Ok(())
    }

    /// Removes the credential from every source. Idempotent.
    ///
    /// The inline credential cannot be erased from configuration, so it is
    /// retired for the lifetime of this store instead.
    pub async fn delete(&self) -> Result<()> {
        *self.memory.write().await = None;
        self.inline_retired.store(true, Ordering::SeqCst);

        if let Some(path) = self.file_path() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::info!(path = %path.display(), "Deleted stored credential"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GoogleMcpError::Io(e).into()),
            }
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credential".to_string());
    let temp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    tokio::fs::write(&temp, json.as_bytes()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(GoogleMcpError::Io(e).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::parse_scopes;
    use crate::error::{kind_of, ErrorKind};
    use chrono::{Duration, SubsecRound, Utc};

    fn sample() -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: (Utc::now() + Duration::hours(1)).trunc_subsecs(0),
            scopes: parse_scopes("https://www.googleapis.com/auth/drive"),
            token_type: "Bearer".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::file(dir.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_from_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let credential = sample();

        CredentialStore::file(&path).save(&credential).await.unwrap();
        let loaded = CredentialStore::file(&path).load().await.unwrap();

        assert_eq!(loaded, Some(credential));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = CredentialStore::file(&path);
        store.save(&sample()).await.unwrap();
        store.save(&sample()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("token.json")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        CredentialStore::file(&path).save(&sample()).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_data_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = CredentialStore::file(&path).load().await.unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::DataCorruption);
    }

    #[tokio::test]
    async fn test_inline_takes_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let mut on_disk = sample();
        on_disk.access_token = "from-file".to_string();
        CredentialStore::file(&path).save(&on_disk).await.unwrap();

        let mut inline = sample();
        inline.access_token = "from-inline".to_string();
        let store = CredentialStore::new(vec![
            CredentialSource::Inline(serde_json::to_string(&inline).unwrap()),
            CredentialSource::File(path),
        ]);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "from-inline");
    }

    #[tokio::test]
    async fn test_corrupt_inline_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        CredentialStore::file(&path).save(&sample()).await.unwrap();

        let store = CredentialStore::new(vec![
            CredentialSource::Inline("garbage".to_string()),
            CredentialSource::File(path),
        ]);
        assert_eq!(store.load().await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_inline_store_saves_in_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = CredentialStore::new(vec![
            CredentialSource::Inline(serde_json::to_string(&sample()).unwrap()),
            CredentialSource::File(path.clone()),
        ]);
        assert!(store.is_ephemeral());

        let mut refreshed = sample();
        refreshed.access_token = "refreshed".to_string();
        store.save(&refreshed).await.unwrap();

        assert!(!path.exists());
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "refreshed");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_retires_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = CredentialStore::new(vec![
            CredentialSource::Inline(serde_json::to_string(&sample()).unwrap()),
            CredentialSource::File(path),
        ]);
        assert!(store.load().await.unwrap().is_some());

        store.delete().await.unwrap();
        store.delete().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_config_orders_inline_first() {
        let config = AuthConfig {
            inline_credential: Some("{}".to_string()),
            ..AuthConfig::default()
        };
        let store = CredentialStore::from_config(&config);
        assert!(matches!(store.sources()[0], CredentialSource::Inline(_)));
        assert!(matches!(store.sources()[1], CredentialSource::File(_)));

        let store = CredentialStore::from_config(&AuthConfig::default());
        assert_eq!(store.sources().len(), 1);
        assert!(!store.is_ephemeral());
    }
}
