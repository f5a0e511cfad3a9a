//! Drive tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{GoogleApi, SCOPE_DRIVE};
use crate::auth::Credential;
use crate::error::Result;
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "search_drive",
        "Search for files in Google Drive using a Drive query expression, \
         e.g. \"name contains 'budget'\".",
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Drive query (q parameter)"},
                "max_results": {"type": "integer", "minimum": 1, "description": "Maximum files to return (default 50)"}
            },
            "required": ["query"]
        }),
        [SCOPE_DRIVE],
        Arc::new(SearchDrive { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "list_drive_folders",
        "List folders in Google Drive. Use parent_id 'root' for the top level.",
        json!({
            "type": "object",
            "properties": {
                "parent_id": {"type": "string", "description": "Parent folder ID (default 'root')"}
            }
        }),
        [SCOPE_DRIVE],
        Arc::new(ListFolders { api: api.clone() }),
    ))?;
    Ok(())
}

/// Escapes a literal for use inside a single-quoted Drive query string.
pub(super) fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_max_results() -> u32 {
    50
}

struct SearchDrive {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for SearchDrive {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: SearchParams = parse_arguments(arguments)?;
        let url = format!("{}/files", self.api.config().drive_base);
        let page_size = params.max_results.clamp(1, 1000).to_string();
        let response = self
            .api
            .get_with_query(
                &url,
                &[
                    ("q", params.query.as_str()),
                    ("fields", "files(id, name, mimeType, webViewLink)"),
                    ("pageSize", page_size.as_str()),
                ],
                credential,
            )
            .await?;

        Ok(json!({ "files": response.get("files").cloned().unwrap_or_else(|| json!([])) }))
    }
}

#[derive(Debug, Deserialize)]
struct ListFoldersParams {
    #[serde(default = "default_parent")]
    parent_id: String,
}

fn default_parent() -> String {
    "root".to_string()
}

struct ListFolders {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for ListFolders {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: ListFoldersParams = parse_arguments(arguments)?;
        let query = format!(
            "'{}' in parents and mimeType='{}' and trashed=false",
            quote(&params.parent_id),
            FOLDER_MIME_TYPE
        );
        let url = format!("{}/files", self.api.config().drive_base);
        let response = self
            .api
            .get_with_query(
                &url,
                &[
                    ("q", query.as_str()),
                    ("fields", "files(id, name, webViewLink)"),
                    ("pageSize", "100"),
                ],
                credential,
            )
            .await?;

        Ok(json!({
            "parent_id": params.parent_id,
            "folders": response.get("files").cloned().unwrap_or_else(|| json!([])),
        }))
    }
}

// ---------------------------------------------------------------------------
// Search by document type
// ---------------------------------------------------------------------------

/// Input schema shared by the per-type search tools.
pub(super) fn typed_search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Full-text search terms; empty lists recent files"},
            "max_results": {"type": "integer", "minimum": 1, "description": "Maximum files to return (default 20)"}
        }
    })
}

/// Builds the Drive query for files of `mime_type`, optionally matching
/// `text` in their content.
fn typed_query(mime_type: &str, text: &str) -> String {
    let mut query = format!("mimeType='{mime_type}' and trashed=false");
    if !text.trim().is_empty() {
        query.push_str(&format!(" and fullText contains '{}'", quote(text.trim())));
    }
    query
}

#[derive(Debug, Deserialize)]
struct TypedSearchParams {
    #[serde(default)]
    query: String,
    #[serde(default = "default_typed_max_results")]
    max_results: u32,
}

fn default_typed_max_results() -> u32 {
    20
}

/// Lists Drive files of one Workspace type, most recently modified first.
pub(super) struct SearchFilesOfType {
    api: GoogleApi,
    mime_type: &'static str,
}

impl SearchFilesOfType {
    pub(super) fn new(api: &GoogleApi, mime_type: &'static str) -> Self {
        Self {
            api: api.clone(),
            mime_type,
        }
    }
}

#[async_trait]
impl ToolHandler for SearchFilesOfType {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: TypedSearchParams = parse_arguments(arguments)?;
        let query = typed_query(self.mime_type, &params.query);
        let page_size = params.max_results.clamp(1, 1000).to_string();
        let url = format!("{}/files", self.api.config().drive_base);
        let response = self
            .api
            .get_with_query(
                &url,
                &[
                    ("q", query.as_str()),
                    ("fields", "files(id, name, modifiedTime, webViewLink)"),
                    ("orderBy", "modifiedTime desc"),
                    ("pageSize", page_size.as_str()),
                ],
                credential,
            )
            .await?;

        Ok(json!({ "files": response.get("files").cloned().unwrap_or_else(|| json!([])) }))
    }
}
