//! Google Workspace tools
//!
//! Each submodule contributes handlers for one API. They share
//! [`GoogleApi`], a thin `reqwest` wrapper that attaches the credential and
//! turns non-success responses into [`GoogleMcpError::Upstream`].

pub mod calendar;
pub mod docs;
pub mod drive;
pub mod gmail;
pub mod sheets;
pub mod slides;

use base64::Engine as _;
use serde::Serialize;
use serde_json::{json, Value};

use super::{ToolHandler, ToolRegistry};
use crate::auth::Credential;
use crate::config::GoogleApiConfig;
use crate::error::{GoogleMcpError, Result};

/// Read, send, and organise mail.
pub const SCOPE_GMAIL_MODIFY: &str = "https://www.googleapis.com/auth/gmail.modify";
/// Manage Gmail labels.
pub const SCOPE_GMAIL_LABELS: &str = "https://www.googleapis.com/auth/gmail.labels";
/// Full Drive access.
pub const SCOPE_DRIVE: &str = "https://www.googleapis.com/auth/drive";
/// Full Calendar access.
pub const SCOPE_CALENDAR: &str = "https://www.googleapis.com/auth/calendar";
/// Google Docs.
pub const SCOPE_DOCUMENTS: &str = "https://www.googleapis.com/auth/documents";
/// Google Sheets.
pub const SCOPE_SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";
/// Google Slides.
pub const SCOPE_PRESENTATIONS: &str = "https://www.googleapis.com/auth/presentations";

/// Registers every Google tool.
///
/// # Errors
///
/// Fails only if two tools share a name.
pub fn register_all(registry: &mut ToolRegistry, api: GoogleApi) -> Result<()> {
    gmail::register(registry, &api)?;
    drive::register(registry, &api)?;
    calendar::register(registry, &api)?;
    sheets::register(registry, &api)?;
    docs::register(registry, &api)?;
    slides::register(registry, &api)?;
    Ok(())
}

/// Builds the default registry for `config`.
pub fn default_registry(config: &GoogleApiConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_all(&mut registry, GoogleApi::new(config.clone()))?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// GoogleApi
// ---------------------------------------------------------------------------

/// Shared HTTP client for the Google REST APIs.
#[derive(Debug, Clone)]
pub struct GoogleApi {
    http: reqwest::Client,
    config: GoogleApiConfig,
}

impl GoogleApi {
    /// Creates a client against the configured API bases.
    pub fn new(config: GoogleApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// API base URLs.
    pub fn config(&self) -> &GoogleApiConfig {
        &self.config
    }

    /// `GET url`.
    pub async fn get(&self, url: &str, credential: &Credential) -> Result<Value> {
        let request = self.http.get(url);
        self.send(request, credential).await
    }

    /// `GET url?query`.
    pub async fn get_with_query<Q: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
        credential: &Credential,
    ) -> Result<Value> {
        let request = self.http.get(url).query(query);
        self.send(request, credential).await
    }

    /// `POST url` with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        credential: &Credential,
    ) -> Result<Value> {
        let request = self.http.post(url).json(body);
        self.send(request, credential).await
    }

    /// `POST url?query` with a JSON body.
    pub async fn post_with_query<Q: Serialize + ?Sized, B: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
        body: &B,
        credential: &Credential,
    ) -> Result<Value> {
        let request = self.http.post(url).query(query).json(body);
        self.send(request, credential).await
    }

    /// `PUT url?query` with a JSON body.
    pub async fn put_with_query<Q: Serialize + ?Sized, B: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
        body: &B,
        credential: &Credential,
    ) -> Result<Value> {
        let request = self.http.put(url).query(query).json(body);
        self.send(request, credential).await
    }

    /// `GET url?query`, returning the raw body. Used for file exports.
    pub async fn get_bytes_with_query<Q: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
        credential: &Credential,
    ) -> Result<Vec<u8>> {
        let request = self.http.get(url).query(query);
        let (_, body) = self.send_raw(request, credential).await?;
        Ok(body)
    }

    async fn send(&self, request: reqwest::RequestBuilder, credential: &Credential) -> Result<Value> {
        let (status, body) = self.send_raw(request, credential).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| {
            GoogleMcpError::Upstream {
                status: status.as_u16(),
                message: format!("unparseable response body: {e}"),
            }
            .into()
        })
    }

    async fn send_raw(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> Result<(reqwest::StatusCode, Vec<u8>)> {
        let resp = request
            .header(
                reqwest::header::AUTHORIZATION,
                credential.authorization_header(),
            )
            .send()
            .await
            .map_err(GoogleMcpError::Http)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(GoogleMcpError::Http)?;

        if !status.is_success() {
            return Err(GoogleMcpError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&String::from_utf8_lossy(&body))
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            }
            .into());
        }

        Ok((status, body.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Drive file export
// ---------------------------------------------------------------------------

/// One export target: the format name accepted by a tool and its MIME type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExportFormat {
    pub name: &'static str,
    pub mime_type: &'static str,
    pub textual: bool,
}

/// Exports a Google Workspace file through Drive.
///
/// Textual formats are returned as `content`; binary ones as
/// `content_base64` together with their size.
pub(crate) async fn export_file(
    api: &GoogleApi,
    file_id: &str,
    format: &ExportFormat,
    credential: &Credential,
) -> Result<Value> {
    let url = format!(
        "{}/files/{}/export",
        api.config().drive_base,
        path_segment(file_id)
    );
    let content = api
        .get_bytes_with_query(&url, &[("mimeType", format.mime_type)], credential)
        .await?;

    if format.textual {
        return Ok(json!({
            "format": format.name,
            "mime_type": format.mime_type,
            "content": String::from_utf8_lossy(&content),
        }));
    }
    Ok(json!({
        "format": format.name,
        "mime_type": format.mime_type,
        "size_bytes": content.len(),
        "content_base64": base64::engine::general_purpose::STANDARD.encode(&content),
    }))
}

/// Finds `name` in `formats`.
///
/// # Errors
///
/// Returns [`GoogleMcpError::InvalidArguments`] listing the supported names.
pub(crate) fn export_format<'a>(
    formats: &'a [ExportFormat],
    name: &str,
) -> Result<&'a ExportFormat> {
    formats.iter().find(|f| f.name == name).ok_or_else(|| {
        let supported: Vec<_> = formats.iter().map(|f| f.name).collect();
        GoogleMcpError::InvalidArguments(format!(
            "unsupported format '{name}', use one of: {}",
            supported.join(", ")
        ))
        .into()
    })
}

/// JSON schema `enum` of the names in `formats`.
pub(crate) fn format_names(formats: &[ExportFormat]) -> Vec<&'static str> {
    formats.iter().map(|f| f.name).collect()
}

/// Export tool for one Workspace file type.
pub(crate) struct ExportFile {
    pub api: GoogleApi,
    /// Name of the argument carrying the file id.
    pub id_param: &'static str,
    pub formats: &'static [ExportFormat],
    pub default_format: &'static str,
}

impl ExportFile {
    /// Input schema: the id argument plus an enumerated `format`.
    pub fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                self.id_param: {"type": "string"},
                "format": {
                    "type": "string",
                    "enum": format_names(self.formats),
                    "description": format!("Export format (default {})", self.default_format)
                }
            },
            "required": [self.id_param]
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for ExportFile {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let file_id = arguments
            .get(self.id_param)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GoogleMcpError::InvalidArguments(format!("missing '{}'", self.id_param))
            })?;
        let name = arguments
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(self.default_format);
        let format = export_format(self.formats, name)?;

        let mut exported = export_file(&self.api, file_id, format, credential).await?;
        exported[self.id_param] = json!(file_id);
        Ok(exported)
    }
}

/// Extracts `error.message` from a Google error body.
fn upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::Object(error) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        // OAuth-style errors: {"error": "invalid_grant", "error_description": "..."}
        Value::String(code) => Some(
            value
                .get("error_description")
                .and_then(Value::as_str)
                .map(|d| format!("{code}: {d}"))
                .unwrap_or_else(|| code.clone()),
        ),
        _ => None,
    }
}

/// Percent-encodes one URL path segment.
pub(crate) fn path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_google_layout() {
        let body = r#"{"error":{"code":404,"message":"File not found: abc","status":"NOT_FOUND"}}"#;
        assert_eq!(upstream_message(body).as_deref(), Some("File not found: abc"));
    }

    #[test]
    fn test_upstream_message_oauth_layout() {
        let body = r#"{"error":"invalid_grant","error_description":"Token has been revoked"}"#;
        assert_eq!(
            upstream_message(body).as_deref(),
            Some("invalid_grant: Token has been revoked")
        );
    }

    #[test]
    fn test_upstream_message_non_json() {
        assert!(upstream_message("<html>502</html>").is_none());
    }

    #[test]
    fn test_path_segment_encoding() {
        assert_eq!(path_segment("Sheet 1!A1:B2"), "Sheet%201%21A1%3AB2");
        assert_eq!(path_segment("abc-123_x"), "abc-123_x");
    }

    #[test]
    fn test_export_format_lookup() {
        const FORMATS: &[ExportFormat] = &[
            ExportFormat {
                name: "csv",
                mime_type: "text/csv",
                textual: true,
            },
            ExportFormat {
                name: "pdf",
                mime_type: "application/pdf",
                textual: false,
            },
        ];
        assert_eq!(export_format(FORMATS, "pdf").unwrap().mime_type, "application/pdf");
        let err = export_format(FORMATS, "odt").unwrap_err();
        assert!(err.to_string().contains("csv, pdf"));
        assert_eq!(format_names(FORMATS), vec!["csv", "pdf"]);
    }

    #[test]
    fn test_default_registry_contains_all_tools() {
        let registry = default_registry(&GoogleApiConfig::default()).unwrap();
        let names: Vec<_> = registry
            .descriptors()
            .into_iter()
            .map(|d| d.name.clone())
            .collect();
        for expected in [
            "get_account_info",
            "list_gmail_labels",
            "create_gmail_label",
            "send_email",
            "search_drive",
            "list_drive_folders",
            "list_calendar_events",
            "create_calendar_event",
            "create_spreadsheet",
            "read_spreadsheet",
            "update_spreadsheet",
            "append_to_spreadsheet",
            "create_document",
            "get_document",
            "append_to_document",
            "search_documents",
            "export_document",
            "search_spreadsheets",
            "get_spreadsheet_info",
            "clear_spreadsheet_range",
            "batch_update_spreadsheet",
            "add_sheet",
            "export_spreadsheet",
            "create_presentation",
            "get_presentation",
            "add_slide",
            "add_text_to_slide",
            "search_presentations",
            "delete_slide",
            "export_presentation",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        let scopes = registry.required_scopes();
        assert!(scopes.contains(SCOPE_DRIVE));
        assert!(scopes.contains(SCOPE_GMAIL_MODIFY));
        assert!(scopes.contains(SCOPE_PRESENTATIONS));
        assert_eq!(registry.len(), 30);
    }
}
