//! Docs tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::drive::{typed_search_schema, SearchFilesOfType};
use super::{path_segment, ExportFile, ExportFormat, GoogleApi, SCOPE_DOCUMENTS, SCOPE_DRIVE};
use crate::auth::Credential;
use crate::error::Result;
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "create_document",
        "Create a new Google Docs document with optional initial text.",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "body_text": {"type": "string", "description": "Initial text"}
            },
            "required": ["title"]
        }),
        [SCOPE_DOCUMENTS],
        Arc::new(CreateDocument { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "get_document",
        "Get the title and full text of a Google Docs document.",
        json!({
            "type": "object",
            "properties": {"document_id": {"type": "string"}},
            "required": ["document_id"]
        }),
        [SCOPE_DOCUMENTS],
        Arc::new(GetDocument { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "append_to_document",
        "Append text to the end of a Google Docs document.",
        json!({
            "type": "object",
            "properties": {
                "document_id": {"type": "string"},
                "text": {"type": "string"}
            },
            "required": ["document_id", "text"]
        }),
        [SCOPE_DOCUMENTS],
        Arc::new(AppendToDocument { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "search_documents",
        "Search Google Docs documents in Drive. An empty query lists recent documents.",
        typed_search_schema(),
        [SCOPE_DRIVE],
        Arc::new(SearchFilesOfType::new(api, DOCUMENT_MIME_TYPE)),
    ))?;
    let export = ExportFile {
        api: api.clone(),
        id_param: "document_id",
        formats: EXPORT_FORMATS,
        default_format: "text",
    };
    registry.register(ToolDescriptor::new(
        "export_document",
        "Export a Google Docs document as text, html, pdf, or docx.",
        export.schema(),
        [SCOPE_DRIVE],
        Arc::new(export),
    ))?;
    Ok(())
}

const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

const EXPORT_FORMATS: &[ExportFormat] = &[
    ExportFormat {
        name: "text",
        mime_type: "text/plain",
        textual: true,
    },
    ExportFormat {
        name: "html",
        mime_type: "text/html",
        textual: true,
    },
    ExportFormat {
        name: "pdf",
        mime_type: "application/pdf",
        textual: false,
    },
    ExportFormat {
        name: "docx",
        mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        textual: false,
    },
];

fn document_url(api: &GoogleApi, document_id: &str) -> String {
    format!(
        "{}/documents/{}",
        api.config().docs_base,
        path_segment(document_id)
    )
}

fn insert_text(index: u64, text: &str) -> Value {
    json!({
        "requests": [{"insertText": {"location": {"index": index}, "text": text}}]
    })
}

/// Concatenates the text runs of every paragraph in the document body.
fn document_text(document: &Value) -> String {
    let content = document
        .pointer("/body/content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    content
        .iter()
        .filter_map(|element| element.pointer("/paragraph/elements"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|run| run.pointer("/textRun/content").and_then(Value::as_str))
        .collect()
}

/// Index just before the document's final newline.
fn end_index(document: &Value) -> u64 {
    document
        .pointer("/body/content")
        .and_then(Value::as_array)
        .and_then(|content| content.last())
        .and_then(|last| last.get("endIndex"))
        .and_then(Value::as_u64)
        .map(|end| end.saturating_sub(1).max(1))
        .unwrap_or(1)
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    title: String,
    #[serde(default)]
    body_text: String,
}

struct CreateDocument {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for CreateDocument {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: CreateParams = parse_arguments(arguments)?;
        let url = format!("{}/documents", self.api.config().docs_base);
        let created = self
            .api
            .post(&url, &json!({"title": params.title}), credential)
            .await?;
        let id = created
            .get("documentId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !params.body_text.is_empty() {
            let batch = format!("{}:batchUpdate", document_url(&self.api, &id));
            self.api
                .post(&batch, &insert_text(1, &params.body_text), credential)
                .await?;
        }

        Ok(json!({
            "document_id": id,
            "url": format!("https://docs.google.com/document/d/{id}/edit"),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DocumentParams {
    document_id: String,
}

struct GetDocument {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for GetDocument {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: DocumentParams = parse_arguments(arguments)?;
        let document = self
            .api
            .get(&document_url(&self.api, &params.document_id), credential)
            .await?;

        Ok(json!({
            "document_id": params.document_id,
            "title": document.get("title"),
            "text": document_text(&document),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AppendParams {
    document_id: String,
    text: String,
}

struct AppendToDocument {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for AppendToDocument {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: AppendParams = parse_arguments(arguments)?;
        let url = document_url(&self.api, &params.document_id);
        let document = self.api.get(&url, credential).await?;
        let index = end_index(&document);

        self.api
            .post(
                &format!("{url}:batchUpdate"),
                &insert_text(index, &params.text),
                credential,
            )
            .await?;

        Ok(json!({"document_id": params.document_id, "inserted_at": index}))
    }
}
