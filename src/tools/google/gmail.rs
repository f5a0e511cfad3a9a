//! Gmail tools

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{GoogleApi, SCOPE_GMAIL_LABELS, SCOPE_GMAIL_MODIFY};
use crate::auth::Credential;
use crate::error::{GoogleMcpError, Result};
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "get_account_info",
        "Get the email address of the currently authenticated Google account.",
        json!({"type": "object", "properties": {}}),
        [SCOPE_GMAIL_MODIFY],
        Arc::new(GetAccountInfo { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "list_gmail_labels",
        "List all user-created labels in Gmail.",
        json!({"type": "object", "properties": {}}),
        [SCOPE_GMAIL_LABELS],
        Arc::new(ListLabels { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "create_gmail_label",
        "Create a new label in Gmail.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Label name"}
            },
            "required": ["name"]
        }),
        [SCOPE_GMAIL_LABELS],
        Arc::new(CreateLabel { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "send_email",
        "Send a plain-text email from the authenticated account.",
        json!({
            "type": "object",
            "properties": {
                "to": {"type": "string", "description": "Recipient address"},
                "subject": {"type": "string"},
                "body": {"type": "string", "description": "Plain-text body"}
            },
            "required": ["to", "subject", "body"]
        }),
        [SCOPE_GMAIL_MODIFY],
        Arc::new(SendEmail { api: api.clone() }),
    ))?;
    Ok(())
}

struct GetAccountInfo {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for GetAccountInfo {
    async fn invoke(&self, _arguments: Value, credential: &Credential) -> Result<Value> {
        let url = format!("{}/users/me/profile", self.api.config().gmail_base);
        let profile = self.api.get(&url, credential).await?;
        Ok(json!({
            "email": profile.get("emailAddress").cloned().unwrap_or(Value::Null),
            "messages_total": profile.get("messagesTotal").cloned().unwrap_or(Value::Null),
        }))
    }
}

struct ListLabels {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for ListLabels {
    async fn invoke(&self, _arguments: Value, credential: &Credential) -> Result<Value> {
        let url = format!("{}/users/me/labels", self.api.config().gmail_base);
        let response = self.api.get(&url, credential).await?;

        let labels: Vec<Value> = response
            .get("labels")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|label| label.get("type").and_then(Value::as_str) == Some("user"))
            .map(|label| json!({"id": label.get("id"), "name": label.get("name")}))
            .collect();

        Ok(json!({ "labels": labels }))
    }
}

#[derive(Debug, Deserialize)]
struct CreateLabelParams {
    name: String,
}

struct CreateLabel {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for CreateLabel {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: CreateLabelParams = parse_arguments(arguments)?;
        let url = format!("{}/users/me/labels", self.api.config().gmail_base);
        let body = json!({
            "name": params.name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        let label = self.api.post(&url, &body, credential).await?;
        Ok(json!({"id": label.get("id"), "name": label.get("name")}))
    }
}

#[derive(Debug, Deserialize)]
struct SendEmailParams {
    to: String,
    subject: String,
    body: String,
}

struct SendEmail {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for SendEmail {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: SendEmailParams = parse_arguments(arguments)?;
        let raw = build_raw_message(&params.to, &params.subject, &params.body)?;

        let url = format!("{}/users/me/messages/send", self.api.config().gmail_base);
        let sent = self.api.post(&url, &json!({ "raw": raw }), credential).await?;
        Ok(json!({"id": sent.get("id"), "thread_id": sent.get("threadId")}))
    }
}

/// Builds the base64url-encoded RFC 2822 message Gmail expects in `raw`.
///
/// Non-ASCII subjects are RFC 2047 encoded. Header values containing line
/// breaks are rejected.
fn build_raw_message(to: &str, subject: &str, body: &str) -> Result<String> {
    for (name, value) in [("to", to), ("subject", subject)] {
        if value.contains(['\r', '\n']) {
            return Err(GoogleMcpError::InvalidArguments(format!(
                "'{name}' must not contain line breaks"
            ))
            .into());
        }
    }

    let subject = if subject.is_ascii() {
        subject.to_string()
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(subject)
        )
    };

    let message = format!(
        "To: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n{body}"
    );
    Ok(base64::engine::general_purpose::URL_SAFE.encode(message))
}
